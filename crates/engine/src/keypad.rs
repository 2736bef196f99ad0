//! Keypad – maps key gestures onto calculator operations.
//!
//! Front ends translate whatever their toolkit delivers (a button id, a
//! typed character, a socket message) into [`Key`]s and call
//! [`Calculator::press`].

use crate::calculator::{Calculator, Operator};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Digit(char),
    Decimal,
    Operator(Operator),
    Equals,
    ToggleSign,
    Percent,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("unknown key: {0:?}")]
    Unknown(String),
}

impl Key {
    pub fn from_char(c: char) -> Option<Key> {
        let key = match c {
            '0'..='9' => Key::Digit(c),
            '.' | ',' => Key::Decimal,
            '+' => Key::Operator(Operator::Add),
            '-' | '−' => Key::Operator(Operator::Subtract),
            '*' | '×' | 'x' | 'X' => Key::Operator(Operator::Multiply),
            '/' | '÷' => Key::Operator(Operator::Divide),
            '=' => Key::Equals,
            '±' | 'n' | 'N' => Key::ToggleSign,
            '%' => Key::Percent,
            'c' | 'C' => Key::Clear,
            _ => return None,
        };
        Some(key)
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "+/-" | "neg" | "sign" => return Ok(Key::ToggleSign),
            "ac" | "ce" | "clear" => return Ok(Key::Clear),
            "equals" => return Ok(Key::Equals),
            _ => {}
        }
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Key::from_char(c).ok_or_else(|| KeyError::Unknown(s.to_string())),
            _ => Err(KeyError::Unknown(s.to_string())),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Digit(d) => write!(f, "{}", d),
            Key::Decimal => f.write_str("."),
            Key::Operator(op) => write!(f, "{}", op),
            Key::Equals => f.write_str("="),
            Key::ToggleSign => f.write_str("±"),
            Key::Percent => f.write_str("%"),
            Key::Clear => f.write_str("C"),
        }
    }
}

/// Parse a key sequence such as `"12 + 3 ="`, `"12+3="` or `"AC 5 +/- ="`.
///
/// Tokens are separated by whitespace. A token naming a multi-character key
/// is one key; any other token is read one character at a time.
pub fn parse_keys(input: &str) -> Result<Vec<Key>, KeyError> {
    let mut keys = Vec::new();
    for token in input.split_whitespace() {
        if token.chars().count() > 1 {
            if let Ok(key) = token.parse::<Key>() {
                keys.push(key);
                continue;
            }
        }
        for c in token.chars() {
            let key = Key::from_char(c).ok_or_else(|| KeyError::Unknown(c.to_string()))?;
            keys.push(key);
        }
    }
    Ok(keys)
}

impl Calculator {
    pub fn press(&mut self, key: Key) -> &str {
        match key {
            Key::Digit(d) => self.append_digit(d),
            Key::Decimal => self.append_decimal(),
            Key::Operator(op) => self.set_operation(op),
            Key::Equals => self.calculate(),
            Key::ToggleSign => self.toggle_sign(),
            Key::Percent => self.percentage(),
            Key::Clear => self.clear(),
        }
    }

    pub fn press_all<I>(&mut self, keys: I) -> &str
    where
        I: IntoIterator<Item = Key>,
    {
        for key in keys {
            self.press(key);
        }
        self.display()
    }
}
