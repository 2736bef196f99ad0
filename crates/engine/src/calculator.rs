//! Calculator engine – the display/input state machine behind the keypad.
//!
//! The engine owns a single [`CalculatorState`] and exposes one method per
//! keypad action. Every method returns the string the display should show.
//! Nothing here fails: out-of-range input is dropped and IEEE-754 special
//! values (infinity, NaN) are rendered like any other result.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of characters typed input may occupy before digits are dropped.
pub const DEFAULT_MAX_DISPLAY_LENGTH: usize = 9;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    /// Apply the operator with `lhs` as the captured operand.
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Operator::Add => lhs + rhs,
            Operator::Subtract => lhs - rhs,
            Operator::Multiply => lhs * rhs,
            Operator::Divide => lhs / rhs,
        }
    }

    /// Keypad glyph for this operator.
    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Subtract => '−',
            Operator::Multiply => '×',
            Operator::Divide => '÷',
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatorState {
    /// Operand being typed, or the most recent result.
    pub current_input: String,
    /// Operand captured when an operator was pressed; empty when none.
    pub previous_input: String,
    pub pending_operator: Option<Operator>,
    /// Next digit starts a new operand instead of extending this one.
    pub awaiting_fresh_input: bool,
    pub max_display_length: usize,
}

impl CalculatorState {
    pub fn new(max_display_length: usize) -> Self {
        Self {
            current_input: "0".to_string(),
            previous_input: String::new(),
            pending_operator: None,
            awaiting_fresh_input: false,
            max_display_length,
        }
    }
}

impl Default for CalculatorState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DISPLAY_LENGTH)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Four-function calculator. Construct one per session and keep it.
#[derive(Debug, Clone, Default)]
pub struct Calculator {
    state: CalculatorState,
}

impl Calculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_display_length(max_display_length: usize) -> Self {
        Self {
            state: CalculatorState::new(max_display_length),
        }
    }

    pub fn state(&self) -> &CalculatorState {
        &self.state
    }

    /// Text currently shown on the display.
    pub fn display(&self) -> &str {
        &self.state.current_input
    }

    pub fn append_digit(&mut self, digit: char) -> &str {
        if !digit.is_ascii_digit() {
            return self.display();
        }
        let state = &mut self.state;
        if state.current_input == "0" || state.awaiting_fresh_input {
            state.current_input = digit.to_string();
            state.awaiting_fresh_input = false;
        } else if state.current_input.len() < state.max_display_length {
            state.current_input.push(digit);
        }
        self.display()
    }

    pub fn append_decimal(&mut self) -> &str {
        let state = &mut self.state;
        if state.awaiting_fresh_input {
            state.current_input = "0.".to_string();
            state.awaiting_fresh_input = false;
        } else if !state.current_input.contains('.') {
            state.current_input.push('.');
        }
        self.display()
    }

    /// Queue `op`, evaluating any operation already pending (left to right).
    pub fn set_operation(&mut self, op: Operator) -> &str {
        if self.state.pending_operator.is_some() {
            self.calculate();
        }
        let state = &mut self.state;
        state.previous_input = state.current_input.clone();
        state.pending_operator = Some(op);
        state.awaiting_fresh_input = true;
        self.display()
    }

    pub fn calculate(&mut self) -> &str {
        let Some(lhs) = operand_value(&self.state.previous_input) else {
            return self.display();
        };
        let Some(op) = self.state.pending_operator else {
            return self.display();
        };
        let rhs = numeric_value(&self.state.current_input);
        let result = op.apply(lhs, rhs);
        debug!(lhs, rhs, %op, result, "evaluated pending operation");

        self.state.current_input = self.format_result(result);
        self.state.pending_operator = None;
        self.state.previous_input.clear();
        self.state.awaiting_fresh_input = true;
        self.display()
    }

    pub fn toggle_sign(&mut self) -> &str {
        let value = numeric_value(&self.state.current_input);
        self.state.current_input = render_number(-1.0 * value);
        self.display()
    }

    pub fn percentage(&mut self) -> &str {
        let value = numeric_value(&self.state.current_input);
        self.state.current_input = render_number(value / 100.0);
        self.display()
    }

    /// Back to the initial display. The fresh-input flag is left alone;
    /// a display of "0" is replaced by the next digit either way.
    pub fn clear(&mut self) -> &str {
        self.state.current_input = "0".to_string();
        self.state.previous_input.clear();
        self.state.pending_operator = None;
        self.display()
    }

    /// Render a computed value, rounding it to `max_display_length - 2`
    /// significant digits when the plain rendering does not fit.
    pub fn format_result(&self, value: f64) -> String {
        let raw = render_number(value);
        if raw.len() <= self.state.max_display_length {
            return raw;
        }
        let significant = self.state.max_display_length.saturating_sub(2).max(1);
        let reduced = to_precision(value, significant);
        match reduced.parse::<f64>() {
            Ok(v) => render_number(v),
            Err(_) => raw,
        }
    }
}

// ---------------------------------------------------------------------------
// Number helpers
// ---------------------------------------------------------------------------

/// Default decimal rendering used for every value the display shows.
///
/// Plain notation for magnitudes in `[1e-6, 1e21)`, exponent notation
/// outside it, `"0"` for both zeros, and `inf` / `-inf` / `NaN` for the
/// IEEE special values.
pub fn render_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_finite() {
        let magnitude = value.abs();
        if !(1e-6..1e21).contains(&magnitude) {
            return format!("{:e}", value);
        }
    }
    value.to_string()
}

/// Digits after the point that hold the exact decimal expansion of any f64.
const EXACT_DIGITS: usize = 800;

/// `value` rounded to `significant` digits, in exponent notation.
///
/// Rounds the exact decimal expansion half away from zero, so a tie picks
/// the larger magnitude (`1234568500` to 7 digits is `1.234569e9`).
fn to_precision(value: f64, significant: usize) -> String {
    let significant = significant.max(1);
    if !value.is_finite() {
        return render_number(value);
    }
    let exact = format!("{:.*e}", EXACT_DIGITS, value.abs());
    let Some((mantissa, exponent)) = exact.split_once('e') else {
        return render_number(value);
    };
    let Ok(mut exponent) = exponent.parse::<i32>() else {
        return render_number(value);
    };

    let digits: Vec<u8> = mantissa.bytes().filter(u8::is_ascii_digit).collect();
    let mut kept: Vec<u8> = digits.iter().take(significant).copied().collect();
    kept.resize(significant, b'0');

    if digits.get(significant).is_some_and(|d| *d >= b'5') {
        let mut i = kept.len();
        loop {
            if i == 0 {
                // carried out of the leading digit: 9.99..e{n} -> 1.00..e{n+1}
                kept.insert(0, b'1');
                kept.truncate(significant);
                exponent += 1;
                break;
            }
            i -= 1;
            if kept[i] == b'9' {
                kept[i] = b'0';
            } else {
                kept[i] += 1;
                break;
            }
        }
    }

    let sign = if value.is_sign_negative() { "-" } else { "" };
    let (lead, rest) = kept.split_at(1);
    let lead = lead[0] as char;
    let rest = String::from_utf8_lossy(rest);
    if rest.is_empty() {
        format!("{}{}e{}", sign, lead, exponent)
    } else {
        format!("{}{}.{}e{}", sign, lead, rest, exponent)
    }
}

fn numeric_value(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// A captured operand; blank or NaN text means there is none.
fn operand_value(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}
