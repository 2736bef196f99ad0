//! Command registry and built-in commands.
//!
//! Commands are registered by name and invoked with JSON input/output.

use crate::calculator::Calculator;
use crate::contacts::{ContactDraft, ContactId, ValidationError};
use crate::context::AppContext;
use crate::keypad::parse_keys;
use crate::traits::CapError;
use crate::types::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, CommandError>> + Send + 'a>>;

/// Signature for all engine commands.
pub type CommandHandler = for<'a> fn(Value, &'a AppContext) -> HandlerFuture<'a>;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Capability(#[from] CapError),
}

impl CommandError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CommandError::InvalidInput(_) => ErrorCode::InvalidInput,
            CommandError::Validation(_) => ErrorCode::ValidationFailed,
            CommandError::Capability(e) => match e {
                CapError::Network(_) => ErrorCode::NetworkError,
                CapError::Timeout => ErrorCode::Timeout,
                CapError::NotFound(_) => ErrorCode::NotFound,
                CapError::Rejected { .. } => ErrorCode::Rejected,
                CapError::Validation(_) => ErrorCode::ValidationFailed,
                CapError::Io(_) => ErrorCode::IoError,
                CapError::Decode(_) | CapError::Other(_) => ErrorCode::InternalError,
            },
        }
    }

    /// Structured context for the error envelope, `null` when there is none.
    pub fn details(&self) -> Value {
        match self {
            CommandError::Capability(CapError::NotFound(id)) => json!({ "id": id }),
            CommandError::Capability(CapError::Rejected { operation, status }) => {
                json!({ "operation": operation, "http_status": status })
            }
            CommandError::Validation(ValidationError::MissingField(field))
            | CommandError::Capability(CapError::Validation(ValidationError::MissingField(
                field,
            ))) => json!({ "field": field }),
            _ => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct CommandRegistry {
    handlers: HashMap<String, CommandHandler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
        };
        // Register built-in commands
        reg.register("calc", cmd_calc);
        reg.register("contacts.list", cmd_contacts_list);
        reg.register("contacts.get", cmd_contacts_get);
        reg.register("contacts.add", cmd_contacts_add);
        reg.register("contacts.update", cmd_contacts_update);
        reg.register("contacts.delete", cmd_contacts_delete);
        reg.register("api_key.get", cmd_api_key_get);
        reg.register("api_key.set", cmd_api_key_set);
        reg
    }

    pub fn register(&mut self, name: &str, handler: CommandHandler) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    /// Execute a command by name and return a full CommandResult.
    pub async fn execute(&self, name: &str, args: Value, ctx: &AppContext) -> CommandResult {
        let run_id = new_run_id();
        let start = Instant::now();

        let handler = match self.handlers.get(name) {
            Some(h) => h,
            None => {
                return result_err(
                    "call",
                    name,
                    &run_id,
                    start.elapsed().as_millis() as u64,
                    ErrorCode::InvalidInput,
                    format!("unknown command: {}", name),
                );
            }
        };

        tracing::debug!(command = name, %run_id, "executing command");
        match handler(args, ctx).await {
            Ok(data) => {
                let mut r = result_ok("call", name, &run_id, start.elapsed().as_millis() as u64);
                r.data = Some(data);
                r
            }
            Err(e) => {
                tracing::debug!(command = name, error = %e, "command failed");
                let mut r = result_err(
                    "call",
                    name,
                    &run_id,
                    start.elapsed().as_millis() as u64,
                    e.error_code(),
                    e.to_string(),
                );
                if let Some(info) = r.error.as_mut() {
                    info.details = e.details();
                }
                r
            }
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Press `keys` on a caller-owned calculator and report the new display.
pub fn press_keys(calc: &mut Calculator, keys: &str) -> CommandResult {
    let run_id = new_run_id();
    let start = Instant::now();
    tracing::debug!(keys, "pressing keys");
    match parse_keys(keys) {
        Ok(parsed) => {
            calc.press_all(parsed);
            let mut r = result_ok("press", keys, &run_id, start.elapsed().as_millis() as u64);
            r.data = Some(calculator_snapshot(calc));
            r
        }
        Err(e) => result_err(
            "press",
            keys,
            &run_id,
            start.elapsed().as_millis() as u64,
            ErrorCode::InvalidInput,
            e.to_string(),
        ),
    }
}

pub fn calculator_snapshot(calc: &Calculator) -> Value {
    json!({
        "display": calc.display(),
        "state": calc.state(),
    })
}

// ===========================================================================
// Argument helpers
// ===========================================================================

fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, CommandError> {
    args.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CommandError::InvalidInput(format!("missing '{}' string field", field)))
}

fn contact_id(args: &Value) -> Result<ContactId, CommandError> {
    let raw = args
        .get("id")
        .cloned()
        .ok_or_else(|| CommandError::InvalidInput("missing 'id' field".into()))?;
    serde_json::from_value(raw)
        .map_err(|_| CommandError::InvalidInput("'id' must be a string or integer".into()))
}

fn contact_draft(args: Value) -> Result<ContactDraft, CommandError> {
    serde_json::from_value(args)
        .map_err(|e| CommandError::InvalidInput(format!("invalid contact fields: {}", e)))
}

/// `ad***@example.com` style rendering of a stored key.
fn mask_token(token: &str) -> String {
    let (local, domain) = match token.split_once('@') {
        Some((l, d)) => (l, Some(d)),
        None => (token, None),
    };
    let visible: String = local.chars().take(2).collect();
    match domain {
        Some(d) => format!("{}***@{}", visible, d),
        None => format!("{}***", visible),
    }
}

// ===========================================================================
// Built-in commands
// ===========================================================================

/// `calc` – press keys on a fresh calculator.
///
/// Args: `{ "keys": "2 + 3 =" }` or `{ "keys": ["2", "+", "3", "="] }`
/// Returns: `{ "display": "5", "state": { ... } }`
fn cmd_calc(args: Value, ctx: &AppContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let keys = match args.get("keys") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(String::from)
                        .ok_or_else(|| CommandError::InvalidInput("'keys' entries must be strings".into()))
                })
                .collect::<Result<Vec<_>, _>>()?
                .join(" "),
            _ => {
                return Err(CommandError::InvalidInput(
                    "missing 'keys' string or array field".into(),
                ))
            }
        };
        let parsed = parse_keys(&keys).map_err(|e| CommandError::InvalidInput(e.to_string()))?;

        let mut calc = ctx.new_calculator();
        calc.press_all(parsed);
        Ok::<_, CommandError>(calculator_snapshot(&calc))
    })
}

/// `contacts.list` – every contact in the directory.
fn cmd_contacts_list(_args: Value, ctx: &AppContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let contacts = ctx.directory().list().await?;
        Ok::<_, CommandError>(json!({ "count": contacts.len(), "contacts": contacts }))
    })
}

/// `contacts.get` – Args: `{ "id": "7" }`
fn cmd_contacts_get(args: Value, ctx: &AppContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let id = contact_id(&args)?;
        let contact = ctx.directory().get(&id).await?;
        Ok::<_, CommandError>(json!({ "contact": contact }))
    })
}

/// `contacts.add` – Args: `{ "name", "surname", "email", "phone", "address"? }`
fn cmd_contacts_add(args: Value, ctx: &AppContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let draft = contact_draft(args)?;
        draft.validate()?;
        ctx.directory().create(&draft).await?;
        Ok::<_, CommandError>(json!({ "added": true }))
    })
}

/// `contacts.update` – Args: `{ "id", "name", "surname", "email", "phone", "address"? }`
fn cmd_contacts_update(args: Value, ctx: &AppContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let id = contact_id(&args)?;
        let draft = contact_draft(args)?;
        draft.validate()?;
        ctx.directory().update(&id, &draft).await?;
        Ok::<_, CommandError>(json!({ "updated": id }))
    })
}

/// `contacts.delete` – Args: `{ "id": "7" }`
fn cmd_contacts_delete(args: Value, ctx: &AppContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let id = contact_id(&args)?;
        ctx.directory().delete(&id).await?;
        Ok::<_, CommandError>(json!({ "deleted": id }))
    })
}

/// `api_key.get` – whether a key is stored, masked.
fn cmd_api_key_get(_args: Value, ctx: &AppContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let stored = ctx.credentials().get()?;
        Ok::<_, CommandError>(json!({
            "configured": stored.is_some(),
            "api_key": stored.as_deref().map(mask_token),
        }))
    })
}

/// `api_key.set` – Args: `{ "api_key": "me@example.com" }`
fn cmd_api_key_set(args: Value, ctx: &AppContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let key = required_str(&args, "api_key")?;
        ctx.credentials().set(key)?;
        Ok::<_, CommandError>(json!({ "saved": true }))
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppContext;

    #[tokio::test]
    async fn test_calc_command() {
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();
        let result = reg.execute("calc", json!({ "keys": "2 + 3 × 4 =" }), &ctx).await;
        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.data.unwrap()["display"], "20");
    }

    #[tokio::test]
    async fn test_calc_command_with_key_array() {
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();
        let result = reg
            .execute("calc", json!({ "keys": ["5", "÷", "2", "="] }), &ctx)
            .await;
        let data = result.data.unwrap();
        assert_eq!(data["display"], "2.5");
        assert_eq!(data["state"]["awaiting_fresh_input"], true);
    }

    #[tokio::test]
    async fn test_calc_command_respects_display_cap() {
        let ctx = AppContext::in_memory().with_max_display_length(3);
        let reg = CommandRegistry::new();
        let result = reg.execute("calc", json!({ "keys": "12345" }), &ctx).await;
        assert_eq!(result.data.unwrap()["display"], "123");
    }

    #[tokio::test]
    async fn test_calc_command_bad_keys() {
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();
        let result = reg.execute("calc", json!({ "keys": "2 ^ 3" }), &ctx).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().code, ErrorCode::InvalidInput);

        let result = reg.execute("calc", json!({}), &ctx).await;
        assert_eq!(result.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();
        let result = reg.execute("nonexistent", json!({}), &ctx).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_contact_commands() {
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();

        let list = reg.execute("contacts.list", json!({}), &ctx).await;
        assert_eq!(list.data.unwrap()["count"], 2);

        let add = reg
            .execute(
                "contacts.add",
                json!({
                    "name": "Ada",
                    "surname": "Lovelace",
                    "email": "ada@example.com",
                    "phone": "555"
                }),
                &ctx,
            )
            .await;
        assert_eq!(add.status, Status::Pass);

        let get = reg.execute("contacts.get", json!({ "id": 3 }), &ctx).await;
        assert_eq!(get.data.unwrap()["contact"]["surname"], "Lovelace");

        let update = reg
            .execute(
                "contacts.update",
                json!({
                    "id": "3",
                    "name": "Ada",
                    "surname": "King",
                    "email": "ada@example.com",
                    "phone": "555",
                    "address": "London"
                }),
                &ctx,
            )
            .await;
        assert_eq!(update.status, Status::Pass);
        let get = reg.execute("contacts.get", json!({ "id": "3" }), &ctx).await;
        let contact = &get.data.unwrap()["contact"];
        assert_eq!(contact["surname"], "King");
        assert_eq!(contact["address"], "London");

        let delete = reg.execute("contacts.delete", json!({ "id": "3" }), &ctx).await;
        assert_eq!(delete.status, Status::Pass);
        let get = reg.execute("contacts.get", json!({ "id": "3" }), &ctx).await;
        let err = get.error.unwrap();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.details["id"], "3");
    }

    #[tokio::test]
    async fn test_contacts_add_validation() {
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();
        let result = reg
            .execute("contacts.add", json!({ "name": "Ada" }), &ctx)
            .await;
        assert_eq!(result.status, Status::Error);
        let err = result.error.unwrap();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.details["field"], "surname");
    }

    #[tokio::test]
    async fn test_contacts_get_requires_id() {
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();
        let result = reg.execute("contacts.get", json!({}), &ctx).await;
        assert_eq!(result.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_api_key_commands() {
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();

        let get = reg.execute("api_key.get", json!({}), &ctx).await;
        assert_eq!(get.data.unwrap()["configured"], false);

        let blank = reg.execute("api_key.set", json!({ "api_key": "  " }), &ctx).await;
        assert_eq!(blank.error.unwrap().code, ErrorCode::ValidationFailed);

        let set = reg
            .execute("api_key.set", json!({ "api_key": "student@example.com" }), &ctx)
            .await;
        assert_eq!(set.status, Status::Pass);

        let get = reg.execute("api_key.get", json!({}), &ctx).await;
        let data = get.data.unwrap();
        assert_eq!(data["configured"], true);
        assert_eq!(data["api_key"], "st***@example.com");
    }

    #[test]
    fn test_press_keys_keeps_state_between_calls() {
        let mut calc = Calculator::new();
        let r = press_keys(&mut calc, "7 ×");
        assert_eq!(r.status, Status::Pass);
        let r = press_keys(&mut calc, "6 =");
        assert_eq!(r.data.unwrap()["display"], "42");

        let r = press_keys(&mut calc, "7 & 6");
        assert_eq!(r.status, Status::Error);
        assert_eq!(calc.display(), "42");
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("appacademy@itvarsity.org"), "ap***@itvarsity.org");
        assert_eq!(mask_token("x"), "x***");
    }

    #[test]
    fn test_list_commands() {
        let reg = CommandRegistry::new();
        let names = reg.list();
        assert!(names.contains(&"calc"));
        assert!(names.contains(&"contacts.list"));
        assert!(names.contains(&"api_key.set"));
    }
}
