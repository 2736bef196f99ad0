//! `deskctl` – command-line front end for the deskpad engine.
//!
//! Drives the same calculator and contact-book logic any other front end
//! would, from a terminal, a script, or a Unix-socket client.

mod config;
mod logging;
mod serve;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use crate::config::{AppConfig, Backend, FrontendConfig};
use desk_engine::commands::press_keys;
use desk_engine::contacts::Contact;
use desk_engine::platform::{FileCredentialStore, MemoryDirectory};
use desk_engine::types::*;
use desk_engine::{AppContext, CommandRegistry, CommandResult};
use dialoguer::{Confirm, Input};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "deskctl",
    version,
    about = "Calculator and contact book from the command line"
)]
struct Cli {
    /// Extra YAML config file layered over the defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Use the built-in sample directory instead of the remote API.
    #[arg(long, global = true)]
    offline: bool,
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Press calculator keys, e.g. `deskctl calc "12 + 3 ="`.
    /// Without keys, starts an interactive session.
    Calc {
        /// Key sequence: digits, . + - × ÷ * / = % ± n C AC +/-
        keys: Option<String>,
    },

    /// Manage contacts in the directory.
    Contacts {
        #[command(subcommand)]
        action: ContactsAction,
    },

    /// Show or store the directory API key.
    ApiKey {
        #[command(subcommand)]
        action: ApiKeyAction,
    },

    /// Print the effective (sanitized) configuration.
    Config,

    /// Invoke an engine command by name with JSON args.
    Call {
        /// Command name (e.g. "calc", "contacts.list", "api_key.set").
        cmd: String,
        /// JSON args to pass to the command.
        #[arg(long, default_value = "{}")]
        args: String,
        /// Directory for artifacts output.
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },

    /// Run a scripted scenario from a YAML file.
    RunScenario {
        /// Path to the scenario YAML file.
        file: PathBuf,
        /// Directory for artifacts output.
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },

    /// Start daemon mode over a Unix socket.
    Serve {
        /// Path for the Unix domain socket.
        #[arg(long)]
        socket: PathBuf,
    },
}

#[derive(Subcommand)]
enum ContactsAction {
    /// List every contact.
    List,
    /// Show one contact.
    Show { id: String },
    /// Add a contact; missing fields are prompted for.
    Add(ContactFields),
    /// Edit a contact; without flags every field is prompted for.
    Edit {
        id: String,
        #[command(flatten)]
        fields: ContactFields,
    },
    /// Delete a contact.
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Default)]
struct ContactFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    surname: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

impl ContactFields {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.surname.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
    }
}

#[derive(Subcommand)]
enum ApiKeyAction {
    /// Store the API key (your email); prompted for when omitted.
    Set { key: Option<String> },
    /// Show whether a key is stored.
    Show,
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = crate::config::load_config(cli.config.as_deref()).context("failed to load configuration")?;
    logging::init_logging(&config.logging);

    let ctx = build_context(&config, cli.offline)?;
    let registry = CommandRegistry::new();
    let json = cli.json;

    match cli.command {
        Commands::Calc { keys } => cmd_calc(keys, json, &ctx)?,
        Commands::Contacts { action } => cmd_contacts(action, json, &ctx, &registry).await?,
        Commands::ApiKey { action } => cmd_api_key(action, json, &ctx, &registry).await?,
        Commands::Config => {
            let view = FrontendConfig::from(&config);
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Call {
            cmd,
            args,
            artifacts,
        } => cmd_call(&cmd, &args, json, artifacts, &ctx, &registry).await,
        Commands::RunScenario { file, artifacts } => {
            cmd_run_scenario(&file, json, artifacts, &ctx, &registry).await
        }
        Commands::Serve { socket } => serve::run_daemon(socket, ctx, registry).await?,
    }
    Ok(())
}

fn build_context(config: &AppConfig, offline: bool) -> anyhow::Result<AppContext> {
    let credential_path = config.credentials.resolved_path();
    let ctx = if offline || config.contact_book.backend == Backend::Memory {
        tracing::debug!("using in-memory contact directory");
        AppContext::new(
            Box::new(MemoryDirectory::with_sample_data()),
            Arc::new(FileCredentialStore::new(&credential_path)),
        )
    } else {
        AppContext::http(&config.directory_settings(), &credential_path)
            .context("failed to set up contact directory client")?
    };
    Ok(ctx.with_max_display_length(config.calculator.max_display_length))
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

fn cmd_calc(keys: Option<String>, json: bool, ctx: &AppContext) -> anyhow::Result<()> {
    let mut calc = ctx.new_calculator();

    if let Some(keys) = keys {
        let result = press_keys(&mut calc, &keys);
        if json || result.status != Status::Pass {
            output_result(&result, json);
        } else {
            println!("{}", calc.display());
        }
        return Ok(());
    }

    println!("Type keys and press enter (q to quit).");
    println!("{}", calc.display());
    loop {
        let line: String = Input::new()
            .with_prompt("keys")
            .allow_empty(true)
            .interact_text()?;
        let line = line.trim();
        if matches!(line, "q" | "quit" | "exit") {
            break;
        }
        let result = press_keys(&mut calc, line);
        if let Some(err) = result.error {
            eprintln!("  {}", err.message);
        } else if json {
            println!("{}", serde_json::to_string(&result.data)?);
        } else {
            println!("{:>width$}", calc.display(), width = ctx.max_display_length);
        }
    }
    Ok(())
}

async fn cmd_contacts(
    action: ContactsAction,
    json: bool,
    ctx: &AppContext,
    registry: &CommandRegistry,
) -> anyhow::Result<()> {
    match action {
        ContactsAction::List => {
            let result = registry.execute("contacts.list", json!({}), ctx).await;
            if json || result.status != Status::Pass {
                output_result(&result, json);
            } else {
                print_contact_list(&result);
            }
        }
        ContactsAction::Show { id } => {
            let result = registry.execute("contacts.get", json!({ "id": id }), ctx).await;
            match contact_from(&result) {
                Some(contact) if !json => print_contact(&contact),
                _ => output_result(&result, json),
            }
        }
        ContactsAction::Add(fields) => {
            let args = json!({
                "name": field_or_prompt(fields.name, "Name", None)?,
                "surname": field_or_prompt(fields.surname, "Surname", None)?,
                "email": field_or_prompt(fields.email, "Email", None)?,
                "phone": field_or_prompt(fields.phone, "Phone", None)?,
                "address": fields.address.unwrap_or_default(),
            });
            let result = registry.execute("contacts.add", args, ctx).await;
            report(&result, json, "Contact added successfully!");
        }
        ContactsAction::Edit { id, fields } => {
            let current = registry.execute("contacts.get", json!({ "id": id }), ctx).await;
            let Some(existing) = contact_from(&current) else {
                output_result(&current, json);
                return Ok(());
            };
            let args = if fields.is_empty() {
                json!({
                    "id": id,
                    "name": field_or_prompt(None, "Name", Some(existing.name.as_str()))?,
                    "surname": field_or_prompt(None, "Surname", Some(existing.surname.as_str()))?,
                    "email": field_or_prompt(None, "Email", Some(existing.email.as_str()))?,
                    "phone": field_or_prompt(None, "Phone", Some(existing.phone.as_str()))?,
                    "address": prompt_optional("Address", existing.address.as_deref())?,
                })
            } else {
                json!({
                    "id": id,
                    "name": fields.name.unwrap_or(existing.name),
                    "surname": fields.surname.unwrap_or(existing.surname),
                    "email": fields.email.unwrap_or(existing.email),
                    "phone": fields.phone.unwrap_or(existing.phone),
                    "address": fields.address.or(existing.address).unwrap_or_default(),
                })
            };
            let result = registry.execute("contacts.update", args, ctx).await;
            report(&result, json, "Contact updated successfully!");
        }
        ContactsAction::Delete { id, yes } => {
            if !yes
                && !Confirm::new()
                    .with_prompt("Are you sure you want to delete this contact?")
                    .default(false)
                    .interact()?
            {
                println!("Cancelled.");
                return Ok(());
            }
            let result = registry.execute("contacts.delete", json!({ "id": id }), ctx).await;
            report(&result, json, "Contact deleted successfully!");
        }
    }
    Ok(())
}

async fn cmd_api_key(
    action: ApiKeyAction,
    json: bool,
    ctx: &AppContext,
    registry: &CommandRegistry,
) -> anyhow::Result<()> {
    match action {
        ApiKeyAction::Set { key } => {
            let key = field_or_prompt(key, "API key (your email)", None)?;
            let result = registry
                .execute("api_key.set", json!({ "api_key": key }), ctx)
                .await;
            report(&result, json, "API Key saved successfully!");
        }
        ApiKeyAction::Show => {
            let result = registry.execute("api_key.get", json!({}), ctx).await;
            if json || result.status != Status::Pass {
                output_result(&result, json);
            } else if let Some(data) = &result.data {
                match data["api_key"].as_str() {
                    Some(masked) => println!("API key: {}", masked),
                    None => println!("No API key stored; the default key is used."),
                }
            }
        }
    }
    Ok(())
}

async fn cmd_call(
    cmd: &str,
    args_str: &str,
    json: bool,
    artifacts: Option<PathBuf>,
    ctx: &AppContext,
    registry: &CommandRegistry,
) {
    let args: Value = match serde_json::from_str(args_str) {
        Ok(v) => v,
        Err(e) => {
            let r = result_err(
                "call",
                cmd,
                &new_run_id(),
                0,
                ErrorCode::InvalidInput,
                format!("invalid JSON args: {}", e),
            );
            output_result(&r, json);
            return;
        }
    };

    let result = registry.execute(cmd, args, ctx).await;
    if let Some(ref dir) = artifacts {
        write_artifacts(dir, &result.run_id, &result, std::slice::from_ref(&result));
    }
    output_result(&result, json);
}

async fn cmd_run_scenario(
    file: &Path,
    json: bool,
    artifacts: Option<PathBuf>,
    ctx: &AppContext,
    registry: &CommandRegistry,
) {
    let yaml = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            let r = result_err(
                "run-scenario",
                &file.display().to_string(),
                &new_run_id(),
                0,
                ErrorCode::IoError,
                format!("cannot read scenario file: {}", e),
            );
            output_result(&r, json);
            return;
        }
    };

    let scenario = match desk_engine::scenario::load_scenario(&yaml) {
        Ok(s) => s,
        Err(e) => {
            let r = result_err(
                "run-scenario",
                &file.display().to_string(),
                &new_run_id(),
                0,
                ErrorCode::InvalidInput,
                e,
            );
            output_result(&r, json);
            return;
        }
    };

    let scenario_result = desk_engine::scenario::run_scenario(&scenario, ctx, registry).await;

    if json {
        let j = serde_json::to_string_pretty(&scenario_result).unwrap_or_default();
        println!("{}", j);
    } else {
        println!(
            "Scenario: {}",
            scenario_result.name.as_deref().unwrap_or("<unnamed>")
        );
        println!("Overall: {:?}", scenario_result.overall_status);
        for (i, sr) in scenario_result.step_results.iter().enumerate() {
            println!(
                "  Step {}: {} {} -> {:?} ({}ms)",
                i, sr.command, sr.target, sr.status, sr.timing_ms.total
            );
            if let Some(ref err) = sr.error {
                println!("    {} – {}", err.code, err.message);
            }
        }
    }

    if let Some(ref dir) = artifacts {
        write_artifacts(
            dir,
            &new_run_id(),
            &scenario_result,
            &scenario_result.step_results,
        );
    }

    if scenario_result.overall_status == Status::Fail {
        std::process::exit(1);
    }
}

// ===========================================================================
// Prompt helpers
// ===========================================================================

/// Use `value` when given on the command line, otherwise ask for it.
fn field_or_prompt(value: Option<String>, label: &str, current: Option<&str>) -> anyhow::Result<String> {
    if let Some(v) = value {
        return Ok(v);
    }
    let mut input = Input::<String>::new().with_prompt(label);
    if let Some(current) = current {
        input = input.default(current.to_string());
    }
    Ok(input.interact_text()?)
}

fn prompt_optional(label: &str, current: Option<&str>) -> anyhow::Result<String> {
    let mut input = Input::<String>::new().with_prompt(label).allow_empty(true);
    if let Some(current) = current {
        input = input.default(current.to_string());
    }
    Ok(input.interact_text()?)
}

// ===========================================================================
// Output helpers
// ===========================================================================

fn contact_from(result: &CommandResult) -> Option<Contact> {
    let data = result.data.as_ref()?;
    serde_json::from_value(data.get("contact")?.clone()).ok()
}

fn print_contact(contact: &Contact) {
    println!("{}  (id {})", contact.full_name(), contact.id);
    println!("  Email: {}", contact.email);
    println!("  Phone: {}", contact.phone);
    if let Some(ref address) = contact.address {
        println!("  Address: {}", address);
    }
}

fn print_contact_list(result: &CommandResult) {
    let contacts: Vec<Contact> = result
        .data
        .as_ref()
        .and_then(|d| d.get("contacts").cloned())
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    if contacts.is_empty() {
        println!("No contacts found. Add some contacts to get started!");
        return;
    }
    for contact in &contacts {
        print_contact(contact);
    }
}

/// Print `success` for a passing mutation, or the full result otherwise.
fn report(result: &CommandResult, json: bool, success: &str) {
    if !json && result.status == Status::Pass {
        println!("{}", success);
    } else {
        output_result(result, json);
    }
}

fn output_result(result: &CommandResult, json: bool) {
    if json {
        let j = serde_json::to_string_pretty(result).unwrap_or_default();
        println!("{}", j);
    } else {
        print_human(result);
    }

    // Exit with non-zero status on error/fail
    match result.status {
        Status::Pass => {}
        Status::Fail => std::process::exit(1),
        Status::Error => std::process::exit(2),
    }
}

fn print_human(r: &CommandResult) {
    let status_icon = match r.status {
        Status::Pass => "PASS",
        Status::Fail => "FAIL",
        Status::Error => "ERROR",
    };

    println!("[{}] {} {}", status_icon, r.command, r.target);
    println!("  run_id: {}", r.run_id);
    println!("  timing: {}ms", r.timing_ms.total);

    if let Some(ref err) = r.error {
        println!("  error:  {} – {}", err.code, err.message);
        if !err.details.is_null() {
            println!("  details: {}", err.details);
        }
    }

    if let Some(ref data) = r.data {
        if let Ok(s) = serde_json::to_string_pretty(data) {
            for line in s.lines() {
                println!("  {}", line);
            }
        }
    }
}

// ===========================================================================
// Artifact helpers
// ===========================================================================

/// Write `DIR/<run_id>/result.json` and one `events.jsonl` line per step.
fn write_artifacts<T: Serialize>(dir: &Path, run_id: &str, result: &T, steps: &[CommandResult]) {
    let art_dir = dir.join(run_id);
    if let Err(e) = std::fs::create_dir_all(&art_dir) {
        tracing::warn!(dir = %art_dir.display(), error = %e, "cannot create artifacts dir");
        return;
    }

    match serde_json::to_string_pretty(result) {
        Ok(j) => {
            if let Err(e) = std::fs::write(art_dir.join("result.json"), j) {
                tracing::warn!(error = %e, "cannot write result.json");
            }
        }
        Err(e) => tracing::warn!(error = %e, "cannot serialize result"),
    }

    let events: String = steps
        .iter()
        .filter_map(|step| serde_json::to_string(step).ok())
        .map(|line| line + "\n")
        .collect();
    if let Err(e) = std::fs::write(art_dir.join("events.jsonl"), events) {
        tracing::warn!(error = %e, "cannot write events.jsonl");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_calc_with_global_flags() {
        let cli = Cli::try_parse_from(["deskctl", "calc", "2 + 2 =", "--json", "--offline"]).unwrap();
        assert!(cli.json);
        assert!(cli.offline);
        assert!(matches!(cli.command, Commands::Calc { keys: Some(ref k) } if k == "2 + 2 ="));
    }

    #[test]
    fn test_parse_contacts_edit_fields() {
        let cli = Cli::try_parse_from([
            "deskctl", "contacts", "edit", "7", "--phone", "555", "--address", "Main St",
        ])
        .unwrap();
        match cli.command {
            Commands::Contacts {
                action: ContactsAction::Edit { id, fields },
            } => {
                assert_eq!(id, "7");
                assert_eq!(fields.phone.as_deref(), Some("555"));
                assert!(fields.name.is_none());
                assert!(!fields.is_empty());
            }
            _ => panic!("expected contacts edit"),
        }
    }

    #[test]
    fn test_contact_fields_is_empty() {
        assert!(ContactFields::default().is_empty());
    }

    #[test]
    #[serial_test::serial]
    fn test_build_context_offline_uses_sample_directory() {
        let config = crate::config::load_config(None).unwrap();
        let ctx = build_context(&config, true).unwrap();
        assert_eq!(ctx.max_display_length, 9);
    }

    #[test]
    #[serial_test::serial]
    fn test_build_context_http_sets_up_tls_client() {
        let config = crate::config::load_config(None).unwrap();
        assert_eq!(config.contact_book.backend, Backend::Http);
        let ctx = build_context(&config, false).unwrap();
        assert_eq!(ctx.max_display_length, 9);
    }

    #[test]
    fn test_write_artifacts_layout() {
        let dir = std::env::temp_dir().join(format!("deskctl_artifacts_{}", new_run_id()));
        let steps = vec![
            result_ok("press", "2 +", "a", 0),
            result_ok("press", "3 =", "b", 0),
        ];
        write_artifacts(&dir, "run-1", &steps[1], &steps);

        let result = std::fs::read_to_string(dir.join("run-1").join("result.json")).unwrap();
        assert!(result.contains("\"3 =\""));
        let events = std::fs::read_to_string(dir.join("run-1").join("events.jsonl")).unwrap();
        assert_eq!(events.lines().count(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_contact_from_result() {
        let mut result = result_ok("call", "contacts.get", "run", 0);
        result.data = Some(json!({
            "contact": {
                "id": 1,
                "name": "John",
                "surname": "Doe",
                "email": "john@example.com",
                "phone": "1234567890",
                "address": ""
            }
        }));
        let contact = contact_from(&result).unwrap();
        assert_eq!(contact.full_name(), "John Doe");
        assert_eq!(contact.address, None);
    }
}
