//! Command registry and dispatch
//!
//! Commands are registered as "category.action" (e.g. "prompts.create",
//! "sync.attach"). Handlers take the vault and JSON arguments and return a
//! JSON result.
//!
//! ## Adding a new command
//!
//! 1. Write a handler: `pub fn my_command(vault: &Coordinator, args: Value) -> Result<Value>`
//! 2. Register it in `REGISTRY`
//! 3. Add tests for the command

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{
    app,
    errors::{Result, VaultError},
    sync::Coordinator,
};

pub mod prompts;
pub mod sync;

pub type CommandHandler = fn(&Coordinator, Value) -> Result<Value>;

static REGISTRY: Lazy<HashMap<&'static str, CommandHandler>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, CommandHandler> = HashMap::new();

    map.insert("prompts.list", prompts::list);
    map.insert("prompts.get", prompts::get);
    map.insert("prompts.search", prompts::search);
    map.insert("prompts.create", prompts::create);
    map.insert("prompts.update", prompts::update);
    map.insert("prompts.archive", prompts::archive);
    map.insert("prompts.restore", prompts::restore);
    map.insert("prompts.delete", prompts::delete);
    map.insert("prompts.path", prompts::path);

    map.insert("sync.status", sync::status);
    map.insert("sync.switch_mode", sync::switch_mode);
    map.insert("sync.attach", sync::attach);
    map.insert("sync.detach", sync::detach);
    map.insert("sync.validate", sync::validate);

    map
});

/// Dispatch against the process-global vault (see [`app::setup`])
pub fn dispatch(command: &str, args: Value) -> Result<Value> {
    let vault = app::get()?;
    dispatch_with(&vault, command, args)
}

pub fn dispatch_with(vault: &Coordinator, command: &str, args: Value) -> Result<Value> {
    match REGISTRY.get(command) {
        Some(handler) => handler(vault, args),
        None => Err(VaultError::CommandNotFound(command.to_string())),
    }
}

/// Like [`dispatch`], but failures come back as an error object
pub fn call(command: &str, args: Value) -> Value {
    match dispatch(command, args) {
        Ok(result) => result,
        Err(err) => error_response(&err),
    }
}

/// `{ error: true, message, category }`
pub fn error_response(err: &VaultError) -> Value {
    json!({
        "error": true,
        "message": err.user_message(),
        "category": err.category(),
    })
}

/// Sorted names of all registered commands
pub fn list_commands() -> Vec<String> {
    let mut commands: Vec<String> = REGISTRY.keys().map(|&k| k.to_string()).collect();
    commands.sort();
    commands
}

/// Decode handler arguments; `null` counts as `{}`
pub(crate) fn parse_args<T: DeserializeOwned>(command: &str, args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| VaultError::InvalidArgs {
        command: command.to_string(),
        reason:  e.to_string(),
    })
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{test_support::vault, *};

    #[test]
    fn test_dispatch_unknown_command() {
        let (_dir, vault) = vault();
        let result = dispatch_with(&vault, "unknown.command", json!({}));

        match result {
            Err(VaultError::CommandNotFound(cmd)) => assert_eq!(cmd, "unknown.command"),
            other => panic!("Expected CommandNotFound error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_response_shape() {
        let value = error_response(&VaultError::CommandNotFound("nope".into()));
        assert_eq!(value["error"], json!(true));
        assert_eq!(value["category"], json!("command"));
        assert!(value["message"].as_str().unwrap().contains("nope"));
    }

    #[test]
    fn test_list_commands_is_sorted_and_complete() {
        let commands = list_commands();
        let mut sorted = commands.clone();
        sorted.sort();
        assert_eq!(commands, sorted);

        for name in ["prompts.create", "prompts.path", "sync.attach", "sync.validate"] {
            assert!(commands.contains(&name.to_string()), "{name}");
        }
        assert_eq!(commands.len(), 14);
    }

    #[test]
    fn test_parse_args_reports_command() {
        #[derive(Debug, serde::Deserialize)]
        struct Needs {
            #[allow(dead_code)]
            id: String,
        }

        let err = parse_args::<Needs>("prompts.get", json!({})).unwrap_err();
        match err {
            VaultError::InvalidArgs { command, .. } => assert_eq!(command, "prompts.get"),
            other => panic!("Expected InvalidArgs, got {other:?}"),
        }
    }
}
