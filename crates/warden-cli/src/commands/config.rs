//! Config inspection command.

use anyhow::Result;
use serde_json::Value;
use warden_core::Config;

use crate::ui;

const REDACTED: &str = "<redacted>";

/// Config actions.
#[derive(Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print one value by dotted path.
    Get {
        /// Key path, e.g. `rateLimiter.windowSecs`.
        key: String,
    },
    /// Print the config file location.
    Path,
}

/// Run the config command.
///
/// # Errors
///
/// Returns error if the config cannot be loaded.
pub fn run_config(action: &ConfigAction) -> Result<()> {
    let path = Config::default_path();

    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
            if !path.exists() {
                ui::info("File does not exist yet; defaults are in effect");
            }
        }
        ConfigAction::Show => {
            let value = effective_config()?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ConfigAction::Get { key } => {
            let value = effective_config()?;
            match lookup(&value, key) {
                Some(Value::String(s)) => println!("{s}"),
                Some(other) => println!("{}", serde_json::to_string_pretty(other)?),
                None => ui::error(&format!("Key not found: {key}")),
            }
        }
    }

    Ok(())
}

/// Loaded config with environment overrides applied and secrets masked.
fn effective_config() -> Result<Value> {
    let config = Config::load_default()?.with_env_overrides();
    let mut value = serde_json::to_value(&config)?;
    redact(&mut value);
    Ok(value)
}

fn redact(value: &mut Value) {
    if let Some(token) = value.pointer_mut("/auth/token/secret") {
        if !token.is_null() {
            *token = Value::String(REDACTED.to_string());
        }
    }
    if let Some(password) = value.pointer_mut("/auth/basic/password") {
        *password = Value::String(REDACTED.to_string());
    }
}

fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(value, |current, part| match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
