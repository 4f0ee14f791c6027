//! Gateway command - start and probe the gateway server.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use warden_core::Config;
use warden_gateway::GatewayBuilder;

use crate::ui;

/// Gateway command arguments.
#[derive(Debug, Clone)]
pub struct GatewayArgs {
    /// Subcommand.
    pub action: GatewayAction,
}

/// Gateway actions.
#[derive(Debug, Clone)]
pub enum GatewayAction {
    /// Start the server in the foreground.
    Run {
        /// Listen address override.
        addr: Option<String>,
        /// Config file override.
        config: Option<PathBuf>,
    },
    /// Probe a running server.
    Status {
        /// Address to probe.
        addr: Option<String>,
    },
}

/// Run the gateway command.
///
/// # Errors
///
/// Returns error if the config is invalid or the server fails.
pub async fn run_gateway(args: GatewayArgs) -> Result<()> {
    match args.action {
        GatewayAction::Run { addr, config } => run_gateway_server(addr, config).await,
        GatewayAction::Status { addr } => gateway_status(addr).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default().context("Failed to load default config")?,
    };
    Ok(config.with_env_overrides())
}

async fn run_gateway_server(addr: Option<String>, path: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(path)?;
    if let Some(addr) = addr {
        config.server.addr = addr;
    }

    ui::header("Starting Warden Gateway");
    ui::kv("Address", &config.server.addr);
    ui::kv("Environment", &config.server.env);
    ui::kv("Data dir", &config.store.data_dir().display().to_string());
    ui::kv(
        "Rate limit",
        &if config.rate_limiter.enabled {
            format!(
                "{} requests / {}s",
                config.rate_limiter.requests_per_window, config.rate_limiter.window_secs
            )
        } else {
            "disabled".to_string()
        },
    );
    ui::kv(
        "Identity cache",
        if config.cache.enabled { "enabled" } else { "disabled" },
    );
    println!();

    if config.auth.basic.password == "admin" {
        ui::warning("Operational endpoints use the default basic credential");
    }

    let gateway = GatewayBuilder::new().with_config(config).build()?;

    ui::info("Press Ctrl+C to stop");
    println!();

    gateway.run().await?;
    Ok(())
}

async fn gateway_status(addr: Option<String>) -> Result<()> {
    ui::header("Gateway Status");

    let addr = match addr {
        Some(addr) => addr,
        None => Config::load_default()?.with_env_overrides().server.addr,
    };
    let url = format!("http://{addr}/v1/health");

    let client = reqwest::Client::new();
    match client
        .get(&url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            ui::success(&format!("Gateway is running on {addr}"));
            if let Ok(body) = resp.json::<serde_json::Value>().await {
                for key in ["status", "env", "version"] {
                    if let Some(value) = body.get(key).and_then(|v| v.as_str()) {
                        ui::kv(key, value);
                    }
                }
            }
        }
        Ok(resp) => {
            ui::warning(&format!("Gateway on {addr} answered {}", resp.status()));
        }
        Err(e) => {
            tracing::debug!(error = %e, %url, "health check failed");
            ui::error(&format!("Gateway is not reachable on {addr}"));
            ui::info("Start with: warden gateway run");
        }
    }

    Ok(())
}
