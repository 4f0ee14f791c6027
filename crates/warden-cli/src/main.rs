//! Warden CLI - run the gateway and manage its accounts.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use warden_core::Config;
use warden_core::config::LogFormat;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - authenticating, rate limiting HTTP gateway")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway operations
    Gateway {
        #[command(subcommand)]
        action: GatewayCommands,
    },

    /// User management (admin commands)
    Admin {
        #[command(subcommand)]
        action: AdminCommands,

        /// Data directory override
        #[arg(long, global = true, env = "WARDEN_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum GatewayCommands {
    /// Start the gateway server
    Run {
        /// Listen address, e.g. 0.0.0.0:8080
        #[arg(long)]
        addr: Option<String>,

        /// Config file to load instead of the default
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check gateway status
    Status {
        /// Gateway address to probe
        #[arg(long)]
        addr: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print a single value, e.g. rateLimiter.windowSecs
    Get {
        /// Dotted key path
        key: String,
    },

    /// Print the config file location
    Path,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create a new user
    Create {
        /// Username for the new user
        #[arg(long)]
        username: String,

        /// Email address for the new user
        #[arg(long)]
        email: String,

        /// Password (prompted for if omitted)
        #[arg(long)]
        password: Option<String>,

        /// Role: user, moderator, or admin
        #[arg(long, default_value = "user")]
        role: String,

        /// Generate a random password
        #[arg(long, conflicts_with = "password")]
        generate_password: bool,
    },

    /// List all users
    List,

    /// Change a user's role
    SetRole {
        /// Username of the user
        #[arg(long)]
        username: String,

        /// New role
        #[arg(long)]
        role: String,
    },

    /// Enable a user account
    Enable {
        /// Username of the user
        #[arg(long)]
        username: String,
    },

    /// Disable a user account
    Disable {
        /// Username of the user
        #[arg(long)]
        username: String,
    },

    /// Delete a user
    Delete {
        /// Username of the user to delete
        #[arg(long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let json = cli.json_logs
        || Config::load_default().is_ok_and(|c| c.log.format == LogFormat::Json);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }

    match cli.command {
        Commands::Gateway { action } => {
            let args = match action {
                GatewayCommands::Run { addr, config } => commands::gateway::GatewayArgs {
                    action: commands::gateway::GatewayAction::Run { addr, config },
                },
                GatewayCommands::Status { addr } => commands::gateway::GatewayArgs {
                    action: commands::gateway::GatewayAction::Status { addr },
                },
            };
            commands::run_gateway(args).await?;
        }

        Commands::Admin { action, data_dir } => {
            let args = commands::admin::AdminArgs {
                action: match action {
                    AdminCommands::Create {
                        username,
                        email,
                        password,
                        role,
                        generate_password,
                    } => commands::admin::AdminAction::Create {
                        username,
                        email,
                        password,
                        role,
                        generate_password,
                    },
                    AdminCommands::List => commands::admin::AdminAction::List,
                    AdminCommands::SetRole { username, role } => {
                        commands::admin::AdminAction::SetRole { username, role }
                    }
                    AdminCommands::Enable { username } => {
                        commands::admin::AdminAction::Enable { username }
                    }
                    AdminCommands::Disable { username } => {
                        commands::admin::AdminAction::Disable { username }
                    }
                    AdminCommands::Delete { username } => {
                        commands::admin::AdminAction::Delete { username }
                    }
                },
                data_dir,
            };
            commands::run_admin(args)?;
        }

        Commands::Config { action } => {
            let action = match action {
                None | Some(ConfigCommands::Show) => commands::config::ConfigAction::Show,
                Some(ConfigCommands::Get { key }) => commands::config::ConfigAction::Get { key },
                Some(ConfigCommands::Path) => commands::config::ConfigAction::Path,
            };
            commands::run_config(&action)?;
        }
    }

    Ok(())
}
