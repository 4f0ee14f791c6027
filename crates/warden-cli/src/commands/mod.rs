//! CLI command implementations.

pub mod admin;
pub mod config;
pub mod gateway;

pub use admin::run_admin;
pub use config::run_config;
pub use gateway::run_gateway;
