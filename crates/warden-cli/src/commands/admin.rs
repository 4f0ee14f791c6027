//! Admin user management commands.
//!
//! These open the store directly, so they cannot run while a gateway holds
//! the same data directory.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use rand::Rng;
use warden_core::{Config, Identity, NewUser, Role, SledStore};

use crate::ui;

/// Arguments for admin commands.
pub struct AdminArgs {
    /// The admin action to perform.
    pub action: AdminAction,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Admin actions.
pub enum AdminAction {
    /// Create a new user.
    Create {
        username: String,
        email: String,
        password: Option<String>,
        role: String,
        generate_password: bool,
    },
    /// List all users.
    List,
    /// Change a user's role.
    SetRole { username: String, role: String },
    /// Enable a user account.
    Enable { username: String },
    /// Disable a user account.
    Disable { username: String },
    /// Delete a user.
    Delete { username: String },
}

/// Run the admin command.
///
/// # Errors
///
/// Returns error if the operation fails.
pub fn run_admin(args: AdminArgs) -> Result<()> {
    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => Config::load_default()?.with_env_overrides().store.data_dir(),
    };
    std::fs::create_dir_all(&data_dir)?;

    let store = SledStore::open(&data_dir).with_context(|| {
        format!(
            "Failed to open store at {} (is the gateway running?)",
            data_dir.display()
        )
    })?;

    match args.action {
        AdminAction::Create {
            username,
            email,
            password,
            role,
            generate_password: gen_pwd,
        } => {
            let password = match (password, gen_pwd) {
                (Some(password), _) => password,
                (None, true) => {
                    let pwd = generate_password(16);
                    ui::success(&format!("Generated password: {pwd}"));
                    pwd
                }
                (None, false) => crate::ui::prompts::new_password("Password")?,
            };
            create_user(&store, username, email, password, role)?;
        }
        AdminAction::List => list_users(&store)?,
        AdminAction::SetRole { username, role } => set_role(&store, &username, &role)?,
        AdminAction::Enable { username } => set_user_active(&store, &username, true)?,
        AdminAction::Disable { username } => set_user_active(&store, &username, false)?,
        AdminAction::Delete { username } => {
            if ui::prompts::confirm(&format!("Delete user '{username}'?"))? {
                delete_user(&store, &username)?;
            } else {
                ui::info("Delete cancelled");
            }
        }
    }

    store.flush()?;
    Ok(())
}

fn create_user(
    store: &SledStore,
    username: String,
    email: String,
    password: String,
    role: String,
) -> Result<Identity> {
    if password.len() < 3 || password.len() > 72 {
        bail!("Password must be between 3 and 72 characters");
    }

    let identity = store
        .create_user(&NewUser {
            username,
            email,
            password,
            role,
        })
        .map_err(|e| anyhow!("Failed to create user: {e}"))?;

    ui::success(&format!(
        "Created user '{}' (id {}) with role '{}'",
        identity.username, identity.id, identity.role.name
    ));
    Ok(identity)
}

fn list_users(store: &SledStore) -> Result<()> {
    let users = store
        .list_users()
        .map_err(|e| anyhow!("Failed to list users: {e}"))?;

    if users.is_empty() {
        ui::info("No users configured.");
        ui::info(
            "Run 'warden admin create --username admin --email admin@example.com --role admin --generate-password'.",
        );
        return Ok(());
    }

    ui::info(&format!("Users ({}):", users.len()));
    println!();
    println!(
        "{:<6} {:<20} {:<28} {:<10} {:<8} {:<20}",
        "ID", "USERNAME", "EMAIL", "ROLE", "ACTIVE", "CREATED"
    );
    println!("{}", "-".repeat(95));

    for user in users {
        let created = user.created_at.format("%Y-%m-%d %H:%M:%S");
        let active = if user.active { "yes" } else { "no" };
        println!(
            "{:<6} {:<20} {:<28} {:<10} {:<8} {:<20}",
            user.id, user.username, user.email, user.role.name, active, created
        );
    }

    Ok(())
}

fn find(store: &SledStore, username: &str) -> Result<Identity> {
    store
        .user_by_username(username)
        .map_err(|e| anyhow!("Failed to find user '{username}': {e}"))
}

fn set_role(store: &SledStore, username: &str, role: &str) -> Result<()> {
    let user = find(store, username)?;
    ensure_not_last_admin(store, &user, role == Role::ADMIN)?;

    let updated = store
        .set_role(user.id, role)
        .map_err(|e| anyhow!("Failed to set role: {e}"))?;
    ui::success(&format!(
        "User '{}' now has role '{}'",
        updated.username, updated.role.name
    ));
    Ok(())
}

fn set_user_active(store: &SledStore, username: &str, active: bool) -> Result<()> {
    let user = find(store, username)?;
    ensure_not_last_admin(store, &user, active)?;

    store
        .set_active(user.id, active)
        .map_err(|e| anyhow!("Failed to update user: {e}"))?;

    let status = if active { "enabled" } else { "disabled" };
    ui::success(&format!("User '{username}' {status}"));
    Ok(())
}

fn delete_user(store: &SledStore, username: &str) -> Result<()> {
    let user = find(store, username)?;
    ensure_not_last_admin(store, &user, false)?;

    store
        .delete_user(user.id)
        .map_err(|e| anyhow!("Failed to delete user: {e}"))?;

    ui::success(&format!("Deleted user '{username}'"));
    Ok(())
}

/// Refuse to remove admin rights from the only active admin.
fn ensure_not_last_admin(store: &SledStore, user: &Identity, keeps_admin: bool) -> Result<()> {
    if keeps_admin || user.role.name != Role::ADMIN || !user.active {
        return Ok(());
    }

    let admins = store
        .list_users()
        .map_err(|e| anyhow!("Failed to list users: {e}"))?
        .iter()
        .filter(|u| u.role.name == Role::ADMIN && u.active)
        .count();

    if admins <= 1 {
        bail!("Cannot remove the last active admin user");
    }
    Ok(())
}

/// Random password from a printable charset.
fn generate_password(length: usize) -> String {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
