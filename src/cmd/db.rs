//! Database maintenance commands — `trofos init-db`, `trofos create-user`.

use anyhow::{Result, bail};
use trofos::config::TrofosConfig;
use trofos::tracker::auth::hash_password;
use trofos::tracker::server::{bootstrap_admin, open_database};
use trofos_common::models::Role;

pub fn cmd_init_db(config: &TrofosConfig) -> Result<()> {
    let db = open_database(&config.database.path)?;
    if let Some((email, password)) = config.admin_credentials()
        && bootstrap_admin(&db, email, password)?
    {
        println!("Created admin account {}", email);
    }
    println!(
        "Database initialized at {}",
        config.database.path.display()
    );
    Ok(())
}

pub fn cmd_create_user(
    config: &TrofosConfig,
    email: &str,
    password: &str,
    name: Option<&str>,
    role: Role,
) -> Result<()> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        bail!("Email and password are required");
    }
    let db = open_database(&config.database.path)?;
    let user = db.create_user(
        email,
        name.unwrap_or(email),
        &hash_password(password)?,
        role,
    )?;
    println!(
        "Created {} user {} (id {})",
        role.name().to_lowercase(),
        user.user_email,
        user.user_id
    );
    Ok(())
}
