//! Configuration for the Trofos server, read from `trofos.toml`.
//!
//! Layered file → environment → CLI. Every section is optional and falls back
//! to defaults.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//! dev_mode = false
//! static_dir = "frontend/build"
//!
//! [database]
//! path = ".trofos/trofos.db"
//!
//! [session]
//! expiry_hours = 24
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//!
//! [admin]
//! email = "admin@example.com"
//! password = "change-me"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "trofos.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS and bind on all interfaces, for a local front-end dev server
    #[serde(default)]
    pub dev_mode: bool,
    /// Pre-built SPA served for every non-API path
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".trofos/trofos.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,
}

fn default_expiry_hours() -> i64 {
    24
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            expiry_hours: default_expiry_hours(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Account created on startup when it does not exist yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminSection {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrofosConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub admin: AdminSection,
}

impl TrofosConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse trofos.toml")
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `TROFOS_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key → value source. Unparseable values are
    /// ignored and reported by [`TrofosConfig::validate`] when relevant.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TROFOS_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TROFOS_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(path) = lookup("TROFOS_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("TROFOS_STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(dir));
        }
        if let Some(email) = lookup("TROFOS_ADMIN_EMAIL") {
            self.admin.email = Some(email);
        }
        if let Some(password) = lookup("TROFOS_ADMIN_PASSWORD") {
            self.admin.password = Some(password);
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.session.expiry_hours <= 0 {
            warnings.push(format!(
                "session.expiry_hours is {}: sessions will expire immediately",
                self.session.expiry_hours
            ));
        }
        if self.admin.email.is_some() != self.admin.password.is_some() {
            warnings.push(
                "admin.email and admin.password must be set together; admin bootstrap skipped"
                    .to_string(),
            );
        }
        if let Some(ref dir) = self.server.static_dir
            && !dir.join("index.html").exists()
        {
            warnings.push(format!(
                "static_dir {} has no index.html; only the API will be served",
                dir.display()
            ));
        }

        warnings
    }

    /// Admin bootstrap credentials, when both halves are configured.
    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (&self.admin.email, &self.admin.password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }
}
