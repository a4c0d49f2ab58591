use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trofos::config::{DEFAULT_CONFIG_FILE, TrofosConfig};
use trofos_common::models::Role;

mod cmd;

#[derive(Parser)]
#[command(name = "trofos")]
#[command(version, about = "Project, sprint and backlog tracker")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (CORS permissive for a local front-end dev server)
        #[arg(long)]
        dev: bool,

        /// Directory of a built front-end to serve
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Create the database and run migrations
    InitDb {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Add a user account
    CreateUser {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        /// Display name (defaults to the email)
        #[arg(long)]
        name: Option<String>,

        /// faculty, student or admin
        #[arg(long, default_value = "student")]
        role: Role,

        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default trofos.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let mut config = TrofosConfig::load_or_default(&cli.config)?;
    config.apply_env();
    trofos::logging::init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            dev,
            static_dir,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(path) = db_path {
                config.database.path = path;
            }
            if let Some(dir) = static_dir {
                config.server.static_dir = Some(dir);
            }
            config.server.dev_mode |= dev;
            cmd::cmd_serve(&config).await?;
        }
        Commands::InitDb { db_path } => {
            if let Some(path) = db_path {
                config.database.path = path;
            }
            cmd::cmd_init_db(&config)?;
        }
        Commands::CreateUser {
            email,
            password,
            name,
            role,
            db_path,
        } => {
            if let Some(path) = db_path {
                config.database.path = path;
            }
            cmd::cmd_create_user(&config, &email, &password, name.as_deref(), role)?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli.config, &config, command)?,
    }

    Ok(())
}
