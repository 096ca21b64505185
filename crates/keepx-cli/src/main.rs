//! keepx - command-line shell for KeePass databases

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Command;
use config::Config;
use keepx_core::{CompositeKey, Database, KdbxFile, TracingStatusLogger};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the master password.
const PASSWORD_VAR: &str = "KEEPX_PASSWORD";

/// keepx - browse and edit KeePass databases by path
#[derive(Parser, Debug)]
#[command(name = "keepx")]
#[command(about = "Browse and edit KeePass databases by path")]
struct Args {
    /// Path to a config file (defaults to ~/.config/keepx/keepx.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the KeePass database file (overrides the config)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Group to start from
    #[arg(long, value_name = "PATH")]
    cd: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("keepx=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let args = Args::parse();
    let mut config = Config::load(args.config)?;
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let password = std::env::var(PASSWORD_VAR)
        .with_context(|| format!("Set {PASSWORD_VAR} to the database master password"))?;

    let mut logger = TracingStatusLogger::new();
    let mut db = Database::open(
        Box::new(KdbxFile::new(&config.database_path)),
        CompositeKey::from_password(password),
        &mut logger,
    )?;

    if let Some(path) = &args.cd {
        let group = db
            .find_group_by_path(path)
            .with_context(|| format!("No such group: {path}"))?;
        db.set_current_group(group)?;
    }

    let mut stdout = std::io::stdout().lock();
    commands::run(&mut db, &args.command, &config, &mut stdout)?;

    if args.command.mutates() && db.is_modified() {
        db.save(&mut logger)?;
    }
    db.close();
    Ok(())
}
