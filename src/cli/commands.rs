//! CLI command definitions for sshbox.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::config::PlatformConfig;
use crate::engine::DockerEngine;
use crate::lifecycle::{ContainerService, Owner};
use crate::metrics::init_metrics;
use crate::server::{self, AppState};
use crate::storage::{ContainerStore, MemoryStore, MigrationRunner, PgStore};

/// Sandboxed SSH container service.
#[derive(Parser)]
#[command(name = "sshbox")]
#[command(about = "Provision sandboxed SSH containers and stream their logs")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the HTTP/WebSocket service.
    Serve(ServeArgs),

    /// Apply database migrations and exit.
    Migrate(DatabaseArgs),

    /// Create or update an owner in the database.
    AddOwner(AddOwnerArgs),

    /// Print the images that may be provisioned.
    Images,
}

/// Arguments for `sshbox serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides SSHBOX_BIND_ADDR).
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// PostgreSQL URL; records are kept in memory when absent.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Container engine address, e.g. unix:///var/run/docker.sock.
    #[arg(long, env = "SSHBOX_DOCKER_HOST")]
    pub docker_host: Option<String>,

    /// Host name used in SSH connection hints.
    #[arg(long)]
    pub ssh_host: Option<String>,

    /// Owners to register at startup, as ID:USERNAME. Repeatable.
    #[arg(long = "owner", env = "SSHBOX_OWNERS", value_delimiter = ',', value_parser = parse_owner_spec)]
    pub owners: Vec<Owner>,
}

/// Arguments for commands that need a database.
#[derive(Parser, Debug)]
pub struct DatabaseArgs {
    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
}

/// Arguments for `sshbox add-owner`.
#[derive(Parser, Debug)]
pub struct AddOwnerArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Owner id, as sent by the auth proxy in `x-owner-id`.
    #[arg(long)]
    pub id: i64,

    #[arg(long)]
    pub username: String,

    /// Register the owner disabled.
    #[arg(long)]
    pub disabled: bool,
}

/// Parses an `ID:USERNAME` owner spec.
pub fn parse_owner_spec(spec: &str) -> Result<Owner, String> {
    let (id, username) = spec
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("expected ID:USERNAME, got '{spec}'"))?;

    let id = id
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid owner id in '{spec}'"))?;
    let username = username.trim();
    if username.is_empty() {
        return Err(format!("empty username in '{spec}'"));
    }

    Ok(Owner::new(id, username))
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and run the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await,
        Commands::Migrate(args) => run_migrate_command(args).await,
        Commands::AddOwner(args) => run_add_owner_command(args).await,
        Commands::Images => run_images_command(),
    }
}

async fn open_store(database_url: Option<&str>) -> anyhow::Result<Arc<dyn ContainerStore>> {
    match database_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .context("failed to connect to database")?;
            let applied = store.run_migrations().await?;
            info!(applied, "Database ready");
            Ok(Arc::new(store))
        }
        None => {
            warn!("No DATABASE_URL configured, container records are kept in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = PlatformConfig::from_env()?;
    if let Some(bind) = args.bind {
        config = config.with_bind_addr(bind);
    }
    if let Some(url) = args.database_url {
        config = config.with_database_url(url);
    }
    if let Some(host) = args.docker_host {
        config = config.with_docker_host(host);
    }
    if let Some(host) = args.ssh_host {
        config = config.with_ssh_host(host);
    }
    config.validate()?;

    if let Err(e) = init_metrics() {
        warn!(error = %e, "Failed to initialize metrics");
    }

    let engine = match config.docker_host.as_deref() {
        Some(host) => DockerEngine::connect(host)?,
        None => DockerEngine::new()?,
    }
    .with_stop_timeout(config.stop_timeout_secs);
    engine
        .ping()
        .await
        .context("container engine is not reachable")?;

    let store = open_store(config.database_url.as_deref()).await?;
    let bind_addr = config.bind_addr;
    let service = Arc::new(ContainerService::new(Arc::new(engine), store, config));

    for owner in &args.owners {
        service.register_owner(owner).await?;
    }

    server::serve(bind_addr, AppState::new(service)).await?;
    Ok(())
}

async fn run_migrate_command(args: DatabaseArgs) -> anyhow::Result<()> {
    let store = PgStore::connect(&args.database_url)
        .await
        .context("failed to connect to database")?;
    let applied = store.run_migrations().await?;
    println!("Applied {applied} migration(s)");

    for migration in MigrationRunner::new(store.pool().clone()).applied().await? {
        println!(
            "  {} (applied {})",
            migration.name,
            migration.applied_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn run_add_owner_command(args: AddOwnerArgs) -> anyhow::Result<()> {
    let store = PgStore::connect(&args.database.database_url)
        .await
        .context("failed to connect to database")?;
    store.run_migrations().await?;

    let mut owner = Owner::new(args.id, args.username);
    owner.enabled = !args.disabled;
    store.upsert_owner(&owner).await?;

    println!(
        "Owner {} ({}) {}",
        owner.id,
        owner.username,
        if owner.enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn run_images_command() -> anyhow::Result<()> {
    let config = PlatformConfig::from_env()?;
    for image in &config.allowed_images {
        println!("{image}");
    }
    Ok(())
}
