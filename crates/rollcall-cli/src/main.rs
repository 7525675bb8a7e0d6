use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveTime};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use rollcall_core::app::{Config, EngineBuilder};
use rollcall_core::domain::parse_time_of_day;
use rollcall_core::impls::{InMemoryMemberStore, ScriptedActionClient};

#[derive(Parser)]
#[command(
    name = "rollcall",
    about = "Time-windowed mark/verify scheduler with a one-time-code store",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the TOML configuration
    #[arg(long, short = 'c', global = true, env = "ROLLCALL_CONFIG", default_value = "rollcall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until Ctrl-C
    Run {
        /// JSON array of members to seed the in-memory store with
        #[arg(long)]
        members: Option<PathBuf>,

        /// Override `action.base_url`
        #[arg(long, env = "ROLLCALL_ACTION_BASE_URL")]
        base_url: Option<String>,

        /// Never call the action endpoint; every mark and verify succeeds
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration and exit
    CheckConfig,

    /// Show whether a time of day falls inside the action window
    Window {
        /// HH:MM or HH:MM:SS (default: now)
        #[arg(long)]
        at: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            members,
            base_url,
            dry_run,
        } => run(&cli.config, members.as_deref(), base_url, dry_run).await,
        Commands::CheckConfig => check_config(&cli.config),
        Commands::Window { at } => window(&cli.config, at.as_deref()),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("loading config from {}", path.display()))
}

fn load_members(path: &Path) -> Result<InMemoryMemberStore> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading members from {}", path.display()))?;
    InMemoryMemberStore::from_json(&raw)
        .with_context(|| format!("parsing members in {}", path.display()))
}

async fn run(
    config_path: &Path,
    members: Option<&Path>,
    base_url: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(base_url) = base_url {
        config.action.base_url = base_url;
        config.validate().context("validating --base-url")?;
    }

    let store = match members {
        Some(path) => load_members(path)?,
        None => InMemoryMemberStore::new(),
    };
    if store.is_empty().await {
        warn!("member store is empty; nothing will be marked");
    } else {
        info!(members = store.len().await, "member store seeded");
    }
    let store = Arc::new(store);

    let mut builder = EngineBuilder::new(config).store(store);
    if dry_run {
        info!("dry run: action endpoint will not be called");
        builder = builder.client(Arc::new(ScriptedActionClient::succeeding()));
    }
    let engine = builder.build().context("building engine")?;
    let handle = engine.start().await.context("starting engine")?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutdown requested");
    handle.shutdown_and_join().await;
    Ok(())
}

fn check_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let window = config.action_window()?;
    println!("ok: {}", config_path.display());
    println!("  action.base_url   {}", config.action.base_url);
    println!("  window            {window}");
    println!(
        "  verification      {}..={} min",
        config.verification.delay_min_minutes, config.verification.delay_max_minutes
    );
    println!("  schedule.tick     {}", config.schedule.tick);
    println!("  schedule.midnight {}", config.schedule.midnight);
    println!("  schedule.pre      {}", config.schedule.pre_window);
    println!("  otp.ttl           {} min", config.otp.ttl_minutes);
    Ok(())
}

fn window(config_path: &Path, at: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let window = config.action_window()?;
    let t: NaiveTime = match at {
        Some(s) => parse_time_of_day(s)?,
        None => Local::now().time(),
    };
    let state = if window.contains(t) { "inside" } else { "outside" };
    println!("{} is {state} {window}", t.format("%H:%M:%S"));
    Ok(())
}
