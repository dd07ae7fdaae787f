//! CLI command handlers
//!
//! Each subcommand has its own module with handler functions.

pub mod config;
pub mod locate;
pub mod reverse;
pub mod serve;
pub mod track;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::format::{available_formats, get_formatter, OutputFormatter};
use crate::geolocation::ip::IpProvider;
use crate::geolocation::replay::ReplayProvider;
use crate::geolocation::{
    GeolocationProvider, PermissionState, PositionOptions, ProviderResult, WatchHandle, WatchId,
};
use crate::position::Position;
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Where am I? Brazilian addresses from your position
#[derive(Parser)]
#[command(name = "guia-turistico")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Locate once and print the address
    Locate(locate::LocateArgs),

    /// Follow position updates and print address changes
    Track(track::TrackArgs),

    /// Reverse geocode explicit coordinates
    Reverse(reverse::ReverseArgs),

    /// Start web server (foreground)
    Serve(serve::ServeArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Locate(args) => locate::run(args).await,
        Commands::Track(args) => track::run(args).await,
        Commands::Reverse(args) => reverse::run(args).await,
        Commands::Serve(args) => serve::run(args).await,
        Commands::Config(args) => config::run(args),
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// The provider picked at runtime
pub enum AnyProvider {
    Ip(IpProvider),
    Replay(ReplayProvider),
}

impl GeolocationProvider for AnyProvider {
    fn name(&self) -> &'static str {
        match self {
            Self::Ip(p) => p.name(),
            Self::Replay(p) => p.name(),
        }
    }

    async fn current_position(&self, options: &PositionOptions) -> ProviderResult<Position> {
        match self {
            Self::Ip(p) => p.current_position(options).await,
            Self::Replay(p) => p.current_position(options).await,
        }
    }

    fn watch_position(&self, options: &PositionOptions) -> ProviderResult<WatchHandle> {
        match self {
            Self::Ip(p) => p.watch_position(options),
            Self::Replay(p) => p.watch_position(options),
        }
    }

    fn clear_watch(&self, id: WatchId) {
        match self {
            Self::Ip(p) => p.clear_watch(id),
            Self::Replay(p) => p.clear_watch(id),
        }
    }

    async fn permission_state(&self) -> Option<ProviderResult<PermissionState>> {
        match self {
            Self::Ip(p) => p.permission_state().await,
            Self::Replay(p) => p.permission_state().await,
        }
    }
}

/// Build the configured provider; a replay file always selects the replay provider
pub fn build_provider(config: &Config, replay: Option<&Path>) -> Result<AnyProvider> {
    if let Some(path) = replay {
        return Ok(AnyProvider::Replay(ReplayProvider::from_file(path)?));
    }

    match config.geolocation.provider.to_lowercase().as_str() {
        "ip" => Ok(AnyProvider::Ip(IpProvider::new())),
        "replay" => Err(Error::Config(
            "the replay provider needs a script: pass --replay <file>".to_string(),
        )),
        other => Err(Error::Config(format!("Unknown geolocation provider: {}", other))),
    }
}

/// Look up a formatter, falling back to the configured default
pub fn resolve_formatter(requested: Option<String>, config: &Config) -> Result<Box<dyn OutputFormatter>> {
    let name = requested.unwrap_or_else(|| config.output.format.clone());
    get_formatter(&name).ok_or_else(|| Error::Config(format!("Unknown format: {}", name)))
}

/// Print available output formats
pub fn list_formats() {
    println!("Available output formats:");
    for format in available_formats() {
        println!("  {:<6} - {}", format.name, format.description);
    }
}
