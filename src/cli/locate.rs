//! Locate command handler
//!
//! Gets one position from the configured provider and prints its address.

use crate::cli::{build_provider, list_formats, resolve_formatter};
use crate::config::Config;
use crate::error::Result;
use crate::format::AddressReport;
use crate::manager::GeocodingManager;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Locate command arguments
#[derive(Args)]
pub struct LocateArgs {
    /// Take the position from a JSON-lines replay script
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f')]
    pub format: Option<String>,

    /// Seconds to wait for the address after the position arrives
    #[arg(long, default_value_t = 30)]
    pub wait: u64,

    /// List available formats
    #[arg(short = 'F', long = "list-formats")]
    pub list_formats: bool,
}

/// Run the locate command
pub async fn run(args: LocateArgs) -> Result<()> {
    if args.list_formats {
        list_formats();
        return Ok(());
    }

    let config = Config::load()?;
    let formatter = resolve_formatter(args.format, &config)?;
    let provider = build_provider(&config, args.replay.as_deref())?;

    let manager = GeocodingManager::new(&config, provider)?;
    let result = manager
        .locate_address(Duration::from_secs(args.wait))
        .await;
    manager.close();

    let event = result?;
    println!("{}", formatter.format(&AddressReport::from_event(&event))?.trim_end());
    Ok(())
}
