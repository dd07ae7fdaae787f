//! Track command handler
//!
//! Watches the position and prints every address plus each component change.
//! With `--announce`, prints the one phrase per update a speech layer would say.

use crate::announce::Announcer;
use crate::change_detection::AddressChangeEvent;
use crate::cli::{build_provider, resolve_formatter};
use crate::config::Config;
use crate::error::Result;
use crate::format::{AddressReport, OutputFormatter};
use crate::geocoder::AddressEvent;
use crate::geolocation::GeolocationProvider;
use crate::manager::GeocodingManager;
use crate::observer::Observer;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Track command arguments
#[derive(Args)]
pub struct TrackArgs {
    /// Take positions from a JSON-lines replay script; exits when it ends
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long, short = 'd')]
    pub duration: Option<u64>,

    /// Output format
    #[arg(long, short = 'f')]
    pub format: Option<String>,

    /// Print announcements for address changes
    #[arg(long, short = 'a')]
    pub announce: bool,
}

/// Run the track command
pub async fn run(args: TrackArgs) -> Result<()> {
    let config = Config::load()?;
    let formatter: Arc<dyn OutputFormatter> = Arc::from(resolve_formatter(args.format, &config)?);
    let provider = build_provider(&config, args.replay.as_deref())?;
    let manager = GeocodingManager::new(&config, provider)?;

    let address_formatter = Arc::clone(&formatter);
    manager.subscribe_address_fn(move |event: &AddressEvent| {
        match address_formatter.format(&AddressReport::from_event(event)) {
            Ok(output) => println!("{}", output.trim_end()),
            Err(e) => warn!("Could not format address: {}", e),
        }
    });

    let change_formatter = Arc::clone(&formatter);
    manager.subscribe_changes_fn(move |event: &AddressChangeEvent| {
        match change_formatter.format_change(event) {
            Ok(output) => println!("{}", output.trim_end()),
            Err(e) => warn!("Could not format change: {}", e),
        }
    });

    if args.announce {
        let announcer = Arc::new(Announcer::new(|announcement| {
            println!(">> {}", announcement.text);
        }));
        manager.subscribe_changes(Arc::clone(&announcer) as Arc<dyn Observer<AddressChangeEvent>>);
        manager.subscribe_address(announcer as Arc<dyn Observer<AddressEvent>>);
    }

    manager.start_tracking()?;
    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = wait_until_done(&manager, deadline) => {}
    }

    manager.close();
    Ok(())
}

/// Resolves at the deadline, or once the position stream has ended and the
/// last geocode finished
async fn wait_until_done<P: GeolocationProvider>(
    manager: &GeocodingManager<P>,
    deadline: Option<Instant>,
) {
    // a cycle spawned by the last fix may not have started yet
    let mut idle_polls = 0;
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Tracking duration elapsed");
            return;
        }
        if manager.service().watch_exhausted() && !manager.geocoder().is_loading() {
            idle_polls += 1;
            if idle_polls >= 2 {
                info!("Position stream ended");
                return;
            }
        } else {
            idle_polls = 0;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
