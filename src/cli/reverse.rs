//! Reverse command handler
//!
//! Reverse geocodes coordinates given on the command line.

use crate::cli::resolve_formatter;
use crate::config::Config;
use crate::error::Result;
use crate::format::AddressReport;
use crate::geocoder::ReverseGeocoder;
use crate::position::Coordinates;
use clap::Args;

/// Reverse command arguments
#[derive(Args)]
pub struct ReverseArgs {
    /// Latitude
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Output format
    #[arg(long, short = 'f')]
    pub format: Option<String>,
}

/// Run the reverse command
pub async fn run(args: ReverseArgs) -> Result<()> {
    let config = Config::load()?;
    let formatter = resolve_formatter(args.format, &config)?;

    let coordinates = Coordinates::new(args.lat, args.lon);
    coordinates.validate()?;

    let geocoder = ReverseGeocoder::new(&config.geocoder)?;
    let raw = geocoder.lookup(coordinates).await?;

    println!("{}", formatter.format(&AddressReport::from_raw(None, &raw))?.trim_end());
    Ok(())
}
