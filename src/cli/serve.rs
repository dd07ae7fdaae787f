//! `serve`: run the address API in the foreground
//!
//! Exposes `GET /api/address?lat=&lon=` (standardized Brazilian address for a
//! coordinate pair) and `GET /api/status`.

use crate::config::Config;
use crate::error::Result;
use crate::server;
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct ServeArgs {
    /// Bind address, overrides `server.host`
    #[arg(long)]
    pub host: Option<String>,

    /// Port, overrides `server.port`
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Send every address request to Nominatim, skipping the address cache
    #[arg(long)]
    pub no_cache: bool,
}

impl ServeArgs {
    /// Apply command line overrides on top of the loaded configuration
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
    }
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = Config::load()?;
    args.apply(&mut config);

    info!(
        "guia-turistico v{} serving /api/address via {} on {} (cache {})",
        env!("CARGO_PKG_VERSION"),
        config.geocoder.base_url,
        config.server_addr(),
        if config.cache.enabled { "on" } else { "off" }
    );

    server::run(config).await
}
