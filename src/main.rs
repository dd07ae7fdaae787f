//! guia-turistico CLI entry point
//!
//! Brazilian reverse geocoding - CLI + web API

use guia_turistico::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("Erro: {}", e.user_message());
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
