//! Visual Search CLI - Asset checks and one-shot searches.
//!
//! # Usage
//!
//! ```bash
//! # Fetch every widget asset and report module status
//! vs-cli modules
//!
//! # Search with a local image
//! vs-cli search ./shirt.jpg
//!
//! # Search a region of it (natural-image pixels)
//! vs-cli search ./shirt.jpg --crop 10,20,200,100
//!
//! # Check that a URL serves an image
//! vs-cli check-url https://cdn.example.com/shirt.png
//! ```
//!
//! # Environment Variables
//!
//! - `VISUAL_SEARCH_APP_URL` - Inference service base URL (required)
//! - `VISUAL_SEARCH_SHOP_DOMAIN` - Shop domain sent with searches (required)
//! - `VISUAL_SEARCH_ENDPOINT` - `search` or `product-handle`
//! - `VISUAL_SEARCH_MAX_FILE_SIZE` - Upload limit in bytes
//! - `VISUAL_SEARCH_ASSET_BASE` - Where widget assets are served from

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use visual_search_core::PixelRect;

mod commands;

#[derive(Parser)]
#[command(name = "vs-cli")]
#[command(author, version, about = "Visual search widget tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every widget module from the asset base
    Modules,
    /// Run one search with a local image
    Search {
        /// Image file (jpeg, png, webp or gif)
        file: PathBuf,

        /// Crop rectangle as `x,y,width,height` in image pixels
        #[arg(long, value_parser = commands::search::parse_crop)]
        crop: Option<PixelRect>,
    },
    /// Check that a URL serves an image
    CheckUrl {
        /// Absolute http(s) URL
        url: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("visual_search_widget=info,vs_cli=info")),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Modules => commands::modules::check().await?,
        Commands::Search { file, crop } => commands::search::run(&file, crop).await?,
        Commands::CheckUrl { url } => commands::check_url::run(&url).await?,
    }
    Ok(())
}
