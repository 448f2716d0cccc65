// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Raseed web server
//!
//! Serves the dashboard, Google sign-in and the JSON API.

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use raseed::config::AppConfig;
use raseed::db::Database;
use raseed::Result;

#[derive(Parser, Debug)]
#[command(name = "raseed-web")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Raseed receipt dashboard server")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database path
    #[arg(long)]
    database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Command-line values win over the file and the environment
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.web.host = host.clone();
        }
        if let Some(port) = self.port {
            config.web.port = port;
        }
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Raseed web v{}", env!("CARGO_PKG_VERSION"));

    dotenvy::dotenv().ok();
    let mut config = AppConfig::load(&args.config)?;
    config.apply_env();
    args.apply(&mut config);

    // Missing keys disable sign-in or analysis; pages still serve
    for problem in config.validate() {
        warn!("Config: {}", problem);
    }

    let db = Database::open(&config.database.path, &config.storage)?;
    info!("Database: {} ({} receipts)", config.database.path, db.receipt_count()?);

    raseed::web::start_server(config, db).await
}
