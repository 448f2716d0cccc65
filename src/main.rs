// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Raseed: receipt ingestion from the command line
//!
//! Reads receipt photos (or already-recognised text), extracts totals, dates and
//! line items, asks Gemini for a spending category and keeps everything in SQLite.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use raseed::categorizer::{Categorizer, InferenceEngine};
use raseed::config::AppConfig;
use raseed::db::{Database, ReceiptStore};
use raseed::gemini::GeminiClient;
use raseed::i18n::Locale;
use raseed::model::Receipt;
use raseed::normalizer::{self, ExtractionHints};
use raseed::ocr::{OcrDocument, OcrEngine, VisionClient};
use raseed::pipeline::{failure_message, ReceiptPipeline};
use raseed::{RaseedError, Result};

/// Raseed CLI - receipt ingestion and spending analysis
#[derive(Parser, Debug)]
#[command(name = "raseed")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Receipt OCR normalization, AI categorization and storage", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read a receipt and store it
    Process {
        /// Receipt image (or text file with --text)
        path: PathBuf,

        /// Owner the receipt is stored under
        #[arg(short, long, default_value = "local")]
        owner: String,

        /// Language for dates and insights (en, te, kn)
        #[arg(short, long, default_value = "en")]
        language: Locale,

        /// Treat the file as already-recognised text and skip OCR
        #[arg(long)]
        text: bool,

        /// Show the extracted draft without categorizing or storing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Stored receipt operations
    Receipts {
        #[command(subcommand)]
        action: ReceiptCommands,
    },

    /// Retry analysis for one receipt, or every uncategorized one
    Recategorize {
        #[arg(short, long, default_value = "local")]
        owner: String,

        /// Receipt id (default: all uncategorized)
        #[arg(long)]
        id: Option<String>,

        #[arg(short, long, default_value = "en")]
        language: Locale,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show service and database status
    Status,

    /// Initialize a new Raseed project
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ReceiptCommands {
    /// List receipts, newest first, or by date range
    List {
        #[arg(short, long, default_value = "local")]
        owner: String,

        /// First date (YYYY-MM-DD), requires --to
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,

        /// Last date (YYYY-MM-DD), requires --from
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Maximum number to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one receipt
    Show { id: String },

    /// Delete one receipt
    Delete { id: String },

    /// Export all receipts of an owner as JSON
    Export {
        #[arg(short, long, default_value = "local")]
        owner: String,

        #[arg(long, default_value = "receipts.json")]
        output: PathBuf,
    },

    /// Spending statistics
    Stats {
        #[arg(short, long, default_value = "local")]
        owner: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Generate {
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Check the configuration and environment secrets
    Validate,
}

/// OCR stand-in for text files
struct PlainText;

#[async_trait]
impl OcrEngine for PlainText {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    async fn extract(&self, image: &[u8]) -> Result<OcrDocument> {
        let text = std::str::from_utf8(image)
            .map_err(|e| RaseedError::InvalidInput(format!("not UTF-8 text: {}", e)))?;
        Ok(OcrDocument::from_text(text))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded environment from {:?}", path);
    }

    // Load configuration
    let mut config = AppConfig::load(&cli.config)?;
    config.apply_env();
    let json = cli.format == "json";

    match cli.command {
        Some(Commands::Process { path, owner, language, text, dry_run }) => {
            run_process(config, &path, &owner, language, text, dry_run, json).await
        }
        Some(Commands::Receipts { action }) => run_receipts_command(config, action, json),
        Some(Commands::Recategorize { owner, id, language }) => {
            run_recategorize(config, &owner, id, language, json).await
        }
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) | None => run_status(config).await,
        Some(Commands::Init { dir, force }) => run_init(dir, force),
    }
}

fn open_db(config: &AppConfig) -> Result<Database> {
    Database::open(&config.database.path, &config.storage)
}

fn build_pipeline(config: &AppConfig, db: &Database, text: bool) -> Result<ReceiptPipeline> {
    let ocr: Arc<dyn OcrEngine> = if text {
        Arc::new(PlainText)
    } else {
        Arc::new(VisionClient::new(&config.ocr)?)
    };
    let engine: Arc<dyn InferenceEngine> = Arc::new(GeminiClient::new(&config.llm)?);
    let categorizer = Categorizer::new(engine, &config.llm);
    Ok(ReceiptPipeline::new(ocr, categorizer, Arc::new(db.clone()), config))
}

fn print_receipt(receipt: &Receipt, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(receipt)?);
        return Ok(());
    }

    println!(
        "{}  {}  {:<24} {:>10} {}  [{}]",
        receipt.id,
        receipt.date.map(|d| d.to_string()).unwrap_or_else(|| "----------".to_string()),
        receipt.merchant,
        receipt.total,
        receipt.currency,
        receipt.category
    );
    for item in &receipt.items {
        println!("      {} x{} @ {}", item.description, item.quantity, item.unit_amount);
    }
    if let Some(insight) = &receipt.insight {
        println!("      {}", insight);
    }
    Ok(())
}

/// Process a receipt file
async fn run_process(
    config: AppConfig,
    path: &Path,
    owner: &str,
    locale: Locale,
    text: bool,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let bytes = std::fs::read(path)?;
    info!("Processing {:?} ({} bytes)", path, bytes.len());

    if dry_run {
        let ocr: Arc<dyn OcrEngine> = if text {
            Arc::new(PlainText)
        } else {
            Arc::new(VisionClient::new(&config.ocr)?)
        };
        let document = ocr.extract(&bytes).await?;
        let hints = ExtractionHints::for_locale(&config.normalizer, locale, Utc::now().date_naive());
        let draft = normalizer::normalize(&document, &hints)?;
        println!("{}", serde_json::to_string_pretty(&draft)?);
        return Ok(());
    }

    let db = open_db(&config)?;
    let pipeline = build_pipeline(&config, &db, text)?;

    match pipeline.process(owner, &bytes, locale).await {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.message(locale));
                print_receipt(&outcome.receipt, false)?;
                for warning in &outcome.warnings {
                    println!("  warning: {:?}", warning);
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", failure_message(&e, locale));
            Err(e)
        }
    }
}

/// Run stored receipt commands
fn run_receipts_command(config: AppConfig, action: ReceiptCommands, json: bool) -> Result<()> {
    let db = open_db(&config)?;

    match action {
        ReceiptCommands::List { owner, from, to, limit } => {
            let receipts = match (from, to) {
                (Some(from), Some(to)) => db.range(&owner, from, to)?,
                _ => db.recent(&owner, limit)?,
            };
            if !json {
                println!("Receipts for {} ({}):", owner, receipts.len());
            }
            for receipt in &receipts {
                print_receipt(receipt, json)?;
            }
        }
        ReceiptCommands::Show { id } => {
            let receipt = db
                .get(&id)?
                .ok_or_else(|| RaseedError::NotFound(format!("receipt {}", id)))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            } else {
                print_receipt(&receipt, false)?;
                println!("\n{}", receipt.raw_text);
            }
        }
        ReceiptCommands::Delete { id } => {
            if db.delete(&id)? {
                println!("Deleted receipt {}", id);
            } else {
                return Err(RaseedError::NotFound(format!("receipt {}", id)));
            }
        }
        ReceiptCommands::Export { owner, output } => {
            let receipts = db.all_for_owner(&owner)?;
            let body = serde_json::to_string_pretty(&receipts)?;
            std::fs::write(&output, body)?;
            println!("Exported {} receipts to {:?}", receipts.len(), output);
        }
        ReceiptCommands::Stats { owner } => {
            let stats = db.stats(&owner)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Spending for {}:", owner);
                println!("  Receipts: {}", stats.total_receipts);
                println!("  Total spent: {}", stats.total_spent);
                println!("  Average: {}", stats.average_spend);
                println!(
                    "  Top category: {}",
                    stats.top_category.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
                );
                for (category, count) in &stats.by_category {
                    println!("    {:<14} {}", category, count);
                }
            }
        }
    }

    Ok(())
}

/// Retry categorization
async fn run_recategorize(
    config: AppConfig,
    owner: &str,
    id: Option<String>,
    locale: Locale,
    json: bool,
) -> Result<()> {
    let db = open_db(&config)?;
    let pipeline = build_pipeline(&config, &db, false)?;

    match id {
        Some(id) => {
            let receipt = pipeline.recategorize(owner, &id, locale).await?;
            print_receipt(&receipt, json)?;
        }
        None => {
            let done = pipeline.retry_uncategorized(owner, locale).await?;
            println!("Categorized {} receipts", done);
        }
    }
    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration at {:?} is valid", config_path);
                println!("  Model: {}", config.llm.model);
                println!("  Database: {}", config.database.path);
            } else {
                for problem in &problems {
                    eprintln!("  ✗ {}", problem);
                }
                return Err(RaseedError::Config(format!(
                    "{} problem(s) in {:?}",
                    problems.len(),
                    config_path
                )));
            }
        }
    }

    Ok(())
}

/// Run status check
async fn run_status(config: AppConfig) -> Result<()> {
    println!("Raseed v{} Status", env!("CARGO_PKG_VERSION"));
    println!("==================");

    match VisionClient::new(&config.ocr) {
        Ok(vision) => match vision.health_check().await {
            Ok(()) => println!("Vision: Reachable at {}", config.ocr.url),
            Err(e) => println!("Vision: Error - {}", e),
        },
        Err(e) => println!("Vision: Error - {}", e),
    }

    match GeminiClient::new(&config.llm) {
        Ok(gemini) => match gemini.model_available().await {
            Ok(true) => println!("Gemini: {} available", gemini.model()),
            Ok(false) => println!("Gemini: Reachable, but {} is not offered", gemini.model()),
            Err(e) => println!("Gemini: Error - {}", e),
        },
        Err(e) => println!("Gemini: Error - {}", e),
    }

    match open_db(&config) {
        Ok(db) => {
            println!("\nDatabase ({}):", config.database.path);
            println!("  Receipts: {}", db.receipt_count()?);
        }
        Err(e) => println!("\nDatabase: ✗ Error - {}", e),
    }

    let problems = config.validate();
    if !problems.is_empty() {
        println!("\nConfiguration problems:");
        for problem in problems {
            println!("  ✗ {}", problem);
        }
    }

    Ok(())
}

/// Initialize a new Raseed project
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(RaseedError::Config(
            "config.json already exists. Use --force to overwrite".to_string()
        ));
    }

    std::fs::create_dir_all(&target)?;

    let mut config = AppConfig::default();
    config.database.path = target.join("raseed.db").to_string_lossy().to_string();
    config.save(&config_path)?;

    let env_path = target.join(".env");
    if !env_path.exists() {
        std::fs::write(
            &env_path,
            "VISION_API_KEY=\nGEMINI_API_KEY=\nGOOGLE_CLIENT_ID=\nGOOGLE_CLIENT_SECRET=\n",
        )?;
    }

    println!("Raseed initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - .env");
    println!("\nNext steps:");
    println!("  1. Fill in the API keys in .env");
    println!("  2. Start the web UI: raseed-web");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["raseed"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_process_command() {
        let cli = Cli::try_parse_from([
            "raseed", "process", "/tmp/receipt.txt", "--text", "--language", "kn", "--dry-run"
        ]).unwrap();

        match cli.command {
            Some(Commands::Process { path, owner, language, text, dry_run }) => {
                assert_eq!(path, PathBuf::from("/tmp/receipt.txt"));
                assert_eq!(owner, "local");
                assert_eq!(language, Locale::Kannada);
                assert!(text);
                assert!(dry_run);
            }
            _ => panic!("Expected Process command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_language() {
        assert!(Cli::try_parse_from(["raseed", "process", "r.jpg", "--language", "fr"]).is_err());
    }

    #[test]
    fn test_cli_receipt_range_needs_both_ends() {
        let cli = Cli::try_parse_from([
            "raseed", "receipts", "list", "--from", "2024-03-01", "--to", "2024-03-31"
        ]).unwrap();
        match cli.command {
            Some(Commands::Receipts { action: ReceiptCommands::List { from, to, .. } }) => {
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 3, 1));
                assert_eq!(to, NaiveDate::from_ymd_opt(2024, 3, 31));
            }
            _ => panic!("Expected receipts list"),
        }

        assert!(Cli::try_parse_from(["raseed", "receipts", "list", "--from", "2024-03-01"]).is_err());
    }

    #[test]
    fn test_cli_recategorize_all() {
        let cli = Cli::try_parse_from(["raseed", "recategorize", "--owner", "u1"]).unwrap();
        match cli.command {
            Some(Commands::Recategorize { owner, id, .. }) => {
                assert_eq!(owner, "u1");
                assert!(id.is_none());
            }
            _ => panic!("Expected Recategorize command"),
        }
    }

    #[tokio::test]
    async fn test_plain_text_ocr() {
        let doc = PlainText.extract(b"Total 9.99").await.unwrap();
        assert_eq!(doc, OcrDocument::from_text("Total 9.99"));
        assert!(PlainText.extract(&[0xff, 0xfe]).await.is_err());
    }

    #[test]
    fn test_init_writes_config_and_env() {
        let dir = tempfile::tempdir().unwrap();
        run_init(Some(dir.path().to_path_buf()), false).unwrap();
        assert!(dir.path().join("config.json").exists());
        assert!(dir.path().join(".env").exists());
        assert!(run_init(Some(dir.path().to_path_buf()), false).is_err());
    }
}
