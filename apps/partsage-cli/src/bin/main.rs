use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use partsage_cli::bootstrap::{build_assistant, catalog_summary, ingest, Paths};
use partsage_cli::{repl, ConversationStore};
use partsage_core::config::Config;
use partsage_core::types::RecordScope;

#[derive(Parser)]
#[command(name = "partsage", about = "Refrigerator and dishwasher parts assistant")]
struct Cli {
    /// Config overlay to merge over config.toml (dev, prod, test)
    #[arg(long = "env", env = "RUST_ENV", default_value = "dev")]
    env_name: String,
    /// Directory holding config.toml
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the catalog export and rebuild the text index and vector table
    Ingest {
        /// Overrides data.catalog_dir
        catalog_dir: Option<PathBuf>,
        /// Only rebuild the text index
        #[arg(long, short = 's')]
        skip_vectors: bool,
    },
    /// Answer a single question
    Ask {
        query: String,
        /// Print the full payload as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive conversation (/new, /reset, /regen, /stats, /threads, /quit)
    Chat,
    /// Record counts, brands and price range in the text index
    Stats {
        /// Limit brands and prices to one appliance type (refrigerator, dishwasher)
        #[arg(long)]
        appliance: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config_dir, &cli.env_name).map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    let paths = Paths::resolve(&settings)?;

    match cli.command {
        Command::Ingest { catalog_dir, skip_vectors } => {
            println!("PartSage ingest\n===============");
            println!("Catalog: {}", catalog_dir.as_deref().unwrap_or(&paths.catalog_dir).display());
            if skip_vectors { println!("⚠️  Skipping vector table (--skip-vectors)"); }
            let report = ingest(&settings, &paths, catalog_dir.as_deref(), skip_vectors).await?;
            println!("\n✅ Ingest complete");
            println!("📊 {} parts, {} compatibility edges, {} repair guides, {} articles", report.parts, report.compatibility, report.repairs, report.blogs);
            print_stats(&report.index_stats);
            println!("📊 {} chunks, {} vectors written to {}", report.chunks, report.vectors_written, paths.vector_db_dir.display());
        }
        Command::Ask { query, json } => {
            let assistant = build_assistant(&settings, &paths).await?;
            let payload = assistant.answer(&query, "cli", &[]).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print!("{}", repl::render_payload(&payload));
            }
        }
        Command::Chat => {
            let assistant = build_assistant(&settings, &paths).await?;
            let mut store = ConversationStore::new(settings.conversation.max_age_hours);
            let mut interrupts = repl::forward_interrupts();
            let mut stdout = tokio::io::stdout();
            repl::run(&assistant, &mut store, BufReader::new(tokio::io::stdin()), &mut stdout, &mut interrupts).await?;
        }
        Command::Stats { appliance } => {
            println!("Text index: {}", paths.text_index_dir.display());
            let summary = catalog_summary(&paths, appliance.as_deref())?;
            print_stats(&summary.counts);
            let scope = appliance.as_deref().map(|a| format!(" ({a})")).unwrap_or_default();
            println!("🏷️  Brands{scope}: {}", if summary.brands.is_empty() { "-".to_string() } else { summary.brands.join(", ") });
            match summary.price_range {
                Some(range) => println!("💲 Price range{scope}: ${:.2} - ${:.2}", range.min, range.max),
                None => println!("💲 Price range{scope}: no priced parts"),
            }
        }
    }
    Ok(())
}

fn print_stats(stats: &[(RecordScope, usize)]) {
    for (scope, count) in stats {
        println!("  {:<14} {count}", scope.as_str());
    }
}
