//! # scanbook CLI
//!
//! ```bash
//! scanbook --config ./config/scanbook.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scanbook init` | Create the SQLite database and seed sections |
//! | `scanbook serve` | Start the HTTP server |
//! | `scanbook sections` | Print every section and its codes |
//! | `scanbook export` | Write the history as CSV |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use scanbook::{config, db, export, migrate, server, sqlite_store::SqliteStore};
use scanbook_core::store::SectionStore;

/// scanbook: a barcode inventory log grouped into named sections.
#[derive(Parser)]
#[command(name = "scanbook", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/scanbook.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and tables. On an empty database, sections are
    /// imported from the snapshot file if present, otherwise the configured
    /// default sections are created. Safe to run repeatedly.
    Init,

    /// Start the HTTP server.
    Serve,

    /// Print every section with its codes.
    Sections,

    /// Export the barcode history as CSV.
    Export {
        /// Output file. Writes to stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Sections => {
            let pool = db::connect(&cfg).await?;
            let snapshot = SqliteStore::new(pool.clone()).snapshot().await?;
            for (name, codes) in snapshot.iter() {
                println!("{} ({})", name, codes.len());
                for code in codes {
                    println!("  {}", code);
                }
            }
            pool.close().await;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
    }

    Ok(())
}
