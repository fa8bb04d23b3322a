use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sqlitenow_codegen::{generate, DatabaseConfig};

#[derive(Parser)]
#[command(name = "sqlitenow-codegen")]
#[command(author, version, about = "SQL-first code generator for SQLite-backed Kotlin projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate Kotlin sources from a SQL asset tree
    Generate {
        /// Path to the database config file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Root of the schema/init/migration/queries tree (overrides config)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Output directory for generated Kotlin sources (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dotted package prefix (overrides config)
        #[arg(short, long)]
        package: Option<String>,

        /// Copy the bootstrap SQLite database to this path for inspection
        #[arg(long)]
        schema_snapshot: Option<PathBuf>,

        /// Emit provenance/debug comments for every statement
        #[arg(long)]
        debug: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            config,
            root,
            output,
            package,
            schema_snapshot,
            debug,
        } => {
            let mut config = DatabaseConfig::from_file(&config)?;
            if let Some(root) = root {
                config.root = root;
            }
            config.merge_cli_overrides(output, package, schema_snapshot, debug);

            let report = generate(&config)?;
            println!(
                "generated {} files ({} tables, {} views, {} namespaces, {} migrations)",
                report.files.len(),
                report.tables,
                report.views,
                report.namespaces,
                report.migrations
            );
        }
    }

    Ok(())
}
