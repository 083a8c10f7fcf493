use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "jobsift")]
#[command(about = "Job postings pipeline: scrape, filter, score, persist")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the scrape pipeline once.
    Run,
    /// Summarize a persisted snapshot.
    Report {
        /// Snapshot file to read.
        #[arg(long, default_value = "data/jobs_latest.json")]
        file: PathBuf,
        /// Also write postings at or above --min-score to top_postings.json.
        #[arg(long)]
        export: bool,
        /// Score floor for --export.
        #[arg(long, default_value_t = jobsift_sync::DEFAULT_EXPORT_MIN_SCORE)]
        min_score: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = jobsift_sync::run_once_from_env().await?;
            println!(
                "run complete: run_id={} found={} filtered={} saved={}",
                summary.run_id, summary.found_count, summary.filtered_count, summary.saved_count
            );
            for error in &summary.errors {
                eprintln!("  {error}");
            }
        }
        Commands::Report {
            file,
            export,
            min_score,
        } => {
            let values = jobsift_sync::load_snapshot_values(&file)?;
            print!("{}", jobsift_sync::render_report(&values));
            if export {
                let dir = file.parent().unwrap_or(Path::new("."));
                let count = jobsift_sync::export_top_postings(&values, dir, min_score)?;
                println!("exported {count} postings at or above {min_score:.2}");
            }
        }
    }

    Ok(())
}
