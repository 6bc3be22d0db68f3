mod args;
mod config;
mod output;
mod runner;

use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use args::{Cli, Commands};
use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    harrow_telemetry::init_logging(cli.verbose, cli.json_logs);
    let cfg = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            company,
            target,
            format,
            poll_ms,
            metrics_addr,
        } => {
            runner::run_scan(
                cfg,
                company,
                target,
                format,
                Duration::from_millis(poll_ms.max(10)),
                metrics_addr,
            )
            .await?;
        }
        Commands::Companies { format } => runner::list_companies(&cfg, format).await?,
        Commands::Dates { company } => runner::list_dates(&cfg, &company).await?,
        Commands::Times { company, date } => runner::list_times(&cfg, &company, &date).await?,
        Commands::Results {
            company,
            date,
            time,
            format,
            from_artifacts,
        } => {
            runner::show_results(&cfg, &company, &date, &time, format, from_artifacts).await?;
        }
    }

    Ok(())
}
