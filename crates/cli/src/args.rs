use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "harrow")]
#[command(version)]
#[command(about = "Scan orchestration for recon and vulnerability tooling", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Config file (defaults to $HARROW_CONFIG, then ./harrow.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Admit and run one scan, reporting progress until it finishes
    Scan {
        /// Company the target belongs to
        #[arg(long)]
        company: String,

        /// Target domain, e.g. example.com
        #[arg(short = 't', long)]
        target: String,

        /// Output format for the findings
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Status poll interval in milliseconds
        #[arg(long, default_value = "500")]
        poll_ms: u64,

        /// Serve Prometheus metrics on this address while the scan runs
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },

    /// List companies with scan counts and severity totals
    Companies {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List scan dates (YYYYMMDD) for a company
    Dates { company: String },

    /// List scan times (HHMM, or HHMM-N for later runs in that minute) for a company on a date
    Times { company: String, date: String },

    /// Show the findings of one scan
    Results {
        company: String,
        /// YYYYMMDD
        date: String,
        /// HHMM or HHMM-N, as listed by `times`
        time: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Re-normalize the raw result file instead of querying the database
        #[arg(long)]
        from_artifacts: bool,
    },
}
