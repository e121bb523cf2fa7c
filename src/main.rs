use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use plc_trend_logger::daemon;

#[derive(Parser)]
#[command(name = "ptl", version, about = "PLC trend collection daemon")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the collection daemon in the foreground
    Serve {
        /// Address to bind the HTTP API to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind the HTTP API to
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for record files and trend logs
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Path to a JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Command::Serve {
            host,
            port,
            data_dir,
            config,
        } => {
            daemon::start_daemon(
                config.as_deref(),
                data_dir.as_deref(),
                host.as_deref(),
                port,
            )
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
