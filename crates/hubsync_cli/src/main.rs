//! hubsync CLI
//!
//! Runs the heartbeat server and inspects its event journal.
//!
//! # Commands
//!
//! - `serve` - Run the heartbeat server over HTTP
//! - `events` - Dump the access events of a journal
//! - `snapshot` - Print the credential snapshot a manager would receive

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// hubsync heartbeat server and tools.
#[derive(Parser)]
#[command(name = "hubsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the heartbeat server
    Serve {
        /// JSON seed with managers, points, users and links
        #[arg(short, long)]
        seed: PathBuf,

        /// Event journal file (in-memory if omitted)
        #[arg(short, long)]
        journal: Option<PathBuf>,

        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Maximum events accepted per heartbeat
        #[arg(long, default_value = "500")]
        max_events: usize,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        request_timeout: u64,

        /// Reject requests without an X-Tenant-Id header
        #[arg(long)]
        require_tenant: bool,
    },

    /// Dump access events from a journal
    Events {
        /// Event journal file
        #[arg(short, long)]
        journal: PathBuf,

        /// Only show events of this manager
        #[arg(short, long)]
        manager: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the credential snapshot of a manager
    Snapshot {
        /// JSON seed with managers, points, users and links
        #[arg(short, long)]
        seed: PathBuf,

        /// Event journal file
        #[arg(short, long)]
        journal: Option<PathBuf>,

        /// Manager ID
        #[arg(short, long)]
        manager: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            seed,
            journal,
            bind,
            max_events,
            request_timeout,
            require_tenant,
        } => {
            let options = commands::serve::ServeOptions {
                seed,
                journal,
                bind,
                max_events,
                request_timeout,
                require_tenant,
            };
            commands::serve::run(&options)?;
        }
        Commands::Events {
            journal,
            manager,
            format,
        } => {
            commands::events::run(&journal, manager, &format)?;
        }
        Commands::Snapshot {
            seed,
            journal,
            manager,
        } => {
            commands::snapshot::run(&seed, journal.as_deref(), manager)?;
        }
        Commands::Version => {
            println!("hubsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("journal format v{}", hubsync_store::JOURNAL_VERSION);
        }
    }

    Ok(())
}
