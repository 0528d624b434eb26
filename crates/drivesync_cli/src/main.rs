//! DriveSync CLI
//!
//! Runs the sync server and performs maintenance on a storage root.
//!
//! # Commands
//!
//! - `serve` - Run the HTTP sync server
//! - `share create` / `share revoke` - Manage share links
//! - `sweep` - Remove abandoned upload sessions
//! - `changes` - Print the change log
//!
//! Maintenance commands take the storage root lock, so they cannot run
//! while a server is serving the same root.

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DriveSync file-sync server and tools.
#[derive(Parser)]
#[command(name = "drivesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Storage root directory
    #[arg(global = true, short, long, env = "DRIVESYNC_ROOT")]
    root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP sync server
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "DRIVESYNC_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Key used to sign share credentials
        #[arg(long, env = "DRIVESYNC_SHARE_SECRET", hide_env_values = true)]
        share_secret: String,

        /// Bearer key required from sync clients
        #[arg(long, env = "DRIVESYNC_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Lifetime of share credentials, in hours
        #[arg(long, default_value = "8")]
        share_ttl_hours: u64,

        /// Largest accepted chunk, in MiB
        #[arg(long, default_value = "64")]
        max_chunk_mb: usize,

        /// Chunk size suggested to clients, in MiB
        #[arg(long, default_value = "32")]
        chunk_size_mb: u32,

        /// Seconds between sweeps of abandoned uploads (0 disables)
        #[arg(long, default_value = "3600")]
        sweep_interval_secs: u64,

        /// Mark share cookies Secure (serve behind TLS)
        #[arg(long)]
        cookie_secure: bool,
    },

    /// Manage share links
    Share {
        /// Key used to sign share credentials
        #[arg(long, env = "DRIVESYNC_SHARE_SECRET", hide_env_values = true)]
        share_secret: String,

        #[command(subcommand)]
        action: ShareAction,
    },

    /// Remove upload sessions idle for too long
    Sweep {
        /// Maximum idle age in hours (default: 24)
        #[arg(long)]
        max_age_hours: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Print the change log
    Changes {
        /// Print changes after this cursor
        #[arg(short, long, default_value = "0")]
        since: i64,

        /// Maximum number of changes
        #[arg(short, long)]
        limit: Option<i64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ShareAction {
    /// Create a password-protected share
    Create {
        /// Path to share
        scope: String,

        /// Share a single file instead of a directory
        #[arg(long)]
        file: bool,

        /// Password visitors must enter
        #[arg(long, env = "DRIVESYNC_SHARE_PASSWORD", hide_env_values = true)]
        password: String,

        /// Expire the share after this many hours
        #[arg(long)]
        expires_in_hours: Option<i64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Delete a share
    Revoke {
        /// Share token
        token: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            share_secret,
            api_key,
            share_ttl_hours,
            max_chunk_mb,
            chunk_size_mb,
            sweep_interval_secs,
            cookie_secure,
        } => {
            let root = cli.root.ok_or("Storage root required for serve")?;
            commands::serve::run(&commands::serve::ServeOptions {
                root,
                bind,
                share_secret,
                api_key,
                share_ttl_hours,
                max_chunk_mb,
                chunk_size_mb,
                sweep_interval_secs,
                cookie_secure,
            })?;
        }
        Commands::Share {
            share_secret,
            action,
        } => {
            let root = cli.root.ok_or("Storage root required for share")?;
            match action {
                ShareAction::Create {
                    scope,
                    file,
                    password,
                    expires_in_hours,
                    format,
                } => commands::share::create(
                    &root,
                    &share_secret,
                    &scope,
                    file,
                    &password,
                    expires_in_hours,
                    format,
                )?,
                ShareAction::Revoke { token } => {
                    commands::share::revoke(&root, &share_secret, &token)?
                }
            }
        }
        Commands::Sweep {
            max_age_hours,
            format,
        } => {
            let root = cli.root.ok_or("Storage root required for sweep")?;
            commands::sweep::run(&root, max_age_hours, format)?;
        }
        Commands::Changes {
            since,
            limit,
            format,
        } => {
            let root = cli.root.ok_or("Storage root required for changes")?;
            commands::changes::run(&root, since, limit, format)?;
        }
        Commands::Version => {
            println!("DriveSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
