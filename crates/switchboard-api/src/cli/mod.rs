//! CLI command definitions for the `swb` binary.

pub mod sessions;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Multi-tenant session manager for a remote messaging network.
#[derive(Parser)]
#[command(name = "swb", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "SWITCHBOARD_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is unset.
    pub fn default_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info,tower_http=warn",
            1 => "info,switchboard_core=debug,switchboard_infra=debug,switchboard_api=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and reconnect stored sessions in the background.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value_t = 3000)]
        port: u16,

        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// List stored sessions.
    Sessions,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}
