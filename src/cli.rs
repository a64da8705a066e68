//! Command line interface for the `devtools-proxy` binary.
//!
//! Kept free of library types so the build script can render the man page
//! from the same definition.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Payload length used by `--shorten`.
pub const SHORTEN_LEN: usize = 80;

/// Command line arguments for the `devtools-proxy` binary.
#[derive(Debug, Parser)]
#[command(
    name = "devtools-proxy",
    version,
    about = "Intercepting proxy tracing browser remote-debugging sessions"
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "each flag is an independent command line switch"
)]
pub struct Cli {
    /// Address debugging clients connect to.
    #[arg(short, long, default_value = "localhost:9223")]
    pub listen: String,

    /// Address of the browser's remote-debugging endpoint.
    #[arg(short, long, default_value = "localhost:9222")]
    pub remote: String,

    /// Shorten rendered payloads to 80 bytes.
    #[arg(short, long, conflicts_with = "truncate")]
    pub shorten: bool,

    /// Shorten rendered payloads to this many bytes (0 keeps them whole).
    #[arg(long, value_name = "BYTES")]
    pub truncate: Option<usize>,

    /// Stop after the first debugging session closes.
    #[arg(long)]
    pub once: bool,

    /// Also log requests when they are sent, before their response arrives.
    #[arg(short = 'i', long)]
    pub show_requests: bool,

    /// Write one log file per sub-session target.
    #[arg(short = 'd', long)]
    pub distribute_logs: bool,

    /// Do not copy records to stdout.
    #[arg(short, long)]
    pub quiet: bool,

    /// Print timestamps with microsecond precision.
    #[arg(short, long)]
    pub microseconds: bool,

    /// Append the time elapsed since the previous record of the same log.
    #[arg(long)]
    pub delta: bool,

    /// Directory holding per-target log files.
    #[arg(long, value_name = "DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Only log records containing this text (repeatable).
    #[arg(long = "include", value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Never log records containing this text (repeatable).
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Emit records as structured `tracing` events instead of text logs.
    #[arg(long)]
    pub structured: bool,

    /// Decoded messages buffered per session before back-pressure applies.
    #[arg(long, value_name = "N", default_value_t = 1024)]
    pub channel_capacity: usize,

    /// Drop decoded messages at once when the buffer is full instead of
    /// waiting briefly for room.
    #[arg(long)]
    pub drop_when_full: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_listen: Option<SocketAddr>,
}

impl Cli {
    /// Truncation length selected by `--shorten` or `--truncate`.
    #[must_use]
    pub fn truncate_len(&self) -> usize {
        if self.shorten {
            SHORTEN_LEN
        } else {
            self.truncate.unwrap_or(0)
        }
    }
}
