use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser};
use tracing::level_filters::LevelFilter;

use crate::tracker::TrackerConfig;

/// Accrual tunables shared by the host binary and `timetab serve`.
#[derive(Args, Debug, Clone)]
pub struct TrackerArgs {
    #[arg(long = "flush-interval", default_value_t = 30, help = "Seconds between full flushes")]
    pub flush_interval: u64,
    #[arg(
        long = "min-flush",
        default_value_t = 15,
        help = "Seconds a session must accrue before a regular flush credits it"
    )]
    pub min_flush: u64,
}

impl TrackerArgs {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            min_flush: Duration::from_secs(self.min_flush),
            flush_interval: Duration::from_secs(self.flush_interval.max(1)),
        }
    }
}

/// Started by the browser through its native messaging manifest.
#[derive(Parser, Debug)]
#[command(name = "timetab-host", version, about = "Native messaging host of timetab")]
pub struct HostArgs {
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    #[command(flatten)]
    pub tracker: TrackerArgs,
    /// Whatever the browser appends when launching the host (extension origin, parent window).
    #[arg(hide = true, num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub caller: Vec<String>,
}
