pub mod export;
pub mod report;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use export::export_history;
use report::{process_report_command, ReportCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    host::{args::TrackerArgs, start_host},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "timetab", version, long_about = None)]
#[command(about = "Tracks how long you spend on each website", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default $XDG_STATE_HOME/timetab or $HOME/.local/state/timetab"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Run the native messaging host in the current console. Useful for debugging the extension"
    )]
    Serve {
        #[command(flatten)]
        tracker: TrackerArgs,
    },
    #[command(about = "Show time spent per domain")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "Write the daily history as JSON")]
    Export {
        #[arg(long, short, help = "Output file. Prints to stdout when omitted")]
        output: Option<PathBuf>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir.join("logs"), logging_level, args.log)?;

    match args.commands {
        Commands::Serve { tracker } => start_host(app_dir, tracker.tracker_config()).await,
        Commands::Report { command } => process_report_command(&app_dir, command).await,
        Commands::Export { output } => export_history(&app_dir, output.as_deref()).await,
    }
}
