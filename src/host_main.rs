// The browser starts the host without a console on Windows.
#![windows_subsystem = "windows"]

use anyhow::Result;
use clap::Parser;
use timetab::{
    host::{args::HostArgs, start_host},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};
use tracing::{error, info};

fn main() -> Result<()> {
    let args = HostArgs::parse();
    let app_dir = args.dir.clone().map_or_else(create_application_default_path, Ok)?;
    enable_logging(HOST_PREFIX, &app_dir.join("logs"), args.log, args.log_console)?;
    info!("Launched by {:?}", args.caller);

    let config = args.tracker.tracker_config();
    single_thread_runtime()?
        .block_on(async move { start_host(app_dir, config).await })
        .inspect_err(|e| error!("Host stopped with an error {e:?}"))?;
    Ok(())
}
