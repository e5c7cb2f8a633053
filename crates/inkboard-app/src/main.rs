//! Main application entry point.

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    log::info!("Starting Inkboard");

    match inkboard_app::run(inkboard_app::Arguments::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("inkboard: {e}");
            ExitCode::FAILURE
        }
    }
}
