//! `rvsim`: run a RISC-V program image, optionally in tandem with a reference
//! model, or serve the remote instruction-injection protocol.

use std::process::ExitCode;

use driver_core::TraceConfig;
use tracing::error;

mod cli;
mod config;
mod logging;
mod session;

fn main() -> ExitCode {
    let invocation = match cli::parse(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let settings = match invocation.settings() {
        Ok(settings) => settings,
        Err(err) => {
            logging::init(&TraceConfig::default());
            error!("{err:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.run.trace);

    match session::execute(&settings) {
        Ok(status) => ExitCode::from(status),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
