use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    let args = verbatim_lib::Args::parse();

    match verbatim_lib::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
