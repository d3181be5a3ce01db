#[cfg(feature = "cli")]
mod cli;

use std::process::ExitCode;

#[cfg(feature = "cli")]
fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() -> ExitCode {
    eprintln!("The CLI is disabled. Rebuild with `--features cli` to render from the command line.");
    ExitCode::FAILURE
}
