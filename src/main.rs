//! Thin CLI front-end around [`sleipnir_framegen::generate`] (spec §6.3),
//! in the same "parse args, call one library entry, report the error"
//! shape as `a2ltool`'s own `main`.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Generate constrained-random Sleipnir Frame test stimuli from an ELF's DWARF info")]
struct Cli {
    /// Path to the ELF binary carrying the Frame type's DWARF debug info
    elf: PathBuf,

    /// Name of the Frame struct/union/typedef type to randomize
    frame_type: String,

    /// Path to the YAML test suite configuration
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match sleipnir_framegen::generate(&cli.elf, &cli.frame_type, &cli.config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
