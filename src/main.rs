//! splitlab - deterministic A/B testing
//!
//! Assign subjects to variants, record what they do, and complete tests
//! once a variant wins with significance.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use splitlab::Result;
use splitlab::app::AppContext;
use splitlab::cli::Cli;
use splitlab::cli::output::robot_error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.robot {
                // Robot mode: structured error on stdout
                let payload = serde_json::to_string(&robot_error(&e)).unwrap_or_default();
                println!("{payload}");
            } else {
                eprintln!("Error: {e}");
                eprintln!("  hint: {}", e.code().suggestion());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = AppContext::from_cli(cli)?;
    splitlab::cli::commands::run(&ctx, &cli.command)
}

fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let filter = match cli.verbose {
        0 => "warn,splitlab=info",
        1 => "info,splitlab=debug",
        2 => "debug,splitlab=trace",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.robot {
        // JSON logging for robot mode
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
