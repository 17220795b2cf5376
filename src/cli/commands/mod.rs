//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::Result;

pub mod assign;
pub mod evaluate;
pub mod simulate;
pub mod stats;
pub mod track;

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Test(args) => test::run(ctx, args),
        Commands::Assign(args) => assign::run(ctx, args),
        Commands::Track(args) => track::run(ctx, args),
        Commands::Stats(args) => stats::run(ctx, args),
        Commands::Evaluate(args) => evaluate::run(ctx, args),
        Commands::Simulate(args) => simulate::run(ctx, args),
    }
}
