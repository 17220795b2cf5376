//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

/// splitlab - deterministic A/B testing with automatic winner declaration
#[derive(Parser, Debug)]
#[command(name = "splitlab")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable JSON output for machine consumption
    #[arg(long, global = true)]
    pub robot: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (replaces the global and project config files)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the database and project config
    #[arg(long, global = true, env = "SPLITLAB_ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, inspect and transition tests
    Test(commands::test::TestArgs),

    /// Assign a subject to a variant of an active test
    Assign(commands::assign::AssignArgs),

    /// Record an event for a subject's assigned variant
    Track(commands::track::TrackArgs),

    /// Show per-variant statistics for a test
    Stats(commands::stats::StatsArgs),

    /// Evaluate every active test and complete those with a winner
    Evaluate(commands::evaluate::EvaluateArgs),

    /// Simulate traffic against a test with known conversion rates
    Simulate(commands::simulate::SimulateArgs),
}
