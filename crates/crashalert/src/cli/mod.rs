//! Command-line interface for the `crashalert` binary.

mod commands;
mod share;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ClassifyCommand, ConfigCommand, ContactsCommand, LogCommand, NormalizeCommand, ServeCommand,
    SimulateCommand, StatusCommand,
};
pub use share::ConsoleShareSheet;

/// crashalert - Crash detection emergency alerts
///
/// Classifies impacts, runs the cancellable emergency countdown, and notifies
/// emergency contacts by SMS with link and share-sheet fallbacks.
#[derive(Debug, Parser)]
#[command(name = "crashalert")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve(ServeCommand),

    /// Simulate a crash and run the emergency countdown
    Simulate(SimulateCommand),

    /// Classify an impact force
    Classify(ClassifyCommand),

    /// Normalize phone numbers
    Normalize(NormalizeCommand),

    /// Manage emergency contacts
    #[command(subcommand)]
    Contacts(ContactsCommand),

    /// Show recent notification attempts
    Log(LogCommand),

    /// Show storage and provider status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}
