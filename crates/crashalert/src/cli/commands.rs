//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// `serve` arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to listen on (overrides `server.bind_address`)
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// `simulate` arguments.
#[derive(Debug, Args)]
pub struct SimulateCommand {
    /// Impact force in G; random between 15 and 35 when omitted
    #[arg(short, long, allow_negative_numbers = true)]
    pub force: Option<f64>,

    /// Latitude of the crash
    #[arg(long, requires = "lng", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude of the crash
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lng: Option<f64>,

    /// Countdown length in seconds (overrides saved settings)
    #[arg(short = 'n', long, value_name = "SECONDS")]
    pub countdown: Option<u32>,

    /// Skip the countdown and alert immediately
    #[arg(long)]
    pub now: bool,

    /// Print the final report as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// `classify` arguments.
#[derive(Debug, Args)]
pub struct ClassifyCommand {
    /// Impact force in G
    #[arg(allow_negative_numbers = true)]
    pub force: f64,
}

/// `normalize` arguments.
#[derive(Debug, Args)]
pub struct NormalizeCommand {
    /// Phone numbers to normalize
    #[arg(required = true)]
    pub phones: Vec<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Contact management commands.
#[derive(Debug, Subcommand)]
pub enum ContactsCommand {
    /// List emergency contacts
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add an emergency contact
    Add {
        /// Display name
        name: String,

        /// Phone number
        phone: String,

        /// Email address
        #[arg(short, long)]
        email: Option<String>,

        /// Do not notify this contact by SMS
        #[arg(long)]
        no_sms: bool,

        /// Notify this contact by email
        #[arg(long)]
        notify_email: bool,
    },

    /// Remove an emergency contact
    Remove {
        /// Contact id
        id: i64,
    },
}

/// `log` arguments.
#[derive(Debug, Args)]
pub struct LogCommand {
    /// Maximum number of records
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration with secrets masked
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
