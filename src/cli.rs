//! Command-line interface for deskd.

use clap::{Parser, Subcommand};

/// deskd - helpdesk ticketing backend
#[derive(Parser)]
#[command(name = "deskd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server (the default when no command is given)
    #[command(alias = "daemon")]
    Serve,

    /// Create an account, or reset its password/role if it already exists
    CreateUser {
        username: String,

        /// Password for the account
        #[arg(long)]
        password: String,

        /// Role: user, tech, or admin
        #[arg(long, default_value = "user")]
        role: String,
    },

    /// Write a default config.toml next to the binary if none exists
    InitConfig,
}
