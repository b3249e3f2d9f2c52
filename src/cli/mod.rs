//! Command-line interface for Collegium.

pub mod commands;

use clap::{Parser, Subcommand};

/// Collegium - College ERP authentication backend
#[derive(Parser)]
#[command(name = "collegium")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default when no subcommand is given)
    Serve,

    /// Create a superuser account with the SUPERADMIN designation
    CreateAdmin {
        /// External user id, e.g. ADMIN002
        user_id: String,

        /// Unique login name
        username: String,

        /// E-mail address receiving OTP challenges
        email: String,

        /// Password; a random one is generated and printed when omitted
        #[arg(long)]
        password: Option<String>,

        /// Mail the generated credentials to the new account's address
        #[arg(long)]
        notify: bool,
    },

    /// Clear a permanent lock on an account
    UnlockUser {
        /// External user id of the locked account
        user_id: String,
    },
}
