use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mukstagram-server", about = "Mukstagram realtime gateway and terminal client")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/mukstagram.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the realtime gateway (default)
    Serve,
    /// Connect to a gateway and print chat, presence and toasts
    Listen {
        /// User id the token belongs to
        #[arg(short, long)]
        user: String,
        /// File holding the access token (overrides realtime.token_file)
        #[arg(long)]
        token_file: Option<String>,
    },
    /// Mint a token signed with the configured secret
    Token {
        user_id: String,
        /// Issue a service token for the notification push endpoint
        #[arg(long)]
        service: bool,
    },
}
