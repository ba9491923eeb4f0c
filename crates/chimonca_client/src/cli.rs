//! Command-line interface for the chimonca client.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chimonca - card battle client
#[derive(Parser, Debug)]
#[command(name = "chimonca")]
#[command(about = "Terminal client for Chimonca card battles", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the client config file
    #[arg(long, global = true, default_value = "chimonca.toml")]
    pub config: PathBuf,

    /// File receiving log output (the terminal is taken by the UI)
    #[arg(long, global = true, default_value = "chimonca.log")]
    pub log_file: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join the matchmaking queue, then play the matched game
    Match {
        /// Card ids of the staged deck, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        cards: Vec<i64>,

        /// Stop after printing the matched room
        #[arg(long)]
        no_play: bool,
    },

    /// Join an existing game room
    Play {
        /// Room id
        #[arg(long)]
        room: i64,
    },
}
