//! Command-line interface for chess_arena.

use clap::{Parser, Subcommand};

/// Chess Arena - AI vs AI chess matches with a move ledger
#[derive(Parser, Debug)]
#[command(name = "chess_arena")]
#[command(about = "Run chess matches between AI move providers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a match described by a TOML config file
    Play {
        /// Path to match configuration file
        #[arg(short, long, default_value = "match.toml")]
        config: std::path::PathBuf,

        /// Ledger moves to this SQLite database, overriding the config
        #[arg(long)]
        db: Option<String>,
    },

    /// Play an offline match between two random movers
    Demo {
        /// Plies before the match is declared drawn
        #[arg(long, default_value = "120")]
        max_plies: u32,

        /// Pause between plies in milliseconds
        #[arg(long, default_value = "0")]
        pacing_ms: u64,

        /// Ledger moves to this SQLite database
        #[arg(long)]
        db: Option<String>,
    },

    /// Print a ledgered match from a SQLite database
    Replay {
        /// Path to the database file
        #[arg(long, default_value = "chess_arena.db")]
        db: String,

        /// Match id as issued by the ledger
        #[arg(long)]
        match_id: i32,
    },
}
