//! Append-only persistence of finalized moves.
//!
//! A [`Ledger`] is an external store reachable over an unreliable channel.
//! Nothing in the match depends on it: [`LedgerWriter`] hands each move to
//! the ledger on a detached task and only reports what happened.

mod http;
mod memory;
mod sqlite;
mod writer;

pub use http::HttpLedger;
pub use memory::{LedgerEntry, MemoryLedger};
pub use sqlite::SqliteLedger;
pub use writer::{LedgerOutcome, LedgerWriter, RetryPolicy};

use std::sync::Arc;
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_new::new;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::chess::{Mover, Position};
use crate::config::{ConfigError, LedgerConfig, LedgerKind};
use crate::orchestrator::{MatchOutcome, Move};

/// The ledger's identifier for one match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct MatchHandle(String);

impl MatchHandle {
    /// Wraps a ledger-issued identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Agent names registered with the ledger for a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct Participants {
    white: String,
    black: String,
}

impl Participants {
    /// Name of the agent playing `mover`.
    pub fn name(&self, mover: Mover) -> &str {
        match mover {
            Mover::White => &self.white,
            Mover::Black => &self.black,
        }
    }
}

/// Write-once form of a finalized move as the ledger stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct LedgerRecord {
    sequence_number: u32,
    mover: Mover,
    notation: String,
    from_square: String,
    to_square: String,
    resulting_position: String,
    rationale: String,
    is_check: bool,
    is_checkmate: bool,
    is_stalemate: bool,
    is_draw: bool,
    evaluation_score: i32,
    source: String,
}

impl From<&Move> for LedgerRecord {
    fn from(mv: &Move) -> Self {
        Self {
            sequence_number: *mv.sequence_number(),
            mover: *mv.mover(),
            notation: mv.notation().clone(),
            from_square: mv.from_square().clone(),
            to_square: mv.to_square().clone(),
            resulting_position: mv.resulting_position().fen().to_string(),
            rationale: mv.rationale().clone(),
            is_check: *mv.is_check(),
            is_checkmate: *mv.is_checkmate(),
            is_stalemate: *mv.is_stalemate(),
            is_draw: *mv.is_draw(),
            evaluation_score: *mv.evaluation_score(),
            source: mv.source().label(),
        }
    }
}

/// Ledger failure, always recoverable from the match's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum LedgerError {
    /// The ledger would not open a match.
    #[display("ledger match creation failed: {reason}")]
    MatchCreationFailed {
        /// What went wrong.
        reason: String,
    },
    /// A move or result could not be written.
    #[display("ledger write failed: {reason}")]
    WriteFailed {
        /// What went wrong.
        reason: String,
    },
}

/// External append-only store for finalized moves.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// Registers a match and returns the ledger's handle for it.
    async fn create_match(
        &self,
        starting_position: &Position,
        participants: &Participants,
    ) -> Result<MatchHandle, LedgerError>;

    /// Appends one move. Repeating a write for the same sequence number must
    /// not create a second entry.
    async fn record_move(&self, handle: &MatchHandle, record: &LedgerRecord) -> Result<(), LedgerError>;

    /// Stores the final result. Ledgers without a result concept may ignore it.
    async fn finish_match(&self, _handle: &MatchHandle, _outcome: &MatchOutcome) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Builds the ledger described by `config`, or `None` when persistence is off.
///
/// # Errors
///
/// Returns [`ConfigError`] if a required path or URL is missing, or if the
/// SQLite database cannot be migrated.
#[instrument(skip(config), fields(kind = ?config.kind()))]
pub fn build_ledger(config: &LedgerConfig) -> Result<Option<Arc<dyn Ledger>>, ConfigError> {
    let ledger: Arc<dyn Ledger> = match config.kind() {
        LedgerKind::None => return Ok(None),
        LedgerKind::Memory => Arc::new(MemoryLedger::new()),
        LedgerKind::Sqlite => {
            let path = config
                .path()
                .clone()
                .ok_or_else(|| ConfigError::new("sqlite ledger requires `path`".to_string()))?;
            let ledger = SqliteLedger::open(path)
                .map_err(|e| ConfigError::new(format!("Failed to open sqlite ledger: {}", e)))?;
            Arc::new(ledger)
        }
        LedgerKind::Http => {
            let url = config
                .url()
                .clone()
                .ok_or_else(|| ConfigError::new("http ledger requires `url`".to_string()))?;
            Arc::new(HttpLedger::new(
                url,
                Duration::from_secs(*config.request_timeout_secs()),
            )?)
        }
    };
    info!("Ledger ready");
    Ok(Some(ledger))
}
