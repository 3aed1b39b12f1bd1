//! Spectator-facing match events.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use super::{MatchOutcome, MatchState};
use crate::chess::{Mover, Position};

/// Something a spectator can observe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MatchEvent {
    /// A move was finalized and applied.
    MoveApplied {
        /// Ply number.
        sequence_number: u32,
        /// Side that moved.
        mover: Mover,
        /// SAN as applied.
        notation: String,
        /// Position after the move.
        resulting_position: Position,
        /// State after the move.
        match_state: MatchState,
    },
    /// A provider's turn failed and a substitute move was chosen.
    ProviderFallback {
        /// Ply number being filled.
        sequence_number: u32,
        /// Side whose provider failed.
        mover: Mover,
        /// Failure kind label.
        failure: String,
        /// Substitute move.
        fallback: String,
    },
    /// The match reached a terminal state.
    MatchEnded {
        /// Final result.
        outcome: MatchOutcome,
    },
    /// The match stopped on a fatal error.
    MatchAborted {
        /// Error text.
        reason: String,
    },
    /// The match stopped on a cancel request.
    MatchCancelled {
        /// Plies applied before stopping.
        plies: u32,
    },
}

/// Optional event sink. Sending never blocks and never fails the match.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<UnboundedSender<MatchEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: UnboundedSender<MatchEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub(crate) fn emit(&self, event: MatchEvent) {
        if let Some(tx) = &self.tx
            && tx.send(event).is_err()
        {
            trace!("Event receiver dropped");
        }
    }
}
