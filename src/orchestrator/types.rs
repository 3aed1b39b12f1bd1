//! Finalized moves, match states and results.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

use crate::chess::{Mover, Position};
use crate::ledger::{LedgerOutcome, MatchHandle};
use crate::provider::ProviderFailure;

/// Where a finalized move came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveSource {
    /// The mover's provider proposed it.
    Provider,
    /// The fallback selector picked it after the provider failed.
    Fallback {
        /// Why the provider's turn was discarded.
        failure: ProviderFailure,
    },
}

impl MoveSource {
    /// Storage label: `provider` or `fallback:<failure kind>`.
    pub fn label(&self) -> String {
        match self {
            Self::Provider => "provider".to_string(),
            Self::Fallback { failure } => format!("fallback:{}", failure.kind()),
        }
    }

    /// Whether the move was substituted.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// An applied, immutable move.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct Move {
    /// 1-based ply number within the match.
    sequence_number: u32,
    /// Side that made the move.
    mover: Mover,
    /// SAN as applied.
    notation: String,
    /// Origin square, e.g. `e2`.
    from_square: String,
    /// Destination square, e.g. `e4`.
    to_square: String,
    /// Position after the move.
    resulting_position: Position,
    /// Provider's reasoning; describes the substitution for fallback moves.
    rationale: String,
    /// Opponent is in check.
    is_check: bool,
    /// Opponent is checkmated.
    is_checkmate: bool,
    /// Opponent is stalemated.
    is_stalemate: bool,
    /// Position is drawn by rule.
    is_draw: bool,
    /// Material balance from white's side, in centipawns.
    evaluation_score: i32,
    /// Provider or fallback.
    source: MoveSource,
}

impl Move {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        sequence_number: u32,
        mover: Mover,
        notation: String,
        from_square: String,
        to_square: String,
        resulting_position: Position,
        rationale: String,
        flags: TerminalFlags,
        evaluation_score: i32,
        source: MoveSource,
    ) -> Self {
        Self {
            sequence_number,
            mover,
            notation,
            from_square,
            to_square,
            resulting_position,
            rationale,
            is_check: flags.check,
            is_checkmate: flags.checkmate,
            is_stalemate: flags.stalemate,
            is_draw: flags.draw,
            evaluation_score,
            source,
        }
    }

    /// State the match is in right after this move.
    pub fn match_state(&self) -> MatchState {
        MatchState::from_flags(self.is_checkmate, self.is_stalemate, self.is_draw)
    }
}

/// Rule flags of a resulting position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TerminalFlags {
    pub(crate) check: bool,
    pub(crate) checkmate: bool,
    pub(crate) stalemate: bool,
    pub(crate) draw: bool,
}

/// Lifecycle of a match. Every state but `Playing` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchState {
    /// Moves are still being made.
    Playing,
    /// The side to move is checkmated.
    Checkmate,
    /// The side to move has no legal move and is not in check.
    Stalemate,
    /// Drawn by rule or by the ply limit.
    Draw,
}

impl MatchState {
    /// Whether no further move may be applied.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Playing)
    }

    /// Derives the state from position flags. Checkmate wins over stalemate
    /// and stalemate over other draws.
    pub fn from_flags(checkmate: bool, stalemate: bool, draw: bool) -> Self {
        if checkmate {
            Self::Checkmate
        } else if stalemate {
            Self::Stalemate
        } else if draw {
            Self::Draw
        } else {
            Self::Playing
        }
    }
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EndReason {
    /// A king was checkmated.
    Checkmate,
    /// The side to move had no legal move.
    Stalemate,
    /// Insufficient material or the fifty-move rule.
    DrawByRule,
    /// The configured ply limit was reached.
    PlyLimit,
}

/// Final result of a completed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    winner: Option<Mover>,
    reason: EndReason,
}

impl MatchOutcome {
    /// Creates an outcome.
    pub fn new(winner: Option<Mover>, reason: EndReason) -> Self {
        Self { winner, reason }
    }

    /// The winning side, `None` for draws.
    pub fn winner(&self) -> Option<Mover> {
        self.winner
    }

    /// Why the match ended.
    pub fn reason(&self) -> EndReason {
        self.reason
    }
}

impl std::fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.winner {
            Some(winner) => write!(f, "{} wins by {}", winner, self.reason),
            None => write!(f, "draw by {}", self.reason),
        }
    }
}

/// Result of one [`play_ply`](super::MatchOrchestrator::play_ply) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlyOutcome {
    /// A move was applied.
    Applied(Box<Move>),
    /// The match had already ended; nothing changed.
    AlreadyOver(MatchState),
}

/// Everything known about a match once [`run`](super::MatchOrchestrator::run) returns.
#[derive(Debug, Clone, Getters)]
pub struct MatchSummary {
    /// State at the end of the run.
    final_state: MatchState,
    /// Result, if the match reached a terminal state.
    outcome: Option<MatchOutcome>,
    /// Full move log.
    moves: Vec<Move>,
    /// Per-move ledger results, by sequence number.
    ledger_outcomes: Vec<LedgerOutcome>,
    /// The run stopped on a cancel request.
    cancelled: bool,
    /// Ledger handle, if the match was registered.
    match_handle: Option<MatchHandle>,
}

impl MatchSummary {
    pub(crate) fn new(
        final_state: MatchState,
        outcome: Option<MatchOutcome>,
        moves: Vec<Move>,
        ledger_outcomes: Vec<LedgerOutcome>,
        cancelled: bool,
        match_handle: Option<MatchHandle>,
    ) -> Self {
        Self {
            final_state,
            outcome,
            moves,
            ledger_outcomes,
            cancelled,
            match_handle,
        }
    }

    /// Number of moves that were substituted by the fallback selector.
    pub fn fallback_count(&self) -> usize {
        self.moves.iter().filter(|m| m.source().is_fallback()).count()
    }
}

/// Fatal orchestrator errors. The match cannot continue after one.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum OrchestratorError {
    /// The rules engine contradicted itself, e.g. rejected a move it listed
    /// as legal.
    #[display("rules consistency violation: {detail}")]
    RulesConsistencyViolation {
        /// What was inconsistent.
        detail: String,
    },
    /// The starting FEN cannot be read by the rules engine.
    #[display("invalid starting position: {fen}")]
    InvalidStartingPosition {
        /// The rejected FEN.
        fen: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkmate_dominates_other_flags() {
        assert_eq!(MatchState::from_flags(true, true, true), MatchState::Checkmate);
        assert_eq!(MatchState::from_flags(false, true, true), MatchState::Stalemate);
        assert_eq!(MatchState::from_flags(false, false, true), MatchState::Draw);
        assert_eq!(MatchState::from_flags(false, false, false), MatchState::Playing);
    }

    #[test]
    fn test_only_playing_is_open() {
        assert!(!MatchState::Playing.is_terminal());
        assert!(MatchState::Checkmate.is_terminal());
        assert!(MatchState::Stalemate.is_terminal());
        assert!(MatchState::Draw.is_terminal());
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(MoveSource::Provider.label(), "provider");
        let source = MoveSource::Fallback {
            failure: ProviderFailure::IllegalProposal {
                notation: "Ke9".to_string(),
            },
        };
        assert_eq!(source.label(), "fallback:illegal_proposal");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            MatchOutcome::new(Some(Mover::Black), EndReason::Checkmate).to_string(),
            "black wins by checkmate"
        );
        assert_eq!(
            MatchOutcome::new(None, EndReason::PlyLimit).to_string(),
            "draw by ply_limit"
        );
    }
}
