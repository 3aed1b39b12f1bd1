//! The match state machine.
//!
//! [`MatchOrchestrator`] owns the authoritative position and move log of one
//! match. Each ply asks the side to move's [`ProviderAdapter`] for a move,
//! substitutes a fallback when the provider fails, applies the move through
//! the [`RulesEngine`], and hands the finalized [`Move`] to the
//! [`LedgerWriter`] without waiting for it.
//!
//! All mutation happens after the ply's only suspension point, so dropping a
//! `play_ply` future never leaves the position and log out of step.

mod cancel;
mod events;
mod invariants;
mod types;

pub use cancel::{CancelHandle, CancelSignal, cancellation};
pub use events::MatchEvent;
pub use invariants::{
    AlternatingMoverInvariant, ContiguousSequenceInvariant, Invariant, InvariantSet,
    InvariantViolation, MoveLogInvariants, TerminalLastInvariant,
};
pub use types::{
    EndReason, MatchOutcome, MatchState, MatchSummary, Move, MoveSource, OrchestratorError,
    PlyOutcome,
};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use derive_getters::Getters;
use derive_setters::Setters;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, instrument, warn};

use crate::chess::{ByMover, Mover, Position, RulesEngine};
use crate::ledger::{LedgerWriter, MatchHandle};
use crate::provider::{FallbackSelector, MoveRequest, ProviderAdapter, ProviderFailure};
use events::EventSink;
pub(crate) use types::TerminalFlags;

/// Recent moves shown to providers.
const HISTORY_LEN: usize = 40;

/// Per-match tunables.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters)]
#[setters(prefix = "with_")]
pub struct MatchSettings {
    /// Position the match starts from.
    starting_position: Position,
    /// Plies after which the match is drawn.
    max_plies: u32,
    /// Pause between plies in [`MatchOrchestrator::run`].
    pacing: Duration,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            starting_position: Position::starting(),
            max_plies: 400,
            pacing: Duration::ZERO,
        }
    }
}

/// Drives one match from its starting position to a terminal state.
pub struct MatchOrchestrator {
    rules: Arc<dyn RulesEngine>,
    adapters: ByMover<ProviderAdapter>,
    fallback: Box<dyn FallbackSelector>,
    ledger: LedgerWriter,
    settings: MatchSettings,
    position: Position,
    mover: Mover,
    moves: Vec<Move>,
    state: MatchState,
    outcome: Option<MatchOutcome>,
    aborted: Option<OrchestratorError>,
    events: EventSink,
}

impl std::fmt::Debug for MatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchOrchestrator")
            .field("adapters", &self.adapters)
            .field("settings", &self.settings)
            .field("position", &self.position)
            .field("mover", &self.mover)
            .field("plies", &self.moves.len())
            .field("state", &self.state)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

impl MatchOrchestrator {
    /// Sets up a match at `settings.starting_position()`.
    ///
    /// The first mover is the side to move in the starting position. A
    /// starting position that is already checkmate, stalemate or drawn
    /// yields a match that is over before its first ply.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidStartingPosition`] if the rules
    /// engine cannot read the starting FEN.
    #[instrument(skip_all, fields(fen = %settings.starting_position(), max_plies = settings.max_plies()))]
    pub fn new(
        rules: Arc<dyn RulesEngine>,
        adapters: ByMover<ProviderAdapter>,
        fallback: Box<dyn FallbackSelector>,
        ledger: LedgerWriter,
        settings: MatchSettings,
    ) -> Result<Self, OrchestratorError> {
        let position = settings.starting_position().clone();
        let mover = rules
            .side_to_move(&position)
            .ok_or_else(|| OrchestratorError::InvalidStartingPosition {
                fen: position.fen().to_string(),
            })?;

        let state = MatchState::from_flags(
            rules.is_checkmate(&position),
            rules.is_stalemate(&position),
            rules.is_draw(&position),
        );
        let outcome = Self::outcome_for(state, mover, false);
        if state.is_terminal() {
            warn!(state = %state, "Starting position is already terminal");
        }

        info!(
            white = %adapters.get(Mover::White).name(),
            black = %adapters.get(Mover::Black).name(),
            first_mover = %mover,
            "Match ready"
        );

        Ok(Self {
            rules,
            adapters,
            fallback,
            ledger,
            settings,
            position,
            mover,
            moves: Vec::new(),
            state,
            outcome,
            aborted: None,
            events: EventSink::default(),
        })
    }

    /// Sends match events to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<MatchEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    /// Current position.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Side to move.
    pub fn mover(&self) -> Mover {
        self.mover
    }

    /// Move log, in order.
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// Current state.
    pub fn state(&self) -> MatchState {
        self.state
    }

    /// Result, once the match is over.
    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    /// Ledger handle, if the match was registered.
    pub fn match_handle(&self) -> Option<&MatchHandle> {
        self.ledger.handle()
    }

    /// The error that halted the match, if any.
    pub fn aborted(&self) -> Option<&OrchestratorError> {
        self.aborted.as_ref()
    }

    fn outcome_for(state: MatchState, side_to_move: Mover, ply_limit: bool) -> Option<MatchOutcome> {
        match state {
            MatchState::Playing => None,
            MatchState::Checkmate => Some(MatchOutcome::new(
                Some(side_to_move.opponent()),
                EndReason::Checkmate,
            )),
            MatchState::Stalemate => Some(MatchOutcome::new(None, EndReason::Stalemate)),
            MatchState::Draw if ply_limit => Some(MatchOutcome::new(None, EndReason::PlyLimit)),
            MatchState::Draw => Some(MatchOutcome::new(None, EndReason::DrawByRule)),
        }
    }

    /// Halts the match. Every later ply returns the same error.
    fn violation(&mut self, detail: String) -> OrchestratorError {
        error!(detail = %detail, fen = %self.position, "Rules consistency violation");
        let error = OrchestratorError::RulesConsistencyViolation { detail };
        self.events.emit(MatchEvent::MatchAborted {
            reason: error.to_string(),
        });
        self.aborted = Some(error.clone());
        error
    }

    fn history(&self) -> Vec<String> {
        let skip = self.moves.len().saturating_sub(HISTORY_LEN);
        self.moves[skip..].iter().map(|m| m.notation().clone()).collect()
    }

    /// Picks a substitute move after a provider failure.
    fn substitute(
        &mut self,
        legal_moves: &BTreeSet<String>,
        failure: ProviderFailure,
    ) -> Result<(String, String, MoveSource), OrchestratorError> {
        let selected = self
            .fallback
            .select_fallback(legal_moves)
            .filter(|n| legal_moves.contains(n));
        let Some(notation) = selected else {
            return Err(self.violation(format!(
                "fallback produced no legal move from {} candidates",
                legal_moves.len()
            )));
        };

        warn!(
            mover = %self.mover,
            provider = %self.adapters.get(self.mover).name(),
            failure = failure.kind(),
            reason = %failure,
            fallback = %notation,
            "Provider failed, using fallback move"
        );
        self.events.emit(MatchEvent::ProviderFallback {
            sequence_number: self.next_sequence(),
            mover: self.mover,
            failure: failure.kind().to_string(),
            fallback: notation.clone(),
        });

        let rationale = format!("fallback after {}", failure);
        Ok((notation, rationale, MoveSource::Fallback { failure }))
    }

    fn next_sequence(&self) -> u32 {
        self.moves.len() as u32 + 1
    }

    /// Plays one ply.
    ///
    /// Returns [`PlyOutcome::AlreadyOver`] without side effects once the
    /// match is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RulesConsistencyViolation`] if the rules
    /// engine contradicts itself. The match is halted: the position and log
    /// are left as they were and every later call returns the same error.
    #[instrument(skip(self), fields(sequence = self.next_sequence(), mover = %self.mover))]
    pub async fn play_ply(&mut self) -> Result<PlyOutcome, OrchestratorError> {
        if let Some(error) = &self.aborted {
            return Err(error.clone());
        }
        if self.state.is_terminal() {
            return Ok(PlyOutcome::AlreadyOver(self.state));
        }

        let legal_moves = self.rules.legal_moves(&self.position);
        if legal_moves.is_empty() {
            return Err(self.violation(format!(
                "no legal moves in a position not reported as mate or stalemate: {}",
                self.position
            )));
        }

        let request = MoveRequest::new(
            self.position.clone(),
            self.mover,
            legal_moves.clone(),
            self.history(),
        );
        let proposal = self.adapters.get(self.mover).propose_move(&request).await;

        // Nothing above this line mutates the match.
        let (notation, rationale, source) = match proposal {
            Ok(p) if legal_moves.contains(p.notation()) => {
                (p.notation().clone(), p.rationale().clone(), MoveSource::Provider)
            }
            Ok(p) => self.substitute(
                &legal_moves,
                ProviderFailure::IllegalProposal {
                    notation: p.notation().clone(),
                },
            )?,
            Err(failure) => self.substitute(&legal_moves, failure)?,
        };

        let Some(applied) = self.rules.apply_move(&self.position, &notation) else {
            return Err(self.violation(format!("listed move {} was rejected on apply", notation)));
        };

        let resulting = applied.position().clone();
        let flags = TerminalFlags {
            check: self.rules.is_check(&resulting),
            checkmate: self.rules.is_checkmate(&resulting),
            stalemate: self.rules.is_stalemate(&resulting),
            draw: self.rules.is_draw(&resulting),
        };
        let sequence_number = self.next_sequence();
        let mv = Move::new(
            sequence_number,
            self.mover,
            notation,
            applied.from_square().clone(),
            applied.to_square().clone(),
            resulting.clone(),
            rationale,
            flags,
            self.rules.evaluate(&resulting),
            source,
        );

        let mut state = mv.match_state();
        let ply_limit = !state.is_terminal() && sequence_number >= self.settings.max_plies;
        if ply_limit {
            state = MatchState::Draw;
        }
        let next_mover = self.mover.opponent();

        // The log is only kept with the move if the invariants still hold.
        self.moves.push(mv.clone());
        if let Err(violations) = MoveLogInvariants::check_all(&self.moves) {
            self.moves.pop();
            let descriptions = violations
                .iter()
                .map(|v| v.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(self.violation(format!("Postcondition failed: {}", descriptions)));
        }

        self.position = resulting;
        self.state = state;
        self.outcome = Self::outcome_for(state, next_mover, ply_limit);
        if !state.is_terminal() {
            self.mover = next_mover;
        }

        debug!(
            notation = %mv.notation(),
            source = %mv.source().label(),
            eval = mv.evaluation_score(),
            state = %state,
            "Move applied"
        );
        self.ledger.record(&mv);
        self.events.emit(MatchEvent::MoveApplied {
            sequence_number,
            mover: *mv.mover(),
            notation: mv.notation().clone(),
            resulting_position: mv.resulting_position().clone(),
            match_state: state,
        });
        if let Some(outcome) = self.outcome {
            info!(outcome = %outcome, plies = sequence_number, "Match ended");
            self.events.emit(MatchEvent::MatchEnded { outcome });
        }

        Ok(PlyOutcome::Applied(Box::new(mv)))
    }

    /// Plays until the match ends or `cancel` fires, then waits for
    /// outstanding ledger writes.
    ///
    /// Cancellation drops any in-flight provider call; the log keeps only
    /// fully applied moves.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RulesConsistencyViolation`] as
    /// [`play_ply`](Self::play_ply) does. Ledger writes are still drained.
    #[instrument(skip_all, fields(white = %self.adapters.get(Mover::White).name(), black = %self.adapters.get(Mover::Black).name()))]
    pub async fn run(mut self, mut cancel: CancelSignal) -> Result<MatchSummary, OrchestratorError> {
        let mut cancelled = false;

        while !self.state.is_terminal() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let ply = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                ply = self.play_ply() => Some(ply),
            };
            match ply {
                None => {
                    cancelled = true;
                    break;
                }
                Some(Err(e)) => {
                    self.ledger.drain().await;
                    return Err(e);
                }
                Some(Ok(_)) => {}
            }

            if !self.state.is_terminal() && !self.settings.pacing.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.settings.pacing) => {}
                }
            }
        }

        if cancelled {
            info!(plies = self.moves.len(), "Match cancelled");
            self.events.emit(MatchEvent::MatchCancelled {
                plies: self.moves.len() as u32,
            });
        }

        let ledger_outcomes = self.ledger.drain().await;
        if let Some(outcome) = &self.outcome {
            self.ledger.finish(outcome).await;
        }
        let recorded = ledger_outcomes.iter().filter(|o| o.is_recorded()).count();
        info!(
            plies = self.moves.len(),
            recorded,
            state = %self.state,
            "Match run complete"
        );

        Ok(MatchSummary::new(
            self.state,
            self.outcome,
            self.moves,
            ledger_outcomes,
            cancelled,
            self.ledger.handle().cloned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::ShakmatyRules;
    use crate::provider::{FirstLegalFallback, MoveProvider, ProviderFault, RawProposal};

    struct Refuses;

    #[async_trait::async_trait]
    impl MoveProvider for Refuses {
        async fn propose(&self, _request: &MoveRequest) -> Result<RawProposal, ProviderFault> {
            Err(ProviderFault::Unavailable {
                reason: "offline".to_string(),
            })
        }

        fn name(&self) -> &str {
            "refuses"
        }
    }

    fn orchestrator(settings: MatchSettings) -> Result<MatchOrchestrator, OrchestratorError> {
        let adapter = ProviderAdapter::new(Arc::new(Refuses), Duration::from_secs(1));
        MatchOrchestrator::new(
            Arc::new(ShakmatyRules::new()),
            ByMover::new(adapter.clone(), adapter),
            Box::new(FirstLegalFallback),
            LedgerWriter::disabled(),
            settings,
        )
    }

    #[test]
    fn test_unreadable_start_is_rejected() {
        let settings = MatchSettings::default().with_starting_position(Position::from_fen("garbage"));
        assert!(matches!(
            orchestrator(settings),
            Err(OrchestratorError::InvalidStartingPosition { .. })
        ));
    }

    #[test]
    fn test_first_mover_follows_fen() {
        let settings = MatchSettings::default().with_starting_position(Position::from_fen(
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
        ));
        let orchestrator = orchestrator(settings).unwrap();
        assert_eq!(orchestrator.mover(), Mover::Black);
    }

    #[test]
    fn test_terminal_start_is_over() {
        let settings = MatchSettings::default()
            .with_starting_position(Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1"));
        let orchestrator = orchestrator(settings).unwrap();
        assert_eq!(orchestrator.state(), MatchState::Stalemate);
        assert_eq!(
            orchestrator.outcome(),
            Some(MatchOutcome::new(None, EndReason::Stalemate))
        );
    }

    #[tokio::test]
    async fn test_fallback_fills_failed_turn() {
        let mut orchestrator = orchestrator(MatchSettings::default()).unwrap();
        let PlyOutcome::Applied(mv) = orchestrator.play_ply().await.unwrap() else {
            panic!("expected a move");
        };
        assert_eq!(*mv.sequence_number(), 1);
        assert_eq!(*mv.mover(), Mover::White);
        assert_eq!(mv.source().label(), "fallback:provider_unavailable");
        assert_eq!(orchestrator.mover(), Mover::Black);
    }

    #[tokio::test]
    async fn test_ply_limit_draws() {
        let mut orchestrator = orchestrator(MatchSettings::default().with_max_plies(2)).unwrap();
        orchestrator.play_ply().await.unwrap();
        assert_eq!(orchestrator.state(), MatchState::Playing);
        orchestrator.play_ply().await.unwrap();
        assert_eq!(orchestrator.state(), MatchState::Draw);
        assert_eq!(
            orchestrator.outcome(),
            Some(MatchOutcome::new(None, EndReason::PlyLimit))
        );
        assert!(matches!(
            orchestrator.play_ply().await.unwrap(),
            PlyOutcome::AlreadyOver(MatchState::Draw)
        ));
        assert_eq!(orchestrator.moves().len(), 2);
    }
}
