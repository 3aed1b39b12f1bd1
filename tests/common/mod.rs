//! Shared test doubles for match tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chess_arena::{
    AppliedMove, ByMover, FallbackSelector, FirstLegalFallback, Ledger, LedgerError, LedgerRecord,
    LedgerWriter, MatchHandle, MatchOrchestrator, MatchSettings, Mover, MoveProvider, MoveRequest,
    Participants, Position, ProviderAdapter, ProviderFault, RawProposal, RulesEngine,
    ShakmatyRules,
};

/// Replies from a fixed script, then reports itself unavailable.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Result<RawProposal, ProviderFault>>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Vec<Result<RawProposal, ProviderFault>>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
        }
    }

    /// A provider that plays `moves` in order.
    pub fn moves(name: &str, moves: &[&str]) -> Self {
        Self::new(
            name,
            moves
                .iter()
                .map(|m| Ok(RawProposal::new(m.to_string(), format!("playing {}", m))))
                .collect(),
        )
    }

    /// A provider that never has a move.
    pub fn silent(name: &str) -> Self {
        Self::new(name, Vec::new())
    }
}

#[async_trait::async_trait]
impl MoveProvider for ScriptedProvider {
    async fn propose(&self, _request: &MoveRequest) -> Result<RawProposal, ProviderFault> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderFault::Unavailable {
                    reason: "script exhausted".to_string(),
                })
            })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Never answers within any sane timeout.
pub struct StallingProvider;

#[async_trait::async_trait]
impl MoveProvider for StallingProvider {
    async fn propose(&self, _request: &MoveRequest) -> Result<RawProposal, ProviderFault> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ProviderFault::Unavailable {
            reason: "woke up".to_string(),
        })
    }

    fn name(&self) -> &str {
        "staller"
    }
}

/// Ledger that can refuse to create matches and fails every move write.
#[derive(Default)]
pub struct FailingLedger {
    pub refuse_create: bool,
    pub write_calls: AtomicU32,
}

#[async_trait::async_trait]
impl Ledger for FailingLedger {
    async fn create_match(
        &self,
        _starting_position: &Position,
        _participants: &Participants,
    ) -> Result<MatchHandle, LedgerError> {
        if self.refuse_create {
            Err(LedgerError::MatchCreationFailed {
                reason: "ledger offline".to_string(),
            })
        } else {
            Ok(MatchHandle::new("doomed"))
        }
    }

    async fn record_move(&self, _handle: &MatchHandle, _record: &LedgerRecord) -> Result<(), LedgerError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        Err(LedgerError::WriteFailed {
            reason: "disk full".to_string(),
        })
    }
}

/// Rules that list moves but refuse to apply any of them.
pub struct BrokenRules(pub ShakmatyRules);

impl RulesEngine for BrokenRules {
    fn legal_moves(&self, position: &Position) -> BTreeSet<String> {
        self.0.legal_moves(position)
    }

    fn apply_move(&self, _position: &Position, _notation: &str) -> Option<AppliedMove> {
        None
    }

    fn side_to_move(&self, position: &Position) -> Option<Mover> {
        self.0.side_to_move(position)
    }

    fn is_check(&self, position: &Position) -> bool {
        self.0.is_check(position)
    }

    fn is_checkmate(&self, position: &Position) -> bool {
        self.0.is_checkmate(position)
    }

    fn is_stalemate(&self, position: &Position) -> bool {
        self.0.is_stalemate(position)
    }

    fn is_draw(&self, position: &Position) -> bool {
        self.0.is_draw(position)
    }
}

/// Rejects the first `apply_move` call, then plays by the normal rules.
#[derive(Default)]
pub struct RejectsFirstApply {
    rules: ShakmatyRules,
    applies: AtomicU32,
}

impl RulesEngine for RejectsFirstApply {
    fn legal_moves(&self, position: &Position) -> BTreeSet<String> {
        self.rules.legal_moves(position)
    }

    fn apply_move(&self, position: &Position, notation: &str) -> Option<AppliedMove> {
        if self.applies.fetch_add(1, Ordering::SeqCst) == 0 {
            None
        } else {
            self.rules.apply_move(position, notation)
        }
    }

    fn side_to_move(&self, position: &Position) -> Option<Mover> {
        self.rules.side_to_move(position)
    }

    fn is_check(&self, position: &Position) -> bool {
        self.rules.is_check(position)
    }

    fn is_checkmate(&self, position: &Position) -> bool {
        self.rules.is_checkmate(position)
    }

    fn is_stalemate(&self, position: &Position) -> bool {
        self.rules.is_stalemate(position)
    }

    fn is_draw(&self, position: &Position) -> bool {
        self.rules.is_draw(position)
    }
}

pub fn adapter(provider: impl MoveProvider + 'static, timeout: Duration) -> ProviderAdapter {
    ProviderAdapter::new(Arc::new(provider), timeout)
}

/// Orchestrator with standard rules and first-legal fallback.
pub fn orchestrator(
    white: impl MoveProvider + 'static,
    black: impl MoveProvider + 'static,
    ledger: LedgerWriter,
    settings: MatchSettings,
) -> MatchOrchestrator {
    orchestrator_with(
        Arc::new(ShakmatyRules::new()),
        white,
        black,
        Box::new(FirstLegalFallback),
        ledger,
        settings,
    )
}

pub fn orchestrator_with(
    rules: Arc<dyn RulesEngine>,
    white: impl MoveProvider + 'static,
    black: impl MoveProvider + 'static,
    fallback: Box<dyn FallbackSelector>,
    ledger: LedgerWriter,
    settings: MatchSettings,
) -> MatchOrchestrator {
    let timeout = Duration::from_millis(200);
    MatchOrchestrator::new(
        rules,
        ByMover::new(adapter(white, timeout), adapter(black, timeout)),
        fallback,
        ledger,
        settings,
    )
    .expect("valid starting position")
}

pub fn participants() -> Participants {
    Participants::new("White Bot".to_string(), "Black Bot".to_string())
}
