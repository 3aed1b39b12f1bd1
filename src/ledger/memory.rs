//! In-process ledger for dry runs and tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use derive_getters::Getters;
use tracing::{debug, instrument};

use super::{Ledger, LedgerError, LedgerRecord, MatchHandle, Participants};
use crate::chess::Position;
use crate::orchestrator::MatchOutcome;

/// Everything the memory ledger holds for one match.
#[derive(Debug, Clone, Getters)]
pub struct LedgerEntry {
    participants: Participants,
    starting_position: Position,
    moves: Vec<LedgerRecord>,
    outcome: Option<MatchOutcome>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    matches: BTreeMap<MatchHandle, LedgerEntry>,
}

/// [`Ledger`] kept in memory. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<State>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of one match, if it exists.
    pub fn entry(&self, handle: &MatchHandle) -> Option<LedgerEntry> {
        self.lock().matches.get(handle).cloned()
    }

    /// Moves recorded for a match, in sequence order.
    pub fn moves(&self, handle: &MatchHandle) -> Vec<LedgerRecord> {
        self.entry(handle).map(|entry| entry.moves).unwrap_or_default()
    }

    /// Number of matches created.
    pub fn match_count(&self) -> usize {
        self.lock().matches.len()
    }
}

#[async_trait::async_trait]
impl Ledger for MemoryLedger {
    #[instrument(skip(self, starting_position, participants))]
    async fn create_match(
        &self,
        starting_position: &Position,
        participants: &Participants,
    ) -> Result<MatchHandle, LedgerError> {
        let mut state = self.lock();
        state.next_id += 1;
        let handle = MatchHandle::new(format!("mem-{}", state.next_id));
        state.matches.insert(
            handle.clone(),
            LedgerEntry {
                participants: participants.clone(),
                starting_position: starting_position.clone(),
                moves: Vec::new(),
                outcome: None,
            },
        );
        debug!(match_handle = %handle, "Match created in memory");
        Ok(handle)
    }

    async fn record_move(&self, handle: &MatchHandle, record: &LedgerRecord) -> Result<(), LedgerError> {
        let mut state = self.lock();
        let entry = state.matches.get_mut(handle).ok_or_else(|| LedgerError::WriteFailed {
            reason: format!("unknown match {}", handle),
        })?;

        if entry
            .moves
            .iter()
            .any(|existing| existing.sequence_number() == record.sequence_number())
        {
            return Ok(());
        }
        let at = entry
            .moves
            .partition_point(|existing| existing.sequence_number() < record.sequence_number());
        entry.moves.insert(at, record.clone());
        Ok(())
    }

    async fn finish_match(&self, handle: &MatchHandle, outcome: &MatchOutcome) -> Result<(), LedgerError> {
        let mut state = self.lock();
        let entry = state.matches.get_mut(handle).ok_or_else(|| LedgerError::WriteFailed {
            reason: format!("unknown match {}", handle),
        })?;
        entry.outcome = Some(*outcome);
        Ok(())
    }
}
