//! Ledger stored in a local SQLite database.

use tracing::{debug, instrument};

use super::{Ledger, LedgerError, LedgerRecord, MatchHandle, Participants};
use crate::chess::Position;
use crate::db::{DbError, LedgerRepository, NewLedgerMove, NewMatchRow};
use crate::orchestrator::MatchOutcome;

/// [`Ledger`] over a [`LedgerRepository`].
///
/// Diesel is synchronous, so every call runs on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    repository: LedgerRepository,
}

impl SqliteLedger {
    /// Opens the database at `db_path`, applying migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened or migrated.
    #[instrument(skip(db_path))]
    pub fn open(db_path: impl Into<String>) -> Result<Self, DbError> {
        let repository = LedgerRepository::new(db_path.into())?;
        repository.run_migrations()?;
        Ok(Self { repository })
    }

    /// The underlying repository, for read-back queries.
    pub fn repository(&self) -> &LedgerRepository {
        &self.repository
    }

    fn match_id(handle: &MatchHandle) -> Result<i32, String> {
        handle
            .as_str()
            .parse()
            .map_err(|_| format!("not a sqlite match handle: {}", handle))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(LedgerRepository) -> Result<T, DbError> + Send + 'static,
    {
        let repository = self.repository.clone();
        match tokio::task::spawn_blocking(move || f(repository)).await {
            Ok(result) => result.map_err(|e| e.message),
            Err(e) => Err(format!("ledger task failed: {}", e)),
        }
    }
}

#[async_trait::async_trait]
impl Ledger for SqliteLedger {
    #[instrument(skip(self, starting_position, participants))]
    async fn create_match(
        &self,
        starting_position: &Position,
        participants: &Participants,
    ) -> Result<MatchHandle, LedgerError> {
        let new_match = NewMatchRow::new(
            participants.white().clone(),
            participants.black().clone(),
            starting_position.fen().to_string(),
        );
        let row = self
            .blocking(move |repo| repo.create_match(new_match))
            .await
            .map_err(|reason| LedgerError::MatchCreationFailed { reason })?;
        Ok(MatchHandle::new(row.id().to_string()))
    }

    #[instrument(skip(self, record), fields(match_handle = %handle, sequence = record.sequence_number()))]
    async fn record_move(&self, handle: &MatchHandle, record: &LedgerRecord) -> Result<(), LedgerError> {
        let match_id = Self::match_id(handle).map_err(|reason| LedgerError::WriteFailed { reason })?;
        let new_move = NewLedgerMove::from_record(match_id, record);
        let inserted = self
            .blocking(move |repo| repo.insert_move(new_move))
            .await
            .map_err(|reason| LedgerError::WriteFailed { reason })?;
        if !inserted {
            debug!("Move was already ledgered");
        }
        Ok(())
    }

    #[instrument(skip(self, outcome), fields(match_handle = %handle))]
    async fn finish_match(&self, handle: &MatchHandle, outcome: &MatchOutcome) -> Result<(), LedgerError> {
        let match_id = Self::match_id(handle).map_err(|reason| LedgerError::WriteFailed { reason })?;
        let winner = outcome.winner().map(|mover| mover.to_string());
        let reason = outcome.reason().to_string();
        self.blocking(move |repo| repo.finish_match(match_id, winner, reason))
            .await
            .map_err(|reason| LedgerError::WriteFailed { reason })
    }
}
