//! Database repository for ledgered matches and moves.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument};

use crate::db::{DbError, LedgerMoveRow, MatchRow, NewLedgerMove, NewMatchRow, schema};

/// Schema migrations compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Milliseconds SQLite waits on a locked database before failing a write.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Database repository for the move ledger.
///
/// Every operation opens its own connection, so the repository is cheap to
/// clone into blocking tasks. `":memory:"` is not useful here since each
/// connection would see a fresh database.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    db_path: String,
}

impl LedgerRepository {
    /// Creates a repository for the database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        if db_path.trim().is_empty() {
            return Err(DbError::new("Database path is empty"));
        }
        info!(path = %db_path, "Creating LedgerRepository");
        Ok(Self { db_path })
    }

    /// Establishes a database connection.
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))?;
        conn.batch_execute(&format!("PRAGMA busy_timeout = {};", BUSY_TIMEOUT_MS))?;
        Ok(conn)
    }

    /// Applies any pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(format!("Migration failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(())
    }

    /// Creates a match row and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, new_match))]
    pub fn create_match(&self, new_match: NewMatchRow) -> Result<MatchRow, DbError> {
        let mut conn = self.connection()?;
        let row = diesel::insert_into(schema::matches::table)
            .values(&new_match)
            .returning(MatchRow::as_returning())
            .get_result(&mut conn)?;
        info!(match_id = row.id(), "Match created");
        Ok(row)
    }

    /// Gets a match by id. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_match(&self, match_id: i32) -> Result<Option<MatchRow>, DbError> {
        let mut conn = self.connection()?;
        let row = schema::matches::table
            .find(match_id)
            .select(MatchRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    /// Inserts a move. A move already stored under the same match and
    /// sequence number is left untouched, so retried writes are harmless.
    ///
    /// Returns `true` if a row was written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, new_move), fields(match_id = new_move.match_id(), sequence = new_move.sequence_number()))]
    pub fn insert_move(&self, new_move: NewLedgerMove) -> Result<bool, DbError> {
        let mut conn = self.connection()?;
        let inserted = diesel::insert_or_ignore_into(schema::ledger_moves::table)
            .values(&new_move)
            .execute(&mut conn)?;
        debug!(inserted, "Move stored");
        Ok(inserted > 0)
    }

    /// Lists the moves of a match in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn list_moves(&self, match_id: i32) -> Result<Vec<LedgerMoveRow>, DbError> {
        let mut conn = self.connection()?;
        let rows = schema::ledger_moves::table
            .filter(schema::ledger_moves::match_id.eq(match_id))
            .order(schema::ledger_moves::sequence_number.asc())
            .select(LedgerMoveRow::as_select())
            .load(&mut conn)?;
        debug!(count = rows.len(), "Moves loaded");
        Ok(rows)
    }

    /// Stores the final result of a match.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the match does not exist or a database error occurs.
    #[instrument(skip(self))]
    pub fn finish_match(
        &self,
        match_id: i32,
        winner: Option<String>,
        end_reason: String,
    ) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let updated = diesel::update(schema::matches::table.find(match_id))
            .set((
                schema::matches::winner.eq(winner),
                schema::matches::end_reason.eq(Some(end_reason)),
                schema::matches::finished_at.eq(Some(chrono::Utc::now().naive_utc())),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(DbError::new(format!("No match with id {}", match_id)));
        }
        info!(match_id, "Match result stored");
        Ok(())
    }
}
