//! SQLite persistence for ledgered matches and moves.

mod error;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only

pub use error::DbError;
pub use models::{LedgerMoveRow, MatchRow, NewLedgerMove, NewMatchRow};
pub use repository::{LedgerRepository, MIGRATIONS};
