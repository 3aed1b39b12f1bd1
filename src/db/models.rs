//! Database models for ledgered matches.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;

use crate::db::schema;
use crate::ledger::LedgerRecord;

/// Match row.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::matches)]
pub struct MatchRow {
    id: i32,
    white_name: String,
    black_name: String,
    starting_fen: String,
    created_at: NaiveDateTime,
    winner: Option<String>,
    end_reason: Option<String>,
    finished_at: Option<NaiveDateTime>,
}

/// Insertable match row.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::matches)]
pub struct NewMatchRow {
    white_name: String,
    black_name: String,
    starting_fen: String,
}

/// Ledgered move row.
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Getters)]
#[diesel(table_name = schema::ledger_moves)]
#[diesel(belongs_to(MatchRow, foreign_key = match_id))]
pub struct LedgerMoveRow {
    id: i32,
    match_id: i32,
    sequence_number: i32,
    mover: String,
    notation: String,
    from_square: String,
    to_square: String,
    resulting_fen: String,
    rationale: String,
    is_check: bool,
    is_checkmate: bool,
    is_stalemate: bool,
    is_draw: bool,
    evaluation_score: i32,
    source: String,
    recorded_at: NaiveDateTime,
}

/// Insertable move row.
#[derive(Debug, Clone, Insertable, Getters)]
#[diesel(table_name = schema::ledger_moves)]
pub struct NewLedgerMove {
    match_id: i32,
    sequence_number: i32,
    mover: String,
    notation: String,
    from_square: String,
    to_square: String,
    resulting_fen: String,
    rationale: String,
    is_check: bool,
    is_checkmate: bool,
    is_stalemate: bool,
    is_draw: bool,
    evaluation_score: i32,
    source: String,
}

impl NewLedgerMove {
    /// Builds the row for `record` within match `match_id`.
    pub fn from_record(match_id: i32, record: &LedgerRecord) -> Self {
        Self {
            match_id,
            sequence_number: *record.sequence_number() as i32,
            mover: record.mover().to_string(),
            notation: record.notation().clone(),
            from_square: record.from_square().clone(),
            to_square: record.to_square().clone(),
            resulting_fen: record.resulting_position().clone(),
            rationale: record.rationale().clone(),
            is_check: *record.is_check(),
            is_checkmate: *record.is_checkmate(),
            is_stalemate: *record.is_stalemate(),
            is_draw: *record.is_draw(),
            evaluation_score: *record.evaluation_score(),
            source: record.source().clone(),
        }
    }
}
