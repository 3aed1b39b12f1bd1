//! Chess position types and the rules engine seam.
//!
//! The rules themselves come from `shakmaty`; this module only adapts them
//! to the string-based interface the orchestrator consumes.

mod position;
mod rules;

pub use position::{ByMover, Mover, Position, STARTING_FEN};
pub use rules::{AppliedMove, RulesEngine, ShakmatyRules};
