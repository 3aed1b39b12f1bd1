//! Move-log invariants.
//!
//! Logical properties every match history must satisfy. They are checked
//! after every ply in all builds and can be tested on hand-built logs.

use super::Move;

/// A logical property that must hold for a given state.
pub trait Invariant<S> {
    /// Checks if the invariant holds for the given state.
    fn holds(state: &S) -> bool;

    /// Human-readable description of the invariant.
    fn description() -> &'static str;
}

/// Violation of an invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub description: String,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// A set of invariants checked together.
pub trait InvariantSet<S> {
    /// Checks all invariants in the set, collecting every violation.
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>>;
}

impl<S, I1, I2, I3> InvariantSet<S> for (I1, I2, I3)
where
    I1: Invariant<S>,
    I2: Invariant<S>,
    I3: Invariant<S>,
{
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>> {
        let violations: Vec<_> = [
            (I1::holds(state), I1::description()),
            (I2::holds(state), I2::description()),
            (I3::holds(state), I3::description()),
        ]
        .into_iter()
        .filter(|(holds, _)| !holds)
        .map(|(_, description)| InvariantViolation::new(description))
        .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Sequence numbers run 1, 2, 3, ... with no gap or repeat.
pub struct ContiguousSequenceInvariant;

impl Invariant<Vec<Move>> for ContiguousSequenceInvariant {
    fn holds(moves: &Vec<Move>) -> bool {
        moves
            .iter()
            .zip(1u32..)
            .all(|(mv, expected)| *mv.sequence_number() == expected)
    }

    fn description() -> &'static str {
        "Sequence numbers are contiguous from 1"
    }
}

/// Consecutive moves are made by opposite sides.
pub struct AlternatingMoverInvariant;

impl Invariant<Vec<Move>> for AlternatingMoverInvariant {
    fn holds(moves: &Vec<Move>) -> bool {
        moves.windows(2).all(|pair| pair[0].mover() != pair[1].mover())
    }

    fn description() -> &'static str {
        "Movers alternate"
    }
}

/// Only the last move may leave the match in a terminal state.
pub struct TerminalLastInvariant;

impl Invariant<Vec<Move>> for TerminalLastInvariant {
    fn holds(moves: &Vec<Move>) -> bool {
        match moves.split_last() {
            None => true,
            Some((_, earlier)) => earlier.iter().all(|mv| !mv.match_state().is_terminal()),
        }
    }

    fn description() -> &'static str {
        "No move follows a terminal position"
    }
}

/// All move-log invariants as a composable set.
pub type MoveLogInvariants = (
    ContiguousSequenceInvariant,
    AlternatingMoverInvariant,
    TerminalLastInvariant,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::{Mover, Position};
    use crate::orchestrator::types::TerminalFlags;
    use crate::orchestrator::MoveSource;

    fn mv(sequence_number: u32, mover: Mover, checkmate: bool) -> Move {
        Move::new(
            sequence_number,
            mover,
            "e4".to_string(),
            "e2".to_string(),
            "e4".to_string(),
            Position::starting(),
            String::new(),
            TerminalFlags {
                checkmate,
                ..TerminalFlags::default()
            },
            0,
            MoveSource::Provider,
        )
    }

    #[test]
    fn test_empty_log_holds() {
        assert!(MoveLogInvariants::check_all(&Vec::new()).is_ok());
    }

    #[test]
    fn test_well_formed_log_holds() {
        let log = vec![
            mv(1, Mover::White, false),
            mv(2, Mover::Black, false),
            mv(3, Mover::White, true),
        ];
        assert!(MoveLogInvariants::check_all(&log).is_ok());
    }

    #[test]
    fn test_gap_in_sequence_detected() {
        let log = vec![mv(1, Mover::White, false), mv(3, Mover::Black, false)];
        assert!(!ContiguousSequenceInvariant::holds(&log));
    }

    #[test]
    fn test_repeated_mover_detected() {
        let log = vec![mv(1, Mover::White, false), mv(2, Mover::White, false)];
        assert!(!AlternatingMoverInvariant::holds(&log));
    }

    #[test]
    fn test_move_after_mate_detected() {
        let log = vec![mv(1, Mover::White, true), mv(2, Mover::Black, false)];
        let violations = MoveLogInvariants::check_all(&log).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].description, TerminalLastInvariant::description());
    }
}
