//! Position snapshots and mover identities.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// One of the two fixed agent identities in a match.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mover {
    /// Plays the white pieces.
    White,
    /// Plays the black pieces.
    Black,
}

impl Mover {
    /// Returns the other mover.
    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

/// A value held once per mover, looked up by identity instead of by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByMover<T> {
    white: T,
    black: T,
}

impl<T> ByMover<T> {
    /// Creates a pair from the white and black values.
    pub fn new(white: T, black: T) -> Self {
        Self { white, black }
    }

    /// Returns the value for `mover`.
    pub fn get(&self, mover: Mover) -> &T {
        match mover {
            Mover::White => &self.white,
            Mover::Black => &self.black,
        }
    }
}

/// Board snapshot in Forsyth-Edwards Notation.
///
/// A `Position` is only a string; whether it describes a legal game state is
/// the rules engine's call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{fen}")]
#[serde(transparent)]
pub struct Position {
    fen: String,
}

impl Position {
    /// The standard starting position.
    #[instrument]
    pub fn starting() -> Self {
        Self::from_fen(STARTING_FEN)
    }

    /// Wraps a FEN string without validating it.
    pub fn from_fen(fen: impl Into<String>) -> Self {
        Self {
            fen: fen.into().trim().to_string(),
        }
    }

    /// Returns the FEN text.
    pub fn fen(&self) -> &str {
        &self.fen
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::starting()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opponent_flips() {
        assert_eq!(Mover::White.opponent(), Mover::Black);
        assert_eq!(Mover::Black.opponent().opponent(), Mover::Black);
    }

    #[test]
    fn test_mover_parses_lowercase() {
        assert_eq!("white".parse::<Mover>().unwrap(), Mover::White);
        assert_eq!(Mover::Black.to_string(), "black");
    }

    #[test]
    fn test_by_mover_lookup() {
        let names = ByMover::new("alpha", "beta");
        assert_eq!(*names.get(Mover::White), "alpha");
        assert_eq!(*names.get(Mover::Black), "beta");
    }

    #[test]
    fn test_position_trims_fen() {
        let position = Position::from_fen(format!("  {STARTING_FEN}\n"));
        assert_eq!(position, Position::starting());
    }
}
