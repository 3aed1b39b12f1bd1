//! Rules engine seam backed by `shakmaty`.

use std::collections::BTreeSet;

use derive_getters::Getters;
use derive_new::new;
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move as ChessMove, Position as _, Role};
use tracing::{debug, instrument, warn};

use super::{Mover, Position};

/// Result of applying one move to a position.
#[derive(Debug, Clone, PartialEq, Eq, Getters, new)]
pub struct AppliedMove {
    /// Position after the move.
    position: Position,
    /// Origin square, e.g. `e2`.
    from_square: String,
    /// Destination square, e.g. `e4`. For castling this is the king's square.
    to_square: String,
}

/// Legal-move generation and terminal detection over FEN positions.
///
/// Implementations must be pure: the same position always yields the same
/// answers. Moves are identified by their SAN text without check suffixes.
pub trait RulesEngine: Send + Sync {
    /// All legal moves in `position`. Empty for terminal or unreadable positions.
    fn legal_moves(&self, position: &Position) -> BTreeSet<String>;

    /// Applies `notation`, or returns `None` if it is not legal in `position`.
    fn apply_move(&self, position: &Position, notation: &str) -> Option<AppliedMove>;

    /// The side to move, or `None` if the position cannot be read.
    fn side_to_move(&self, position: &Position) -> Option<Mover>;

    /// Whether the side to move is in check.
    fn is_check(&self, position: &Position) -> bool;

    /// Whether the side to move is checkmated.
    fn is_checkmate(&self, position: &Position) -> bool;

    /// Whether the side to move has no legal moves but is not in check.
    fn is_stalemate(&self, position: &Position) -> bool;

    /// Whether the position is drawn by rule.
    fn is_draw(&self, position: &Position) -> bool;

    /// Advisory score in centipawns from white's point of view.
    fn evaluate(&self, _position: &Position) -> i32 {
        0
    }
}

/// Halfmove clock value at which the fifty-move rule draws the game.
const FIFTY_MOVE_HALFMOVES: u32 = 100;

/// [`RulesEngine`] over standard chess.
///
/// Draws are insufficient material and the fifty-move rule. Repetition is
/// not visible from a single FEN and is left to the ply cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyRules;

impl ShakmatyRules {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }

    fn parse(&self, position: &Position) -> Option<Chess> {
        let fen: Fen = match position.fen().parse() {
            Ok(fen) => fen,
            Err(e) => {
                warn!(fen = %position, error = %e, "Unparseable FEN");
                return None;
            }
        };
        match fen.into_position(CastlingMode::Standard) {
            Ok(chess) => Some(chess),
            Err(e) => {
                warn!(fen = %position, error = %e, "FEN describes an illegal position");
                None
            }
        }
    }

    fn to_position(chess: &Chess) -> Position {
        Position::from_fen(Fen::from_position(chess.clone(), EnPassantMode::Legal).to_string())
    }

    fn squares(m: &ChessMove) -> (String, String) {
        match m.to_uci(CastlingMode::Standard) {
            Uci::Normal { from, to, .. } => (from.to_string(), to.to_string()),
            _ => (
                m.from().map(|sq| sq.to_string()).unwrap_or_default(),
                m.to().to_string(),
            ),
        }
    }
}

impl RulesEngine for ShakmatyRules {
    #[instrument(skip(self), fields(fen = %position))]
    fn legal_moves(&self, position: &Position) -> BTreeSet<String> {
        let Some(chess) = self.parse(position) else {
            return BTreeSet::new();
        };
        let moves: BTreeSet<String> = chess
            .legal_moves()
            .iter()
            .map(|m| San::from_move(&chess, m).to_string())
            .collect();
        debug!(count = moves.len(), "Generated legal moves");
        moves
    }

    #[instrument(skip(self), fields(fen = %position))]
    fn apply_move(&self, position: &Position, notation: &str) -> Option<AppliedMove> {
        let chess = self.parse(position)?;
        let chosen = chess
            .legal_moves()
            .iter()
            .find(|m| San::from_move(&chess, m).to_string() == notation)
            .cloned();
        let Some(chosen) = chosen else {
            debug!(notation, "Move is not legal here");
            return None;
        };

        let (from_square, to_square) = Self::squares(&chosen);
        let mut next = chess;
        next.play_unchecked(&chosen);
        Some(AppliedMove::new(Self::to_position(&next), from_square, to_square))
    }

    fn side_to_move(&self, position: &Position) -> Option<Mover> {
        self.parse(position).map(|chess| match chess.turn() {
            Color::White => Mover::White,
            Color::Black => Mover::Black,
        })
    }

    fn is_check(&self, position: &Position) -> bool {
        self.parse(position).is_some_and(|chess| chess.is_check())
    }

    fn is_checkmate(&self, position: &Position) -> bool {
        self.parse(position).is_some_and(|chess| chess.is_checkmate())
    }

    fn is_stalemate(&self, position: &Position) -> bool {
        self.parse(position).is_some_and(|chess| chess.is_stalemate())
    }

    fn is_draw(&self, position: &Position) -> bool {
        self.parse(position).is_some_and(|chess| {
            chess.is_insufficient_material() || chess.halfmoves() >= FIFTY_MOVE_HALFMOVES
        })
    }

    fn evaluate(&self, position: &Position) -> i32 {
        let Some(chess) = self.parse(position) else {
            return 0;
        };
        let board = chess.board();
        [
            (Role::Pawn, 100),
            (Role::Knight, 300),
            (Role::Bishop, 320),
            (Role::Rook, 500),
            (Role::Queen, 900),
        ]
        .into_iter()
        .map(|(role, value)| {
            let white = (board.by_color(Color::White) & board.by_role(role)).count() as i32;
            let black = (board.by_color(Color::Black) & board.by_role(role)).count() as i32;
            (white - black) * value
        })
        .sum()
    }
}
