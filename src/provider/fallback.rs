//! Substitute moves for turns where the provider gave nothing usable.

use std::collections::BTreeSet;

use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Picks a legal move without asking anyone.
///
/// Must not block or suspend, and must return a member of `legal_moves`
/// whenever it is non-empty.
pub trait FallbackSelector: Send + Sync {
    /// Chooses a substitute move, or `None` only when `legal_moves` is empty.
    fn select_fallback(&self, legal_moves: &BTreeSet<String>) -> Option<String>;
}

/// Uniformly random choice among the legal moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomFallback;

impl FallbackSelector for RandomFallback {
    #[instrument(skip(self, legal_moves), fields(count = legal_moves.len()))]
    fn select_fallback(&self, legal_moves: &BTreeSet<String>) -> Option<String> {
        let choice = legal_moves.iter().choose(&mut rand::thread_rng()).cloned();
        debug!(choice = ?choice, "Random fallback selected");
        choice
    }
}

/// Always the first legal move in SAN order. Reproducible across runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstLegalFallback;

impl FallbackSelector for FirstLegalFallback {
    fn select_fallback(&self, legal_moves: &BTreeSet<String>) -> Option<String> {
        legal_moves.iter().next().cloned()
    }
}

/// Fallback strategy named in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackStrategy {
    /// [`RandomFallback`].
    #[default]
    Random,
    /// [`FirstLegalFallback`].
    FirstLegal,
}

impl FallbackStrategy {
    /// Builds the selector for this strategy.
    pub fn build(self) -> Box<dyn FallbackSelector> {
        match self {
            Self::Random => Box::new(RandomFallback),
            Self::FirstLegal => Box::new(FirstLegalFallback),
        }
    }
}
