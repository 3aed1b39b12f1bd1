//! Offline provider that plays random legal moves.

use std::time::Duration;

use rand::seq::IteratorRandom;
use tracing::{debug, instrument};

use super::{MoveProvider, MoveRequest, ProviderFault, RawProposal};

/// Picks uniformly among the legal moves it is shown.
///
/// Needs no API key, so it backs demo matches and tests.
#[derive(Debug, Clone)]
pub struct RandomMoveProvider {
    name: String,
    think_time: Duration,
}

impl RandomMoveProvider {
    /// Creates a provider that answers immediately.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            think_time: Duration::ZERO,
        }
    }

    /// Delays every answer by `think_time`.
    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }
}

#[async_trait::async_trait]
impl MoveProvider for RandomMoveProvider {
    #[instrument(skip(self, request), fields(agent = %self.name))]
    async fn propose(&self, request: &MoveRequest) -> Result<RawProposal, ProviderFault> {
        let choice = request
            .legal_moves()
            .iter()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| ProviderFault::Unavailable {
                reason: "no legal moves offered".to_string(),
            })?;

        if !self.think_time.is_zero() {
            tokio::time::sleep(self.think_time).await;
        }

        debug!(choice = %choice, "Random move chosen");
        Ok(RawProposal::new(choice, String::new()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::{Mover, Position, RulesEngine, ShakmatyRules};

    #[tokio::test]
    async fn test_random_provider_plays_legal_moves() {
        let rules = ShakmatyRules::new();
        let position = Position::starting();
        let legal = rules.legal_moves(&position);
        let request = MoveRequest::new(position, Mover::White, legal.clone(), Vec::new());

        let provider = RandomMoveProvider::new("Dice");
        for _ in 0..20 {
            let proposal = provider.propose(&request).await.unwrap();
            assert!(legal.contains(proposal.notation()));
        }
        assert_eq!(provider.name(), "Dice");
    }
}
