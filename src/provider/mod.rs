//! Move providers and the adapter that judges their output.
//!
//! A [`MoveProvider`] is any backend that can suggest a move: a hosted LLM,
//! an offline random mover, or a scripted test double. Providers never decide
//! legality. [`ProviderAdapter`] wraps one provider with a timeout and turns
//! every outcome into a [`Proposal`] or a classified [`ProviderFailure`].

mod adapter;
mod fallback;
mod llm;
mod random;

pub use adapter::{ProviderAdapter, ProviderFailure, Proposal, normalize_notation};
pub use fallback::{FallbackSelector, FallbackStrategy, FirstLegalFallback, RandomFallback};
pub use llm::{LlmMoveProvider, parse_reply};
pub use random::RandomMoveProvider;

use std::collections::BTreeSet;
use std::sync::Arc;

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_new::new;
use tracing::{info, instrument};

use crate::chess::{Mover, Position};
use crate::config::{AgentConfig, ConfigError, ProviderKind};
use crate::llm_client::LlmClient;

/// Everything a provider is told about the ply it must fill.
#[derive(Debug, Clone, Getters, new)]
pub struct MoveRequest {
    /// Current position.
    position: Position,
    /// Side the provider plays for this ply.
    mover: Mover,
    /// Legal moves in SAN, never empty.
    legal_moves: BTreeSet<String>,
    /// Recent moves in SAN, oldest first.
    history: Vec<String>,
}

/// Unvalidated reply from a provider.
#[derive(Debug, Clone, PartialEq, Eq, Getters, new)]
pub struct RawProposal {
    /// Suggested move as the provider wrote it.
    notation: String,
    /// Free-text reasoning, possibly empty.
    rationale: String,
}

/// Failure reported by a provider itself, before any legality check.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ProviderFault {
    /// The backend errored or could not be reached.
    #[display("provider unavailable: {reason}")]
    Unavailable {
        /// What went wrong.
        reason: String,
    },
    /// The backend answered with something that is not a move.
    #[display("malformed response: {reason}")]
    Malformed {
        /// Why the reply could not be read.
        reason: String,
    },
}

/// A source of move suggestions for one agent.
#[async_trait::async_trait]
pub trait MoveProvider: Send + Sync {
    /// Suggests a move for `request`.
    async fn propose(&self, request: &MoveRequest) -> Result<RawProposal, ProviderFault>;

    /// Display name of the agent behind this provider.
    fn name(&self) -> &str;
}

/// Builds the provider described by an agent configuration.
///
/// # Errors
///
/// Returns [`ConfigError`] if an LLM provider is requested but its API key
/// is not set.
#[instrument(skip(config), fields(agent = %config.name(), provider = ?config.provider()))]
pub fn build_provider(config: &AgentConfig) -> Result<Arc<dyn MoveProvider>, ConfigError> {
    let provider: Arc<dyn MoveProvider> = match config.provider() {
        ProviderKind::Random => Arc::new(RandomMoveProvider::new(config.name().clone())),
        ProviderKind::OpenAi | ProviderKind::Anthropic => {
            let llm_config = config.create_llm_config()?;
            Arc::new(LlmMoveProvider::new(
                config.name().clone(),
                LlmClient::new(llm_config),
            ))
        }
    };
    info!("Move provider ready");
    Ok(provider)
}
