//! Timeout and classification around a single move provider.

use std::sync::Arc;
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use tracing::{debug, instrument, warn};

use super::{MoveProvider, MoveRequest, ProviderFault};

/// Why a provider's turn did not produce a usable move.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ProviderFailure {
    /// The provider errored or did not answer in time.
    #[display("provider unavailable: {reason}")]
    ProviderUnavailable {
        /// What went wrong.
        reason: String,
    },
    /// The provider named a move that is not legal in the position.
    #[display("illegal proposal: {notation:?}")]
    IllegalProposal {
        /// The move as proposed, after normalization.
        notation: String,
    },
    /// The provider's reply could not be read as a move.
    #[display("malformed response: {reason}")]
    MalformedResponse {
        /// Why the reply could not be read.
        reason: String,
    },
}

impl ProviderFailure {
    /// Short stable label for logs and storage.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::IllegalProposal { .. } => "illegal_proposal",
            Self::MalformedResponse { .. } => "malformed_response",
        }
    }
}

impl From<ProviderFault> for ProviderFailure {
    fn from(fault: ProviderFault) -> Self {
        match fault {
            ProviderFault::Unavailable { reason } => Self::ProviderUnavailable { reason },
            ProviderFault::Malformed { reason } => Self::MalformedResponse { reason },
        }
    }
}

/// A legal move offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct Proposal {
    /// Move in SAN, a member of the legal set it was checked against.
    notation: String,
    /// Provider's reasoning, possibly empty.
    rationale: String,
}

/// Strips whitespace and trailing check or annotation glyphs (`+ # ! ?`).
///
/// This is the only rewriting applied to provider output.
pub fn normalize_notation(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['+', '#', '!', '?'])
        .trim()
        .to_string()
}

/// Wraps one [`MoveProvider`] with a bounded wait.
///
/// The adapter never retries; a failed call is reported once and the caller
/// decides what to do next.
#[derive(Clone)]
pub struct ProviderAdapter {
    provider: Arc<dyn MoveProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderAdapter {
    /// Creates an adapter that gives `provider` at most `timeout` per call.
    pub fn new(provider: Arc<dyn MoveProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Display name of the wrapped provider.
    pub fn name(&self) -> &str {
        self.provider.name()
    }

    /// Maximum wait per call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Asks the provider for a move and checks it against the legal set.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderFailure`] when the provider fails, times out,
    /// answers unreadably, or names a move outside `request.legal_moves()`.
    #[instrument(skip(self, request), fields(provider = %self.name(), mover = %request.mover()))]
    pub async fn propose_move(&self, request: &MoveRequest) -> Result<Proposal, ProviderFailure> {
        let raw = match tokio::time::timeout(self.timeout, self.provider.propose(request)).await {
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Provider timed out");
                return Err(ProviderFailure::ProviderUnavailable {
                    reason: format!("no reply within {} ms", self.timeout.as_millis()),
                });
            }
            Ok(Err(fault)) => {
                warn!(error = %fault, "Provider failed");
                return Err(fault.into());
            }
            Ok(Ok(raw)) => raw,
        };

        let notation = normalize_notation(raw.notation());
        if notation.is_empty() {
            return Err(ProviderFailure::MalformedResponse {
                reason: "empty move".to_string(),
            });
        }
        if !request.legal_moves().contains(&notation) {
            warn!(notation = %notation, "Provider proposed an illegal move");
            return Err(ProviderFailure::IllegalProposal { notation });
        }

        debug!(notation = %notation, "Provider proposed a legal move");
        Ok(Proposal {
            notation,
            rationale: raw.rationale().trim().to_string(),
        })
    }
}
