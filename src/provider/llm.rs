//! Move provider backed by a hosted chat-completion model.

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{MoveProvider, MoveRequest, ProviderFault, RawProposal};
use crate::llm_client::LlmClient;

const SYSTEM_PROMPT: &str = "You are a chess engine playing a rated game. \
Reply with a single JSON object and nothing else: \
{\"move\": \"<one move copied exactly from the legal list, in SAN>\", \
\"rationale\": \"<one or two sentences>\"}";

/// Number of earlier moves quoted back to the model.
const HISTORY_WINDOW: usize = 20;

/// Agent that asks an LLM for each move.
#[derive(Debug, Clone)]
pub struct LlmMoveProvider {
    name: String,
    client: LlmClient,
}

impl LlmMoveProvider {
    /// Creates a provider named `name` using `client`.
    pub fn new(name: impl Into<String>, client: LlmClient) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    fn build_prompt(&self, request: &MoveRequest) -> String {
        let legal = request
            .legal_moves()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        let history = request.history();
        let skipped = history.len().saturating_sub(HISTORY_WINDOW);
        let recent = if history.is_empty() {
            "(none)".to_string()
        } else {
            history[skipped..].join(" ")
        };

        format!(
            "You are {name}, playing {mover}.\n\
             Position (FEN): {fen}\n\
             Recent moves: {recent}\n\
             Legal moves: {legal}\n\n\
             Choose your move.",
            name = self.name,
            mover = request.mover(),
            fen = request.position(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(rename = "move", alias = "notation")]
    notation: String,
    #[serde(default)]
    rationale: Option<String>,
}

/// Extracts `{"move", "rationale"}` from a model reply.
///
/// Prose or code fences around the object are tolerated; the first `{` to
/// the last `}` must parse as JSON with a string `move` field.
///
/// # Errors
///
/// Returns [`ProviderFault::Malformed`] when no such object is present.
pub fn parse_reply(text: &str) -> Result<RawProposal, ProviderFault> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(ProviderFault::Malformed {
            reason: "no JSON object in reply".to_string(),
        });
    };
    if end < start {
        return Err(ProviderFault::Malformed {
            reason: "no JSON object in reply".to_string(),
        });
    }

    let reply: Reply = serde_json::from_str(&text[start..=end]).map_err(|e| ProviderFault::Malformed {
        reason: format!("invalid move JSON: {}", e),
    })?;

    Ok(RawProposal::new(reply.notation, reply.rationale.unwrap_or_default()))
}

#[async_trait::async_trait]
impl MoveProvider for LlmMoveProvider {
    #[instrument(skip(self, request), fields(agent = %self.name, mover = %request.mover()))]
    async fn propose(&self, request: &MoveRequest) -> Result<RawProposal, ProviderFault> {
        let prompt = self.build_prompt(request);
        debug!(prompt_length = prompt.len(), "Requesting move from LLM");

        let text = self
            .client
            .generate(SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| ProviderFault::Unavailable { reason: e.message })?;

        let proposal = parse_reply(&text);
        if let Err(e) = &proposal {
            warn!(error = %e, reply = %text, "Unreadable LLM reply");
        }
        proposal
    }

    fn name(&self) -> &str {
        &self.name
    }
}
