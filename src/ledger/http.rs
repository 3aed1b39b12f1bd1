//! Ledger service reached over HTTP.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{Ledger, LedgerError, LedgerRecord, MatchHandle, Participants};
use crate::chess::Position;
use crate::config::ConfigError;
use crate::orchestrator::MatchOutcome;

#[derive(Debug, Serialize)]
struct CreateMatchBody<'a> {
    starting_position: &'a str,
    white: &'a str,
    black: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateMatchResponse {
    match_id: serde_json::Value,
}

/// [`Ledger`] backed by a JSON HTTP service.
///
/// Endpoints, relative to the base URL:
/// `POST /matches`, `POST /matches/{id}/moves`, `POST /matches/{id}/result`.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedger {
    /// Creates a ledger client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response, String> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST to ledger");
        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| e.to_string())
    }
}

#[async_trait::async_trait]
impl Ledger for HttpLedger {
    #[instrument(skip(self, starting_position, participants), fields(base_url = %self.base_url))]
    async fn create_match(
        &self,
        starting_position: &Position,
        participants: &Participants,
    ) -> Result<MatchHandle, LedgerError> {
        let body = CreateMatchBody {
            starting_position: starting_position.fen(),
            white: participants.white(),
            black: participants.black(),
        };
        let response = self
            .post("/matches", &body)
            .await
            .map_err(|reason| LedgerError::MatchCreationFailed { reason })?;
        let created: CreateMatchResponse =
            response.json().await.map_err(|e| LedgerError::MatchCreationFailed {
                reason: format!("unreadable response: {}", e),
            })?;

        match created.match_id {
            serde_json::Value::String(id) if !id.is_empty() => Ok(MatchHandle::new(id)),
            serde_json::Value::Number(id) => Ok(MatchHandle::new(id.to_string())),
            other => Err(LedgerError::MatchCreationFailed {
                reason: format!("unusable match_id: {}", other),
            }),
        }
    }

    #[instrument(skip(self, record), fields(match_handle = %handle, sequence = record.sequence_number()))]
    async fn record_move(&self, handle: &MatchHandle, record: &LedgerRecord) -> Result<(), LedgerError> {
        self.post(&format!("/matches/{}/moves", handle), record)
            .await
            .map(|_| ())
            .map_err(|reason| LedgerError::WriteFailed { reason })
    }

    #[instrument(skip(self, outcome), fields(match_handle = %handle))]
    async fn finish_match(&self, handle: &MatchHandle, outcome: &MatchOutcome) -> Result<(), LedgerError> {
        self.post(&format!("/matches/{}/result", handle), outcome)
            .await
            .map(|_| ())
            .map_err(|reason| LedgerError::WriteFailed { reason })
    }
}
