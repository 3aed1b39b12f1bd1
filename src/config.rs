//! Match and agent configuration loaded from TOML.

use std::path::Path;
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::chess::Position;
use crate::llm_client::{LlmConfig, LlmProvider};
use crate::provider::FallbackStrategy;

/// Backend an agent uses to pick moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// Offline random mover.
    #[default]
    Random,
}

impl ProviderKind {
    /// The LLM backend, if this kind uses one.
    pub fn llm(self) -> Option<LlmProvider> {
        match self {
            Self::OpenAi => Some(LlmProvider::OpenAI),
            Self::Anthropic => Some(LlmProvider::Anthropic),
            Self::Random => None,
        }
    }
}

/// Configuration for one agent seat.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Display name shown to spectators and stored in the ledger.
    name: String,

    /// Move backend.
    #[serde(default)]
    provider: ProviderKind,

    /// LLM model name (e.g., "gpt-4o-mini", "claude-3-5-haiku-20241022").
    #[serde(default = "default_model")]
    model: String,

    /// Maximum tokens for each LLM reply.
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,

    /// Seconds to wait for a move before falling back.
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    300
}

fn default_timeout_secs() -> u64 {
    8
}

impl AgentConfig {
    /// Creates an agent configuration with default model settings.
    pub fn new(name: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            name: name.into(),
            provider,
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Creates an offline random agent.
    pub fn random(name: impl Into<String>) -> Self {
        Self::new(name, ProviderKind::Random)
    }

    /// Per-move provider timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Creates LLM configuration from this agent config.
    ///
    /// Requires `OPENAI_API_KEY` or `ANTHROPIC_API_KEY` in the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for the random provider or a missing API key.
    #[instrument(skip(self), fields(agent = %self.name, provider = ?self.provider, model = %self.model))]
    pub fn create_llm_config(&self) -> Result<LlmConfig, ConfigError> {
        let provider = self.provider.llm().ok_or_else(|| {
            ConfigError::new(format!("Agent '{}' does not use an LLM", self.name))
        })?;

        let variable = match provider {
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        };
        let api_key = std::env::var(variable)
            .map_err(|_| ConfigError::new(format!("{} environment variable not set", variable)))?;

        Ok(LlmConfig::new(provider, api_key, self.model.clone(), self.max_tokens))
    }
}

/// Which ledger backend receives finalized moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// No persistence.
    #[default]
    None,
    /// In-process store, lost at exit.
    Memory,
    /// Local SQLite database.
    Sqlite,
    /// Remote ledger service over HTTP.
    Http,
}

/// Ledger connection and retry settings.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Backend.
    #[serde(default)]
    kind: LedgerKind,

    /// SQLite database path (sqlite only).
    #[serde(default)]
    path: Option<String>,

    /// Base URL of the ledger service (http only).
    #[serde(default)]
    url: Option<String>,

    /// Write attempts per move, including the first.
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_backoff_ms")]
    backoff_ms: u64,

    /// HTTP request timeout in seconds (http only).
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    200
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl LedgerConfig {
    /// A SQLite ledger at `path` with default retry settings.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            kind: LedgerKind::Sqlite,
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            kind: LedgerKind::None,
            path: None,
            url: None,
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Full description of one match.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Agent playing white.
    white: AgentConfig,

    /// Agent playing black.
    black: AgentConfig,

    /// Plies after which the match is declared drawn.
    #[serde(default = "default_max_plies")]
    max_plies: u32,

    /// Pause between plies, for spectators.
    #[serde(default)]
    pacing_ms: u64,

    /// Starting FEN; the standard position when absent.
    #[serde(default)]
    starting_fen: Option<String>,

    /// How substitute moves are picked.
    #[serde(default)]
    fallback: FallbackStrategy,

    /// Ledger settings.
    #[serde(default)]
    ledger: LedgerConfig,
}

fn default_max_plies() -> u32 {
    400
}

impl MatchConfig {
    /// Creates a match between two agents with default settings.
    pub fn new(white: AgentConfig, black: AgentConfig) -> Self {
        Self {
            white,
            black,
            max_plies: default_max_plies(),
            pacing_ms: 0,
            starting_fen: None,
            fallback: FallbackStrategy::default(),
            ledger: LedgerConfig::default(),
        }
    }

    /// Two random agents, for offline demos.
    pub fn demo(max_plies: u32) -> Self {
        Self {
            max_plies,
            ..Self::new(AgentConfig::random("Random White"), AgentConfig::random("Random Black"))
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading match config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(white = %config.white.name, black = %config.black.name, "Config loaded successfully");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not a valid match config.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        if config.max_plies == 0 {
            return Err(ConfigError::new("max_plies must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Starting position for the match.
    pub fn starting_position(&self) -> Position {
        self.starting_fen
            .as_deref()
            .map(Position::from_fen)
            .unwrap_or_default()
    }

    /// Pause between plies.
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Replaces the pause between plies.
    pub fn with_pacing_ms(mut self, pacing_ms: u64) -> Self {
        self.pacing_ms = pacing_ms;
        self
    }

    /// Replaces the ledger settings.
    pub fn with_ledger(mut self, ledger: LedgerConfig) -> Self {
        self.ledger = ledger;
        self
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
