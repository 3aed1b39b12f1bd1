//! Chess Arena library - AI vs AI chess matches
//!
//! This library runs chess matches between two move providers (hosted LLMs or
//! offline movers), applies only legal moves, substitutes a fallback move
//! whenever a provider fails, and records every move in an external ledger
//! without ever waiting on it.
//!
//! # Architecture
//!
//! - **Chess**: positions in FEN and a rules engine backed by `shakmaty`
//! - **Provider**: move providers, the timeout adapter, and fallback selection
//! - **Ledger**: SQLite, HTTP and in-memory ledgers behind a detached writer
//! - **Orchestrator**: the per-ply state machine, events and cancellation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chess_arena::{
//!     ByMover, CancelSignal, FallbackStrategy, LedgerWriter, MatchOrchestrator, MatchSettings,
//!     ProviderAdapter, RandomMoveProvider, ShakmatyRules,
//! };
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let white = ProviderAdapter::new(Arc::new(RandomMoveProvider::new("white")), Duration::from_secs(5));
//! let black = ProviderAdapter::new(Arc::new(RandomMoveProvider::new("black")), Duration::from_secs(5));
//! let orchestrator = MatchOrchestrator::new(
//!     Arc::new(ShakmatyRules::new()),
//!     ByMover::new(white, black),
//!     FallbackStrategy::Random.build(),
//!     LedgerWriter::disabled(),
//!     MatchSettings::default().with_max_plies(80),
//! )?;
//! let summary = orchestrator.run(CancelSignal::never()).await?;
//! println!("{:?}", summary.outcome());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod chess;
mod config;
mod db;
mod ledger;
mod llm_client;
mod orchestrator;
mod provider;

// Crate-level exports - Chess rules
pub use chess::{AppliedMove, ByMover, Mover, Position, RulesEngine, STARTING_FEN, ShakmatyRules};

// Crate-level exports - Configuration
pub use config::{AgentConfig, ConfigError, LedgerConfig, LedgerKind, MatchConfig, ProviderKind};

// Crate-level exports - Database
pub use db::{DbError, LedgerMoveRow, LedgerRepository, MIGRATIONS, MatchRow, NewLedgerMove, NewMatchRow};

// Crate-level exports - Ledger
pub use ledger::{
    HttpLedger, Ledger, LedgerEntry, LedgerError, LedgerOutcome, LedgerRecord, LedgerWriter,
    MatchHandle, MemoryLedger, Participants, RetryPolicy, SqliteLedger, build_ledger,
};

// Crate-level exports - LLM client
pub use llm_client::{LlmClient, LlmConfig, LlmError, LlmProvider};

// Crate-level exports - Orchestrator
pub use orchestrator::{
    AlternatingMoverInvariant, CancelHandle, CancelSignal, ContiguousSequenceInvariant, EndReason,
    Invariant, InvariantSet, InvariantViolation, MatchEvent, MatchOrchestrator, MatchOutcome,
    MatchSettings, MatchState, MatchSummary, Move, MoveLogInvariants, MoveSource,
    OrchestratorError, PlyOutcome, TerminalLastInvariant, cancellation,
};

// Crate-level exports - Providers
pub use provider::{
    FallbackSelector, FallbackStrategy, FirstLegalFallback, LlmMoveProvider, MoveProvider,
    MoveRequest, ProviderAdapter, ProviderFailure, ProviderFault, Proposal, RandomFallback,
    RandomMoveProvider, RawProposal, build_provider, normalize_notation, parse_reply,
};
