//! Chess Arena - Unified CLI
//!
//! Plays AI vs AI chess matches and replays ledgered ones.

#![warn(missing_docs)]

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chess_arena::{
    ByMover, LedgerConfig, LedgerRepository, LedgerWriter, MatchConfig, MatchEvent,
    MatchOrchestrator, MatchSettings, MatchSummary, Participants, ProviderAdapter, RetryPolicy,
    ShakmatyRules, build_ledger, build_provider, cancellation,
};
use clap::Parser;
use cli::{Cli, Command};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chess_arena=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Play { config, db } => {
            let mut config = MatchConfig::from_file(&config)?;
            if let Some(db) = db {
                config = config.with_ledger(LedgerConfig::sqlite(db));
            }
            run_match(config).await
        }
        Command::Demo {
            max_plies,
            pacing_ms,
            db,
        } => {
            let mut config = MatchConfig::demo(max_plies).with_pacing_ms(pacing_ms);
            if let Some(db) = db {
                config = config.with_ledger(LedgerConfig::sqlite(db));
            }
            run_match(config).await
        }
        Command::Replay { db, match_id } => replay(db, match_id),
    }
}

/// Plays one match to completion or Ctrl-C.
#[instrument(skip(config), fields(white = %config.white().name(), black = %config.black().name()))]
async fn run_match(config: MatchConfig) -> Result<()> {
    let white = build_provider(config.white())?;
    let black = build_provider(config.black())?;
    let adapters = ByMover::new(
        ProviderAdapter::new(white, config.white().timeout()),
        ProviderAdapter::new(black, config.black().timeout()),
    );

    let starting_position = config.starting_position();
    let participants = Participants::new(config.white().name().clone(), config.black().name().clone());
    let ledger = match build_ledger(config.ledger())? {
        Some(ledger) => {
            let policy = RetryPolicy::new(
                *config.ledger().max_attempts(),
                Duration::from_millis(*config.ledger().backoff_ms()),
            );
            LedgerWriter::open(ledger, &starting_position, &participants, policy).await
        }
        None => LedgerWriter::disabled(),
    };

    let settings = MatchSettings::default()
        .with_starting_position(starting_position)
        .with_max_plies(*config.max_plies())
        .with_pacing(config.pacing());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = MatchOrchestrator::new(
        Arc::new(ShakmatyRules::new()),
        adapters,
        config.fallback().build(),
        ledger,
        settings,
    )?
    .with_events(tx);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let (cancel, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping match");
            cancel.cancel();
        }
    });

    let summary = orchestrator.run(signal).await;
    printer.await.context("event printer failed")?;
    print_summary(&summary?);
    Ok(())
}

fn print_event(event: &MatchEvent) {
    match event {
        MatchEvent::MoveApplied {
            sequence_number,
            mover,
            notation,
            match_state,
            ..
        } => println!(
            "{:>4}. {:<5} {:<8} {}",
            sequence_number,
            mover.to_string(),
            notation,
            match_state
        ),
        MatchEvent::ProviderFallback {
            mover,
            failure,
            fallback,
            ..
        } => println!("      {mover} provider failed ({failure}), playing {fallback}"),
        MatchEvent::MatchEnded { outcome } => println!("Result: {outcome}"),
        MatchEvent::MatchAborted { reason } => println!("Match aborted: {reason}"),
        MatchEvent::MatchCancelled { plies } => println!("Match cancelled after {plies} plies"),
    }
}

fn print_summary(summary: &MatchSummary) {
    let recorded = summary.ledger_outcomes().iter().filter(|o| o.is_recorded()).count();
    println!(
        "{} plies, {} fallback moves, {} ledgered",
        summary.moves().len(),
        summary.fallback_count(),
        recorded
    );
    if let Some(handle) = summary.match_handle() {
        println!("Ledger match id: {handle}");
    }
    if let Some(last) = summary.moves().last() {
        println!("Final position: {}", last.resulting_position());
    }
}

/// Prints a ledgered match.
#[instrument]
fn replay(db: String, match_id: i32) -> Result<()> {
    let repository = LedgerRepository::new(db)?;
    let row = repository
        .get_match(match_id)?
        .with_context(|| format!("no match with id {match_id}"))?;
    info!(match_id, "Replaying match");

    println!("{} (white) vs {} (black)", row.white_name(), row.black_name());
    println!("Start: {}", row.starting_fen());
    for mv in repository.list_moves(match_id)? {
        println!(
            "{:>4}. {:<5} {:<8} {:<20} {}",
            mv.sequence_number(),
            mv.mover(),
            mv.notation(),
            mv.source(),
            mv.rationale()
        );
    }
    match (row.winner(), row.end_reason()) {
        (Some(winner), Some(reason)) => println!("Result: {winner} wins by {reason}"),
        (None, Some(reason)) => println!("Result: draw by {reason}"),
        _ => println!("Result: unfinished"),
    }
    Ok(())
}
