//! Detached, retrying delivery of moves to a [`Ledger`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::{Ledger, LedgerError, LedgerRecord, MatchHandle, Participants};
use crate::chess::Position;
use crate::orchestrator::{MatchOutcome, Move};

/// How often and how patiently a move write is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    /// At most `max_attempts` writes (at least one), waiting `initial_backoff`
    /// before the first retry and doubling after that.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// A single attempt with no retry.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Total attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before attempt number `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// What became of one move's ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The ledger accepted the move.
    Recorded {
        /// Move sequence number.
        sequence_number: u32,
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed.
    Failed {
        /// Move sequence number.
        sequence_number: u32,
        /// Attempts made.
        attempts: u32,
        /// Error from the last attempt.
        error: LedgerError,
    },
    /// No write was attempted because the match has no ledger handle.
    Skipped {
        /// Move sequence number.
        sequence_number: u32,
    },
}

impl LedgerOutcome {
    /// Sequence number of the move this outcome is about.
    pub fn sequence_number(&self) -> u32 {
        match self {
            Self::Recorded { sequence_number, .. }
            | Self::Failed { sequence_number, .. }
            | Self::Skipped { sequence_number } => *sequence_number,
        }
    }

    /// Whether the move reached the ledger.
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

/// Logs a ledger outcome. The single place ledger results are reported.
///
/// Skipped writes are not logged; the missing handle was reported once when
/// the match was opened.
fn report(outcome: &LedgerOutcome, handle: &MatchHandle) {
    let match_handle = handle.as_str();
    match outcome {
        LedgerOutcome::Recorded {
            sequence_number,
            attempts,
        } => debug!(match_handle, sequence = sequence_number, attempts, "Move ledgered"),
        LedgerOutcome::Failed {
            sequence_number,
            attempts,
            error,
        } => error!(
            match_handle,
            sequence = sequence_number,
            attempts,
            error = %error,
            "Move could not be ledgered"
        ),
        LedgerOutcome::Skipped { .. } => {}
    }
}

async fn write_with_retry(
    ledger: Arc<dyn Ledger>,
    handle: MatchHandle,
    record: LedgerRecord,
    policy: RetryPolicy,
) -> LedgerOutcome {
    let sequence_number = *record.sequence_number();
    let mut attempt = 1;
    let outcome = loop {
        match ledger.record_move(&handle, &record).await {
            Ok(()) => {
                break LedgerOutcome::Recorded {
                    sequence_number,
                    attempts: attempt,
                };
            }
            Err(error) if attempt >= policy.max_attempts() => {
                break LedgerOutcome::Failed {
                    sequence_number,
                    attempts: attempt,
                    error,
                };
            }
            Err(error) => {
                let wait = policy.backoff_after(attempt);
                warn!(
                    match_handle = %handle,
                    sequence = sequence_number,
                    attempt,
                    retry_in_ms = wait.as_millis() as u64,
                    error = %error,
                    "Ledger write failed, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    };
    report(&outcome, &handle);
    outcome
}

/// Best-effort, non-blocking persistence for one match.
///
/// [`record`](Self::record) returns immediately; writes run on their own
/// detached tasks and their outcomes are collected for later inspection.
/// Dropping the writer does not cancel writes in flight, but only
/// [`drain`](Self::drain) reports how they ended. If the ledger refused to
/// open the match, every move is skipped and the degradation is logged once.
pub struct LedgerWriter {
    ledger: Option<Arc<dyn Ledger>>,
    handle: Option<MatchHandle>,
    policy: RetryPolicy,
    pending: Vec<JoinHandle<()>>,
    outcomes_tx: mpsc::UnboundedSender<LedgerOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<LedgerOutcome>,
    completed: Vec<LedgerOutcome>,
}

impl std::fmt::Debug for LedgerWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerWriter")
            .field("handle", &self.handle)
            .field("policy", &self.policy)
            .field("pending", &self.in_flight())
            .field("completed", &self.completed.len())
            .finish_non_exhaustive()
    }
}

impl LedgerWriter {
    /// A writer that skips every move.
    pub fn disabled() -> Self {
        Self::with_parts(None, None, RetryPolicy::once())
    }

    fn with_parts(
        ledger: Option<Arc<dyn Ledger>>,
        handle: Option<MatchHandle>,
        policy: RetryPolicy,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            ledger,
            handle,
            policy,
            pending: Vec::new(),
            outcomes_tx,
            outcomes_rx,
            completed: Vec::new(),
        }
    }

    /// Registers the match with `ledger` and returns a writer for it.
    ///
    /// Never fails: if the ledger cannot create the match, the writer is
    /// returned without a handle and the match proceeds unledgered.
    #[instrument(skip(ledger, starting_position, participants, policy), fields(white = %participants.white(), black = %participants.black()))]
    pub async fn open(
        ledger: Arc<dyn Ledger>,
        starting_position: &Position,
        participants: &Participants,
        policy: RetryPolicy,
    ) -> Self {
        let handle = match ledger.create_match(starting_position, participants).await {
            Ok(handle) => {
                info!(match_handle = %handle, "Ledger match created");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Ledger unavailable for this match; moves will not be ledgered");
                None
            }
        };
        Self::with_parts(Some(ledger), handle, policy)
    }

    /// The ledger's handle for this match, if it was created.
    pub fn handle(&self) -> Option<&MatchHandle> {
        self.handle.as_ref()
    }

    /// Hands `mv` to the ledger on a detached task.
    pub fn record(&mut self, mv: &Move) {
        self.reap();

        let (Some(ledger), Some(handle)) = (&self.ledger, &self.handle) else {
            self.completed.push(LedgerOutcome::Skipped {
                sequence_number: *mv.sequence_number(),
            });
            return;
        };

        let write = write_with_retry(
            Arc::clone(ledger),
            handle.clone(),
            LedgerRecord::from(mv),
            self.policy,
        );
        let outcomes = self.outcomes_tx.clone();
        self.pending.push(tokio::spawn(async move {
            // The writer may be gone by now; the write itself still happened.
            outcomes.send(write.await).ok();
        }));
    }

    /// Collects writes that have already finished without waiting.
    fn reap(&mut self) {
        self.pending.retain(|task| !task.is_finished());
        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.completed.push(outcome);
        }
    }

    /// Number of writes still in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.iter().filter(|task| !task.is_finished()).count()
    }

    /// Waits for all in-flight writes and returns every outcome so far,
    /// ordered by sequence number.
    #[instrument(skip(self), fields(in_flight = self.in_flight()))]
    pub async fn drain(&mut self) -> Vec<LedgerOutcome> {
        for task in std::mem::take(&mut self.pending) {
            if let Err(e) = task.await {
                error!(error = %e, "Ledger write task panicked");
            }
        }
        self.reap();
        let mut outcomes = std::mem::take(&mut self.completed);
        outcomes.sort_by_key(LedgerOutcome::sequence_number);
        outcomes
    }

    /// Stores the match result, once. Failure is logged and otherwise ignored.
    #[instrument(skip(self, outcome))]
    pub async fn finish(&self, outcome: &MatchOutcome) {
        let (Some(ledger), Some(handle)) = (&self.ledger, &self.handle) else {
            return;
        };
        match ledger.finish_match(handle, outcome).await {
            Ok(()) => info!(match_handle = %handle, "Match result ledgered"),
            Err(e) => warn!(match_handle = %handle, error = %e, "Match result could not be ledgered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::Mover;
    use crate::orchestrator::{MoveSource, TerminalFlags};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    /// Counts every tracing event it sees.
    struct CountEvents(Arc<AtomicU32>);

    impl<S: tracing::Subscriber> Layer<S> for CountEvents {
        fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_subscriber() -> (Arc<AtomicU32>, impl tracing::Subscriber + Send + Sync + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let subscriber = tracing_subscriber::registry().with(CountEvents(count.clone()));
        (count, subscriber)
    }

    fn sample_move(sequence_number: u32) -> Move {
        Move::new(
            sequence_number,
            Mover::White,
            "e4".to_string(),
            "e2".to_string(),
            "e4".to_string(),
            Position::starting(),
            String::new(),
            TerminalFlags::default(),
            0,
            MoveSource::Provider,
        )
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    /// Fails the first `failures` writes, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Ledger for Flaky {
        async fn create_match(
            &self,
            _starting_position: &Position,
            _participants: &Participants,
        ) -> Result<MatchHandle, LedgerError> {
            Ok(MatchHandle::new("flaky"))
        }

        async fn record_move(&self, _handle: &MatchHandle, _record: &LedgerRecord) -> Result<(), LedgerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(LedgerError::WriteFailed {
                    reason: format!("attempt {}", call + 1),
                })
            } else {
                Ok(())
            }
        }
    }

    fn record(sequence_number: u32) -> LedgerRecord {
        serde_json::from_value(serde_json::json!({
            "sequence_number": sequence_number,
            "mover": "white",
            "notation": "e4",
            "from_square": "e2",
            "to_square": "e4",
            "resulting_position": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
            "rationale": "",
            "is_check": false,
            "is_checkmate": false,
            "is_stalemate": false,
            "is_draw": false,
            "evaluation_score": 0,
            "source": "provider"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let ledger = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let outcome = write_with_retry(
            ledger.clone(),
            MatchHandle::new("flaky"),
            record(1),
            RetryPolicy::new(3, Duration::from_millis(1)),
        )
        .await;
        assert_eq!(
            outcome,
            LedgerOutcome::Recorded {
                sequence_number: 1,
                attempts: 3
            }
        );
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let ledger = Arc::new(Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let outcome = write_with_retry(
            ledger.clone(),
            MatchHandle::new("flaky"),
            record(7),
            RetryPolicy::new(2, Duration::from_millis(1)),
        )
        .await;
        assert!(matches!(
            outcome,
            LedgerOutcome::Failed {
                sequence_number: 7,
                attempts: 2,
                ..
            }
        ));
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 2);
    }

    /// Sleeps before every write.
    struct Slow {
        delay: Duration,
        writes: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Ledger for Slow {
        async fn create_match(
            &self,
            _starting_position: &Position,
            _participants: &Participants,
        ) -> Result<MatchHandle, LedgerError> {
            Ok(MatchHandle::new("slow"))
        }

        async fn record_move(&self, _handle: &MatchHandle, _record: &LedgerRecord) -> Result<(), LedgerError> {
            tokio::time::sleep(self.delay).await;
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_skipped_moves_are_not_logged_per_move() {
        let (events, subscriber) = counting_subscriber();
        let mut writer = LedgerWriter::disabled();
        tracing::subscriber::with_default(subscriber, || {
            for n in 1..=3 {
                writer.record(&sample_move(n));
            }
        });
        assert_eq!(events.load(Ordering::SeqCst), 0);

        let outcomes = writer.drain().await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| matches!(o, LedgerOutcome::Skipped { .. })));
    }

    #[test]
    fn test_failed_write_is_reported() {
        let (events, subscriber) = counting_subscriber();
        let outcome = LedgerOutcome::Failed {
            sequence_number: 4,
            attempts: 3,
            error: LedgerError::WriteFailed {
                reason: "disk full".to_string(),
            },
        };
        tracing::subscriber::with_default(subscriber, || {
            report(&outcome, &MatchHandle::new("m-1"));
        });
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_writer_still_delivers() {
        let ledger = Arc::new(Slow {
            delay: Duration::from_millis(20),
            writes: AtomicU32::new(0),
        });
        let mut writer = LedgerWriter::open(
            ledger.clone(),
            &Position::starting(),
            &Participants::new("a".to_string(), "b".to_string()),
            RetryPolicy::once(),
        )
        .await;
        writer.record(&sample_move(1));
        assert_eq!(writer.in_flight(), 1);
        drop(writer);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ledger.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drain_collects_detached_writes() {
        let ledger = Arc::new(Slow {
            delay: Duration::from_millis(5),
            writes: AtomicU32::new(0),
        });
        let mut writer = LedgerWriter::open(
            ledger.clone(),
            &Position::starting(),
            &Participants::new("a".to_string(), "b".to_string()),
            RetryPolicy::once(),
        )
        .await;
        writer.record(&sample_move(2));
        writer.record(&sample_move(1));

        let outcomes = writer.drain().await;
        let sequence: Vec<u32> = outcomes.iter().map(LedgerOutcome::sequence_number).collect();
        assert_eq!(sequence, vec![1, 2]);
        assert!(outcomes.iter().all(LedgerOutcome::is_recorded));
        assert_eq!(writer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_disabled_writer_finishes_quietly() {
        let writer = LedgerWriter::disabled();
        assert!(writer.handle().is_none());
        assert_eq!(writer.in_flight(), 0);
        writer
            .finish(&MatchOutcome::new(None, crate::orchestrator::EndReason::PlyLimit))
            .await;
    }
}
