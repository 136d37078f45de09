//! Reconciliation poller.
//!
//! Unique responsibility: drive a remote resource from a submitted mutation to a
//! terminal observed state, re-fetching it at a fixed interval.
//!
//! The poller owns no state beyond its attempt counter and start instant. It
//! never persists anything; the caller maps the final snapshot into state.
//!
//! Two modes:
//! - `poll_until_settled`: wait for a success or failure status.
//! - `poll_until_deleted`: wait for the resource to disappear (a not-found
//!   fetch error is the success signal).
//!
//! Every wait is bounded by `PollPolicy::timeout`.

use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::time::Instant;

/// Default interval between two fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default upper bound for a whole poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Classification of a remote status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Not settled yet, fetch again.
    Pending,
    /// Terminal, the mutation succeeded.
    Success,
    /// Terminal, the mutation failed.
    Failure,
}

/// A snapshot of a remote resource carrying a status field.
pub trait Observed {
    /// Raw status value as reported by the remote system.
    fn status(&self) -> &str;
}

/// Fetch errors the poller needs to tell apart.
pub trait FetchError {
    /// Whether the error means the resource does not exist.
    fn is_not_found(&self) -> bool;
}

/// Timing of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed suspension between two fetches.
    pub interval: Duration,
    /// Maximum time spent polling before giving up.
    pub timeout: Duration,
    /// Suspension before the first fetch.
    pub initial_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT)
    }
}

impl PollPolicy {
    /// Create a policy with no initial delay.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            initial_delay: Duration::ZERO,
        }
    }

    /// Wait `delay` before the first fetch.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

/// Terminal outcome of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T, E> {
    /// The resource reached a success status; carries the last snapshot.
    Succeeded(T),
    /// The resource is gone (delete confirmation only).
    Deleted,
    /// The resource reached a failure status.
    Failed {
        /// Reported reason.
        reason: String,
        /// Snapshot carrying the failure status.
        last: T,
    },
    /// The timeout elapsed before a terminal status was observed.
    TimedOut {
        /// Number of fetches performed.
        attempts: u32,
        /// Last pending snapshot, if any fetch returned one.
        last: Option<T>,
    },
    /// A fetch failed; polling stopped right away.
    TransportError(E),
}

/// Error view of the non-success outcomes.
#[derive(Debug, Error)]
pub enum PollError<E> {
    /// The resource reached a failure status.
    #[error("remote resource reported failure: {reason}")]
    Failed {
        /// Reported reason.
        reason: String,
    },
    /// The timeout elapsed.
    #[error("gave up waiting after {attempts} attempts ({timeout:?})")]
    TimedOut {
        /// Number of fetches performed.
        attempts: u32,
        /// Configured timeout.
        timeout: Duration,
    },
    /// A fetch failed.
    #[error("{0}")]
    Transport(E),
}

impl<T, E> PollOutcome<T, E> {
    /// Whether the outcome is `Succeeded` or `Deleted`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Deleted)
    }

    /// Convert into a `Result`: `Some(snapshot)` on success, `None` when deleted.
    ///
    /// # Errors
    ///
    /// Returns a `PollError` for failed, timed-out and transport outcomes.
    pub fn into_result(self, policy: &PollPolicy) -> Result<Option<T>, PollError<E>> {
        match self {
            Self::Succeeded(snapshot) => Ok(Some(snapshot)),
            Self::Deleted => Ok(None),
            Self::Failed { reason, .. } => Err(PollError::Failed { reason }),
            Self::TimedOut { attempts, .. } => Err(PollError::TimedOut {
                attempts,
                timeout: policy.timeout,
            }),
            Self::TransportError(e) => Err(PollError::Transport(e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Settle,
    ConfirmDeletion,
}

/// Fetch until `classify` reports a terminal status.
///
/// Sequence per attempt: fetch, classify, then sleep `policy.interval` if still
/// pending. A fetch error ends the poll immediately with `TransportError`.
pub async fn poll_until_settled<T, E, F, Fut, C>(
    policy: &PollPolicy,
    fetch: F,
    classify: C,
) -> PollOutcome<T, E>
where
    T: Observed,
    E: FetchError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&str) -> StatusClass,
{
    run(policy, Mode::Settle, fetch, classify).await
}

/// Fetch until the resource is gone.
///
/// A not-found fetch error yields `Deleted`. Any snapshot, `FAILED` included,
/// means the resource still exists; `classify` only feeds the attempt log.
pub async fn poll_until_deleted<T, E, F, Fut, C>(
    policy: &PollPolicy,
    fetch: F,
    classify: C,
) -> PollOutcome<T, E>
where
    T: Observed,
    E: FetchError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&str) -> StatusClass,
{
    run(policy, Mode::ConfirmDeletion, fetch, classify).await
}

async fn run<T, E, F, Fut, C>(
    policy: &PollPolicy,
    mode: Mode,
    mut fetch: F,
    classify: C,
) -> PollOutcome<T, E>
where
    T: Observed,
    E: FetchError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&str) -> StatusClass,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;
    let mut last: Option<T>;

    if !policy.initial_delay.is_zero() {
        tokio::time::sleep(policy.initial_delay).await;
    }

    loop {
        attempts = attempts.saturating_add(1);

        let snapshot = match fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) if mode == Mode::ConfirmDeletion && e.is_not_found() => {
                tracing::info!(attempts, "resource is gone");
                return PollOutcome::Deleted;
            }
            Err(e) => {
                tracing::warn!(attempts, error = %e, "fetch failed, abandoning poll");
                return PollOutcome::TransportError(e);
            }
        };

        let observed = classify(snapshot.status());
        tracing::debug!(attempts, status = snapshot.status(), ?observed, "poll attempt");

        // Any snapshot, whatever its status, means the resource still exists.
        let class = match mode {
            Mode::Settle => observed,
            Mode::ConfirmDeletion => StatusClass::Pending,
        };

        match class {
            StatusClass::Success => {
                tracing::info!(attempts, status = snapshot.status(), "resource settled");
                return PollOutcome::Succeeded(snapshot);
            }
            StatusClass::Failure => {
                let reason = format!("status '{}'", snapshot.status());
                tracing::warn!(attempts, %reason, "resource reported failure");
                return PollOutcome::Failed {
                    reason,
                    last: snapshot,
                };
            }
            StatusClass::Pending => last = Some(snapshot),
        }

        if started.elapsed().saturating_add(policy.interval) > policy.timeout {
            tracing::warn!(attempts, timeout = ?policy.timeout, "poll budget exhausted");
            return PollOutcome::TimedOut { attempts, last };
        }

        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::fmt;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Snap(&'static str);

    impl Observed for Snap {
        fn status(&self) -> &str {
            self.0
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        NotFound,
        Boom,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl FetchError for TestError {
        fn is_not_found(&self) -> bool {
            matches!(self, Self::NotFound)
        }
    }

    fn classify(status: &str) -> StatusClass {
        match status {
            "READY" => StatusClass::Success,
            "FAILED" => StatusClass::Failure,
            _ => StatusClass::Pending,
        }
    }

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_secs(10), Duration::from_secs(600))
    }

    /// Scripted fetch: pops responses in order, counts calls.
    struct Script {
        responses: VecDeque<Result<Snap, TestError>>,
        calls: u32,
    }

    impl Script {
        fn new(responses: Vec<Result<Snap, TestError>>) -> Self {
            Self {
                responses: responses.into(),
                calls: 0,
            }
        }

        fn next(&mut self) -> std::future::Ready<Result<Snap, TestError>> {
            self.calls += 1;
            std::future::ready(
                self.responses
                    .pop_front()
                    .unwrap_or(Err(TestError::Boom)),
            )
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pending_pending_ready_succeeds_after_three_fetches() {
        let mut script = Script::new(vec![
            Ok(Snap("PENDING")),
            Ok(Snap("PENDING")),
            Ok(Snap("READY")),
        ]);
        let started = Instant::now();

        let outcome = poll_until_settled(&policy(), || script.next(), classify).await;

        assert_eq!(outcome, PollOutcome::Succeeded(Snap("READY")));
        assert_eq!(script.calls, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_failed_stops_after_two_fetches() {
        let mut script = Script::new(vec![
            Ok(Snap("PENDING")),
            Ok(Snap("FAILED")),
            Ok(Snap("READY")),
        ]);

        let outcome = poll_until_settled(&policy(), || script.next(), classify).await;

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                reason: "status 'FAILED'".to_string(),
                last: Snap("FAILED"),
            }
        );
        assert_eq!(script.calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn immediately_ready_does_not_sleep() {
        let mut script = Script::new(vec![Ok(Snap("READY"))]);
        let started = Instant::now();

        let outcome = poll_until_settled(&policy(), || script.next(), classify).await;

        assert!(outcome.is_success());
        assert_eq!(script.calls, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_stops_immediately() {
        let mut script = Script::new(vec![
            Ok(Snap("PENDING")),
            Err(TestError::Boom),
            Ok(Snap("READY")),
        ]);

        let outcome = poll_until_settled(&policy(), || script.next(), classify).await;

        assert_eq!(outcome, PollOutcome::TransportError(TestError::Boom));
        assert_eq!(script.calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_while_settling_is_a_transport_error() {
        let mut script = Script::new(vec![Err(TestError::NotFound)]);

        let outcome = poll_until_settled(&policy(), || script.next(), classify).await;

        assert_eq!(outcome, PollOutcome::TransportError(TestError::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_confirmation_with_immediate_not_found() {
        let mut script = Script::new(vec![Err(TestError::NotFound), Ok(Snap("READY"))]);
        let policy = policy().with_initial_delay(Duration::from_secs(10));
        let started = Instant::now();

        let outcome = poll_until_deleted(&policy, || script.next(), classify).await;

        assert_eq!(outcome, PollOutcome::Deleted);
        assert_eq!(script.calls, 1);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_confirmation_keeps_polling_while_present() {
        let mut script = Script::new(vec![
            Ok(Snap("READY")),
            Ok(Snap("DELETING")),
            Err(TestError::NotFound),
        ]);

        let outcome = poll_until_deleted(&policy(), || script.next(), classify).await;

        assert_eq!(outcome, PollOutcome::Deleted);
        assert_eq!(script.calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_confirmation_ignores_failed_status() {
        let mut script = Script::new(vec![Ok(Snap("FAILED")), Err(TestError::NotFound)]);
        let started = Instant::now();

        let outcome = poll_until_deleted(&policy(), || script.next(), classify).await;

        assert_eq!(outcome, PollOutcome::Deleted);
        assert_eq!(script.calls, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_confirmation_other_error_is_transport() {
        let mut script = Script::new(vec![Ok(Snap("DELETING")), Err(TestError::Boom)]);

        let outcome = poll_until_deleted(&policy(), || script.next(), classify).await;

        assert_eq!(outcome, PollOutcome::TransportError(TestError::Boom));
        assert_eq!(script.calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_times_out() {
        let mut script = Script::new(vec![Ok(Snap("PENDING")); 10]);
        let policy = PollPolicy::new(Duration::from_secs(10), Duration::from_secs(25));

        let outcome = poll_until_settled(&policy, || script.next(), classify).await;

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                attempts: 3,
                last: Some(Snap("PENDING")),
            }
        );
        assert_eq!(script.calls, 3);
    }

    #[test]
    fn into_result_maps_each_outcome() {
        let policy = policy();

        let ok: PollOutcome<Snap, TestError> = PollOutcome::Succeeded(Snap("READY"));
        assert!(matches!(ok.into_result(&policy), Ok(Some(Snap("READY")))));

        let gone: PollOutcome<Snap, TestError> = PollOutcome::Deleted;
        assert!(matches!(gone.into_result(&policy), Ok(None)));

        let timed_out: PollOutcome<Snap, TestError> = PollOutcome::TimedOut {
            attempts: 4,
            last: None,
        };
        let err = timed_out.into_result(&policy).err();
        assert!(matches!(err, Some(PollError::TimedOut { attempts: 4, .. })));
    }
}
