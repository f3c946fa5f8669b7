//! # Operation Tracker
//!
//! Drives an already-started server-side activity to completion: poll the
//! latest snapshot, emit human-readable progress, and return a definitive
//! success/failure verdict.
//!
//! Command handlers submit a mutating request (e.g. "restore this backup"),
//! get back an [`Activity`] handle, and call [`wait_and_log`] to wait for the
//! server to finish executing it. The loop alternates between a fetch and a
//! timed sleep; the only correctness criterion for termination is the
//! activity `state` reaching a terminal value. `completion_percent` is
//! advisory and never decides termination (the server may report 100% before
//! committing the terminal state).
//!
//! Transient fetch errors are retried internally with exponential backoff and
//! only escalate to [`TrackerError::Unreachable`] after the retry budget is
//! exhausted. Timeout is a soft deadline checked once per iteration; the loop
//! never aborts an in-flight fetch. An optional cancel channel stops the wait
//! at the next suspension point.

use std::time::{Duration, Instant};

use snafu::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    activity::{Activity, ActivityState},
    error::NimbusError,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_FETCH_MAX_ATTEMPTS: usize = 5;
const DEFAULT_FETCH_INITIAL_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_FETCH_MAX_DELAY: Duration = Duration::from_secs(5);

/// Capability to fetch the latest snapshot of an activity by identifier.
///
/// Implemented by [`EnvironmentHandle`](crate::environment::EnvironmentHandle);
/// tests plug in scripted sources.
pub trait ActivitySource {
    async fn fetch(&self, id: &str) -> Result<Activity, NimbusError>;
}

/// Sink for progress text. Append-only, side-effect only.
pub trait ProgressReporter {
    fn report(&self, text: &str);
}

/// Cancellation token for [`wait_and_log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCancel {
    Requested,
}

/// Retry policy for transient fetch failures while polling.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum fetch attempts per poll (0 disables the cap).
    pub max_attempts: usize,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_FETCH_MAX_ATTEMPTS,
            initial_delay: DEFAULT_FETCH_INITIAL_DELAY,
            max_delay: DEFAULT_FETCH_MAX_DELAY,
        }
    }
}

/// Options for [`wait_and_log`].
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    /// Time between status polls.
    pub poll_interval: Duration,
    /// Soft deadline for the whole wait. None means unbounded.
    pub timeout: Option<Duration>,
    /// Return immediately without polling.
    pub no_wait: bool,
    /// Retry policy for transient fetch failures.
    pub fetch_retry: RetryConfig,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            no_wait: false,
            fetch_retry: RetryConfig::default(),
        }
    }
}

impl TrackerOptions {
    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn no_wait(mut self, no_wait: bool) -> Self {
        self.no_wait = no_wait;
        self
    }

    #[must_use]
    pub fn fetch_retry(mut self, fetch_retry: RetryConfig) -> Self {
        self.fetch_retry = fetch_retry;
        self
    }
}

/// Verdict returned by [`wait_and_log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The activity reached `complete`.
    Success,
    /// The activity reached `failure`.
    Failed,
    /// `no_wait` was set; completion was not observed. Callers treat this as
    /// "not confirmed, proceed optimistically".
    Skipped,
}

impl WaitOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Errors from the tracker itself, distinct from the tracked operation
/// failing. A `failure` terminal state is a normal [`WaitOutcome::Failed`],
/// not an error; these errors mean the tracker could not observe the
/// operation to completion.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TrackerError {
    /// The soft deadline elapsed before a terminal state was observed.
    /// The last-known state is preserved for diagnostics.
    #[snafu(display("timed out after {}s waiting for activity {id} (last state: {last_state})", waited.as_secs()))]
    Timeout {
        id: String,
        waited: Duration,
        last_state: ActivityState,
    },

    /// The activity vanished (deleted or never existed).
    #[snafu(display("activity {id} not found"))]
    NotFound { id: String },

    /// Transient fetch failures exhausted the retry budget.
    #[snafu(display("could not observe activity {id} after {attempts} attempts: {last_error}"))]
    Unreachable {
        id: String,
        attempts: usize,
        last_error: String,
    },

    /// The wait was canceled by the caller.
    #[snafu(display("wait canceled for activity {id}"))]
    Cancelled { id: String },
}

/// Polls `activity` until it reaches a terminal state, reporting progress to
/// `reporter`, then emits `success_message` or `failure_message` and returns
/// the verdict.
///
/// With `options.no_wait` set, returns [`WaitOutcome::Skipped`] immediately
/// without any fetch. A message on `cancel` stops the wait at the next
/// suspension point (never mid-fetch) with [`TrackerError::Cancelled`].
///
/// ```rust,no_run
/// use nimbus::prelude::*;
/// # struct Stdout;
/// # impl ProgressReporter for Stdout { fn report(&self, text: &str) { println!("{text}"); } }
/// # async fn example(env: EnvironmentHandle, backup: Activity) -> anyhow::Result<()> {
/// let operation = env.restore(&backup).await?;
/// let outcome = wait_and_log(
///     &operation,
///     &env,
///     &Stdout,
///     "The backup was successfully restored",
///     "Restoring failed",
///     &TrackerOptions::default(),
///     None,
/// )
/// .await?;
/// assert!(outcome.is_success());
/// # Ok(())
/// # }
/// ```
pub async fn wait_and_log<S, R>(
    activity: &Activity,
    source: &S,
    reporter: &R,
    success_message: &str,
    failure_message: &str,
    options: &TrackerOptions,
    mut cancel: Option<&mut mpsc::UnboundedReceiver<WaitCancel>>,
) -> Result<WaitOutcome, TrackerError>
where
    S: ActivitySource,
    R: ProgressReporter,
{
    if options.no_wait {
        debug!(id = %activity.id, "no_wait set; skipping poll loop");
        return Ok(WaitOutcome::Skipped);
    }

    let started_at = Instant::now();
    let deadline = options.timeout.map(|timeout| started_at + timeout);
    let mut last_state = activity.state;
    // Some(percent) once a progress line has been emitted; lines are
    // de-duplicated so an unchanged percent is not re-printed every poll
    let mut last_reported: Option<Option<u8>> = None;

    loop {
        // soft deadline, checked at iteration boundaries only
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            warn!(id = %activity.id, ?last_state, "tracker deadline elapsed");
            return Err(TrackerError::Timeout {
                id: activity.id.clone(),
                waited: started_at.elapsed(),
                last_state,
            });
        }

        // the snapshot replaces the previous one; nothing mutates in place
        let snapshot = fetch_with_retry(source, &activity.id, &options.fetch_retry).await?;
        last_state = snapshot.state;

        match snapshot.state {
            ActivityState::Complete => {
                reporter.report(success_message);
                return Ok(WaitOutcome::Success);
            }
            ActivityState::Failure => {
                reporter.report(failure_message);
                return Ok(WaitOutcome::Failed);
            }
            ActivityState::Pending | ActivityState::InProgress => {
                if last_reported != Some(snapshot.completion_percent) {
                    last_reported = Some(snapshot.completion_percent);
                    match snapshot.completion_percent {
                        Some(percent) => {
                            reporter.report(&format!("{}: {percent}%", snapshot.kind));
                        }
                        None => reporter.report(&format!("{}: in progress", snapshot.kind)),
                    }
                }
            }
        }

        sleep_or_cancel(&activity.id, options.poll_interval, cancel.as_deref_mut()).await?;
    }
}

/// One poll: fetch the snapshot, retrying transient errors with exponential
/// backoff. Not-found is never retried - a vanished activity will not come
/// back.
async fn fetch_with_retry<S: ActivitySource>(
    source: &S,
    id: &str,
    retry: &RetryConfig,
) -> Result<Activity, TrackerError> {
    let mut attempt = 0usize;
    let mut delay = retry.initial_delay;

    loop {
        attempt += 1;
        match source.fetch(id).await {
            Ok(activity) => return Ok(activity),
            Err(NimbusError::NotFound { .. }) => {
                return Err(TrackerError::NotFound { id: id.to_string() });
            }
            Err(err) => {
                let transient = matches!(
                    err,
                    NimbusError::Http { .. } | NimbusError::TooManyRetries { .. }
                ) || matches!(err, NimbusError::ApiError { code, .. } if code >= 500);

                let exhausted = retry.max_attempts > 0 && attempt >= retry.max_attempts;
                if !transient || exhausted {
                    if transient {
                        warn!(id, attempt, "giving up polling after transient errors");
                    }
                    return Err(TrackerError::Unreachable {
                        id: id.to_string(),
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }

                debug!(id, attempt, %err, "transient fetch error, retrying");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let doubled = delay.mul_f64(2.0);
                delay = if doubled > retry.max_delay {
                    retry.max_delay
                } else {
                    doubled
                };
            }
        }
    }
}

async fn sleep_or_cancel(
    id: &str,
    interval: Duration,
    cancel: Option<&mut mpsc::UnboundedReceiver<WaitCancel>>,
) -> Result<(), TrackerError> {
    let Some(cancel) = cancel else {
        tokio::time::sleep(interval).await;
        return Ok(());
    };
    tokio::select! {
        () = tokio::time::sleep(interval) => Ok(()),
        token = cancel.recv() => {
            // a closed channel means the caller gave up waiting too
            debug!(id, ?token, "wait canceled");
            Err(TrackerError::Cancelled { id: id.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    use super::*;
    use crate::activity::{ACTIVITY_TYPE_RESTORE, ActivityPayload};

    const SUCCESS_MSG: &str = "The backup was successfully restored";
    const FAILURE_MSG: &str = "Restoring failed";

    fn restore_activity(state: ActivityState, percent: Option<u8>) -> Activity {
        Activity {
            id: "act-restore-1".to_string(),
            kind: ACTIVITY_TYPE_RESTORE.to_string(),
            state,
            completion_percent: percent,
            payload: ActivityPayload::default(),
            operations: Vec::new(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    /// Replays a scripted sequence of fetch results; repeats `stuck` forever
    /// once the script is exhausted.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Activity, NimbusError>>>,
        stuck: Option<Activity>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Activity, NimbusError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                stuck: None,
                fetches: AtomicUsize::new(0),
            }
        }

        fn stuck_on(activity: Activity) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                stuck: Some(activity),
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::Relaxed)
        }
    }

    impl ActivitySource for ScriptedSource {
        async fn fetch(&self, _id: &str) -> Result<Activity, NimbusError> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            if let Some(next) = self.script.lock().pop_front() {
                return next;
            }
            match &self.stuck {
                Some(activity) => Ok(activity.clone()),
                None => panic!("scripted source exhausted"),
            }
        }
    }

    #[derive(Default)]
    struct MemReporter(Mutex<Vec<String>>);

    impl MemReporter {
        fn lines(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    impl ProgressReporter for MemReporter {
        fn report(&self, text: &str) {
            self.0.lock().push(text.to_string());
        }
    }

    fn fast_options() -> TrackerOptions {
        TrackerOptions::default()
            .poll_interval(Duration::from_millis(1))
            .fetch_retry(RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            })
    }

    fn server_error() -> NimbusError {
        NimbusError::ApiError {
            code: 503,
            method: "GET".to_string(),
            url: "/environments/main/activities/act-restore-1".to_string(),
            message: "unavailable".to_string(),
        }
    }

    #[test_log::test(tokio::test)]
    async fn no_wait_returns_without_fetching() {
        let source = ScriptedSource::new(Vec::new());
        let reporter = MemReporter::default();
        let outcome = wait_and_log(
            &restore_activity(ActivityState::Pending, None),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options().no_wait(true),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome, WaitOutcome::Skipped);
        assert!(!outcome.is_success());
        assert_eq!(source.fetch_count(), 0);
        assert!(reporter.lines().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn terminates_exactly_at_complete_snapshot() {
        let source = ScriptedSource::new(vec![
            Ok(restore_activity(ActivityState::Pending, None)),
            Ok(restore_activity(ActivityState::InProgress, Some(30))),
            Ok(restore_activity(ActivityState::InProgress, Some(70))),
            Ok(restore_activity(ActivityState::Complete, Some(100))),
        ]);
        let reporter = MemReporter::default();
        let outcome = wait_and_log(
            &restore_activity(ActivityState::Pending, None),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome, WaitOutcome::Success);
        assert!(outcome.is_success());
        assert_eq!(source.fetch_count(), 4);

        let lines = reporter.lines();
        let successes = lines.iter().filter(|line| *line == SUCCESS_MSG).count();
        assert_eq!(successes, 1, "success message emitted exactly once");
        assert!(lines.iter().any(|line| line.contains("30%")));
        assert!(lines.iter().any(|line| line.contains("70%")));
    }

    #[test_log::test(tokio::test)]
    async fn percent_never_decides_termination() {
        // 100% while still in_progress must not end the loop
        let source = ScriptedSource::new(vec![
            Ok(restore_activity(ActivityState::InProgress, Some(100))),
            Ok(restore_activity(ActivityState::Complete, Some(100))),
        ]);
        let reporter = MemReporter::default();
        let outcome = wait_and_log(
            &restore_activity(ActivityState::InProgress, Some(100)),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome, WaitOutcome::Success);
        assert_eq!(source.fetch_count(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn failure_state_reports_failure_message() {
        let source = ScriptedSource::new(vec![
            Ok(restore_activity(ActivityState::Pending, None)),
            Ok(restore_activity(ActivityState::Failure, Some(55))),
        ]);
        let reporter = MemReporter::default();
        let outcome = wait_and_log(
            &restore_activity(ActivityState::Pending, None),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome, WaitOutcome::Failed);
        assert!(!outcome.is_success());
        assert_eq!(reporter.lines().last().map(String::as_str), Some(FAILURE_MSG));
    }

    #[test_log::test(tokio::test)]
    async fn times_out_on_stuck_activity() {
        let source = ScriptedSource::stuck_on(restore_activity(ActivityState::InProgress, Some(42)));
        let reporter = MemReporter::default();
        let timeout = Duration::from_millis(50);
        let started = Instant::now();
        let err = wait_and_log(
            &restore_activity(ActivityState::InProgress, Some(42)),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options()
                .poll_interval(Duration::from_millis(10))
                .timeout(timeout),
            None,
        )
        .await
        .unwrap_err();
        let elapsed = started.elapsed();
        match err {
            TrackerError::Timeout {
                waited, last_state, ..
            } => {
                assert!(waited >= timeout);
                assert_eq!(last_state, ActivityState::InProgress);
            }
            other => panic!("expected Timeout, got {other}"),
        }
        // approximately the configured duration, not a hang
        assert!(elapsed < Duration::from_secs(2));
        assert!(!reporter.lines().contains(&SUCCESS_MSG.to_string()));
    }

    #[test_log::test(tokio::test)]
    async fn vanished_activity_is_not_found() {
        let source = ScriptedSource::new(vec![Err(NimbusError::NotFound {
            obj_type: "Activity".to_string(),
            key: "act-restore-1".to_string(),
        })]);
        let reporter = MemReporter::default();
        let err = wait_and_log(
            &restore_activity(ActivityState::Pending, None),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TrackerError::NotFound { id } if id == "act-restore-1"));
        // not retried: a vanished activity will not come back
        assert_eq!(source.fetch_count(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn transient_errors_are_retried_then_succeed() {
        let source = ScriptedSource::new(vec![
            Err(server_error()),
            Err(server_error()),
            Ok(restore_activity(ActivityState::Complete, Some(100))),
        ]);
        let reporter = MemReporter::default();
        let outcome = wait_and_log(
            &restore_activity(ActivityState::InProgress, Some(90)),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome, WaitOutcome::Success);
        assert_eq!(source.fetch_count(), 3);
    }

    #[test_log::test(tokio::test)]
    async fn retry_budget_exhaustion_is_unreachable() {
        let source = ScriptedSource::new(vec![
            Err(server_error()),
            Err(server_error()),
            Err(server_error()),
        ]);
        let reporter = MemReporter::default();
        let err = wait_and_log(
            &restore_activity(ActivityState::InProgress, Some(10)),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options(),
            None,
        )
        .await
        .unwrap_err();
        match err {
            TrackerError::Unreachable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Unreachable, got {other}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn non_transient_error_is_not_retried() {
        let source = ScriptedSource::new(vec![Err(NimbusError::Forbidden)]);
        let reporter = MemReporter::default();
        let err = wait_and_log(
            &restore_activity(ActivityState::InProgress, Some(10)),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TrackerError::Unreachable { attempts: 1, .. }));
        assert_eq!(source.fetch_count(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn cancel_stops_wait_at_next_suspension_point() {
        let source = ScriptedSource::stuck_on(restore_activity(ActivityState::InProgress, None));
        let reporter = MemReporter::default();
        let (cancel_tx, mut cancel_rx) = mpsc::unbounded_channel();
        cancel_tx.send(WaitCancel::Requested).unwrap();

        let err = wait_and_log(
            &restore_activity(ActivityState::InProgress, None),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options().poll_interval(Duration::from_secs(60)),
            Some(&mut cancel_rx),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TrackerError::Cancelled { .. }));
        // the in-flight fetch completed; cancellation landed at the sleep
        assert_eq!(source.fetch_count(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn progress_lines_are_deduplicated() {
        let source = ScriptedSource::new(vec![
            Ok(restore_activity(ActivityState::InProgress, Some(50))),
            Ok(restore_activity(ActivityState::InProgress, Some(50))),
            Ok(restore_activity(ActivityState::InProgress, Some(50))),
            Ok(restore_activity(ActivityState::Complete, Some(100))),
        ]);
        let reporter = MemReporter::default();
        wait_and_log(
            &restore_activity(ActivityState::InProgress, Some(50)),
            &source,
            &reporter,
            SUCCESS_MSG,
            FAILURE_MSG,
            &fast_options(),
            None,
        )
        .await
        .unwrap();
        let progress = reporter
            .lines()
            .iter()
            .filter(|line| line.contains("50%"))
            .count();
        assert_eq!(progress, 1);
    }
}
