use futures::FutureExt;
use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore, watch},
    time::Instant,
};
use typed_builder::TypedBuilder;

use super::{Budget, DeadlinePolicy, Phase, RunResult, deadline::Deadline};
use crate::{
    connection::{Connection, ConnectionPool, PooledConnection},
    error::Error,
};

/// Issues calls as fast as a concurrency budget allows, for a fixed duration,
/// then drains every outstanding call before reporting.
///
/// See the [module documentation](super) for the algorithm.
///
/// # Example
/// ```rust,no_run
/// use std::time::Duration;
/// use saturate::{
///     BoundedDispatcher, ConnectionPool,
///     connection::line::{LineConnector, Procedure},
///     dispatcher::Budget,
/// };
///
/// # async fn demo() -> Result<(), saturate::Error> {
/// let pool = ConnectionPool::connect(&LineConnector, "localhost:8000", 10).await?;
/// let result = BoundedDispatcher::builder()
///     .budget(Budget::Bounded(5000))
///     .duration(Duration::from_secs(2))
///     .build()
///     .run(&pool, Procedure::Nothing)
///     .await?;
/// println!("{} calls, {:.0}/sec", result.admitted, result.throughput());
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder)]
pub struct BoundedDispatcher {
    /// Maximum number of calls in flight.
    pub budget: Budget,
    /// How long admission runs.
    #[builder(default = Duration::from_secs(2))]
    pub duration: Duration,
    /// How the end of admission is detected.
    #[builder(default)]
    pub deadline: DeadlinePolicy,
    #[builder(default = watch::channel(Phase::Idle).0, setter(skip))]
    phases: watch::Sender<Phase>,
}

impl BoundedDispatcher {
    /// Observe the phase of the current (or last) run.
    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.phases.subscribe()
    }

    /// Run the pipeline against `pool`, sending `request` on every call.
    ///
    /// Fails with [`crate::ConfigError::ZeroBudget`] before any call is made if
    /// the budget is zero. Call failures never fail the run.
    pub async fn run<C>(&self, pool: &ConnectionPool<C>, request: C::Request) -> Result<RunResult, Error>
    where
        C: Connection,
    {
        self.phases.send_replace(Phase::Idle);
        let capacity = self.budget.capacity()?;
        let budget = Arc::new(Semaphore::new(capacity as usize));
        let tally = Arc::new(Tally::default());
        let request = Arc::new(request);

        tracing::info!(
            "Admitting calls for {:?} across {} connections (budget: {}, deadline: {})...",
            self.duration,
            pool.len(),
            self.budget,
            self.deadline,
        );
        let mut state = RunState::start(&self.phases, self.duration, self.deadline);

        loop {
            if state.deadline.is_expired() {
                break;
            }

            let acquired = tokio::select! {
                biased;
                _ = state.deadline.expired() => break,
                acquired = budget.clone().acquire_owned() => acquired,
            };
            // The budget is never closed, so this only stops admission if that changes.
            let Ok(permit) = acquired else {
                tracing::error!("Concurrency budget closed during admission.");
                break;
            };
            if state.deadline.is_expired() {
                // Acquired while the deadline passed: hand it back unused.
                drop(permit);
                break;
            }

            let token = state.admit();
            spawn_call(
                pool.slot_for(token),
                Arc::clone(&request),
                Arc::clone(&tally),
                permit,
            );

            // Keep a never-blocking budget from starving the call tasks.
            tokio::task::consume_budget().await;
        }

        state.enter(Phase::Draining);
        tracing::info!(
            "Admitted {} calls, waiting for in-flight calls to finish...",
            state.admitted
        );
        match budget.acquire_many(capacity).await {
            Ok(all) => drop(all),
            Err(e) => tracing::error!("Drain aborted: {e}"),
        }
        let elapsed = state.started_at.elapsed();
        state.enter(Phase::Done);

        // The drain synchronizes with every call task through the budget.
        let result = RunResult {
            admitted: state.admitted,
            succeeded: tally.succeeded.load(Ordering::Relaxed),
            failed: tally.failed.load(Ordering::Relaxed),
            elapsed,
        };
        if result.failed > 0 {
            tracing::warn!("{} of {} calls failed", result.failed, result.admitted);
        }
        tracing::info!("Done: {} calls in {:?}.", result.admitted, result.elapsed);
        Ok(result)
    }
}

/// Coordinator-owned state of one run.
struct RunState<'a> {
    phases: &'a watch::Sender<Phase>,
    phase: Phase,
    started_at: Instant,
    deadline: Deadline,
    admitted: u64,
}

impl<'a> RunState<'a> {
    /// Enter `Admitting`: start the clock and arm the deadline.
    fn start(phases: &'a watch::Sender<Phase>, duration: Duration, policy: DeadlinePolicy) -> Self {
        let started_at = Instant::now();
        // Roughly 30 years, the same cap tokio applies to far-future timers.
        let at = started_at
            .checked_add(duration)
            .unwrap_or_else(|| started_at + Duration::from_secs(86400 * 365 * 30));
        let mut state = Self {
            phases,
            phase: Phase::Idle,
            started_at,
            deadline: policy.arm(at),
            admitted: 0,
        };
        state.enter(Phase::Admitting);
        state
    }

    fn enter(&mut self, next: Phase) {
        debug_assert_eq!(self.phase.next(), Some(next), "phase skipped");
        tracing::debug!("Dispatcher phase: {:?} -> {:?}", self.phase, next);
        self.phase = next;
        self.phases.send_replace(next);
    }

    /// Count one admission and return its token.
    fn admit(&mut self) -> u64 {
        let token = self.admitted;
        self.admitted += 1;
        token
    }
}

/// Call outcomes, written by the call tasks only.
#[derive(Debug, Default)]
struct Tally {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Perform one call on its own task. The permit is released when the task
/// ends, whatever the outcome.
fn spawn_call<C>(
    slot: PooledConnection<C>,
    request: Arc<C::Request>,
    tally: Arc<Tally>,
    permit: OwnedSemaphorePermit,
) where
    C: Connection,
{
    tokio::spawn(async move {
        let _permit = permit;
        match AssertUnwindSafe(slot.call(&request)).catch_unwind().await {
            Ok(Ok(_)) => {
                tally.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                tracing::trace!("Call on connection {} failed: {e}", slot.index());
                tally.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                tracing::warn!("Call on connection {} panicked", slot.index());
                tally.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    });
}
