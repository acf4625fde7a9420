//! Run-wide gate for remote calls: rate-limit suspension, cancellation and
//! fatal abort.

use chrono::{DateTime, Utc};
use mockable::Clock;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::sync::{
    config::RateLimitPolicy,
    domain::{FailureReason, HaltReason},
    ports::RemoteError,
};

/// Failure of a call issued through [`RunControl::call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The remote rejected the call.
    Remote(RemoteError),
    /// The run halted before the call could be issued.
    Halted(HaltReason),
}

impl From<CallError> for FailureReason {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Remote(remote) => remote.into(),
            CallError::Halted(reason) => Self::Interrupted(reason),
        }
    }
}

/// Shared state gating every remote call of one run.
///
/// Workers share a single suspension deadline, so one rate-limit response
/// pauses all of them. Calls already in flight are allowed to finish.
pub struct RunControl<C>
where
    C: Clock + Send + Sync,
{
    clock: Arc<C>,
    policy: RateLimitPolicy,
    cancellation: CancellationToken,
    halt: CancellationToken,
    aborted: AtomicBool,
    suspended_until: Mutex<Option<DateTime<Utc>>>,
}

impl<C> RunControl<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a control observing the caller's cancellation token.
    #[must_use]
    pub fn new(clock: Arc<C>, policy: RateLimitPolicy, cancellation: CancellationToken) -> Self {
        let halt = cancellation.child_token();
        Self {
            clock,
            policy,
            cancellation,
            halt,
            aborted: AtomicBool::new(false),
            suspended_until: Mutex::new(None),
        }
    }

    /// Returns why the run stopped issuing calls, if it did.
    #[must_use]
    pub fn halt_reason(&self) -> Option<HaltReason> {
        if self.aborted.load(Ordering::Acquire) {
            Some(HaltReason::RunAborted)
        } else if self.cancellation.is_cancelled() {
            Some(HaltReason::Cancelled)
        } else {
            None
        }
    }

    /// Aborts the run after a fatal failure.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.halt.cancel();
    }

    /// Returns the active suspension deadline.
    pub async fn suspended_until(&self) -> Option<DateTime<Utc>> {
        *self.suspended_until.lock().await
    }

    /// Issues one remote call under the run's policies.
    ///
    /// The call is refused once the run is halted and delayed while a
    /// rate-limit suspension is active. A `RateLimited` response extends
    /// the shared suspension and the same call is reissued after it, up to
    /// [`RateLimitPolicy::max_suspensions`] times. An `Auth` response
    /// aborts the run.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Halted`] when the run is cancelled or aborted
    /// before the call is issued, and [`CallError::Remote`] for any other
    /// remote failure.
    pub async fn call<T, F, Fut>(&self, mut operation: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, RemoteError>> + Send,
        T: Send,
    {
        let mut suspensions = 0_u32;
        loop {
            self.ensure_running()?;
            self.wait_for_resume().await?;
            self.ensure_running()?;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(RemoteError::RateLimited { reset_at }) => {
                    suspensions = suspensions.saturating_add(1);
                    if suspensions > self.policy.max_suspensions {
                        return Err(CallError::Remote(RemoteError::rate_limited(reset_at)));
                    }
                    self.suspend(reset_at).await;
                }
                Err(err) => {
                    if err.is_fatal() {
                        warn!(error = %err, "fatal remote failure, aborting run");
                        self.abort();
                    }
                    return Err(CallError::Remote(err));
                }
            }
        }
    }

    fn ensure_running(&self) -> Result<(), CallError> {
        self.halt_reason().map_or(Ok(()), |reason| Err(CallError::Halted(reason)))
    }

    async fn suspend(&self, reset_at: DateTime<Utc>) {
        let mut deadline = self.suspended_until.lock().await;
        let extended = deadline.map_or(reset_at, |current| current.max(reset_at));
        if *deadline != Some(extended) {
            warn!(reset_at = %extended, "rate limited, suspending remote calls");
        }
        *deadline = Some(extended);
    }

    /// Sleeps until the shared suspension ends or the run halts.
    ///
    /// A single wait never exceeds [`RateLimitPolicy::max_wait`].
    async fn wait_for_resume(&self) -> Result<(), CallError> {
        loop {
            let Some(deadline) = self.suspended_until().await else {
                return Ok(());
            };
            let remaining = (deadline - self.clock.utc())
                .to_std()
                .unwrap_or_default()
                .min(self.policy.max_wait());

            tokio::select! {
                () = self.halt.cancelled() => {
                    return Err(CallError::Halted(
                        self.halt_reason().unwrap_or(HaltReason::Cancelled),
                    ));
                }
                () = tokio::time::sleep(remaining) => {}
            }

            let mut current = self.suspended_until.lock().await;
            if *current == Some(deadline) {
                *current = None;
                return Ok(());
            }
        }
    }
}
