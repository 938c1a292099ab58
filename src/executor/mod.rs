//! Strategy execution.
//!
//! One attempt at a time per session: route the strategy to a provider
//! operation, feed the provider's step events into the progress tracker while
//! the call is pending, then refresh balances whatever the outcome.

mod events;
pub mod plan;

pub use events::ExecutionEvent;
pub use plan::{ProviderCall, Route};

use crate::balance::BalanceCache;
use crate::progress::{ProgressSnapshot, ProgressTracker, ProgressUpdate};
use crate::provider::{self, ProviderEvent, ProviderOutcome};
use crate::session::{Connection, ProviderSession};
use crate::strategy::Strategy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Conditions that prevent an attempt from starting.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Provider not initialized or wallet address unknown")]
    NotReady,

    #[error("Another execution is already in progress")]
    Busy,

    #[error("Unknown chain '{0}'")]
    UnknownChain(String),

    #[error("Unknown token '{0}'")]
    UnknownToken(String),

    #[error("Invalid amount {0}")]
    InvalidAmount(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The fee confirmation was denied.
    UserDenied,
    /// The provider call returned an error.
    Provider,
    /// The provider answered without success.
    Rejected,
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        explorer_url: Option<String>,
    },
    Failure {
        error: String,
        kind: FailureKind,
    },
}

impl ExecutionResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    #[must_use]
    pub fn explorer_url(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success { explorer_url } => explorer_url.as_deref(),
            ExecutionResult::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::Failure { error, .. } => Some(error),
        }
    }

    #[must_use]
    pub fn is_user_denial(&self) -> bool {
        matches!(
            self,
            ExecutionResult::Failure {
                kind: FailureKind::UserDenied,
                ..
            }
        )
    }

    fn from_outcome(
        outcome: Result<ProviderOutcome, provider::Error>,
        fallback_url: Option<String>,
    ) -> Self {
        match outcome {
            Ok(o) if o.success => ExecutionResult::Success {
                explorer_url: o.explorer_url.or(fallback_url),
            },
            Ok(o) => ExecutionResult::Failure {
                error: o
                    .error
                    .unwrap_or_else(|| "Provider reported failure".to_string()),
                kind: FailureKind::Rejected,
            },
            Err(e) => ExecutionResult::Failure {
                kind: if e.is_user_denial() {
                    FailureKind::UserDenied
                } else {
                    FailureKind::Provider
                },
                error: e.to_string(),
            },
        }
    }
}

/// Clears the busy flag when the attempt ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct StrategyExecutor {
    session: Arc<ProviderSession>,
    balances: Arc<BalanceCache>,
    progress: Mutex<ProgressTracker>,
    busy: AtomicBool,
    events: Option<mpsc::Sender<ExecutionEvent>>,
}

impl StrategyExecutor {
    pub fn new(session: Arc<ProviderSession>, balances: Arc<BalanceCache>) -> Self {
        Self {
            session,
            balances,
            progress: Mutex::new(ProgressTracker::new()),
            busy: AtomicBool::new(false),
            events: None,
        }
    }

    /// Send progress notifications to `tx`.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<ExecutionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.tracker().snapshot()
    }

    fn tracker(&self) -> MutexGuard<'_, ProgressTracker> {
        match self.progress.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("Progress lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Never waits on the observer: the attempt holds the session read lock.
    fn emit(&self, event: ExecutionEvent) {
        if let Some(tx) = &self.events
            && let Err(e) = tx.try_send(event)
        {
            debug!("Dropped execution event: {e}");
        }
    }

    /// Execute `strategy` with its recommended amount.
    pub async fn execute(&self, strategy: &Strategy) -> Result<ExecutionResult, ExecuteError> {
        self.execute_with_amount(strategy, strategy.recommended_amount())
            .await
    }

    /// Execute `strategy` moving `amount` of its token.
    ///
    /// Provider failures and denials come back as
    /// [`ExecutionResult::Failure`]; `Err` means no attempt was started.
    pub async fn execute_with_amount(
        &self,
        strategy: &Strategy,
        amount: f64,
    ) -> Result<ExecutionResult, ExecuteError> {
        // Rejects amounts that round to zero base units before anything starts.
        let call = plan::plan(strategy, amount)?;
        let _busy = BusyGuard::acquire(&self.busy).ok_or(ExecuteError::Busy)?;

        let result = {
            let guard = self.session.connection().await;
            let connection = guard
                .as_ref()
                .filter(|c| c.wallet().address.is_some())
                .ok_or(ExecuteError::NotReady)?;

            info!(
                strategy = strategy.id(),
                connection = %connection.id(),
                operation = call.operation(),
                "Execution attempt started"
            );
            self.tracker().begin();
            self.emit(ExecutionEvent::Started {
                strategy: strategy.id().to_string(),
                kind: strategy.kind(),
            });

            self.run(connection, call).await
        };

        self.tracker().close();
        match &result {
            ExecutionResult::Success { explorer_url } => {
                info!(strategy = strategy.id(), explorer = ?explorer_url, "Execution succeeded");
            }
            ExecutionResult::Failure { error, kind } => {
                warn!(strategy = strategy.id(), ?kind, "Execution failed: {error}");
            }
        }
        self.emit(ExecutionEvent::Settled(result.clone()));

        match self.balances.refresh(&self.session).await {
            Ok(count) => self.emit(ExecutionEvent::BalancesRefreshed(count)),
            Err(e) => {
                warn!("Balance refresh after execution failed: {e}");
                self.emit(ExecutionEvent::BalanceRefreshFailed(e.to_string()));
            }
        }
        Ok(result)
    }

    async fn run(&self, connection: &Connection, call: ProviderCall) -> ExecutionResult {
        let mut rx = connection.events().lock().await;
        let mut stale = 0usize;
        while rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale, "Discarded events from an earlier attempt");
        }

        let pending = call.dispatch(connection.provider().as_ref());
        tokio::pin!(pending);
        let outcome = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => self.observe(event),
                outcome = &mut pending => break outcome,
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.observe(event);
        }

        let settlement_url = self
            .tracker()
            .expected()
            .iter()
            .find_map(|s| s.explorer_url().map(str::to_string));
        ExecutionResult::from_outcome(outcome, settlement_url)
    }

    fn observe(&self, event: ProviderEvent) {
        let update = {
            let mut tracker = self.tracker();
            tracker
                .apply(event)
                .map(|update| (update, tracker.expected().len()))
        };
        let event = match update {
            Some((ProgressUpdate::Expected(steps), _)) => ExecutionEvent::StepsExpected(steps),
            Some((ProgressUpdate::Completed { ordinal, step }, total)) => {
                debug!(ordinal, total, step = %step.kind, "Step completed");
                ExecutionEvent::StepCompleted {
                    ordinal,
                    total,
                    step,
                }
            }
            None => return,
        };
        self.emit(event);
    }
}
