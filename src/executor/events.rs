use super::ExecutionResult;
use crate::provider::ProgressStep;
use crate::strategy::StrategyKind;

/// Progress notifications for an execution observer.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    Started {
        strategy: String,
        kind: StrategyKind,
    },
    StepsExpected(Vec<ProgressStep>),
    /// Step at `ordinal` of `total` is now current.
    StepCompleted {
        ordinal: usize,
        total: usize,
        step: ProgressStep,
    },
    Settled(ExecutionResult),
    /// Balances refreshed after settlement: number of assets.
    BalancesRefreshed(usize),
    BalanceRefreshFailed(String),
}
