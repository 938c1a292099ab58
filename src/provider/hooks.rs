//! Interaction hooks the provider calls back into during an attempt.
//!
//! The intent hook confirms fee-incurring steps; a denial unwinds the whole
//! attempt. The allowance hook authorizes token spend.

use alloy_primitives::U256;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fee estimate for an intent, in USDC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeEstimate {
    pub total: String,
    pub gas: String,
    pub protocol: String,
}

/// What the provider is about to do, shown to the user for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub token: String,
    pub amount: String,
    pub destination_chain_id: u64,
    pub source_chain_ids: Vec<u64>,
    pub fees: FeeEstimate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentDecision {
    Allow,
    Deny,
}

/// Confirmation hook, invoked before any fee-incurring step.
#[async_trait]
pub trait IntentHook: Send + Sync {
    async fn confirm(&self, intent: &Intent) -> IntentDecision;

    /// Optional name for debugging/logging.
    fn name(&self) -> &'static str {
        "unnamed_hook"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceSource {
    pub chain_id: u64,
    pub token: String,
    pub current: String,
    pub required: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceRequest {
    pub sources: Vec<AllowanceSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowanceChoice {
    Min,
    Max,
    Exact(U256),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowanceDecision {
    /// One choice per requested source, in order.
    Grant(Vec<AllowanceChoice>),
    Deny,
}

/// Allowance hook, invoked when the provider needs spend authorization.
#[async_trait]
pub trait AllowanceHook: Send + Sync {
    async fn authorize(&self, request: &AllowanceRequest) -> AllowanceDecision;
}

/// Hooks registered with a provider connection.
#[derive(Clone)]
pub struct ProviderHooks {
    pub intent: Arc<dyn IntentHook>,
    pub allowance: Arc<dyn AllowanceHook>,
}

impl ProviderHooks {
    /// Hooks with the session allowance policy: grant the minimum required.
    pub fn new(intent: Arc<dyn IntentHook>) -> Self {
        Self {
            intent,
            allowance: Arc::new(MinimumAllowance),
        }
    }
}

/// Approves every intent (CLI `--yes`).
pub struct AutoConfirm;

#[async_trait]
impl IntentHook for AutoConfirm {
    async fn confirm(&self, _intent: &Intent) -> IntentDecision {
        IntentDecision::Allow
    }

    fn name(&self) -> &'static str {
        "auto_confirm"
    }
}

/// Denies intents whose total fee exceeds a ceiling, or cannot be read.
pub struct FeeCeiling {
    max_fee: f64,
}

impl FeeCeiling {
    #[must_use]
    pub fn new(max_fee: f64) -> Self {
        Self { max_fee }
    }
}

#[async_trait]
impl IntentHook for FeeCeiling {
    async fn confirm(&self, intent: &Intent) -> IntentDecision {
        match intent.fees.total.trim().parse::<f64>() {
            Ok(fee) if fee.is_finite() && fee <= self.max_fee => IntentDecision::Allow,
            Ok(fee) => {
                warn!(fee, max = self.max_fee, "Intent fee above ceiling");
                IntentDecision::Deny
            }
            Err(_) => {
                warn!(fee = %intent.fees.total, "Unreadable intent fee");
                IntentDecision::Deny
            }
        }
    }

    fn name(&self) -> &'static str {
        "fee_ceiling"
    }
}

/// Runs intent hooks in order; every hook must allow, the first denial wins.
#[derive(Default)]
pub struct ConfirmChain {
    hooks: Vec<Arc<dyn IntentHook>>,
}

impl ConfirmChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, hook: Arc<dyn IntentHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[async_trait]
impl IntentHook for ConfirmChain {
    async fn confirm(&self, intent: &Intent) -> IntentDecision {
        for hook in &self.hooks {
            if hook.confirm(intent).await == IntentDecision::Deny {
                debug!(hook = hook.name(), "Intent denied");
                return IntentDecision::Deny;
            }
        }
        // An empty chain has nobody to say yes.
        if self.hooks.is_empty() {
            IntentDecision::Deny
        } else {
            IntentDecision::Allow
        }
    }

    fn name(&self) -> &'static str {
        "confirm_chain"
    }
}

/// Session allowance policy: grant the minimum required for every source.
pub struct MinimumAllowance;

#[async_trait]
impl AllowanceHook for MinimumAllowance {
    async fn authorize(&self, request: &AllowanceRequest) -> AllowanceDecision {
        AllowanceDecision::Grant(vec![AllowanceChoice::Min; request.sources.len()])
    }
}
