//! In-process execution provider.
//!
//! Mirrors the provider contract closely enough to drive the whole
//! orchestration layer without a network: it announces expected steps,
//! asks the intent and allowance hooks, completes steps in order, and moves
//! simulated balances between chains on success. The knobs on
//! [`SimulationConfig`] let tests script failures, denials and stray events.

use super::hooks::{AllowanceDecision, AllowanceRequest, AllowanceSource, FeeEstimate};
use super::{
    BridgeAndExecuteParams, BridgeParams, ChainBalance, Connector, Error, EventScope, EventSink,
    ExecuteLeg, ExecuteParams, ExecutionProvider, Intent, IntentDecision, Network, ProgressStep,
    ProviderEvent, ProviderHooks, ProviderOutcome, StepKind, UserAsset, WalletHandle,
};
use crate::{chain, token};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

const DEFAULT_FEE: &str = "0.42";
const DEFAULT_EXPLORER: &str = "https://explorer.simulated.local";
/// Simulated balances are kept at display precision.
const DISPLAY_DECIMALS: u8 = 6;

/// Behaviour of simulated provider connections.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub balances: Vec<UserAsset>,
    /// Total fee quoted to the intent hook, in USDC.
    pub fee: String,
    pub explorer_base: String,
    /// Replaces the operation's default step list.
    pub steps: Option<Vec<StepKind>>,
    /// Step completions for types outside the expected list, emitted first.
    pub stray_steps: Vec<StepKind>,
    /// Fail every operation with this error once the intent is confirmed.
    pub fail_with: Option<Error>,
    /// Answer every operation with `success = false` and this message.
    pub reject_with: Option<String>,
    pub fail_initialize: bool,
    /// Delay between step completions.
    pub step_delay: Duration,
    /// Hold each operation open until notified.
    pub gate: Option<Arc<Notify>>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            balances: default_balances(),
            fee: DEFAULT_FEE.to_string(),
            explorer_base: DEFAULT_EXPLORER.to_string(),
            steps: None,
            stray_steps: Vec::new(),
            fail_with: None,
            reject_with: None,
            fail_initialize: false,
            step_delay: Duration::ZERO,
            gate: None,
        }
    }
}

impl SimulationConfig {
    #[must_use]
    pub fn with_balances(mut self, balances: Vec<UserAsset>) -> Self {
        self.balances = balances;
        self
    }

    #[must_use]
    pub fn with_fee(mut self, fee: impl Into<String>) -> Self {
        self.fee = fee.into();
        self
    }

    #[must_use]
    pub fn with_steps(mut self, steps: Vec<StepKind>) -> Self {
        self.steps = Some(steps);
        self
    }

    #[must_use]
    pub fn with_stray_step(mut self, kind: StepKind) -> Self {
        self.stray_steps.push(kind);
        self
    }

    #[must_use]
    pub fn with_failure(mut self, error: Error) -> Self {
        self.fail_with = Some(error);
        self
    }

    #[must_use]
    pub fn with_rejection(mut self, message: impl Into<String>) -> Self {
        self.reject_with = Some(message.into());
        self
    }

    #[must_use]
    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

fn slice(chain_id: u64, balance: f64, price: f64) -> ChainBalance {
    ChainBalance {
        chain_id,
        chain_name: chain::display_name(chain_id),
        balance: token::format_amount(balance, DISPLAY_DECIMALS),
        balance_in_fiat: Some(round_cents(balance * price)),
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Demo portfolio used when no balances are configured.
#[must_use]
pub fn default_balances() -> Vec<UserAsset> {
    let asset = |symbol: &str, price: f64, parts: &[(u64, f64)]| {
        let breakdown: Vec<ChainBalance> =
            parts.iter().map(|&(id, b)| slice(id, b, price)).collect();
        let total: f64 = parts.iter().map(|&(_, b)| b).sum();
        UserAsset {
            symbol: symbol.to_string(),
            balance: token::format_amount(total, DISPLAY_DECIMALS),
            balance_in_fiat: Some(round_cents(total * price)),
            breakdown,
        }
    };
    vec![
        asset("ETH", 3017.83, &[(1, 1.2), (8453, 0.6)]),
        asset("USDC", 1.0, &[(42161, 1500.0), (10, 900.0), (137, 810.45)]),
        asset("ARB", 0.82, &[(42161, 1204.05)]),
        asset("OP", 1.74, &[(10, 376.05)]),
    ]
}

#[derive(Default)]
struct State {
    wallet: Option<WalletHandle>,
    sink: Option<EventSink>,
    hooks: Option<ProviderHooks>,
    balances: Vec<UserAsset>,
}

/// One simulated connection.
pub struct SimulatedProvider {
    network: Network,
    config: SimulationConfig,
    state: Mutex<State>,
    intents: AtomicU64,
    balance_calls: AtomicUsize,
    deinit_calls: AtomicUsize,
    listeners_removed: AtomicBool,
}

/// A single provider operation, normalized.
struct Flow<'a> {
    scope: EventScope,
    steps: Vec<StepKind>,
    token: &'a str,
    amount: &'a str,
    destination: u64,
    sources: &'a [u64],
    leg: Option<&'a ExecuteLeg>,
}

impl SimulatedProvider {
    #[must_use]
    pub fn new(network: Network, config: SimulationConfig) -> Self {
        let balances = config.balances.clone();
        Self {
            network,
            config,
            state: Mutex::new(State {
                balances,
                ..State::default()
            }),
            intents: AtomicU64::new(0),
            balance_calls: AtomicUsize::new(0),
            deinit_calls: AtomicUsize::new(0),
            listeners_removed: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.network
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state().sink.is_some()
    }

    /// Number of unified balance fetches served.
    #[must_use]
    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn deinit_calls(&self) -> usize {
        self.deinit_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn listeners_removed(&self) -> bool {
        self.listeners_removed.load(Ordering::SeqCst)
    }

    /// The sink registered at initialize, while listeners are attached.
    #[must_use]
    pub fn event_sink(&self) -> Option<EventSink> {
        self.state().sink.clone()
    }

    /// Current simulated balances.
    #[must_use]
    pub fn balances(&self) -> Vec<UserAsset> {
        self.state().balances.clone()
    }

    fn attached(&self) -> Result<(EventSink, ProviderHooks, WalletHandle), Error> {
        let state = self.state();
        match (&state.sink, &state.hooks, &state.wallet) {
            (Some(sink), Some(hooks), Some(wallet)) => {
                Ok((sink.clone(), hooks.clone(), wallet.clone()))
            }
            _ => Err(Error::NotInitialized),
        }
    }

    fn available(&self, token: &str, chains: &[u64]) -> f64 {
        let state = self.state();
        state
            .balances
            .iter()
            .filter(|a| a.symbol.eq_ignore_ascii_case(token))
            .flat_map(|a| a.breakdown.iter())
            .filter(|b| chains.contains(&b.chain_id))
            .filter_map(|b| b.balance.parse::<f64>().ok())
            .sum()
    }

    async fn run(&self, flow: Flow<'_>) -> Result<ProviderOutcome, Error> {
        let (sink, hooks, wallet) = self.attached()?;
        let intent_id = self.intents.fetch_add(1, Ordering::SeqCst) + 1;
        let explorer_url = format!("{}/intent/{intent_id}", self.config.explorer_base);

        let steps: Vec<ProgressStep> = flow
            .steps
            .iter()
            .map(|kind| {
                let step = ProgressStep::new(kind.clone());
                if *kind == StepKind::InboundSettlement {
                    step.with_data(json!({ "explorerURL": explorer_url }))
                } else {
                    step
                }
            })
            .collect();

        debug!(intent = intent_id, steps = steps.len(), "Simulated intent announced");
        sink.emit(ProviderEvent::ExpectedSteps {
            scope: flow.scope,
            steps: steps.clone(),
        });
        for kind in &self.config.stray_steps {
            sink.emit(ProviderEvent::StepComplete {
                scope: flow.scope,
                step: ProgressStep::new(kind.clone()),
            });
        }

        if let Some(gate) = &self.config.gate {
            gate.notified().await;
        }

        let amount: f64 = flow
            .amount
            .parse()
            .map_err(|_| Error::InvalidParams(format!("invalid amount '{}'", flow.amount)))?;
        let funding: Vec<u64> = if flow.sources.is_empty() {
            vec![flow.destination]
        } else {
            flow.sources.to_vec()
        };

        let mut confirmed = false;
        for step in steps {
            match step.kind {
                StepKind::CheckSources => {
                    let available = self.available(flow.token, &funding);
                    if available < amount {
                        return Err(Error::InsufficientBalance {
                            token: flow.token.to_string(),
                            needed: flow.amount.to_string(),
                            available: available.to_string(),
                        });
                    }
                }
                _ if !confirmed => {
                    self.confirm_intent(&hooks, &flow).await?;
                    confirmed = true;
                    if let Some(err) = &self.config.fail_with {
                        return Err(err.clone());
                    }
                    if let Some(message) = &self.config.reject_with {
                        return Ok(ProviderOutcome::failed(message.clone()));
                    }
                    self.perform(&step, &hooks, &wallet, &flow, &funding).await?;
                }
                _ => self.perform(&step, &hooks, &wallet, &flow, &funding).await?,
            }

            if !self.config.step_delay.is_zero() {
                tokio::time::sleep(self.config.step_delay).await;
            }
            sink.emit(ProviderEvent::StepComplete {
                scope: flow.scope,
                step,
            });
        }

        self.settle(&flow, amount, &funding);
        info!(intent = intent_id, network = %self.network, "Simulated intent settled");
        Ok(ProviderOutcome::succeeded(Some(explorer_url)))
    }

    async fn confirm_intent(&self, hooks: &ProviderHooks, flow: &Flow<'_>) -> Result<(), Error> {
        let intent = Intent {
            token: flow.token.to_string(),
            amount: flow.amount.to_string(),
            destination_chain_id: flow.destination,
            source_chain_ids: flow.sources.to_vec(),
            fees: FeeEstimate {
                total: self.config.fee.clone(),
                gas: self.config.fee.clone(),
                protocol: "0".to_string(),
            },
        };
        match hooks.intent.confirm(&intent).await {
            IntentDecision::Allow => Ok(()),
            IntentDecision::Deny => Err(Error::UserDenied),
        }
    }

    async fn perform(
        &self,
        step: &ProgressStep,
        hooks: &ProviderHooks,
        wallet: &WalletHandle,
        flow: &Flow<'_>,
        funding: &[u64],
    ) -> Result<(), Error> {
        match &step.kind {
            StepKind::TokenApproval => {
                let request = AllowanceRequest {
                    sources: funding
                        .iter()
                        .map(|&chain_id| AllowanceSource {
                            chain_id,
                            token: flow.token.to_string(),
                            current: "0".to_string(),
                            required: flow.amount.to_string(),
                        })
                        .collect(),
                };
                match hooks.allowance.authorize(&request).await {
                    AllowanceDecision::Grant(choices) if choices.len() == request.sources.len() => {
                        Ok(())
                    }
                    AllowanceDecision::Grant(_) | AllowanceDecision::Deny => {
                        Err(Error::AllowanceDenied)
                    }
                }
            }
            StepKind::ContractCall => {
                let leg = flow
                    .leg
                    .ok_or_else(|| Error::InvalidParams("no contract call to perform".into()))?;
                let user = wallet
                    .address
                    .ok_or_else(|| Error::InvalidParams("no connected account".into()))?;
                let params = leg.build_params.build(
                    &leg.token_approval.token,
                    &leg.token_approval.amount,
                    flow.destination,
                    user,
                )?;
                debug!(
                    contract = %leg.contract_address,
                    function = %leg.function_name,
                    args = params.function_params.len(),
                    "Simulated contract call"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Move the bridged amount to the destination; a contract call then
    /// consumes it there.
    fn settle(&self, flow: &Flow<'_>, amount: f64, funding: &[u64]) {
        let bridged = flow.steps.contains(&StepKind::Bridge);
        let consumed = flow.leg.is_some() && flow.steps.contains(&StepKind::ContractCall);
        let decimals = token::by_symbol(flow.token)
            .map_or(DISPLAY_DECIMALS, |t| t.decimals.min(DISPLAY_DECIMALS));

        let mut state = self.state();
        let Some(asset) = state
            .balances
            .iter_mut()
            .find(|a| a.symbol.eq_ignore_ascii_case(flow.token))
        else {
            return;
        };
        let price = match (asset.balance_in_fiat, asset.balance.parse::<f64>()) {
            (Some(fiat), Ok(total)) if total > 0.0 => fiat / total,
            _ => 0.0,
        };

        let mut deltas: Vec<(u64, f64)> = Vec::new();
        if bridged {
            let mut remaining = amount;
            for &chain_id in funding.iter().filter(|&&c| c != flow.destination) {
                if remaining <= 0.0 {
                    break;
                }
                let held = asset
                    .breakdown
                    .iter()
                    .find(|b| b.chain_id == chain_id)
                    .and_then(|b| b.balance.parse::<f64>().ok())
                    .unwrap_or(0.0);
                let take = held.min(remaining);
                if take > 0.0 {
                    deltas.push((chain_id, -take));
                    remaining -= take;
                }
            }
            deltas.push((flow.destination, amount - remaining));
        }
        if consumed {
            deltas.push((flow.destination, -amount));
        }

        for (chain_id, delta) in deltas {
            let index = match asset.breakdown.iter().position(|b| b.chain_id == chain_id) {
                Some(i) => i,
                None => {
                    asset.breakdown.push(slice(chain_id, 0.0, price));
                    asset.breakdown.len() - 1
                }
            };
            let entry = &mut asset.breakdown[index];
            let current = entry.balance.parse::<f64>().unwrap_or(0.0);
            let next = (current + delta).max(0.0);
            entry.balance = token::format_amount(next, decimals);
            entry.balance_in_fiat = Some(round_cents(next * price));
        }

        let total: f64 = asset
            .breakdown
            .iter()
            .filter_map(|b| b.balance.parse::<f64>().ok())
            .sum();
        asset.balance = token::format_amount(total, decimals);
        asset.balance_in_fiat = Some(round_cents(total * price));
    }

    fn steps_or(&self, defaults: Vec<StepKind>) -> Vec<StepKind> {
        self.config.steps.clone().unwrap_or(defaults)
    }
}

fn approval_steps(token: &str) -> Vec<StepKind> {
    if token::by_symbol(token).is_some_and(|t| t.native) {
        vec![]
    } else {
        vec![StepKind::TokenApproval]
    }
}

#[async_trait]
impl ExecutionProvider for SimulatedProvider {
    fn id(&self) -> &str {
        "simulated"
    }

    async fn initialize(
        &self,
        wallet: &WalletHandle,
        events: EventSink,
        hooks: ProviderHooks,
    ) -> Result<(), Error> {
        if self.config.fail_initialize {
            return Err(Error::Initialization("simulated initialization failure".into()));
        }
        let mut state = self.state();
        state.wallet = Some(wallet.clone());
        state.sink = Some(events);
        state.hooks = Some(hooks);
        self.listeners_removed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn bridge(&self, params: BridgeParams) -> Result<ProviderOutcome, Error> {
        let mut defaults = vec![StepKind::CheckSources];
        defaults.extend(approval_steps(&params.token));
        defaults.extend([StepKind::Bridge, StepKind::InboundSettlement]);
        self.run(Flow {
            scope: EventScope::Standard,
            steps: self.steps_or(defaults),
            token: &params.token,
            amount: &params.amount,
            destination: params.destination_chain_id,
            sources: &params.source_chain_ids,
            leg: None,
        })
        .await
    }

    async fn execute(&self, params: ExecuteParams) -> Result<ProviderOutcome, Error> {
        let approval = &params.leg.token_approval;
        let mut defaults = approval_steps(&approval.token);
        defaults.push(StepKind::ContractCall);
        self.run(Flow {
            scope: EventScope::Standard,
            steps: self.steps_or(defaults),
            token: &approval.token,
            amount: &approval.amount,
            destination: params.destination_chain_id,
            sources: &[],
            leg: Some(&params.leg),
        })
        .await
    }

    async fn bridge_and_execute(
        &self,
        params: BridgeAndExecuteParams,
    ) -> Result<ProviderOutcome, Error> {
        let mut defaults = vec![StepKind::CheckSources];
        defaults.extend(approval_steps(&params.token));
        defaults.extend([
            StepKind::Bridge,
            StepKind::InboundSettlement,
            StepKind::ContractCall,
        ]);
        self.run(Flow {
            scope: EventScope::BridgeExecute,
            steps: self.steps_or(defaults),
            token: &params.token,
            amount: &params.amount,
            destination: params.destination_chain_id,
            sources: &params.source_chain_ids,
            leg: Some(&params.execute),
        })
        .await
    }

    async fn unified_balances(&self) -> Result<Vec<UserAsset>, Error> {
        let state = self.state();
        if state.wallet.is_none() {
            return Err(Error::NotInitialized);
        }
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(state.balances.clone())
    }

    fn remove_all_listeners(&self) {
        let mut state = self.state();
        state.sink = None;
        state.hooks = None;
        self.listeners_removed.store(true, Ordering::SeqCst);
    }

    async fn deinit(&self) -> Result<(), Error> {
        self.deinit_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        state.wallet = None;
        state.sink = None;
        state.hooks = None;
        Ok(())
    }
}

/// Hands out simulated connections and keeps them for inspection.
pub struct SimulatedConnector {
    config: SimulationConfig,
    created: Mutex<Vec<Arc<SimulatedProvider>>>,
}

impl SimulatedConnector {
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Every provider created so far, oldest first.
    #[must_use]
    pub fn providers(&self) -> Vec<Arc<SimulatedProvider>> {
        match self.created.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The most recently created provider.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<SimulatedProvider>> {
        self.providers().pop()
    }
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl Connector for SimulatedConnector {
    fn connect(&self, network: Network) -> Arc<dyn ExecutionProvider> {
        let provider = Arc::new(SimulatedProvider::new(network, self.config.clone()));
        match self.created.lock() {
            Ok(mut g) => g.push(provider.clone()),
            Err(poisoned) => poisoned.into_inner().push(provider.clone()),
        }
        provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::event_channel;
    use crate::provider::hooks::AutoConfirm;

    fn usdc(asset: &[UserAsset]) -> &UserAsset {
        asset.iter().find(|a| a.symbol == "USDC").unwrap()
    }

    fn chain_balance(asset: &UserAsset, chain_id: u64) -> f64 {
        asset
            .breakdown
            .iter()
            .find(|b| b.chain_id == chain_id)
            .map_or(0.0, |b| b.balance.parse().unwrap())
    }

    async fn attached(
        config: SimulationConfig,
    ) -> (SimulatedProvider, crate::provider::EventStream) {
        let provider = SimulatedProvider::new(Network::Testnet, config);
        let (sink, rx) = event_channel();
        provider
            .initialize(
                &WalletHandle::new("test").with_address(alloy_primitives::Address::repeat_byte(1)),
                sink,
                ProviderHooks::new(Arc::new(AutoConfirm)),
            )
            .await
            .unwrap();
        (provider, rx)
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let provider = SimulatedProvider::new(Network::Testnet, SimulationConfig::default());
        let result = provider
            .bridge(BridgeParams {
                token: "USDC".into(),
                amount: "1".into(),
                destination_chain_id: 137,
                source_chain_ids: vec![42161],
            })
            .await;
        assert_eq!(result, Err(Error::NotInitialized));
        assert_eq!(provider.unified_balances().await, Err(Error::NotInitialized));
    }

    #[tokio::test]
    async fn test_bridge_moves_balance() {
        let (provider, mut rx) = attached(SimulationConfig::default()).await;
        let outcome = provider
            .bridge(BridgeParams {
                token: "USDC".into(),
                amount: "1000".into(),
                destination_chain_id: 137,
                source_chain_ids: vec![10, 42161],
            })
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.explorer_url.is_some());

        let balances = provider.balances();
        let asset = usdc(&balances);
        assert_eq!(chain_balance(asset, 10), 0.0);
        assert_eq!(chain_balance(asset, 42161), 1400.0);
        assert!((chain_balance(asset, 137) - 1810.45).abs() < 1e-9);
        assert_eq!(asset.balance, "3210.45");

        let Some(ProviderEvent::ExpectedSteps { steps, .. }) = rx.recv().await else {
            panic!("expected steps first");
        };
        assert_eq!(steps.len(), 4);
        let mut completed = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, ProviderEvent::StepComplete { .. }));
            completed += 1;
        }
        assert_eq!(completed, 4);
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let (provider, _rx) = attached(SimulationConfig::default()).await;
        let result = provider
            .bridge(BridgeParams {
                token: "USDC".into(),
                amount: "5000".into(),
                destination_chain_id: 137,
                source_chain_ids: vec![42161],
            })
            .await;
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn test_remove_listeners_detaches() {
        let (provider, _rx) = attached(SimulationConfig::default()).await;
        assert!(provider.is_initialized());
        provider.remove_all_listeners();
        assert!(provider.listeners_removed());
        assert!(provider.event_sink().is_none());
        provider.deinit().await.unwrap();
        assert_eq!(provider.deinit_calls(), 1);
    }

    #[test]
    fn test_connector_tracks_providers() {
        let connector = SimulatedConnector::default();
        connector.connect(Network::Testnet);
        connector.connect(Network::Mainnet);
        assert_eq!(connector.providers().len(), 2);
        assert_eq!(connector.latest().unwrap().network(), Network::Mainnet);
    }
}
