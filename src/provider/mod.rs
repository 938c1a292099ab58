//! Execution provider abstraction.
//!
//! The provider performs the actual cross-chain work. The core only talks to
//! it through [`ExecutionProvider`]: one connection per session, typed
//! progress events over a channel, and two interaction hooks.

pub mod abi;
mod error;
pub mod events;
pub mod hooks;
pub mod simulated;
mod types;

use async_trait::async_trait;
use std::sync::Arc;

pub use error::Error;
pub use events::{
    EventScope, EventSink, EventStream, ProgressStep, ProviderEvent, StepKind, event_channel,
};
pub use hooks::{
    AllowanceDecision, AllowanceHook, AllowanceRequest, AutoConfirm, ConfirmChain, FeeCeiling,
    Intent, IntentDecision, IntentHook, MinimumAllowance, ProviderHooks,
};
pub use simulated::{SimulatedConnector, SimulatedProvider};
pub use types::*;

/// Operations a live provider connection offers.
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    /// Provider identifier, for logging.
    fn id(&self) -> &str;

    /// Bind the provider to a wallet, an event channel and the session hooks.
    async fn initialize(
        &self,
        wallet: &WalletHandle,
        events: EventSink,
        hooks: ProviderHooks,
    ) -> Result<(), Error>;

    async fn bridge(&self, params: BridgeParams) -> Result<ProviderOutcome, Error>;

    async fn execute(&self, params: ExecuteParams) -> Result<ProviderOutcome, Error>;

    async fn bridge_and_execute(
        &self,
        params: BridgeAndExecuteParams,
    ) -> Result<ProviderOutcome, Error>;

    async fn unified_balances(&self) -> Result<Vec<UserAsset>, Error>;

    /// Drop every registered event listener and hook.
    fn remove_all_listeners(&self);

    /// Release the connection.
    async fn deinit(&self) -> Result<(), Error>;
}

/// Creates provider instances, one per connection.
pub trait Connector: Send + Sync {
    fn connect(&self, network: Network) -> Arc<dyn ExecutionProvider>;
}
