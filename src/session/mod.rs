//! Provider connection lifecycle for one session.

use crate::provider::{
    self, Connector, EventStream, ExecutionProvider, Network, ProviderHooks, WalletHandle,
    event_channel,
};
use alloy_primitives::Address;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No wallet provider available")]
    NoProviderAvailable,

    #[error("Provider initialization failed: {0}")]
    Provider(#[from] provider::Error),
}

/// One live provider connection and the receiving half of its event channel.
pub struct Connection {
    id: Uuid,
    provider: Arc<dyn ExecutionProvider>,
    wallet: WalletHandle,
    events: Mutex<EventStream>,
}

impl Connection {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ExecutionProvider> {
        &self.provider
    }

    #[must_use]
    pub fn wallet(&self) -> &WalletHandle {
        &self.wallet
    }

    /// Event stream for this connection. Held by one attempt at a time.
    #[must_use]
    pub fn events(&self) -> &Mutex<EventStream> {
        &self.events
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Subscriptions never outlive the connection, closed or not.
        self.provider.remove_all_listeners();
    }
}

/// Owns the single execution-provider connection of a session.
pub struct ProviderSession {
    connector: Arc<dyn Connector>,
    network: Network,
    ambient: Option<WalletHandle>,
    hooks: ProviderHooks,
    connection: RwLock<Option<Connection>>,
}

impl ProviderSession {
    pub fn new(
        connector: Arc<dyn Connector>,
        network: Network,
        ambient: Option<WalletHandle>,
        hooks: ProviderHooks,
    ) -> Self {
        Self {
            connector,
            network,
            ambient,
            hooks,
            connection: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.network
    }

    /// Connect using `wallet`, or the ambient wallet when none is given.
    ///
    /// Any existing connection is released first. Waits for an in-flight
    /// attempt to settle, since attempts hold the connection for reading.
    pub async fn initialize(&self, wallet: Option<WalletHandle>) -> Result<Uuid, SessionError> {
        let wallet = wallet
            .or_else(|| self.ambient.clone())
            .ok_or(SessionError::NoProviderAvailable)?;

        let mut slot = self.connection.write().await;
        if let Some(previous) = slot.take() {
            debug!(connection = %previous.id, "Replacing provider connection");
            release(previous).await;
        }

        let provider = self.connector.connect(self.network);
        let (sink, rx) = event_channel();
        if let Err(e) = provider.initialize(&wallet, sink, self.hooks.clone()).await {
            warn!(provider = provider.id(), "Provider initialization failed: {e}");
            provider.remove_all_listeners();
            if let Err(deinit) = provider.deinit().await {
                warn!(provider = provider.id(), "Deinit after failed initialization: {deinit}");
            }
            return Err(e.into());
        }

        let connection = Connection {
            id: Uuid::new_v4(),
            provider,
            wallet,
            events: Mutex::new(rx),
        };
        let id = connection.id;
        info!(
            connection = %id,
            provider = connection.provider.id(),
            network = %self.network,
            wallet = %connection.wallet.label,
            "Provider connection opened"
        );
        *slot = Some(connection);
        Ok(id)
    }

    /// Release the connection, if any. Safe to call repeatedly.
    pub async fn close(&self) {
        let previous = self.connection.write().await.take();
        if let Some(connection) = previous {
            release(connection).await;
        }
    }

    /// Read access to the live connection for the duration of a call.
    pub async fn connection(&self) -> RwLockReadGuard<'_, Option<Connection>> {
        self.connection.read().await
    }

    pub async fn is_initialized(&self) -> bool {
        self.connection.read().await.is_some()
    }

    pub async fn connection_id(&self) -> Option<Uuid> {
        self.connection.read().await.as_ref().map(Connection::id)
    }

    pub async fn wallet(&self) -> Option<WalletHandle> {
        self.connection
            .read()
            .await
            .as_ref()
            .map(|c| c.wallet.clone())
    }

    pub async fn wallet_address(&self) -> Option<Address> {
        self.connection
            .read()
            .await
            .as_ref()
            .and_then(|c| c.wallet.address)
    }
}

/// Remove listeners, then deinit. Deinit failures are logged only.
async fn release(connection: Connection) {
    connection.provider.remove_all_listeners();
    if let Err(e) = connection.provider.deinit().await {
        warn!(connection = %connection.id, "Provider deinit failed: {e}");
    }
    info!(connection = %connection.id, "Provider connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::simulated::{SimulatedConnector, SimulationConfig};
    use crate::provider::{AutoConfirm, EventScope, ProgressStep, ProviderEvent, StepKind};

    fn wallet() -> WalletHandle {
        WalletHandle::new("test").with_address(Address::repeat_byte(0xaa))
    }

    fn session(
        connector: Arc<SimulatedConnector>,
        ambient: Option<WalletHandle>,
    ) -> ProviderSession {
        ProviderSession::new(
            connector,
            Network::Testnet,
            ambient,
            ProviderHooks::new(Arc::new(AutoConfirm)),
        )
    }

    #[tokio::test]
    async fn test_no_provider_available() {
        let connector = Arc::new(SimulatedConnector::default());
        let session = session(connector.clone(), None);
        assert!(matches!(
            session.initialize(None).await,
            Err(SessionError::NoProviderAvailable)
        ));
        assert!(!session.is_initialized().await);
        assert!(connector.providers().is_empty());
    }

    #[tokio::test]
    async fn test_ambient_wallet_used() {
        let connector = Arc::new(SimulatedConnector::default());
        let session = session(connector, Some(wallet()));
        let id = session.initialize(None).await.unwrap();
        assert_eq!(session.connection_id().await, Some(id));
        assert_eq!(session.wallet_address().await, Some(Address::repeat_byte(0xaa)));
    }

    #[tokio::test]
    async fn test_reinitialize_releases_previous() {
        let connector = Arc::new(SimulatedConnector::default());
        let session = session(connector.clone(), None);
        let first = session.initialize(Some(wallet())).await.unwrap();
        let old_sink = connector.latest().unwrap().event_sink().unwrap();

        let second = session.initialize(Some(wallet())).await.unwrap();
        assert_ne!(first, second);

        let providers = connector.providers();
        assert_eq!(providers.len(), 2);
        assert!(providers[0].listeners_removed());
        assert_eq!(providers[0].deinit_calls(), 1);
        assert!(!providers[1].listeners_removed());

        // The old channel is gone with its connection.
        assert!(old_sink.is_closed());
        assert!(!old_sink.emit(ProviderEvent::StepComplete {
            scope: EventScope::Standard,
            step: ProgressStep::new(StepKind::Bridge),
        }));
    }

    #[tokio::test]
    async fn test_failed_initialize_stays_uninitialized() {
        let connector = Arc::new(SimulatedConnector::new(
            SimulationConfig::default().failing_initialize(),
        ));
        let session = session(connector.clone(), None);
        assert!(matches!(
            session.initialize(Some(wallet())).await,
            Err(SessionError::Provider(provider::Error::Initialization(_)))
        ));
        assert!(!session.is_initialized().await);
        assert_eq!(connector.latest().unwrap().deinit_calls(), 1);
    }

    #[tokio::test]
    async fn test_close_releases_connection() {
        let connector = Arc::new(SimulatedConnector::default());
        let session = session(connector.clone(), None);
        session.initialize(Some(wallet())).await.unwrap();
        session.close().await;
        session.close().await;

        let provider = connector.latest().unwrap();
        assert!(provider.listeners_removed());
        assert_eq!(provider.deinit_calls(), 1);
        assert!(!session.is_initialized().await);
        assert!(session.wallet().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_removes_listeners() {
        let connector = Arc::new(SimulatedConnector::default());
        {
            let session = session(connector.clone(), None);
            session.initialize(Some(wallet())).await.unwrap();
        }
        assert!(connector.latest().unwrap().listeners_removed());
    }
}
