//! Typed progress events emitted by an execution provider.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Step types reported by the provider. Unknown types decode to `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    CheckSources,
    TokenApproval,
    Bridge,
    ContractCall,
    InboundSettlement,
    Other(String),
}

impl StepKind {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            StepKind::CheckSources => "check-sources",
            StepKind::TokenApproval => "token-approval",
            StepKind::Bridge => "bridge",
            StepKind::ContractCall => "contract-call",
            StepKind::InboundSettlement => "inbound-settlement",
            StepKind::Other(id) => id,
        }
    }

    /// Short label for progress output.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            StepKind::CheckSources => "Checking source balances",
            StepKind::TokenApproval => "Approving token spend",
            StepKind::Bridge => "Bridging funds",
            StepKind::ContractCall => "Calling contract",
            StepKind::InboundSettlement => "Settling on destination",
            StepKind::Other(id) => id,
        }
    }
}

impl From<String> for StepKind {
    fn from(id: String) -> Self {
        match id.as_str() {
            "check-sources" => StepKind::CheckSources,
            "token-approval" => StepKind::TokenApproval,
            "bridge" => StepKind::Bridge,
            "contract-call" => StepKind::ContractCall,
            "inbound-settlement" => StepKind::InboundSettlement,
            _ => StepKind::Other(id),
        }
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.id().to_string()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One unit of provider-reported progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ProgressStep {
    #[must_use]
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            data: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Explorer link carried by the settlement step, if any.
    #[must_use]
    pub fn explorer_url(&self) -> Option<&str> {
        ["explorerURL", "explorerUrl", "explorer_url"]
            .iter()
            .find_map(|key| self.data.get(key).and_then(|v| v.as_str()))
    }
}

/// Which provider flow an event belongs to. Bridge-and-execute reports on
/// its own pair of event names; the tracker treats both alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    Standard,
    BridgeExecute,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Replaces the full ordered step list for the current attempt.
    ExpectedSteps {
        scope: EventScope,
        steps: Vec<ProgressStep>,
    },
    /// Marks one step as complete.
    StepComplete {
        scope: EventScope,
        step: ProgressStep,
    },
}

/// Sending half of a connection's event channel, handed to the provider.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ProviderEvent>,
}

impl EventSink {
    /// Emit an event. Returns false once the connection has been released.
    pub fn emit(&self, event: ProviderEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub type EventStream = mpsc::UnboundedReceiver<ProviderEvent>;

/// Create the event channel for one provider connection.
#[must_use]
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_kind_roundtrip() {
        for id in [
            "check-sources",
            "token-approval",
            "bridge",
            "contract-call",
            "inbound-settlement",
        ] {
            let kind = StepKind::from(id.to_string());
            assert!(!matches!(kind, StepKind::Other(_)));
            assert_eq!(kind.id(), id);
        }
        assert_eq!(
            StepKind::from("INTENT_COLLECTION".to_string()),
            StepKind::Other("INTENT_COLLECTION".into())
        );
    }

    #[test]
    fn test_step_decodes_unknown_type() {
        let step: ProgressStep =
            serde_json::from_value(json!({"type": "mystery", "data": {"n": 1}})).unwrap();
        assert_eq!(step.kind, StepKind::Other("mystery".into()));
    }

    #[test]
    fn test_explorer_url() {
        let step = ProgressStep::new(StepKind::InboundSettlement)
            .with_data(json!({"explorerURL": "https://explorer.test/tx/1"}));
        assert_eq!(step.explorer_url(), Some("https://explorer.test/tx/1"));
        assert_eq!(ProgressStep::new(StepKind::Bridge).explorer_url(), None);
    }

    #[test]
    fn test_sink_reports_closed_channel() {
        let (sink, rx) = event_channel();
        assert!(sink.emit(ProviderEvent::StepComplete {
            scope: EventScope::Standard,
            step: ProgressStep::new(StepKind::Bridge),
        }));
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.emit(ProviderEvent::ExpectedSteps {
            scope: EventScope::Standard,
            steps: vec![],
        }));
    }
}
