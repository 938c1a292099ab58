use super::abi::{AbiFunction, ParamBuilder};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        })
    }
}

/// Injectable wallet provider handle supplied by the wallet connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletHandle {
    pub label: String,
    /// Connected account; absent until the user selects one.
    pub address: Option<Address>,
    pub chain_id: Option<u64>,
}

impl WalletHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            address: None,
            chain_id: None,
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    #[must_use]
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeParams {
    pub token: String,
    /// Human decimal amount.
    pub amount: String,
    pub destination_chain_id: u64,
    pub source_chain_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenApproval {
    pub token: String,
    pub amount: String,
}

/// Contract-call half of an execute or bridge-and-execute request.
#[derive(Debug, Clone)]
pub struct ExecuteLeg {
    pub contract_address: Address,
    pub contract_abi: Vec<AbiFunction>,
    pub function_name: String,
    pub build_params: ParamBuilder,
    pub wait_for_receipt: bool,
    pub token_approval: TokenApproval,
}

#[derive(Debug, Clone)]
pub struct ExecuteParams {
    pub destination_chain_id: u64,
    pub leg: ExecuteLeg,
}

#[derive(Debug, Clone)]
pub struct BridgeAndExecuteParams {
    pub token: String,
    pub amount: String,
    pub destination_chain_id: u64,
    pub source_chain_ids: Vec<u64>,
    pub execute: ExecuteLeg,
}

/// Result shape shared by the three provider operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderOutcome {
    #[must_use]
    pub fn succeeded(explorer_url: Option<String>) -> Self {
        Self {
            success: true,
            explorer_url,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            explorer_url: None,
            error: Some(error.into()),
        }
    }
}

/// Per-chain slice of a unified balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBalance {
    pub chain_id: u64,
    pub chain_name: String,
    pub balance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_in_fiat: Option<f64>,
}

/// One asset in a unified, cross-chain balance snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAsset {
    pub symbol: String,
    /// String-encoded decimal.
    pub balance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_in_fiat: Option<f64>,
    #[serde(default)]
    pub breakdown: Vec<ChainBalance>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_wire_shape() {
        let ok: ProviderOutcome =
            serde_json::from_value(json!({"success": true, "explorerUrl": "https://x/1"})).unwrap();
        assert_eq!(ok, ProviderOutcome::succeeded(Some("https://x/1".into())));

        let failed = serde_json::to_value(ProviderOutcome::failed("reverted")).unwrap();
        assert_eq!(failed, json!({"success": false, "error": "reverted"}));
    }

    #[test]
    fn test_asset_decodes_without_breakdown() {
        let asset: UserAsset =
            serde_json::from_value(json!({"symbol": "USDC", "balance": "12.5"})).unwrap();
        assert!(asset.breakdown.is_empty());
        assert!(asset.balance_in_fiat.is_none());
    }
}
