//! Strategy values: immutable descriptions of a cross-chain move, optionally
//! followed by a contract call.
//!
//! The operation kind is a tagged enum, so an `execute` strategy without a
//! contract call cannot be constructed. The JSON wire form used by the
//! generation service and strategy files keeps the flat `type` tag with
//! optional `contractAddress`/`functionName`, and is validated on the way in.

pub mod catalog;

use alloy_primitives::Address;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

static FUNCTION_IDENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("function identifier regex must be valid")
});

#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error("Unsupported strategy type: {0}")]
    UnsupportedStrategyType(String),

    #[error("Strategy type '{kind}' requires a contract address and function name")]
    MissingContractCall { kind: StrategyKind },

    #[error("Bridge strategies must not carry a contract address or function name")]
    UnexpectedContractCall,

    #[error("Invalid contract address '{0}'")]
    InvalidContractAddress(String),

    #[error("Invalid function name '{0}'")]
    InvalidFunctionName(String),

    #[error("Invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider operation a strategy routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Bridge,
    Execute,
    BridgeExecute,
}

impl StrategyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Bridge => "bridge",
            StrategyKind::Execute => "execute",
            StrategyKind::BridgeExecute => "bridge-execute",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bridge" => Ok(StrategyKind::Bridge),
            "execute" => Ok(StrategyKind::Execute),
            "bridge-execute" => Ok(StrategyKind::BridgeExecute),
            other => Err(StrategyError::UnsupportedStrategyType(other.to_string())),
        }
    }
}

/// Target of an execute leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    address: Address,
    function: String,
}

impl ContractCall {
    pub fn new(address: &str, function: &str) -> Result<Self, StrategyError> {
        let address = Address::from_str(address.trim())
            .map_err(|_| StrategyError::InvalidContractAddress(address.to_string()))?;
        let function = function.trim();
        if !FUNCTION_IDENT.is_match(function) {
            return Err(StrategyError::InvalidFunctionName(function.to_string()));
        }
        Ok(Self {
            address,
            function: function.to_string(),
        })
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyAction {
    Bridge,
    Execute(ContractCall),
    BridgeExecute(ContractCall),
}

impl StrategyAction {
    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyAction::Bridge => StrategyKind::Bridge,
            StrategyAction::Execute(_) => StrategyKind::Execute,
            StrategyAction::BridgeExecute(_) => StrategyKind::BridgeExecute,
        }
    }

    #[must_use]
    pub fn contract_call(&self) -> Option<&ContractCall> {
        match self {
            StrategyAction::Bridge => None,
            StrategyAction::Execute(call) | StrategyAction::BridgeExecute(call) => Some(call),
        }
    }
}

/// A validated, immutable strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StrategyWire", into = "StrategyWire")]
pub struct Strategy {
    id: String,
    name: String,
    description: String,
    risk: RiskTier,
    apy: f64,
    chains: Vec<String>,
    protocols: Vec<String>,
    tvl: f64,
    recommended: bool,
    action: StrategyAction,
    execution_steps: Vec<String>,
    recommended_amount: f64,
    token: String,
}

impl Strategy {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn risk(&self) -> RiskTier {
        self.risk
    }

    /// Advertised annual yield, in percent.
    #[must_use]
    pub fn apy(&self) -> f64 {
        self.apy
    }

    /// Target chains; the first is the destination.
    #[must_use]
    pub fn chains(&self) -> &[String] {
        &self.chains
    }

    #[must_use]
    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    #[must_use]
    pub fn tvl(&self) -> f64 {
        self.tvl
    }

    #[must_use]
    pub fn recommended(&self) -> bool {
        self.recommended
    }

    #[must_use]
    pub fn action(&self) -> &StrategyAction {
        &self.action
    }

    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        self.action.kind()
    }

    #[must_use]
    pub fn execution_steps(&self) -> &[String] {
        &self.execution_steps
    }

    /// Amount to move, in human units of `token`.
    #[must_use]
    pub fn recommended_amount(&self) -> f64 {
        self.recommended_amount
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Parse a strategy from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        let wire: StrategyWire = serde_json::from_str(json)?;
        Ok(Self::try_from(wire)?)
    }

    /// Read a strategy JSON file.
    pub fn from_file(path: &Path) -> Result<Self, crate::Error> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Flat JSON shape shared with the generation service and strategy files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyWire {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub risk: RiskTier,
    #[serde(default)]
    pub apy: f64,
    pub chains: Vec<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub tvl: f64,
    #[serde(default)]
    pub recommended: bool,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub execution_steps: Vec<String>,
    pub recommended_amount: f64,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> StrategyError {
    StrategyError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl TryFrom<StrategyWire> for Strategy {
    type Error = StrategyError;

    fn try_from(wire: StrategyWire) -> Result<Self, Self::Error> {
        let kind: StrategyKind = wire.kind.parse()?;

        if wire.id.trim().is_empty() {
            return Err(invalid("id", "must not be empty"));
        }
        if wire.token.trim().is_empty() {
            return Err(invalid("token", "must not be empty"));
        }
        let chains: Vec<String> = wire
            .chains
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if chains.is_empty() {
            return Err(invalid("chains", "at least one chain is required"));
        }
        if !wire.tvl.is_finite() || wire.tvl < 0.0 {
            return Err(invalid("tvl", format!("{} is not a non-negative number", wire.tvl)));
        }
        if !wire.apy.is_finite() {
            return Err(invalid("apy", "must be finite"));
        }
        if !wire.recommended_amount.is_finite() || wire.recommended_amount <= 0.0 {
            return Err(invalid(
                "recommendedAmount",
                format!("{} is not a positive amount", wire.recommended_amount),
            ));
        }

        let address = non_blank(wire.contract_address.as_ref());
        let function = non_blank(wire.function_name.as_ref());
        let action = match kind {
            StrategyKind::Bridge => {
                if address.is_some() || function.is_some() {
                    return Err(StrategyError::UnexpectedContractCall);
                }
                StrategyAction::Bridge
            }
            StrategyKind::Execute | StrategyKind::BridgeExecute => {
                let (Some(address), Some(function)) = (address, function) else {
                    return Err(StrategyError::MissingContractCall { kind });
                };
                let call = ContractCall::new(address, function)?;
                if kind == StrategyKind::Execute {
                    StrategyAction::Execute(call)
                } else {
                    StrategyAction::BridgeExecute(call)
                }
            }
        };

        Ok(Strategy {
            id: wire.id.trim().to_string(),
            name: wire.name,
            description: wire.description,
            risk: wire.risk,
            apy: wire.apy,
            chains,
            protocols: wire.protocols,
            tvl: wire.tvl,
            recommended: wire.recommended,
            action,
            execution_steps: wire.execution_steps,
            recommended_amount: wire.recommended_amount,
            token: wire.token.trim().to_uppercase(),
        })
    }
}

impl From<Strategy> for StrategyWire {
    fn from(s: Strategy) -> Self {
        let call = s.action.contract_call();
        StrategyWire {
            kind: s.action.kind().as_str().to_string(),
            contract_address: call.map(|c| c.address().to_checksum(None)),
            function_name: call.map(|c| c.function().to_string()),
            id: s.id,
            name: s.name,
            description: s.description,
            risk: s.risk,
            apy: s.apy,
            chains: s.chains,
            protocols: s.protocols,
            tvl: s.tvl,
            recommended: s.recommended,
            execution_steps: s.execution_steps,
            recommended_amount: s.recommended_amount,
            token: s.token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AAVE_POOL: &str = "0x794a61358D6845594F94dc1DB02A252b5b4814aD";

    fn wire(kind: &str) -> StrategyWire {
        StrategyWire {
            id: "test".into(),
            name: "Test".into(),
            description: String::new(),
            risk: RiskTier::Low,
            apy: 4.2,
            chains: vec!["Polygon".into(), "Arbitrum".into()],
            protocols: vec![],
            tvl: 0.0,
            recommended: false,
            kind: kind.into(),
            execution_steps: vec![],
            recommended_amount: 100.0,
            token: "usdc".into(),
            contract_address: None,
            function_name: None,
        }
    }

    #[test]
    fn test_bridge_has_no_contract_call() {
        let s = Strategy::try_from(wire("bridge")).unwrap();
        assert_eq!(s.kind(), StrategyKind::Bridge);
        assert!(s.action().contract_call().is_none());
        assert_eq!(s.token(), "USDC");

        let back = StrategyWire::from(s);
        assert!(back.contract_address.is_none());
        assert!(back.function_name.is_none());
    }

    #[test]
    fn test_bridge_rejects_contract_fields() {
        let mut w = wire("bridge");
        w.function_name = Some("supply".into());
        assert_eq!(
            Strategy::try_from(w),
            Err(StrategyError::UnexpectedContractCall)
        );
    }

    #[test]
    fn test_execute_kinds_require_contract_call() {
        for kind in ["execute", "bridge-execute"] {
            let mut w = wire(kind);
            w.contract_address = Some(AAVE_POOL.into());
            assert!(matches!(
                Strategy::try_from(w.clone()),
                Err(StrategyError::MissingContractCall { .. })
            ));

            w.function_name = Some("  ".into());
            assert!(matches!(
                Strategy::try_from(w.clone()),
                Err(StrategyError::MissingContractCall { .. })
            ));

            w.function_name = Some("supply".into());
            let s = Strategy::try_from(w).unwrap();
            let call = s.action().contract_call().unwrap();
            assert_eq!(call.function(), "supply");

            let back = StrategyWire::from(s);
            let address: Address = back.contract_address.unwrap().parse().unwrap();
            assert_eq!(address, AAVE_POOL.parse::<Address>().unwrap());
            assert_eq!(back.function_name.as_deref(), Some("supply"));
        }
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        assert_eq!(
            Strategy::try_from(wire("swap")),
            Err(StrategyError::UnsupportedStrategyType("swap".into()))
        );
    }

    #[test]
    fn test_invalid_contract_fields() {
        let mut w = wire("execute");
        w.contract_address = Some("0x1234".into());
        w.function_name = Some("supply".into());
        assert!(matches!(
            Strategy::try_from(w.clone()),
            Err(StrategyError::InvalidContractAddress(_))
        ));

        w.contract_address = Some(AAVE_POOL.into());
        w.function_name = Some("supply(uint256)".into());
        assert!(matches!(
            Strategy::try_from(w),
            Err(StrategyError::InvalidFunctionName(_))
        ));
    }

    #[test]
    fn test_numeric_validation() {
        let mut w = wire("bridge");
        w.tvl = -1.0;
        assert!(matches!(
            Strategy::try_from(w),
            Err(StrategyError::Invalid { field: "tvl", .. })
        ));

        let mut w = wire("bridge");
        w.recommended_amount = 0.0;
        assert!(matches!(
            Strategy::try_from(w),
            Err(StrategyError::Invalid {
                field: "recommendedAmount",
                ..
            })
        ));

        let mut w = wire("bridge");
        w.chains = vec![" ".into()];
        assert!(matches!(
            Strategy::try_from(w),
            Err(StrategyError::Invalid { field: "chains", .. })
        ));
    }

    #[test]
    fn test_json_roundtrip_uses_wire_names() {
        let json = r#"{
            "id": "x", "name": "X", "risk": "high", "apy": 9.5,
            "chains": ["Base"], "type": "bridge",
            "recommendedAmount": 25, "token": "ETH"
        }"#;
        let s = Strategy::from_json(json).unwrap();
        assert_eq!(s.risk(), RiskTier::High);
        assert_eq!(s.recommended_amount(), 25.0);

        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["type"], "bridge");
        assert_eq!(value["recommendedAmount"], 25.0);
        assert!(value.get("contractAddress").is_none());
    }

    #[test]
    fn test_from_json_surfaces_unsupported_type() {
        let json = r#"{"id":"x","name":"X","risk":"low","chains":["Base"],
            "type":"stake","recommendedAmount":1,"token":"ETH"}"#;
        let err = Strategy::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Strategy(StrategyError::UnsupportedStrategyType(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(
            &path,
            r#"{"id":"f","name":"F","risk":"low","chains":["Base","Arbitrum"],
                "type":"bridge","recommendedAmount":3,"token":"USDC"}"#,
        )
        .unwrap();
        assert_eq!(Strategy::from_file(&path).unwrap().chains().len(), 2);

        let err = Strategy::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
