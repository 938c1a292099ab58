//! Predefined strategies offered on the dashboard.

use super::{RiskTier, Strategy, StrategyWire};
use once_cell::sync::Lazy;

const YIELD_VAULT: &str = "0x794a61358D6845594F94dc1DB02A252b5b4814aD";
const STAKING_VAULT: &str = "0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84";

#[allow(clippy::too_many_arguments)]
fn entry(
    id: &str,
    name: &str,
    description: &str,
    risk: RiskTier,
    apy: f64,
    chains: &[&str],
    protocols: &[&str],
    tvl: f64,
    recommended: bool,
    kind: &str,
    token: &str,
    amount: f64,
    call: Option<(&str, &str)>,
    steps: &[&str],
) -> StrategyWire {
    StrategyWire {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        risk,
        apy,
        chains: chains.iter().map(|s| (*s).to_string()).collect(),
        protocols: protocols.iter().map(|s| (*s).to_string()).collect(),
        tvl,
        recommended,
        kind: kind.to_string(),
        execution_steps: steps.iter().map(|s| (*s).to_string()).collect(),
        recommended_amount: amount,
        token: token.to_string(),
        contract_address: call.map(|(a, _)| a.to_string()),
        function_name: call.map(|(_, f)| f.to_string()),
    }
}

static CATALOG: Lazy<Vec<Strategy>> = Lazy::new(|| {
    vec![
        entry(
            "yield-optimizer",
            "Yield Optimizer Pro",
            "Automatically moves funds to highest yielding protocols across chains with risk management",
            RiskTier::Medium,
            12.8,
            &["Ethereum", "Arbitrum", "Optimism", "Base"],
            &["Aave", "Compound", "Curve", "Uniswap V3"],
            45_000_000.0,
            true,
            "bridge-execute",
            "USDC",
            500.0,
            Some((YIELD_VAULT, "deposit")),
            &[
                "Bridge USDC to Ethereum",
                "Approve vault spend",
                "Deposit into yield vault",
            ],
        ),
        entry(
            "safe-staking",
            "Safe Staking Suite",
            "Low-risk staking across multiple chains with insurance coverage",
            RiskTier::Low,
            5.2,
            &["Ethereum", "Polygon"],
            &["Lido", "Rocket Pool", "Stakewise"],
            32_000_000.0,
            true,
            "execute",
            "ETH",
            0.5,
            Some((STAKING_VAULT, "stake")),
            &["Stake ETH"],
        ),
        entry(
            "airdrop-hunter",
            "Airdrop Hunter Max",
            "Optimizes for potential airdrops while maintaining yield generation",
            RiskTier::High,
            18.3,
            &["Base", "Arbitrum", "zkSync", "Starknet"],
            &["LayerZero", "zkSync Era", "Starknet", "Arbitrum Nova"],
            15_600_000.0,
            false,
            "bridge",
            "USDC",
            100.0,
            None,
            &["Bridge USDC to Base"],
        ),
        entry(
            "defi-bluechip",
            "DeFi Blue Chip",
            "Conservative strategy focusing on established protocols with proven track records",
            RiskTier::Low,
            7.4,
            &["Ethereum", "Arbitrum"],
            &["Uniswap", "Aave", "Compound", "MakerDAO"],
            89_000_000.0,
            false,
            "bridge",
            "USDC",
            250.0,
            None,
            &["Bridge USDC to Ethereum"],
        ),
    ]
    .into_iter()
    .map(|wire| Strategy::try_from(wire).expect("catalog strategies must be valid"))
    .collect()
});

/// All predefined strategies, in display order.
#[must_use]
pub fn all() -> &'static [Strategy] {
    &CATALOG
}

#[must_use]
pub fn find(id: &str) -> Option<&'static Strategy> {
    CATALOG.iter().find(|s| s.id() == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyKind;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_is_valid_and_unique() {
        let ids: HashSet<_> = all().iter().map(Strategy::id).collect();
        assert_eq!(ids.len(), all().len());
        assert_eq!(all().len(), 4);
    }

    #[test]
    fn test_catalog_covers_every_kind() {
        let kinds: HashSet<_> = all().iter().map(Strategy::kind).collect();
        assert!(kinds.contains(&StrategyKind::Bridge));
        assert!(kinds.contains(&StrategyKind::Execute));
        assert!(kinds.contains(&StrategyKind::BridgeExecute));
    }

    #[test]
    fn test_find() {
        assert_eq!(find("safe-staking").map(Strategy::risk), Some(RiskTier::Low));
        assert!(find("missing").is_none());
    }
}
