//! Chain registry: display names used by strategies and balances, mapped to
//! EVM chain ids used by the execution provider.

use serde::{Deserialize, Serialize};

/// A chain known to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chain {
    pub id: u64,
    pub name: &'static str,
}

/// Chains the provider can route through, in display order.
pub const CHAINS: &[Chain] = &[
    Chain {
        id: 1,
        name: "Ethereum",
    },
    Chain {
        id: 42161,
        name: "Arbitrum",
    },
    Chain {
        id: 10,
        name: "Optimism",
    },
    Chain {
        id: 137,
        name: "Polygon",
    },
    Chain {
        id: 8453,
        name: "Base",
    },
    Chain {
        id: 324,
        name: "zkSync",
    },
    Chain {
        id: 534352,
        name: "Scroll",
    },
    Chain {
        id: 43114,
        name: "Avalanche",
    },
];

/// Look up a chain by display name (case-insensitive).
#[must_use]
pub fn by_name(name: &str) -> Option<Chain> {
    let name = name.trim();
    CHAINS
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .copied()
}

/// Look up a chain by id.
#[must_use]
pub fn by_id(id: u64) -> Option<Chain> {
    CHAINS.iter().find(|c| c.id == id).copied()
}

/// Display name for a chain id, falling back to the raw id.
#[must_use]
pub fn display_name(id: u64) -> String {
    by_id(id).map_or_else(|| format!("chain {id}"), |c| c.name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_ignores_case() {
        assert_eq!(by_name("polygon").map(|c| c.id), Some(137));
        assert_eq!(by_name(" Arbitrum ").map(|c| c.id), Some(42161));
        assert!(by_name("Starknet").is_none());
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(display_name(10), "Optimism");
        assert_eq!(display_name(999), "chain 999");
    }

    #[test]
    fn test_ids_are_unique() {
        for (i, a) in CHAINS.iter().enumerate() {
            for b in &CHAINS[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }
}
