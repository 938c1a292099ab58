use crate::generator::FallbackTemplate;
use crate::provider::simulated::{SimulationConfig, default_balances};
use crate::provider::{Network, UserAsset, WalletHandle};
use crate::strategy::StrategyError;
use alloy_primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides `[wallet] address`.
pub const WALLET_ENV: &str = "AETHERFLOW_WALLET";
/// Overrides `[generator] api_key`.
pub const GENERATOR_KEY_ENV: &str = "AETHERFLOW_GENERATOR_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: Network,
    pub wallet: WalletConfig,
    pub generator: GeneratorConfig,
    pub execution: ExecutionConfig,
    pub simulator: SimulatorConfig,
}

/// The ambient wallet used when no other is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub address: Option<String>,
    pub chain_id: Option<u64>,
    pub label: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            address: None,
            chain_id: None,
            label: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Generation service URL. Without one, generation always falls back.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub fallback: FallbackConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: 30,
            fallback: FallbackConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub token: String,
    pub amount: f64,
    pub chains: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            token: "USDC".to_string(),
            amount: 100.0,
            chains: vec![
                "Polygon".to_string(),
                "Arbitrum".to_string(),
                "Optimism".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Confirm every intent without asking.
    pub auto_confirm: bool,
    /// Deny intents whose total fee (USDC) exceeds this.
    pub max_fee: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Total fee quoted per intent, in USDC.
    pub fee: String,
    /// Delay between simulated step completions.
    pub step_delay_ms: u64,
    /// Seed balances (camelCase asset fields). Demo portfolio when absent.
    pub balances: Option<Vec<UserAsset>>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            fee: "0.42".to_string(),
            step_delay_ms: 250,
            balances: None,
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("aetherflow").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".aetherflow/config.toml"))
    }

    /// Load from `path`, or the default location. A missing default file
    /// yields defaults; a missing explicit file is an error. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(address) = lookup(WALLET_ENV).filter(|v| !v.trim().is_empty()) {
            self.wallet.address = Some(address);
        }
        if let Some(key) = lookup(GENERATOR_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.generator.api_key = Some(key);
        }
    }

    /// The ambient wallet, if an address is configured.
    pub fn ambient_wallet(&self) -> anyhow::Result<Option<WalletHandle>> {
        let Some(address) = &self.wallet.address else {
            return Ok(None);
        };
        let address: Address = address
            .trim()
            .parse()
            .with_context(|| format!("Invalid wallet address '{address}'"))?;
        let mut wallet = WalletHandle::new(self.wallet.label.clone()).with_address(address);
        if let Some(chain_id) = self.wallet.chain_id {
            wallet = wallet.with_chain_id(chain_id);
        }
        Ok(Some(wallet))
    }

    pub fn fallback_template(&self) -> Result<FallbackTemplate, StrategyError> {
        let f = &self.generator.fallback;
        FallbackTemplate::new(f.token.clone(), f.amount, f.chains.clone())
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator.timeout_secs.max(1))
    }

    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig::default()
            .with_balances(
                self.simulator
                    .balances
                    .clone()
                    .unwrap_or_else(default_balances),
            )
            .with_fee(self.simulator.fee.clone())
            .with_step_delay(Duration::from_millis(self.simulator.step_delay_ms))
    }
}
