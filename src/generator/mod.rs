//! Prompt to strategy generation with a local fallback.
//!
//! The external service is best effort. Any failure (timeout, transport,
//! bad answer) yields a locally synthesized bridge strategy plus a warning,
//! so a generation request always ends with something executable.

mod client;
mod warning;

pub use client::HttpGenerationClient;
pub use warning::{GenerationWarning, WarningCategory};

use crate::chain;
use crate::strategy::{RiskTier, Strategy, StrategyError, StrategyWire};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Outermost JSON object in a response that wraps it in prose.
static JSON_EXTRACTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("JSON extractor regex must be valid"));

/// Last fallback id handed out, in unix millis.
static LAST_FALLBACK_ID: AtomicI64 = AtomicI64::new(0);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("No answer within {0}s")]
    Timeout(u64),

    #[error(
        "Rate limited{}",
        .retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default()
    )]
    RateLimited { retry_after: Option<u64> },

    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid strategy: {0}")]
    Strategy(#[from] StrategyError),
}

/// External strategy generation service.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    fn id(&self) -> &str;

    async fn generate_strategy(&self, prompt: &str) -> Result<Strategy, GenerationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Generated(Strategy),
    Fallback {
        strategy: Strategy,
        warning: GenerationWarning,
    },
}

impl GenerationOutcome {
    #[must_use]
    pub fn strategy(&self) -> &Strategy {
        match self {
            GenerationOutcome::Generated(strategy)
            | GenerationOutcome::Fallback { strategy, .. } => strategy,
        }
    }

    #[must_use]
    pub fn warning(&self) -> Option<&GenerationWarning> {
        match self {
            GenerationOutcome::Generated(_) => None,
            GenerationOutcome::Fallback { warning, .. } => Some(warning),
        }
    }

    #[must_use]
    pub fn into_strategy(self) -> Strategy {
        match self {
            GenerationOutcome::Generated(strategy)
            | GenerationOutcome::Fallback { strategy, .. } => strategy,
        }
    }
}

/// Token, amount and chains of the fallback strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackTemplate {
    token: String,
    amount: f64,
    chains: Vec<String>,
}

impl FallbackTemplate {
    /// Validates by building a probe strategy from the template.
    pub fn new(
        token: impl Into<String>,
        amount: f64,
        chains: Vec<String>,
    ) -> Result<Self, StrategyError> {
        let template = Self {
            token: token.into(),
            amount,
            chains,
        };
        Strategy::try_from(template.wire("ai-0".to_string(), String::new()))?;
        Ok(template)
    }

    fn wire(&self, id: String, prompt: String) -> StrategyWire {
        let destination = self
            .chains
            .first()
            .and_then(|c| chain::by_name(c))
            .map_or("the destination chain", |c| c.name);
        StrategyWire {
            id,
            name: "AI Generated Strategy".to_string(),
            description: prompt,
            risk: RiskTier::Medium,
            apy: 0.0,
            chains: self.chains.clone(),
            protocols: Vec::new(),
            tvl: 0.0,
            recommended: false,
            kind: "bridge".to_string(),
            execution_steps: vec![format!("Bridge {} to {destination}", self.token)],
            recommended_amount: self.amount,
            token: self.token.clone(),
            contract_address: None,
            function_name: None,
        }
    }
}

impl Default for FallbackTemplate {
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

/// `ai-<unix millis>`, strictly increasing within the process.
fn next_fallback_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_FALLBACK_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_FALLBACK_ID.compare_exchange_weak(
            last,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return format!("ai-{next}"),
            Err(actual) => last = actual,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Body {
    Envelope { strategy: StrategyWire },
    Bare(StrategyWire),
}

/// Parse a generated strategy from a response body.
///
/// Accepts the strategy object, `{"strategy": {...}}`, or text wrapping
/// either of those.
pub fn extract_strategy(text: &str) -> Result<Strategy, GenerationError> {
    let body: Body = match serde_json::from_str(text.trim()) {
        Ok(body) => body,
        Err(_) => {
            let json_str = JSON_EXTRACTOR
                .find(text)
                .ok_or_else(|| GenerationError::Malformed("no JSON object in response".into()))?
                .as_str();
            serde_json::from_str(json_str)
                .map_err(|e| GenerationError::Malformed(format!("not a strategy: {e}")))?
        }
    };
    let wire = match body {
        Body::Envelope { strategy } | Body::Bare(strategy) => strategy,
    };
    Ok(Strategy::try_from(wire)?)
}

pub struct StrategyGenerator {
    api: Arc<dyn GenerationApi>,
    fallback: FallbackTemplate,
    timeout: Duration,
}

impl StrategyGenerator {
    pub fn new(api: Arc<dyn GenerationApi>) -> Self {
        Self {
            api,
            fallback: FallbackTemplate::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackTemplate) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generate a strategy for `prompt`.
    ///
    /// Only an empty prompt is an error; service failures produce
    /// [`GenerationOutcome::Fallback`].
    pub async fn generate(&self, prompt: &str) -> Result<GenerationOutcome, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let result = match tokio::time::timeout(self.timeout, self.api.generate_strategy(prompt))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.timeout.as_secs())),
        };

        match result {
            Ok(strategy) => {
                info!(strategy = strategy.id(), api = self.api.id(), "Strategy generated");
                Ok(GenerationOutcome::Generated(strategy))
            }
            Err(e) => {
                let warning = GenerationWarning::from_error(&e);
                warn!(
                    api = self.api.id(),
                    category = ?warning.category,
                    "Generation failed, using fallback: {e}"
                );
                Ok(GenerationOutcome::Fallback {
                    strategy: self.fallback_strategy(prompt)?,
                    warning,
                })
            }
        }
    }

    /// The deterministic local strategy for `prompt`.
    pub fn fallback_strategy(&self, prompt: &str) -> Result<Strategy, GenerationError> {
        let wire = self.fallback.wire(next_fallback_id(), prompt.to_string());
        Ok(Strategy::try_from(wire)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{StrategyKind, catalog};

    enum Script {
        Answer(Strategy),
        Fail(fn() -> GenerationError),
        Hang,
    }

    struct ScriptedApi(Script);

    #[async_trait]
    impl GenerationApi for ScriptedApi {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn generate_strategy(&self, _prompt: &str) -> Result<Strategy, GenerationError> {
            match &self.0 {
                Script::Answer(s) => Ok(s.clone()),
                Script::Fail(make) => Err(make()),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(GenerationError::Network("unreachable".into()))
                }
            }
        }
    }

    fn generator(script: Script) -> StrategyGenerator {
        StrategyGenerator::new(Arc::new(ScriptedApi(script)))
    }

    #[tokio::test]
    async fn test_generated_strategy_returned() {
        let expected = catalog::find("defi-bluechip").unwrap().clone();
        let outcome = generator(Script::Answer(expected.clone()))
            .generate("blue chips please")
            .await
            .unwrap();
        assert_eq!(outcome, GenerationOutcome::Generated(expected));
        assert!(outcome.warning().is_none());
    }

    #[tokio::test]
    async fn test_failure_falls_back() {
        let outcome = generator(Script::Fail(|| GenerationError::Api {
            status: 500,
            message: "internal error".into(),
        }))
        .generate("  medium risk yield on Arbitrum  ")
        .await
        .unwrap();

        let GenerationOutcome::Fallback { strategy, warning } = outcome else {
            panic!("expected fallback");
        };
        assert_eq!(warning.category, WarningCategory::ServerError);
        assert_eq!(strategy.kind(), StrategyKind::Bridge);
        assert_eq!(strategy.risk(), RiskTier::Medium);
        assert_eq!(strategy.description(), "medium risk yield on Arbitrum");
        assert!(strategy.id().starts_with("ai-"));
        assert_eq!(strategy.token(), "USDC");
        assert_eq!(strategy.recommended_amount(), 100.0);
        assert_eq!(strategy.chains()[0], "Polygon");
        assert!(strategy.action().contract_call().is_none());
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let outcome = generator(Script::Hang)
            .with_timeout(Duration::from_millis(20))
            .generate("anything")
            .await
            .unwrap();
        assert_eq!(
            outcome.warning().map(|w| w.category),
            Some(WarningCategory::Timeout)
        );
    }

    #[tokio::test]
    async fn test_malformed_falls_back() {
        let outcome = generator(Script::Fail(|| GenerationError::Malformed("truncated".into())))
            .generate("anything")
            .await
            .unwrap();
        assert_eq!(
            outcome.warning().map(|w| w.category),
            Some(WarningCategory::MalformedResponse)
        );
    }

    #[tokio::test]
    async fn test_empty_prompt_is_error() {
        let g = generator(Script::Fail(|| GenerationError::Network("down".into())));
        assert!(matches!(g.generate("   ").await, Err(GenerationError::EmptyPrompt)));
    }

    #[tokio::test]
    async fn test_configured_fallback() {
        let template =
            FallbackTemplate::new("ETH", 0.25, vec!["Base".into(), "Ethereum".into()]).unwrap();
        let outcome = generator(Script::Fail(|| GenerationError::Network("down".into())))
            .with_fallback(template)
            .generate("stake")
            .await
            .unwrap();
        let strategy = outcome.into_strategy();
        assert_eq!(strategy.token(), "ETH");
        assert_eq!(strategy.recommended_amount(), 0.25);
        assert_eq!(strategy.execution_steps(), ["Bridge ETH to Base"]);
    }

    #[test]
    fn test_invalid_fallback_template() {
        assert!(FallbackTemplate::new("USDC", 0.0, vec!["Polygon".into()]).is_err());
        assert!(FallbackTemplate::new("USDC", 1.0, vec![]).is_err());
    }

    #[test]
    fn test_fallback_ids_strictly_increase() {
        let g = generator(Script::Hang);
        let ids: Vec<i64> = (0..50)
            .map(|_| {
                let s = g.fallback_strategy("p").unwrap();
                s.id().trim_start_matches("ai-").parse().unwrap()
            })
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_extract_strategy_forms() {
        let bare = r#"{"id":"g1","name":"G","risk":"low","chains":["Polygon"],
            "type":"bridge","recommendedAmount":5,"token":"usdc"}"#;
        assert_eq!(extract_strategy(bare).unwrap().token(), "USDC");

        let envelope = format!(r#"{{"strategy": {bare}}}"#);
        assert_eq!(extract_strategy(&envelope).unwrap().id(), "g1");

        let chatty = format!("Here is your strategy:\n{bare}\nGood luck!");
        assert_eq!(extract_strategy(&chatty).unwrap().id(), "g1");
    }

    #[test]
    fn test_extract_strategy_rejects_garbage() {
        assert!(matches!(
            extract_strategy("no json here"),
            Err(GenerationError::Malformed(_))
        ));
        let swap = r#"{"id":"x","name":"X","risk":"low","chains":["Polygon"],
            "type":"swap","recommendedAmount":1,"token":"USDC"}"#;
        assert!(matches!(
            extract_strategy(swap),
            Err(GenerationError::Strategy(StrategyError::UnsupportedStrategyType(_)))
        ));
    }
}
