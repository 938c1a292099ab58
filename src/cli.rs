use crate::balance::BalanceCache;
use crate::config::Config;
use crate::executor::{ExecutionEvent, ExecutionResult, StrategyExecutor};
use crate::generator::{GenerationApi, GenerationError, HttpGenerationClient, StrategyGenerator};
use crate::provider::{
    AutoConfirm, ConfirmChain, Connector, FeeCeiling, Intent, IntentDecision, IntentHook,
    ProviderHooks, SimulatedConnector, WalletHandle,
};
use crate::session::ProviderSession;
use crate::strategy::{Strategy, StrategyWire, catalog};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "aetherflow", version, about = "Cross-chain strategy orchestration")]
pub struct Cli {
    /// Config file (default: <config dir>/aetherflow/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short = 'o', long, default_value = "text", value_enum, global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the predefined strategies
    Strategies,
    /// Show unified balances across chains
    Balances,
    /// Execute a catalog strategy, or one read from a JSON file
    Execute(ExecuteArgs),
    /// Generate a strategy from a prompt
    Generate(GenerateArgs),
}

#[derive(Parser, Debug)]
pub struct ExecuteArgs {
    /// Catalog strategy id
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub id: Option<String>,

    /// Amount to move, instead of the recommended amount
    #[arg(long)]
    pub amount: Option<f64>,

    /// Strategy JSON file
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Confirm fees without asking
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// What the strategy should do
    #[arg(required = true)]
    pub prompt: String,

    /// Execute the strategy once generated
    #[arg(long)]
    pub execute: bool,

    /// Confirm fees without asking
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Asks on the terminal before fee-incurring steps. Anything but yes denies.
struct PromptConfirm;

#[async_trait]
impl IntentHook for PromptConfirm {
    async fn confirm(&self, intent: &Intent) -> IntentDecision {
        let question = format!(
            "Execute cross-chain strategy? Fee: {} USDC [y/N] ",
            intent.fees.total
        );
        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stderr = io::stderr();
            write!(stderr, "{question}")?;
            stderr.flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) if is_yes(&line) => IntentDecision::Allow,
            Ok(Ok(_)) => IntentDecision::Deny,
            Ok(Err(e)) => {
                warn!("Confirmation prompt failed: {e}");
                IntentDecision::Deny
            }
            Err(e) => {
                warn!("Confirmation prompt task failed: {e}");
                IntentDecision::Deny
            }
        }
    }

    fn name(&self) -> &'static str {
        "prompt"
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// `--yes` or `auto_confirm` skip the prompt; otherwise the fee ceiling (if
/// configured) runs before it.
fn intent_hook(yes: bool, config: &Config) -> Arc<dyn IntentHook> {
    if yes || config.execution.auto_confirm {
        return Arc::new(AutoConfirm);
    }
    let mut chain = ConfirmChain::new();
    if let Some(max_fee) = config.execution.max_fee {
        chain = chain.with(Arc::new(FeeCeiling::new(max_fee)));
    }
    Arc::new(chain.with(Arc::new(PromptConfirm)))
}

/// Stands in for the generation service when no endpoint is configured.
struct NoEndpoint;

#[async_trait]
impl GenerationApi for NoEndpoint {
    fn id(&self) -> &str {
        "none"
    }

    async fn generate_strategy(&self, _prompt: &str) -> Result<Strategy, GenerationError> {
        Err(GenerationError::Network(
            "no generation endpoint configured".to_string(),
        ))
    }
}

fn generator(config: &Config) -> Result<StrategyGenerator> {
    let api: Arc<dyn GenerationApi> = match &config.generator.endpoint {
        Some(endpoint) => Arc::new(HttpGenerationClient::new(
            endpoint.clone(),
            config.generator.api_key.clone(),
            config.generator_timeout(),
        )),
        None => Arc::new(NoEndpoint),
    };
    let fallback = config
        .fallback_template()
        .context("Invalid [generator.fallback] config")?;
    Ok(StrategyGenerator::new(api)
        .with_fallback(fallback)
        .with_timeout(config.generator_timeout()))
}

/// Demo account used against the simulated provider when none is configured.
fn simulated_wallet() -> WalletHandle {
    WalletHandle::new("simulated").with_address(Address::repeat_byte(0xae))
}

/// Initialized session plus its balance cache.
struct Runtime {
    session: Arc<ProviderSession>,
    balances: Arc<BalanceCache>,
}

impl Runtime {
    async fn open(config: &Config, hooks: ProviderHooks) -> Result<Self> {
        let connector: Arc<dyn Connector> = Arc::new(SimulatedConnector::new(config.simulation()));
        let wallet = match config.ambient_wallet()? {
            Some(wallet) => wallet,
            None => {
                debug!("No wallet configured, using the simulated account");
                simulated_wallet()
            }
        };
        let session = Arc::new(ProviderSession::new(
            connector,
            config.network,
            Some(wallet),
            hooks,
        ));
        session.initialize(None).await?;
        Ok(Self {
            session,
            balances: Arc::new(BalanceCache::new()),
        })
    }

    async fn close(&self) {
        self.session.close().await;
    }
}

/// Exit status for a settled attempt: 0 success, 2 user denial, 1 otherwise.
fn exit_status(result: &ExecutionResult) -> u8 {
    if result.is_success() {
        0
    } else if result.is_user_denial() {
        2
    } else {
        1
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn compact_usd(value: f64) -> String {
    if value >= 1e9 {
        format!("${:.1}B", value / 1e9)
    } else if value >= 1e6 {
        format!("${:.1}M", value / 1e6)
    } else if value >= 1e3 {
        format!("${:.1}K", value / 1e3)
    } else {
        format!("${value:.0}")
    }
}

fn print_strategy(strategy: &Strategy) {
    println!("{} ({})", strategy.name(), strategy.id());
    if !strategy.description().is_empty() {
        println!("  {}", strategy.description());
    }
    println!(
        "  type: {}  risk: {}  token: {}  amount: {}",
        strategy.kind(),
        strategy.risk(),
        strategy.token(),
        strategy.recommended_amount()
    );
    println!("  chains: {}", strategy.chains().join(" <- "));
    for (i, step) in strategy.execution_steps().iter().enumerate() {
        println!("  {}. {step}", i + 1);
    }
}

fn list_strategies(output: OutputFormat) -> Result<()> {
    let strategies = catalog::all();
    match output {
        OutputFormat::Json => {
            let wire: Vec<StrategyWire> = strategies.iter().cloned().map(Into::into).collect();
            print_json(&serde_json::to_value(wire)?)
        }
        OutputFormat::Text => {
            println!(
                "{:<22} {:<26} {:<6} {:>7} {:>8} {:<15} CHAINS",
                "ID", "NAME", "RISK", "APY", "TVL", "TYPE"
            );
            for s in strategies {
                let marker = if s.recommended() { "*" } else { "" };
                println!(
                    "{:<22} {:<26} {:<6} {:>6.1}% {:>8} {:<15} {}",
                    format!("{}{marker}", s.id()),
                    s.name(),
                    s.risk().as_str(),
                    s.apy(),
                    compact_usd(s.tvl()),
                    s.kind().as_str(),
                    s.chains().join(", ")
                );
            }
            Ok(())
        }
    }
}

async fn show_balances(config: &Config, output: OutputFormat) -> Result<ExitCode> {
    // Read-only: nothing here should ever confirm an intent.
    let rt = Runtime::open(config, ProviderHooks::new(Arc::new(ConfirmChain::new()))).await?;
    let refreshed = rt.balances.refresh(&rt.session).await;
    rt.close().await;
    refreshed?;

    let assets = rt.balances.snapshot();
    let distribution = rt.balances.chain_distribution();
    match output {
        OutputFormat::Json => print_json(&json!({
            "assets": &*assets,
            "totalFiat": rt.balances.total_fiat(),
            "distribution": distribution,
        }))?,
        OutputFormat::Text => {
            for asset in assets.iter() {
                let fiat = asset
                    .balance_in_fiat
                    .map(|v| format!("${v:.2}"))
                    .unwrap_or_default();
                println!("{:<6} {:>16} {:>12}", asset.symbol, asset.balance, fiat);
                for chain in &asset.breakdown {
                    println!("       {:<12} {:>16}", chain.chain_name, chain.balance);
                }
            }
            println!("Total: ${:.2}", rt.balances.total_fiat());
            for share in distribution {
                println!(
                    "  {:<12} ${:>12.2} {:>5.1}%",
                    share.chain_name, share.value, share.percent
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn print_progress(mut rx: mpsc::Receiver<ExecutionEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ExecutionEvent::Started { strategy, kind } => {
                eprintln!("Starting {kind} strategy {strategy}");
            }
            ExecutionEvent::StepsExpected(steps) => {
                let labels: Vec<&str> = steps.iter().map(|s| s.kind.label()).collect();
                eprintln!("Steps: {}", labels.join(" > "));
            }
            ExecutionEvent::StepCompleted {
                ordinal,
                total,
                step,
            } => {
                eprintln!("  [{}/{total}] {}", ordinal + 1, step.kind.label());
            }
            ExecutionEvent::Settled(_) => {}
            ExecutionEvent::BalancesRefreshed(count) => {
                debug!(count, "Balances refreshed");
            }
            ExecutionEvent::BalanceRefreshFailed(e) => {
                eprintln!("Balance refresh failed: {e}");
            }
        }
    }
}

async fn execute_strategy(
    rt: &Runtime,
    strategy: &Strategy,
    amount: Option<f64>,
    output: OutputFormat,
) -> Result<ExecutionResult> {
    let (tx, rx) = mpsc::channel(64);
    let executor =
        StrategyExecutor::new(Arc::clone(&rt.session), Arc::clone(&rt.balances)).with_events(tx);
    let printer = tokio::spawn(print_progress(rx));

    let result = match amount {
        Some(amount) => executor.execute_with_amount(strategy, amount).await,
        None => executor.execute(strategy).await,
    };
    // Closes the event channel so the printer drains and exits.
    drop(executor);
    let _ = printer.await;
    let result = result?;

    match output {
        OutputFormat::Json => print_json(&serde_json::to_value(&result)?)?,
        OutputFormat::Text => match &result {
            ExecutionResult::Success { explorer_url } => {
                println!("Execution succeeded");
                if let Some(url) = explorer_url {
                    println!("Explorer: {url}");
                }
            }
            ExecutionResult::Failure { error, .. } => println!("Execution failed: {error}"),
        },
    }
    Ok(result)
}

async fn execute(config: &Config, args: ExecuteArgs, output: OutputFormat) -> Result<ExitCode> {
    let strategy = match (&args.file, &args.id) {
        (Some(path), _) => Strategy::from_file(path)
            .with_context(|| format!("Failed to load strategy {}", path.display()))?,
        (None, Some(id)) => catalog::find(id)
            .cloned()
            .with_context(|| format!("Unknown strategy '{id}'"))?,
        (None, None) => anyhow::bail!("A strategy id or --file is required"),
    };

    let rt = Runtime::open(config, ProviderHooks::new(intent_hook(args.yes, config))).await?;
    let result = execute_strategy(&rt, &strategy, args.amount, output).await;
    rt.close().await;
    Ok(ExitCode::from(exit_status(&result?)))
}

async fn generate(config: &Config, args: GenerateArgs, output: OutputFormat) -> Result<ExitCode> {
    let outcome = generator(config)?.generate(&args.prompt).await?;

    match output {
        OutputFormat::Json => print_json(&json!({
            "strategy": StrategyWire::from(outcome.strategy().clone()),
            "warning": outcome.warning().map(ToString::to_string),
        }))?,
        OutputFormat::Text => {
            if let Some(warning) = outcome.warning() {
                eprintln!("Warning: {warning}");
            }
            print_strategy(outcome.strategy());
        }
    }
    if !args.execute {
        return Ok(ExitCode::SUCCESS);
    }

    let strategy = outcome.into_strategy();
    let rt = Runtime::open(config, ProviderHooks::new(intent_hook(args.yes, config))).await?;
    let result = execute_strategy(&rt, &strategy, None, output).await;
    rt.close().await;
    Ok(ExitCode::from(exit_status(&result?)))
}

/// Run a CLI command.
pub async fn run(cli: Cli) -> ExitCode {
    match run_inner(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run_inner(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Strategies => list_strategies(cli.output).map(|()| ExitCode::SUCCESS),
        Commands::Balances => show_balances(&config, cli.output).await,
        Commands::Execute(args) => execute(&config, args, cli.output).await,
        Commands::Generate(args) => generate(&config, args, cli.output).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FailureKind;
    use crate::generator::GenerationOutcome;
    use crate::provider::hooks::FeeEstimate;

    fn intent(fee: &str) -> Intent {
        Intent {
            token: "USDC".into(),
            amount: "100".into(),
            destination_chain_id: 137,
            source_chain_ids: vec![42161],
            fees: FeeEstimate {
                total: fee.into(),
                gas: "0".into(),
                protocol: "0".into(),
            },
        }
    }

    #[test]
    fn test_parse_execute_by_id() {
        let cli = Cli::try_parse_from(["aetherflow", "execute", "safe-staking", "-y"]).unwrap();
        let Commands::Execute(args) = cli.command else {
            panic!("Expected Execute command");
        };
        assert_eq!(args.id.as_deref(), Some("safe-staking"));
        assert!(args.yes);
        assert!(args.amount.is_none());
    }

    #[test]
    fn test_parse_execute_from_file() {
        let cli = Cli::try_parse_from([
            "aetherflow",
            "execute",
            "--file",
            "s.json",
            "--amount",
            "12.5",
        ])
        .unwrap();
        let Commands::Execute(args) = cli.command else {
            panic!("Expected Execute command");
        };
        assert!(args.id.is_none());
        assert_eq!(args.file, Some(PathBuf::from("s.json")));
        assert_eq!(args.amount, Some(12.5));
    }

    #[test]
    fn test_execute_requires_id_or_file() {
        assert!(Cli::try_parse_from(["aetherflow", "execute"]).is_err());
        assert!(
            Cli::try_parse_from(["aetherflow", "execute", "x", "--file", "s.json"]).is_err()
        );
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "aetherflow",
            "strategies",
            "-o",
            "json",
            "-v",
            "--config",
            "c.toml",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Strategies));
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn test_parse_generate() {
        let cli =
            Cli::try_parse_from(["aetherflow", "generate", "move my USDC", "--execute"]).unwrap();
        let Commands::Generate(args) = cli.command else {
            panic!("Expected Generate command");
        };
        assert_eq!(args.prompt, "move my USDC");
        assert!(args.execute);
        assert!(!args.yes);
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n\n"));
        assert!(!is_yes("yep"));
    }

    #[tokio::test]
    async fn test_intent_hook_selection() {
        let config = Config::default();
        assert_eq!(intent_hook(true, &config).name(), "auto_confirm");
        assert_eq!(intent_hook(false, &config).name(), "confirm_chain");

        let mut config = Config::default();
        config.execution.auto_confirm = true;
        assert_eq!(intent_hook(false, &config).name(), "auto_confirm");

        // The ceiling denies before the prompt would ask.
        let mut config = Config::default();
        config.execution.max_fee = Some(0.1);
        let hook = intent_hook(false, &config);
        assert_eq!(hook.confirm(&intent("0.42")).await, IntentDecision::Deny);
    }

    #[test]
    fn test_exit_codes() {
        let ok = ExecutionResult::Success { explorer_url: None };
        let denied = ExecutionResult::Failure {
            error: "denied".into(),
            kind: FailureKind::UserDenied,
        };
        let failed = ExecutionResult::Failure {
            error: "reverted".into(),
            kind: FailureKind::Provider,
        };
        assert_eq!(exit_status(&ok), 0);
        assert_eq!(exit_status(&denied), 2);
        assert_eq!(exit_status(&failed), 1);
    }

    #[tokio::test]
    async fn test_generate_without_endpoint_falls_back() {
        let outcome = generator(&Config::default())
            .unwrap()
            .generate("spread my USDC")
            .await
            .unwrap();
        assert!(matches!(outcome, GenerationOutcome::Fallback { .. }));
        assert!(outcome.strategy().id().starts_with("ai-"));
        assert_eq!(outcome.strategy().description(), "spread my USDC");
    }

    #[tokio::test]
    async fn test_runtime_uses_simulated_wallet() {
        let rt = Runtime::open(
            &Config::default(),
            ProviderHooks::new(Arc::new(AutoConfirm)),
        )
        .await
        .unwrap();
        assert_eq!(
            rt.session.wallet_address().await,
            Some(Address::repeat_byte(0xae))
        );
        assert_eq!(rt.balances.refresh(&rt.session).await.unwrap(), 4);
        rt.close().await;
        assert!(!rt.session.is_initialized().await);
    }

    #[tokio::test]
    async fn test_execute_catalog_strategy() {
        let mut config = Config::default();
        config.simulator.step_delay_ms = 0;
        let rt = Runtime::open(&config, ProviderHooks::new(Arc::new(AutoConfirm)))
            .await
            .unwrap();
        let strategy = catalog::find("safe-staking").unwrap();
        let result = execute_strategy(&rt, strategy, None, OutputFormat::Json)
            .await
            .unwrap();
        assert!(result.is_success());
        assert!(result.explorer_url().is_some());
        rt.close().await;
    }
}
