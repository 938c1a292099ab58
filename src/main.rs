use aetherflow::cli::Cli;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        Some(EnvFilter::new("aetherflow=debug"))
    } else if std::env::var_os("RUST_LOG").is_some() {
        Some(EnvFilter::from_default_env())
    } else {
        None
    };
    if let Some(filter) = filter {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    aetherflow::cli::run(cli).await
}
