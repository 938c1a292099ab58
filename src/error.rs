use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid strategy: {0}")]
    Strategy(#[from] crate::strategy::StrategyError),

    #[error("Provider error: {0}")]
    Provider(#[from] crate::provider::Error),

    #[error("Session error: {0}")]
    Session(#[from] crate::session::SessionError),

    #[error("Balance error: {0}")]
    Balance(#[from] crate::balance::BalanceError),

    #[error("Execution error: {0}")]
    Execute(#[from] crate::executor::ExecuteError),

    #[error("Generation error: {0}")]
    Generation(#[from] crate::generator::GenerationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
