//! Soft warnings shown when generation falls back to a local strategy.

use super::GenerationError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    Timeout,
    Network,
    RateLimited,
    ServerError,
    MalformedResponse,
    Other,
}

impl WarningCategory {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            WarningCategory::Timeout => "Request timed out",
            WarningCategory::Network => "Network error",
            WarningCategory::RateLimited => "Rate limited",
            WarningCategory::ServerError => "Server error",
            WarningCategory::MalformedResponse => "Malformed response",
            WarningCategory::Other => "Generation failed",
        }
    }

    /// Classify a generation failure.
    #[must_use]
    pub fn of(err: &GenerationError) -> Self {
        match err {
            GenerationError::Timeout(_) => WarningCategory::Timeout,
            GenerationError::RateLimited { .. } => WarningCategory::RateLimited,
            GenerationError::Malformed(_) | GenerationError::Strategy(_) => {
                WarningCategory::MalformedResponse
            }
            GenerationError::Api { status, .. } if *status == 429 => WarningCategory::RateLimited,
            GenerationError::Api { status, .. } if *status >= 500 => WarningCategory::ServerError,
            other => from_message(&other.to_string()),
        }
    }
}

/// Classify from an error message, for errors without structure.
fn from_message(err: &str) -> WarningCategory {
    let err_lower = err.to_lowercase();

    if err.contains("429") || err_lower.contains("rate limit") {
        return WarningCategory::RateLimited;
    }

    if err_lower.contains("timeout")
        || err_lower.contains("timed out")
        || err_lower.contains("deadline exceeded")
    {
        return WarningCategory::Timeout;
    }

    if err_lower.contains("connection")
        || err_lower.contains("network")
        || err_lower.contains("dns")
        || err_lower.contains("resolve")
    {
        return WarningCategory::Network;
    }

    if err.contains("500")
        || err.contains("502")
        || err.contains("503")
        || err.contains("504")
        || err_lower.contains("server error")
        || err_lower.contains("internal error")
        || err_lower.contains("service unavailable")
        || err_lower.contains("bad gateway")
    {
        return WarningCategory::ServerError;
    }

    WarningCategory::Other
}

/// Why a fallback strategy was returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationWarning {
    pub category: WarningCategory,
    pub detail: String,
}

impl GenerationWarning {
    #[must_use]
    pub fn from_error(err: &GenerationError) -> Self {
        Self {
            category: WarningCategory::of(err),
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for GenerationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}. Using a fallback strategy.",
            self.category.label(),
            self.detail
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_errors() {
        assert_eq!(
            WarningCategory::of(&GenerationError::Timeout(30)),
            WarningCategory::Timeout
        );
        assert_eq!(
            WarningCategory::of(&GenerationError::RateLimited { retry_after: Some(5) }),
            WarningCategory::RateLimited
        );
        assert_eq!(
            WarningCategory::of(&GenerationError::Malformed("no JSON".into())),
            WarningCategory::MalformedResponse
        );
        assert_eq!(
            WarningCategory::of(&GenerationError::Api {
                status: 503,
                message: "unavailable".into()
            }),
            WarningCategory::ServerError
        );
    }

    #[test]
    fn test_client_error_is_other() {
        assert_eq!(
            WarningCategory::of(&GenerationError::Api {
                status: 401,
                message: "invalid api key".into()
            }),
            WarningCategory::Other
        );
    }

    #[test]
    fn test_message_classification() {
        assert_eq!(from_message("HTTP 429: rate limit"), WarningCategory::RateLimited);
        assert_eq!(from_message("Request timed out"), WarningCategory::Timeout);
        assert_eq!(
            from_message("error sending request: connection refused"),
            WarningCategory::Network
        );
        assert_eq!(from_message("dns error: failed to lookup"), WarningCategory::Network);
        assert_eq!(from_message("HTTP 502 Bad Gateway"), WarningCategory::ServerError);
        assert_eq!(from_message("Invalid API key"), WarningCategory::Other);
    }

    #[test]
    fn test_display() {
        let warning = GenerationWarning::from_error(&GenerationError::Timeout(30));
        assert_eq!(
            warning.to_string(),
            "Request timed out: No answer within 30s. Using a fallback strategy."
        );
    }
}
