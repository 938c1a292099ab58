//! HTTP client for the strategy generation service.

use super::{GenerationApi, GenerationError, extract_strategy};
use crate::strategy::Strategy;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

/// POSTs `{"prompt": ...}` to the generation endpoint.
pub struct HttpGenerationClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpGenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerationClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpGenerationClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
        }
    }

    fn build_headers(&self) -> Result<HeaderMap, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                GenerationError::Malformed("API key contains invalid header characters".into())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }

    fn map_transport(&self, e: &reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.timeout.as_secs())
        } else {
            GenerationError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl GenerationApi for HttpGenerationClient {
    fn id(&self) -> &str {
        "http"
    }

    async fn generate_strategy(&self, prompt: &str) -> Result<Strategy, GenerationError> {
        let headers = self.build_headers()?;
        debug!(endpoint = %self.endpoint, "Requesting strategy generation");

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| self.map_transport(&e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(&response);
            return Err(GenerationError::RateLimited { retry_after });
        }
        let text = response.text().await.map_err(|e| self.map_transport(&e))?;

        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        extract_strategy(&text)
    }
}

/// Readable message from an error body: `{"error": {"message", "code"}}`,
/// `{"error": "..."}` or `{"message": "..."}`. Anything else is returned
/// trimmed, or the empty-body placeholder.
fn error_message(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    let error = json.get("error");
    let message = error
        .and_then(|e| e.get("message").or(Some(e)))
        .or_else(|| json.get("message"))
        .and_then(|m| m.as_str());
    match (message, error.and_then(|e| e.get("code")).and_then(|c| c.as_str())) {
        (Some(message), Some(code)) => format!("{message} ({code})"),
        (Some(message), None) => message.to_string(),
        (None, _) => body.to_string(),
    }
}

/// Extract and parse `Retry-After` header from a response.
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    let value = response.headers().get(RETRY_AFTER)?;
    let s = value.to_str().ok()?;
    parse_retry_after_value(s)
}

/// Parse a `Retry-After` header value as seconds, rounding fractions up.
/// HTTP-date values are not supported.
fn parse_retry_after_value(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        Some(secs.max(1))
    } else if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() && f > 0.0 {
            Some((f.ceil() as u64).max(1))
        } else {
            None
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(key: Option<&str>) -> HttpGenerationClient {
        HttpGenerationClient::new(
            "http://127.0.0.1:9/generate",
            key.map(str::to_string),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_bearer_auth() {
        let headers = client(Some("test-token")).build_headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer test-token");
    }

    #[test]
    fn test_no_key_no_auth_header() {
        assert!(client(None).build_headers().unwrap().get(AUTHORIZATION).is_none());
        assert!(client(Some("  ")).build_headers().unwrap().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", client(Some("secret")));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after_value("30"), Some(30));
        assert_eq!(parse_retry_after_value("0"), Some(1));
        assert_eq!(parse_retry_after_value("2.5"), Some(3));
        assert_eq!(parse_retry_after_value("  30  "), Some(30));
        assert_eq!(
            parse_retry_after_value("Thu, 01 Jan 2026 00:00:00 GMT"),
            None
        );
        assert_eq!(parse_retry_after_value("-1.5"), None);
        assert_eq!(parse_retry_after_value("NaN"), None);
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error":{"message":"quota exhausted","code":"quota"}}"#),
            "quota exhausted (quota)"
        );
        assert_eq!(error_message(r#"{"error":"bad prompt"}"#), "bad prompt");
        assert_eq!(error_message(r#"{"message":"model offline"}"#), "model offline");
        assert_eq!(error_message(" upstream down \n"), "upstream down");
        assert_eq!(error_message(r#"{"detail":1}"#), r#"{"detail":1}"#);
        assert_eq!(error_message(""), "empty response body");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let err = client(None).generate_strategy("anything").await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Network(_) | GenerationError::Timeout(_)
        ));
    }
}
