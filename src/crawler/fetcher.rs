//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests for city pages
//! - POST requests to the marketplace JSON API
//! - Error classification into transport, application and malformed failures

use crate::config::UserAgentConfig;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Value of the response `status` field that signals an application failure
pub const FAILURE_STATUS: &str = "failure";

/// Why a stage could not produce its output
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// No usable response (connection error, timeout, HTTP error status)
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response arrived but reported `status == "failure"`, or lacked the expected content
    #[error("application failure: {message}")]
    Application {
        message: String,
        body: Option<Value>,
    },

    /// A required field was missing or unparsable
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl StageError {
    /// Short reason code stored in failure records
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Application { .. } => "application",
            Self::Malformed(_) => "malformed",
        }
    }

    /// Whether the retry policy applies; malformed payloads do not change on refetch
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Application { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

/// Formats the crawler's user agent: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Example
///
/// ```no_run
/// use menu_harvest::config::UserAgentConfig;
/// use menu_harvest::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "MenuHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

fn classify_send_error(e: reqwest::Error) -> StageError {
    if e.is_timeout() {
        StageError::Transport("request timeout".to_string())
    } else if e.is_connect() {
        StageError::Transport("connection refused".to_string())
    } else {
        StageError::Transport(e.to_string())
    }
}

fn check_status(status: StatusCode) -> Result<(), StageError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(StageError::Transport(format!("HTTP {}", status.as_u16())))
    }
}

/// Fetches an HTML page
pub async fn fetch_page(client: &Client, url: &str) -> Result<String, StageError> {
    let response = client.get(url).send().await.map_err(classify_send_error)?;
    check_status(response.status())?;

    response.text().await.map_err(classify_send_error)
}

/// Posts a JSON request to an API endpoint and returns the decoded response
///
/// A response whose `status` is `"failure"` is an application failure and
/// carries the request body for diagnostics.
pub async fn post_json(client: &Client, url: &str, body: &Value) -> Result<Value, StageError> {
    let response = client
        .post(url)
        // The API rejects requests without this header
        .header("x-csrf-token", "x")
        .json(body)
        .send()
        .await
        .map_err(classify_send_error)?;
    check_status(response.status())?;

    let payload: Value = response
        .json()
        .await
        .map_err(|e| StageError::Transport(format!("undecodable response: {}", e)))?;

    if payload.get("status").and_then(Value::as_str) == Some(FAILURE_STATUS) {
        return Err(StageError::Application {
            message: format!("{} reported status \"{}\"", url, FAILURE_STATUS),
            body: Some(body.clone()),
        });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn client() -> Client {
        build_http_client(&create_test_config(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_user_agent_format() {
        assert_eq!(
            user_agent_string(&create_test_config()),
            "TestCrawler/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[tokio::test]
    async fn test_post_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/getStoreV1"))
            .and(header("x-csrf-token", "x"))
            .and(body_json(json!({"storeUuid": "abc"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "success", "data": {}})),
            )
            .mount(&server)
            .await;

        let url = format!("{}/api/getStoreV1", server.uri());
        let payload = post_json(&client(), &url, &json!({"storeUuid": "abc"}))
            .await
            .unwrap();
        assert_eq!(payload["status"], "success");
    }

    #[tokio::test]
    async fn test_failure_status_is_application_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "failure"})))
            .mount(&server)
            .await;

        let url = format!("{}/api/getSeoFeedV1", server.uri());
        let err = post_json(&client(), &url, &json!({"pathname": "/category/x"}))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "application");
        assert_eq!(err.body(), Some(&json!({"pathname": "/category/x"})));
    }

    #[tokio::test]
    async fn test_http_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetch_page(&client(), &format!("{}/city/berkeley-ca", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_malformed_is_not_retryable() {
        assert!(!StageError::Malformed("uuid".to_string()).is_retryable());
    }
}
