//! Signed REST client for the spot and derivatives hosts
//!
//! The client never retries and never panics on I/O: every failure comes back
//! as an [`EngineError`] so callers can decide whether to zero-fill, retry or
//! give up.

use crate::client::auth::AuthHeaders;
use crate::config::ExchangeConfig;
use crate::error::{EngineError, Result, SUCCESS_CODE};
use crate::types::{Credential, Venue};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Seam between the aggregator and the network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Issue one signed GET and return the validated JSON envelope
    async fn call(&self, credential: &Credential, venue: Venue, path: &str) -> Result<serde_json::Value>;
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    code: String,
    #[serde(default)]
    msg: String,
}

/// HTTP client for authenticated account queries
#[derive(Clone)]
pub struct ExchangeClient {
    http: Client,
    spot_url: String,
    futures_url: String,
    key_version: String,
    header_prefix: String,
}

impl ExchangeClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| EngineError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            spot_url: config.spot_url.trim_end_matches('/').to_string(),
            futures_url: config.futures_url.trim_end_matches('/').to_string(),
            key_version: config.key_version.clone(),
            header_prefix: config.header_prefix.clone(),
        })
    }

    /// Typed request headers. A value that cannot travel in a header is a
    /// credential problem, never a transport one.
    fn header_map(&self, headers: &AuthHeaders) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in headers.pairs(&self.header_prefix) {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                EngineError::Internal(format!("Invalid header prefix '{}': {}", self.header_prefix, e))
            })?;
            let mut value = HeaderValue::from_str(value).map_err(|_| {
                EngineError::InvalidCredentials(format!("{} is not a valid header value", name))
            })?;
            value.set_sensitive(true);
            map.insert(name, value);
        }

        Ok(map)
    }

    fn host(&self, venue: Venue) -> &str {
        match venue {
            Venue::Spot => &self.spot_url,
            Venue::Derivatives => &self.futures_url,
        }
    }
}

#[async_trait]
impl ExchangeApi for ExchangeClient {
    async fn call(&self, credential: &Credential, venue: Venue, path: &str) -> Result<serde_json::Value> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let headers = AuthHeaders::build(
            &credential.api_key,
            &credential.api_secret,
            &credential.api_passphrase,
            &self.key_version,
            timestamp,
            "GET",
            path,
        )?;

        let url = format!("{}{}", self.host(venue), path);
        debug!(%venue, path, "Signed exchange call");

        let resp = self
            .http
            .get(&url)
            .headers(self.header_map(&headers)?)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;

        parse_response(status, &body)
    }
}

/// Normalize a raw HTTP response into the error taxonomy
pub(crate) fn parse_response(status: reqwest::StatusCode, body: &str) -> Result<serde_json::Value> {
    if !status.is_success() {
        return Err(match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(env) => EngineError::from_exchange_code(&env.code, env.msg),
            Err(_) => EngineError::Transport(format!("HTTP {}", status)),
        });
    }

    let value: serde_json::Value = serde_json::from_str(body)?;
    match value.get("code").and_then(|c| c.as_str()) {
        Some(SUCCESS_CODE) => Ok(value),
        Some(code) => {
            let msg = value.get("msg").and_then(|m| m.as_str()).unwrap_or_default();
            Err(EngineError::from_exchange_code(code, msg))
        }
        None => Err(EngineError::Transport("response without code".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_success_envelope() {
        let body = r#"{"code":"200000","data":[]}"#;
        let value = parse_response(StatusCode::OK, body).unwrap();
        assert_eq!(value["data"], serde_json::json!([]));
    }

    #[test]
    fn test_unauthorized_with_envelope_is_auth() {
        let body = r#"{"code":"400003","msg":"KC-API-KEY not exists"}"#;
        let err = parse_response(StatusCode::UNAUTHORIZED, body).unwrap_err();
        assert!(matches!(err, EngineError::Auth(_)));
    }

    #[test]
    fn test_business_error_on_200() {
        let body = r#"{"code":"400100","msg":"Parameter error"}"#;
        let err = parse_response(StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, EngineError::Business { .. }));
    }

    #[test]
    fn test_gateway_error_without_envelope_is_transport() {
        let err = parse_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_malformed_json_is_transport() {
        let err = parse_response(StatusCode::OK, "{\"code\":").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_uses_configured_hosts() {
        let config = ExchangeConfig {
            spot_url: "http://spot.local/".into(),
            futures_url: "http://futures.local".into(),
            ..Default::default()
        };
        let client = ExchangeClient::new(&config).unwrap();
        assert_eq!(client.host(Venue::Spot), "http://spot.local");
        assert_eq!(client.host(Venue::Derivatives), "http://futures.local");
    }

    #[tokio::test]
    async fn test_header_unsafe_key_is_invalid_credentials() {
        let config = ExchangeConfig {
            spot_url: "http://127.0.0.1:1".into(),
            ..Default::default()
        };
        let client = ExchangeClient::new(&config).unwrap();
        let cred = Credential::new("key\nwith-newline", "s", "p");
        let err = client.call(&cred, Venue::Spot, "/api/v1/accounts").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidCredentials(_)));
        assert!(!err.is_retryable());
        assert!(!err.to_string().contains("with-newline"));
    }

    #[test]
    fn test_header_map_uses_prefix() {
        let config = ExchangeConfig {
            header_prefix: "X-API".into(),
            ..Default::default()
        };
        let client = ExchangeClient::new(&config).unwrap();
        let headers =
            AuthHeaders::build("key", "secret", "passphrase", "3", 1_700_000_000_000, "GET", "/api/v1/accounts")
                .unwrap();
        let map = client.header_map(&headers).unwrap();
        assert_eq!(map["X-API-KEY"], "key");
        assert_eq!(map["X-API-KEY-VERSION"], "3");
        assert!(map["X-API-SIGN"].is_sensitive());
        assert_eq!(map[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport() {
        let config = ExchangeConfig {
            spot_url: "http://127.0.0.1:1".into(),
            request_timeout_secs: 2,
            ..Default::default()
        };
        let client = ExchangeClient::new(&config).unwrap();
        let cred = Credential::new("k", "s", "p");
        let err = client.call(&cred, Venue::Spot, "/api/v1/accounts").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("failed to dispatch request"));
    }
}
