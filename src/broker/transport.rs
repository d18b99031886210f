//! # broker::transport
//!
//! The raw XTS wire surface behind a trait so the session, master and quote
//! layers are testable without a live gateway. `HttpTransport` is the real
//! implementation; tests swap in a scripted stub.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::XtsCredentials;
use crate::error::AppError;

// ─── Response envelope ────────────────────────────────────────────────────────

/// Decoded outcome of a quote call. Separating these lets the retry layer
/// distinguish "token died" from "broker said no" from "here is data".
#[derive(Debug)]
pub enum QuoteResponse {
    /// HTTP 401/403 — the session token is no longer valid.
    Unauthorized,
    /// 2xx with `"type": "error"` in the body.
    ApiError(String),
    /// The `result.listQuotes` array. Entries may be JSON-encoded strings or
    /// native objects; normalisation happens in the quote layer.
    Quotes(Vec<Value>),
}

// ─── BrokerTransport ──────────────────────────────────────────────────────────

#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// POST /auth/login. Returns the session token.
    async fn login(&self, creds: &XtsCredentials) -> Result<String, AppError>;

    /// POST /instruments/master. Returns the raw pipe-delimited blob for one
    /// exchange segment.
    async fn download_master(&self, token: &str, segment: &str) -> Result<String, AppError>;

    /// POST /instruments/quotes for a single instrument.
    async fn fetch_quotes(
        &self,
        token: &str,
        segment: u32,
        instrument_id: i64,
    ) -> Result<QuoteResponse, AppError>;
}

// ─── HttpTransport ────────────────────────────────────────────────────────────

/// Gateway timeouts differ per endpoint: login is interactive, the master
/// download is a multi-megabyte blob, quotes must fail fast so the estimator
/// can take over within one poll cycle.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
const MASTER_TIMEOUT: Duration = Duration::from_secs(30);
const QUOTE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpTransport {
    client:   reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AppError> {
        // Some institutional XTS deployments serve a broken certificate
        // chain; the gateway is reached over a private link.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| AppError::Transient(format!("HTTP client init: {e}")))?;
        Ok(Self { client, base_url: base_url.into() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl BrokerTransport for HttpTransport {
    async fn login(&self, creds: &XtsCredentials) -> Result<String, AppError> {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .timeout(LOGIN_TIMEOUT)
            .json(&json!({
                "secretKey": creds.secret_key,
                "appKey":    creds.app_key,
                "source":    creds.source,
            }))
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("login request failed: {e}")))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("login response not JSON: {e}")))?;

        if !status.is_success() || body["type"] == "error" {
            let desc = body["description"].as_str().unwrap_or("no description");
            return Err(AppError::Auth(format!("HTTP {status}: {desc}")));
        }

        match body["result"]["token"].as_str() {
            Some(token) if !token.is_empty() => {
                debug!("🔑 Login OK, token length {}", token.len());
                Ok(token.to_string())
            }
            _ => Err(AppError::Auth("login response carried no token".to_string())),
        }
    }

    async fn download_master(&self, token: &str, segment: &str) -> Result<String, AppError> {
        let resp = self
            .client
            .post(self.url("/instruments/master"))
            .timeout(MASTER_TIMEOUT)
            .header("Authorization", token)
            .json(&json!({ "exchangeSegmentList": [segment] }))
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("master request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Transient(format!("master download HTTP {status}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Transient(format!("master response not JSON: {e}")))?;
        if body["type"] == "error" {
            let desc = body["description"].as_str().unwrap_or("no description");
            return Err(AppError::Transient(format!("master download rejected: {desc}")));
        }

        // `result` is the whole segment as one pipe-delimited text blob.
        match body["result"].as_str() {
            Some(blob) if !blob.is_empty() => Ok(blob.to_string()),
            _ => Err(AppError::EmptyMaster),
        }
    }

    async fn fetch_quotes(
        &self,
        token: &str,
        segment: u32,
        instrument_id: i64,
    ) -> Result<QuoteResponse, AppError> {
        let resp = self
            .client
            .post(self.url("/instruments/quotes"))
            .timeout(QUOTE_TIMEOUT)
            .header("Authorization", token)
            .json(&json!({
                "instruments": [{
                    "exchangeSegment":      segment,
                    "exchangeInstrumentID": instrument_id,
                }],
                "xtsMessageCode": 1502,
                "publishFormat":  "JSON",
            }))
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("quote request failed: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(QuoteResponse::Unauthorized);
        }
        if !status.is_success() {
            return Err(AppError::Transient(format!("quote HTTP {status}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Transient(format!("quote response not JSON: {e}")))?;
        if body["type"] == "error" {
            let desc = body["description"].as_str().unwrap_or("no description").to_string();
            return Ok(QuoteResponse::ApiError(desc));
        }

        let quotes = body["result"]["listQuotes"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        Ok(QuoteResponse::Quotes(quotes))
    }
}

// ─── Test stub ────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod stub {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Scripted transport: each quote call pops the next canned response.
    pub(crate) struct StubTransport {
        pub login_calls: AtomicUsize,
        pub quote_calls: AtomicUsize,
        pub master_blob: Option<String>,
        responses:       Mutex<Vec<Result<QuoteResponse, AppError>>>,
    }

    impl StubTransport {
        pub(crate) fn new(responses: Vec<Result<QuoteResponse, AppError>>) -> Self {
            Self {
                login_calls: AtomicUsize::new(0),
                quote_calls: AtomicUsize::new(0),
                master_blob: None,
                responses: Mutex::new(responses),
            }
        }

        pub(crate) fn with_master(mut self, blob: impl Into<String>) -> Self {
            self.master_blob = Some(blob.into());
            self
        }
    }

    #[async_trait]
    impl BrokerTransport for StubTransport {
        async fn login(&self, _creds: &XtsCredentials) -> Result<String, AppError> {
            let n = self.login_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token-{n}"))
        }

        async fn download_master(
            &self,
            _token: &str,
            _segment: &str,
        ) -> Result<String, AppError> {
            self.master_blob.clone().ok_or(AppError::EmptyMaster)
        }

        async fn fetch_quotes(
            &self,
            _token: &str,
            _segment: u32,
            _instrument_id: i64,
        ) -> Result<QuoteResponse, AppError> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(QuoteResponse::Quotes(vec![]))
            } else {
                responses.remove(0)
            }
        }
    }

    pub(crate) fn test_creds() -> XtsCredentials {
        XtsCredentials {
            base_url:   "https://gateway.test".to_string(),
            app_key:    "app".to_string(),
            secret_key: "secret".to_string(),
            source:     "WEBAPI".to_string(),
        }
    }
}
