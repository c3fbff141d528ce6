//! Wallet Backend Client
//!
//! HTTP client for the wallet backend deposit endpoints. Responses are
//! returned as raw JSON; [`crate::normalize`] turns them into canonical types.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::PollerConfig;
use crate::error::PollerError;
use crate::intent::PaymentMethod;

/// Header carrying the per-request idempotency key on intent creation.
pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

// ============================================================================
// REQUEST STRUCTURES
// ============================================================================

/// Body of POST /wallet/deposits.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIntentRequest {
    /// Deposit amount, sent as a JSON number
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Payment method
    pub method: PaymentMethod,
}

// ============================================================================
// GATEWAY SEAM
// ============================================================================

/// Backend operations the poller depends on.
///
/// Injected into [`crate::PaymentPoller`] so tests can substitute a fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a deposit intent and returns the raw backend response.
    async fn create_intent(&self, request: &CreateIntentRequest) -> Result<Value, PollerError>;

    /// Fetches the raw status of a payment.
    async fn payment_status(&self, payment_id: &str) -> Result<Value, PollerError>;
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

/// HTTP client for the wallet backend.
pub struct WalletClient {
    /// HTTP client instance
    client: Client,
    /// Base URL without trailing slash, e.g. "http://127.0.0.1:8000/api"
    base_url: String,
    /// Bearer token, if the backend requires authentication
    auth_token: Option<String>,
}

impl WalletClient {
    /// Creates a new wallet backend client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Backend base URL
    /// * `auth_token` - Optional bearer token
    /// * `timeout` - Per-request timeout
    ///
    /// # Returns
    ///
    /// * `Ok(WalletClient)` - Client ready to use
    /// * `Err(PollerError::Http)` - The HTTP client could not be built
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PollerError> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy() // Avoid macOS system-configuration issues in tests
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    /// Creates a client from the service section of the configuration.
    pub fn from_config(config: &PollerConfig) -> Result<Self, PollerError> {
        Self::new(
            config.service.backend_url.clone(),
            config.auth_token(),
            Duration::from_millis(config.service.request_timeout_ms),
        )
    }

    /// Fetches the account balance view.
    ///
    /// # Returns
    ///
    /// * `Ok(Value)` - Balance payload as returned by the backend
    /// * `Err(PollerError)` - Transport failure or non-2xx response
    pub async fn balance(&self) -> Result<Value, PollerError> {
        let url = format!("{}/wallet/balance", self.base_url);
        let request = self.authorized(self.client.get(&url));
        Self::read_json(request.send().await?).await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Converts non-2xx responses into [`PollerError::Api`] and parses the body.
    async fn read_json(response: reqwest::Response) -> Result<Value, PollerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PollerError::Api {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentGateway for WalletClient {
    async fn create_intent(&self, request: &CreateIntentRequest) -> Result<Value, PollerError> {
        let url = format!("{}/wallet/deposits", self.base_url);
        let idempotency_key = uuid::Uuid::new_v4().to_string();

        debug!(
            "POST {} (amount: {}, method: {}, key: {})",
            url,
            request.amount,
            request.method.as_str(),
            idempotency_key
        );

        let response = self
            .authorized(self.client.post(&url))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(request)
            .send()
            .await?;

        Self::read_json(response).await
    }

    async fn payment_status(&self, payment_id: &str) -> Result<Value, PollerError> {
        let url = format!("{}/wallet/deposits/{}/status", self.base_url, payment_id);
        tracing::trace!("GET {}", url);

        let response = self.authorized(self.client.get(&url)).send().await?;
        Self::read_json(response).await
    }
}

/// Pulls a human-readable message out of an error body.
///
/// Accepts `{"error": "..."}`, `{"message": "..."}` or `{"detail": "..."}`,
/// falling back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["error", "message", "detail"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}
