//! Accounting gateway: submit purchase orders to Fortnox and run its
//! OAuth2 authorization-code flow.
//!
//! Credentials are passed per call. [`FortnoxClient::resolve_credentials`]
//! consults the configured fallback only when the caller supplies none, and
//! warns when it does. Tokens only ever reach the logs through [`preview`].

mod oauth;
mod payload;

#[cfg(test)]
pub(crate) mod fake;

pub use oauth::{complete_authorization, OAuthCallback, TokenRequest, TokenResponse, OAUTH_SCOPES};
pub use payload::{FortnoxPurchaseOrder, FortnoxPurchaseOrderRow, DEFAULT_DELIVERY_NAME};

use crate::config::{FortnoxConfig, FortnoxCredentials};
use crate::error::Pdf2PoError;
use crate::model::PurchaseOrder;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Message returned with every accepted submission.
pub const SUBMIT_SUCCESS_MESSAGE: &str = "Purchase order created successfully in Fortnox";

/// Characters of a token shown in logs.
const PREVIEW_LEN: usize = 20;

/// First 20 characters of a token followed by `...`.
pub fn preview(token: &str) -> String {
    let head: String = token.chars().take(PREVIEW_LEN).collect();
    format!("{head}...")
}

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    /// Raw payload returned by the accounting system.
    pub data: Value,
    pub message: String,
}

/// Hands a purchase order to the accounting system.
#[async_trait]
pub trait OrderSubmitter: Send + Sync {
    async fn submit_order(
        &self,
        order: &PurchaseOrder,
        credentials: Option<FortnoxCredentials>,
    ) -> Result<SubmitResponse, Pdf2PoError>;
}

/// HTTP client for the Fortnox REST and OAuth endpoints.
#[derive(Debug, Clone)]
pub struct FortnoxClient {
    http: reqwest::Client,
    config: FortnoxConfig,
}

impl FortnoxClient {
    pub fn new(config: FortnoxConfig) -> Result<Self, Pdf2PoError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Pdf2PoError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &FortnoxConfig {
        &self.config
    }

    /// Explicit credentials win; the configured fallback is used only when
    /// none (or an incomplete pair) is given.
    pub fn resolve_credentials(
        &self,
        explicit: Option<FortnoxCredentials>,
    ) -> Result<FortnoxCredentials, Pdf2PoError> {
        let complete =
            |c: &FortnoxCredentials| !c.access_token.is_empty() && !c.client_secret.is_empty();

        if let Some(creds) = explicit.filter(complete) {
            return Ok(creds);
        }
        match self.config.fallback.as_ref().filter(|c| complete(*c)) {
            Some(fallback) => {
                warn!(
                    token = %preview(&fallback.access_token),
                    "Using fallback Fortnox access token from the environment; it may be outdated"
                );
                Ok(fallback.clone())
            }
            None => Err(Pdf2PoError::CredentialsNotConfigured),
        }
    }

    /// `POST {api}/api/warehouse/purchaseorders-v1`.
    #[instrument(skip_all, fields(supplier = %order.supplier_number, rows = order.rows.len()))]
    pub async fn create_purchase_order(
        &self,
        order: &PurchaseOrder,
        credentials: Option<FortnoxCredentials>,
    ) -> Result<SubmitResponse, Pdf2PoError> {
        if order.rows.is_empty() {
            return Err(Pdf2PoError::MissingParameters {
                missing: vec!["rows"],
            });
        }
        let creds = self.resolve_credentials(credentials)?;
        let payload = FortnoxPurchaseOrder::from(order);
        debug!(
            payload = %serde_json::to_string(&payload).unwrap_or_default(),
            "Sending to Fortnox warehouse API"
        );

        let url = format!("{}/api/warehouse/purchaseorders-v1", self.config.api_base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&creds.access_token)
            .header("Client-Secret", &creds.client_secret)
            .header(ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| Pdf2PoError::SubmissionRejected {
                status: None,
                message: e.to_string(),
            })?;

        let (status, body) = read_body(response).await;
        if !status.is_success() {
            error!(status = status.as_u16(), body = %body, "Fortnox API error");
            let message = error_information(&body)
                .or_else(|| string_at(&body, &["message"]))
                .or_else(|| string_at(&body, &["error"]))
                .unwrap_or_else(|| status_failure(status));
            return Err(Pdf2PoError::SubmissionRejected {
                status: Some(status.as_u16()),
                message,
            });
        }

        info!("Purchase order accepted by Fortnox");
        Ok(SubmitResponse {
            success: true,
            data: body,
            message: SUBMIT_SUCCESS_MESSAGE.to_string(),
        })
    }

    /// `GET {api}/3/companyinformation`; returns the company name.
    #[instrument(skip_all)]
    pub async fn test_connection(
        &self,
        credentials: Option<FortnoxCredentials>,
    ) -> Result<String, Pdf2PoError> {
        let creds = self.resolve_credentials(credentials)?;
        let url = format!("{}/3/companyinformation", self.config.api_base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&creds.access_token)
            .header("Client-Secret", &creds.client_secret)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Pdf2PoError::ConnectionCheckFailed {
                status: None,
                message: e.to_string(),
            })?;

        let (status, body) = read_body(response).await;
        if !status.is_success() {
            return Err(Pdf2PoError::ConnectionCheckFailed {
                status: Some(status.as_u16()),
                message: error_information(&body).unwrap_or_else(|| status_failure(status)),
            });
        }

        string_at(&body, &["CompanyInformation", "CompanyName"]).ok_or_else(|| {
            Pdf2PoError::GatewayResponse {
                detail: "CompanyInformation.CompanyName missing".into(),
            }
        })
    }
}

#[async_trait]
impl OrderSubmitter for FortnoxClient {
    async fn submit_order(
        &self,
        order: &PurchaseOrder,
        credentials: Option<FortnoxCredentials>,
    ) -> Result<SubmitResponse, Pdf2PoError> {
        self.create_purchase_order(order, credentials).await
    }
}

// ── Response helpers ────────────────────────────────────────────────────

/// Status plus body as JSON. Non-JSON text is kept as a string, an empty
/// body is `null`.
pub(crate) async fn read_body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    (status, body)
}

pub(crate) fn string_at(body: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(body, |v, key| v.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn error_information(body: &Value) -> Option<String> {
    string_at(body, &["ErrorInformation", "Message"])
        .or_else(|| string_at(body, &["ErrorInformation", "message"]))
}

pub(crate) fn status_failure(status: StatusCode) -> String {
    format!("Request failed with status code {}", status.as_u16())
}
