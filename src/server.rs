//! HTTP backend.
//!
//! | Method & path | Handler |
//! |---|---|
//! | `GET /api/health` | liveness and server time |
//! | `POST /api/extract` | multipart field `pdf` → `ExtractedData` |
//! | `POST /api/fortnox/purchase-order` | `PurchaseOrder` → gateway submission |
//! | `POST /api/fortnox/oauth/token` | authorization code → access token |
//!
//! Failures answer `{error, details}`; validation failures answer 400.

use crate::config::{FortnoxCredentials, ServerConfig};
use crate::error::Pdf2PoError;
use crate::extract::OrderExtractor;
use crate::fortnox::{FortnoxClient, SubmitResponse, TokenRequest};
use crate::model::{ExtractedData, PurchaseOrder};
use crate::pipeline::input::PdfDocument;
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const ACCESS_TOKEN_HEADER: &str = "x-fortnox-access-token";
const CLIENT_SECRET_HEADER: &str = "x-fortnox-client-secret";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn OrderExtractor>,
    pub fortnox: Arc<FortnoxClient>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("No PDF file uploaded")]
    NoFile,
    #[error("Only PDF files are allowed")]
    NotPdf,
    #[error("No purchase order data provided")]
    NoOrder,
    #[error("Invalid purchase order data")]
    InvalidOrder(#[source] serde_json::Error),
    #[error("Missing required parameters")]
    MissingParameters,
    #[error("{}", .0.body_text())]
    Upload(#[from] MultipartError),
    #[error("Failed to extract data from PDF")]
    Extraction(#[source] Pdf2PoError),
    #[error("Failed to create purchase order in Fortnox")]
    Submission(#[source] Pdf2PoError),
    #[error("Failed to exchange authorization code")]
    TokenExchange(#[source] Pdf2PoError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.to_string();
        let (status, body) = match self {
            ApiError::NoFile | ApiError::NotPdf | ApiError::NoOrder => {
                (StatusCode::BAD_REQUEST, json!({ "error": error }))
            }
            ApiError::InvalidOrder(e) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": error, "details": e.to_string() }),
            ),
            ApiError::MissingParameters => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": error,
                    "required": ["code", "clientId", "clientSecret", "redirectUri"],
                }),
            ),
            ApiError::Upload(e) => (e.status(), json!({ "error": error })),
            ApiError::Extraction(e) | ApiError::Submission(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": error, "details": e.to_string() }),
            ),
            ApiError::TokenExchange(e) => {
                let status = e
                    .upstream_status()
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let details = match e {
                    Pdf2PoError::TokenExchangeFailed { message, .. } => message,
                    other => other.to_string(),
                };
                (status, json!({ "error": error, "details": details }))
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router with CORS, tracing and the upload limit applied.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/extract", post(extract))
        .route("/api/fortnox/purchase-order", post(create_purchase_order))
        .route("/api/fortnox/oauth/token", post(exchange_token))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), Pdf2PoError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Pdf2PoError::Internal(format!("binding {addr}: {e}")))?;

    info!("Server running on {addr}");
    info!("API available at http://localhost:{}/api", config.port);

    axum::serve(listener, router(state, config))
        .await
        .map_err(|e| Pdf2PoError::Internal(format!("server error: {e}")))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

#[tracing::instrument(skip_all)]
async fn extract(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractedData>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("pdf") {
            continue;
        }
        if field.content_type() != Some("application/pdf") {
            return Err(ApiError::NotPdf);
        }
        let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
        let bytes = field.bytes().await?;
        upload = Some(PdfDocument::new(file_name, bytes.to_vec()));
        break;
    }
    let doc = upload.ok_or(ApiError::NoFile)?;

    info!(file = %doc.file_name, bytes = doc.len(), "Processing PDF");
    let data = state.extractor.extract(&doc).await.map_err(|e| {
        error!(error = ?e, "Error extracting data");
        ApiError::Extraction(e)
    })?;
    Ok(Json(data))
}

fn header_credentials(headers: &HeaderMap) -> Option<FortnoxCredentials> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    match (read(ACCESS_TOKEN_HEADER), read(CLIENT_SECRET_HEADER)) {
        (None, None) => None,
        (token, secret) => Some(FortnoxCredentials::new(
            token.unwrap_or_default(),
            secret.unwrap_or_default(),
        )),
    }
}

#[tracing::instrument(skip_all)]
async fn create_purchase_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SubmitResponse>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::NoOrder);
    }
    let order: PurchaseOrder = serde_json::from_slice(&body).map_err(ApiError::InvalidOrder)?;

    info!("Creating purchase order in Fortnox");
    let result = state
        .fortnox
        .create_purchase_order(&order, header_credentials(&headers))
        .await
        .map_err(|e| {
            error!(error = ?e, "Error creating purchase order");
            ApiError::Submission(e)
        })?;
    Ok(Json(result))
}

#[tracing::instrument(skip_all)]
async fn exchange_token(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    // A missing or malformed body is reported as missing parameters.
    let request: TokenRequest = serde_json::from_slice(&body).unwrap_or_default();
    if !request.missing().is_empty() {
        return Err(ApiError::MissingParameters);
    }

    let token = state.fortnox.exchange_code(&request).await.map_err(|e| {
        error!(error = ?e, "OAuth token exchange error");
        ApiError::TokenExchange(e)
    })?;

    Ok(Json(json!({
        "success": true,
        "accessToken": token.access_token,
        "refreshToken": token.refresh_token,
        "expiresIn": token.expires_in,
        "scope": token.scope,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FortnoxConfig;
    use crate::fortnox::fake::FakeFortnox;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdf2po-boundary";

    struct StubExtractor;

    #[async_trait]
    impl OrderExtractor for StubExtractor {
        async fn extract(&self, doc: &PdfDocument) -> Result<ExtractedData, Pdf2PoError> {
            if doc.file_name.contains("corrupt") {
                return Err(Pdf2PoError::RasterisationFailed {
                    detail: "PDF is corrupt or unreadable".into(),
                });
            }
            Ok(ExtractedData {
                purchase_order: PurchaseOrder {
                    supplier_number: "1001".into(),
                    ..Default::default()
                },
                confidence: 0.92,
            })
        }
    }

    fn app_with(base_url: &str, config: &ServerConfig) -> Router {
        let fortnox =
            FortnoxClient::new(FortnoxConfig::default().with_base_url(base_url)).unwrap();
        router(
            AppState {
                extractor: Arc::new(StubExtractor),
                fortnox: Arc::new(fortnox),
            },
            config,
        )
    }

    fn app() -> Router {
        app_with("http://127.0.0.1:9", &ServerConfig::default())
    }

    fn multipart(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/extract")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn json_post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app()
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn extract_returns_data() {
        let response = app()
            .oneshot(multipart("pdf", "order.pdf", "application/pdf", b"%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["purchaseOrder"]["supplierNumber"], "1001");
        assert_eq!(body["confidence"], 0.92);
    }

    #[tokio::test]
    async fn extract_without_pdf_field_is_400() {
        let response = app()
            .oneshot(multipart("other", "order.pdf", "application/pdf", b"%PDF"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["error"], "No PDF file uploaded");
    }

    #[tokio::test]
    async fn extract_rejects_other_mime_types() {
        let response = app()
            .oneshot(multipart("pdf", "notes.txt", "text/plain", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["error"], "Only PDF files are allowed");
    }

    #[tokio::test]
    async fn extract_failure_is_500_with_details() {
        let response = app()
            .oneshot(multipart("pdf", "corrupt.pdf", "application/pdf", b"%PDF"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Failed to extract data from PDF");
        assert!(body["details"]
            .as_str()
            .unwrap()
            .starts_with("Failed to convert PDF to image"));
    }

    #[tokio::test]
    async fn oversized_upload_is_413() {
        let config = ServerConfig {
            max_upload_bytes: 1024,
            ..ServerConfig::default()
        };
        let big = vec![b'x'; 8 * 1024];
        let response = app_with("http://127.0.0.1:9", &config)
            .oneshot(multipart("pdf", "big.pdf", "application/pdf", &big))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn purchase_order_requires_body() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/fortnox/purchase-order")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(response).await["error"],
            "No purchase order data provided"
        );
    }

    #[tokio::test]
    async fn purchase_order_uses_header_credentials() {
        let fake = FakeFortnox::default();
        fake.reply(
            "/api/warehouse/purchaseorders-v1",
            StatusCode::OK,
            json!({ "id": 5 }),
        );
        let base = fake.start().await;

        let mut request = json_post(
            "/api/fortnox/purchase-order",
            json!({ "supplierNumber": "1001", "rows": [{ "itemId": "A", "orderedQuantity": 1 }] }),
        );
        request
            .headers_mut()
            .insert(ACCESS_TOKEN_HEADER, "header-token".parse().unwrap());
        request
            .headers_mut()
            .insert(CLIENT_SECRET_HEADER, "header-secret".parse().unwrap());

        let response = app_with(&base, &ServerConfig::default())
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], 5);
        assert_eq!(body["message"], "Purchase order created successfully in Fortnox");

        let sent = &fake.requests()[0];
        assert_eq!(sent.header("authorization"), Some("Bearer header-token"));
        assert_eq!(sent.header("client-secret"), Some("header-secret"));
    }

    #[tokio::test]
    async fn purchase_order_rejection_is_500() {
        let fake = FakeFortnox::default();
        fake.reply(
            "/api/warehouse/purchaseorders-v1",
            StatusCode::BAD_REQUEST,
            json!({ "ErrorInformation": { "Message": "Invalid supplier" } }),
        );
        let base = fake.start().await;

        let mut request = json_post(
            "/api/fortnox/purchase-order",
            json!({ "supplierNumber": "x", "rows": [{ "itemId": "A", "orderedQuantity": 1 }] }),
        );
        request
            .headers_mut()
            .insert(ACCESS_TOKEN_HEADER, "t".parse().unwrap());
        request
            .headers_mut()
            .insert(CLIENT_SECRET_HEADER, "s".parse().unwrap());

        let response = app_with(&base, &ServerConfig::default())
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Failed to create purchase order in Fortnox");
        assert_eq!(
            body["details"],
            "Failed to create purchase order: Invalid supplier"
        );
    }

    #[tokio::test]
    async fn token_exchange_lists_required_params() {
        let response = app()
            .oneshot(json_post(
                "/api/fortnox/oauth/token",
                json!({ "code": "abc", "clientId": "id" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Missing required parameters");
        assert_eq!(
            body["required"],
            json!(["code", "clientId", "clientSecret", "redirectUri"])
        );
    }

    #[tokio::test]
    async fn token_exchange_with_empty_body_lists_required_params() {
        for body in [Body::empty(), Body::from("code=abc")] {
            let response = app()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/fortnox/oauth/token")
                        .body(body)
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = read_json(response).await;
            assert_eq!(body["error"], "Missing required parameters");
            assert_eq!(
                body["required"],
                json!(["code", "clientId", "clientSecret", "redirectUri"])
            );
        }
    }

    #[tokio::test]
    async fn token_exchange_mirrors_upstream_status() {
        let fake = FakeFortnox::default();
        fake.reply(
            "/oauth-v1/token",
            StatusCode::UNAUTHORIZED,
            json!({ "error": "invalid_client" }),
        );
        let base = fake.start().await;

        let response = app_with(&base, &ServerConfig::default())
            .oneshot(json_post(
                "/api/fortnox/oauth/token",
                json!({
                    "code": "abc",
                    "clientId": "id",
                    "clientSecret": "secret",
                    "redirectUri": "http://localhost:3000/oauth-callback",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Failed to exchange authorization code");
        assert_eq!(body["details"], "invalid_client");
    }

    #[tokio::test]
    async fn token_exchange_success_is_camel_case() {
        let fake = FakeFortnox::default();
        fake.reply(
            "/oauth-v1/token",
            StatusCode::OK,
            json!({ "access_token": "tok", "refresh_token": "ref", "expires_in": 3600, "scope": "warehouse" }),
        );
        let base = fake.start().await;

        let response = app_with(&base, &ServerConfig::default())
            .oneshot(json_post(
                "/api/fortnox/oauth/token",
                json!({
                    "code": "abc",
                    "clientId": "id",
                    "clientSecret": "secret",
                    "redirectUri": "http://localhost:3000/oauth-callback",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(
            body,
            json!({
                "success": true,
                "accessToken": "tok",
                "refreshToken": "ref",
                "expiresIn": 3600,
                "scope": "warehouse",
            })
        );
    }
}
