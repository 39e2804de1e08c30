//! OAuth2 authorization-code flow against `apps.fortnox.se/oauth-v1`.
//!
//! ```text
//! authorization_url ─▶ user consents ─▶ redirect ?code=… ─▶ OAuthCallback
//!        ─▶ exchange_code (Basic auth, form body) ─▶ access token saved
//! ```

use super::{preview, read_body, status_failure, string_at, FortnoxClient};
use crate::credentials::{ApiKeys, CredentialStore};
use crate::error::Pdf2PoError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Scopes requested for purchase-order submission.
pub const OAUTH_SCOPES: [&str; 4] = ["companyinformation", "article", "warehouse", "supplier"];

/// Parameters of a token exchange. Every field is required; blanks count
/// as missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenRequest {
    pub code: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

impl TokenRequest {
    /// Exchange `code` using the stored client id, secret and redirect URI.
    pub fn from_keys(code: impl Into<String>, keys: &ApiKeys) -> Self {
        Self {
            code: Some(code.into()),
            client_id: Some(keys.fortnox_client_id.clone()),
            client_secret: Some(keys.fortnox_client_secret.clone()),
            redirect_uri: Some(keys.fortnox_redirect_uri.clone()),
        }
    }

    /// Names of the blank or absent fields, in wire order.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("code", &self.code),
            ("clientId", &self.client_id),
            ("clientSecret", &self.client_secret),
            ("redirectUri", &self.redirect_uri),
        ]
        .into_iter()
        .filter(|(_, v)| v.as_deref().map_or(true, str::is_empty))
        .map(|(name, _)| name)
        .collect()
    }
}

/// Token endpoint answer.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &preview(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

impl FortnoxClient {
    /// Consent page URL with the purchase-order scopes.
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, Pdf2PoError> {
        if client_id.trim().is_empty() {
            return Err(Pdf2PoError::MissingParameters {
                missing: vec!["clientId"],
            });
        }
        let scope = OAUTH_SCOPES.join(" ");
        let url = Url::parse_with_params(
            &format!("{}/auth", self.config.oauth_base_url),
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("scope", scope.as_str()),
                ("state", state),
                ("response_type", "code"),
                ("access_type", "offline"),
            ],
        )
        .map_err(|e| Pdf2PoError::InvalidConfig(format!("OAuth base URL: {e}")))?;
        info!(scopes = %scope, "Built authorization URL");
        Ok(url.to_string())
    }

    /// Trade an authorization code for an access token.
    ///
    /// Missing fields fail before any request is sent.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, request: &TokenRequest) -> Result<TokenResponse, Pdf2PoError> {
        let missing = request.missing();
        if !missing.is_empty() {
            return Err(Pdf2PoError::MissingParameters { missing });
        }
        let field = |v: &Option<String>| v.clone().unwrap_or_default();

        info!("Exchanging authorization code for access token");
        let url = format!("{}/token", self.config.oauth_base_url);
        let response = self
            .http
            .post(&url)
            .basic_auth(field(&request.client_id), Some(field(&request.client_secret)))
            .form(&[
                ("grant_type", "authorization_code".to_string()),
                ("code", field(&request.code)),
                ("redirect_uri", field(&request.redirect_uri)),
            ])
            .send()
            .await
            .map_err(|e| Pdf2PoError::TokenExchangeFailed {
                status: None,
                message: e.to_string(),
            })?;

        let (status, body) = read_body(response).await;
        if !status.is_success() {
            let message = string_at(&body, &["error_description"])
                .or_else(|| string_at(&body, &["error"]))
                .unwrap_or_else(|| status_failure(status));
            return Err(Pdf2PoError::TokenExchangeFailed {
                status: Some(status.as_u16()),
                message,
            });
        }

        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| Pdf2PoError::GatewayResponse {
                detail: format!("token response: {e}"),
            })?;
        info!(
            scope = ?token.scope,
            expires_in = ?token.expires_in,
            token = %preview(&token.access_token),
            "Obtained access token"
        );
        Ok(token)
    }
}

/// Query parameters of the OAuth redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl OAuthCallback {
    /// Parse a full redirect URL.
    pub fn from_url(url: &str) -> Result<Self, Pdf2PoError> {
        let url = Url::parse(url.trim())
            .map_err(|e| Pdf2PoError::InvalidConfig(format!("callback URL: {e}")))?;
        Ok(Self::from_pairs(url.query_pairs()))
    }

    /// Parse a bare query string, with or without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        let mut url = match Url::parse("http://localhost/") {
            Ok(u) => u,
            Err(_) => return Self::default(),
        };
        url.set_query(Some(query.trim().trim_start_matches('?')));
        Self::from_pairs(url.query_pairs())
    }

    fn from_pairs<'a>(pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>) -> Self {
        let mut cb = Self::default();
        for (key, value) in pairs {
            let value = Some(value.into_owned()).filter(|v| !v.is_empty());
            match key.as_ref() {
                "code" => cb.code = value,
                "error" => cb.error = value,
                "error_description" => cb.error_description = value,
                _ => {}
            }
        }
        cb
    }

    /// The authorization code, or why there is none.
    pub fn into_code(self) -> Result<String, Pdf2PoError> {
        if let Some(error) = self.error {
            let message = if error == "unsupported_scope" {
                format!(
                    "A requested scope is not enabled for your Fortnox integration. \
Enable these scopes in the Fortnox Developer Portal \
(https://developer.fortnox.se/ → your integration → Scopes): {}",
                    OAUTH_SCOPES.join(", ")
                )
            } else {
                self.error_description.unwrap_or_else(|| error.clone())
            };
            return Err(Pdf2PoError::AuthorizationDenied { error, message });
        }
        self.code.ok_or(Pdf2PoError::MissingAuthorizationCode)
    }
}

/// Finish the flow: exchange the callback's code with the stored client
/// credentials and write the new access token back to the store.
pub async fn complete_authorization(
    store: &dyn CredentialStore,
    client: &FortnoxClient,
    callback: OAuthCallback,
) -> Result<TokenResponse, Pdf2PoError> {
    let code = callback.into_code()?;
    let mut keys = store.load()?.ok_or(Pdf2PoError::CredentialsMissing)?;

    let token = client
        .exchange_code(&TokenRequest::from_keys(code, &keys))
        .await?;

    info!(
        new = %preview(&token.access_token),
        old = %preview(&keys.fortnox_access_token),
        "Saving new access token"
    );
    keys.fortnox_access_token = token.access_token.clone();
    store.save(&keys)?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::super::fake::FakeFortnox;
    use super::*;
    use crate::config::FortnoxConfig;
    use crate::credentials::MemoryCredentialStore;
    use axum::http::StatusCode;
    use serde_json::json;

    fn full_request() -> TokenRequest {
        TokenRequest {
            code: Some("abc".into()),
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            redirect_uri: Some("http://localhost:3000/oauth-callback".into()),
        }
    }

    async fn client(fake: &FakeFortnox) -> FortnoxClient {
        let base = fake.start().await;
        FortnoxClient::new(FortnoxConfig::default().with_base_url(base)).unwrap()
    }

    #[test]
    fn missing_lists_blank_fields() {
        let req = TokenRequest {
            code: Some(String::new()),
            client_secret: Some("s".into()),
            ..Default::default()
        };
        assert_eq!(req.missing(), vec!["code", "clientId", "redirectUri"]);
        assert!(full_request().missing().is_empty());
    }

    #[tokio::test]
    async fn missing_fields_send_nothing() {
        let fake = FakeFortnox::default();
        let client = client(&fake).await;
        let req = TokenRequest {
            redirect_uri: None,
            ..full_request()
        };
        let err = client.exchange_code(&req).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameters: redirectUri");
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn exchange_posts_form_with_basic_auth() {
        let fake = FakeFortnox::default();
        fake.reply(
            "/oauth-v1/token",
            StatusCode::OK,
            json!({
                "access_token": "new-token-abcdefghijklmnop",
                "refresh_token": "refresh",
                "expires_in": 3600,
                "scope": "companyinformation warehouse",
            }),
        );
        let client = client(&fake).await;

        let token = client.exchange_code(&full_request()).await.unwrap();
        assert_eq!(token.access_token, "new-token-abcdefghijklmnop");
        assert_eq!(token.expires_in, Some(3600));

        let req = &fake.requests()[0];
        assert_eq!(req.path, "/oauth-v1/token");
        // base64("client:secret")
        assert_eq!(req.header("authorization"), Some("Basic Y2xpZW50OnNlY3JldA=="));
        assert_eq!(
            req.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert!(req.body.contains("grant_type=authorization_code"));
        assert!(req.body.contains("code=abc"));
        assert!(req
            .body
            .contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Foauth-callback"));
    }

    #[tokio::test]
    async fn provider_error_keeps_status_and_description() {
        let fake = FakeFortnox::default();
        fake.reply(
            "/oauth-v1/token",
            StatusCode::UNAUTHORIZED,
            json!({ "error": "invalid_grant", "error_description": "Code expired" }),
        );
        let client = client(&fake).await;
        let err = client.exchange_code(&full_request()).await.unwrap_err();
        assert_eq!(err.upstream_status(), Some(401));
        assert!(err.to_string().ends_with("Code expired"));
    }

    #[test]
    fn authorization_url_carries_scopes_and_state() {
        let client = FortnoxClient::new(FortnoxConfig::default()).unwrap();
        let url = client
            .authorization_url("my-client", "http://localhost:3000/oauth-callback", "xyz")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/oauth-v1/auth");
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "my-client");
        assert_eq!(pairs["scope"], "companyinformation article warehouse supplier");
        assert_eq!(pairs["state"], "xyz");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["access_type"], "offline");

        assert!(client.authorization_url("", "x", "y").is_err());
    }

    #[test]
    fn callback_parsing() {
        let cb = OAuthCallback::from_url("http://localhost:3000/oauth-callback?code=c0de&state=s")
            .unwrap();
        assert_eq!(cb.clone().into_code().unwrap(), "c0de");

        let cb = OAuthCallback::from_query("?error=unsupported_scope");
        let err = cb.into_code().unwrap_err();
        assert!(err.to_string().contains("Developer Portal"));

        let cb = OAuthCallback::from_query("error=access_denied&error_description=User+said+no");
        assert_eq!(
            cb.into_code().unwrap_err().to_string(),
            "Authorization was denied: User said no"
        );

        assert!(matches!(
            OAuthCallback::from_query("state=s").into_code(),
            Err(Pdf2PoError::MissingAuthorizationCode)
        ));
    }

    #[tokio::test]
    async fn complete_authorization_saves_token() {
        let fake = FakeFortnox::default();
        fake.reply(
            "/oauth-v1/token",
            StatusCode::OK,
            json!({ "access_token": "fresh" }),
        );
        let client = client(&fake).await;
        let store = MemoryCredentialStore::new(Some(ApiKeys {
            fortnox_client_id: "client".into(),
            fortnox_client_secret: "secret".into(),
            fortnox_access_token: "stale".into(),
            ..ApiKeys::default()
        }));

        let cb = OAuthCallback::from_query("code=abc");
        complete_authorization(&store, &client, cb).await.unwrap();

        let keys = store.load().unwrap().unwrap();
        assert_eq!(keys.fortnox_access_token, "fresh");
        assert_eq!(keys.fortnox_client_id, "client");
    }

    #[tokio::test]
    async fn complete_authorization_requires_stored_keys() {
        let fake = FakeFortnox::default();
        let client = client(&fake).await;
        let store = MemoryCredentialStore::default();
        let err = complete_authorization(&store, &client, OAuthCallback::from_query("code=abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2PoError::CredentialsMissing));
        assert!(fake.requests().is_empty());
    }
}
