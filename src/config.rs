//! Configuration types.
//!
//! Extraction behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. The accounting gateway reads
//! [`FortnoxConfig`] and the HTTP backend [`ServerConfig`].

use crate::error::Pdf2PoError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default vision model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for extracting a purchase order from a PDF.
///
/// # Example
/// ```rust
/// use pdf2po::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(300)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI for page 1. Range: 72–600. Default: 300.
    ///
    /// Order documents are dense with small digits; 300 DPI keeps article
    /// numbers and prices legible to the model.
    pub dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 4000.
    ///
    /// An A4 page at 300 DPI is 2480 × 3508 px, which fits; oversized pages
    /// are scaled down instead of exhausting memory.
    pub max_rendered_pixels: u32,

    /// Vision model identifier. Default: `gpt-4o`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 4096.
    pub max_tokens: usize,

    /// Timeout for the model call in seconds. Default: 120.
    ///
    /// A hung call surfaces as an error on the queue item instead of
    /// stalling it forever.
    pub api_timeout_secs: u64,

    /// Directory containing the pdfium shared library. Falls back to the
    /// system library search path when unset.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Custom system prompt. If None, uses the built-in extraction prompt.
    pub system_prompt: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            api_timeout_secs: 120,
            pdfium_lib_path: None,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2PoError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(Pdf2PoError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(Pdf2PoError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2PoError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Accounting gateway ──────────────────────────────────────────────────

/// Access token and client secret for one gateway call.
#[derive(Clone, PartialEq, Eq)]
pub struct FortnoxCredentials {
    pub access_token: String,
    pub client_secret: String,
}

impl FortnoxCredentials {
    pub fn new(access_token: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for FortnoxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FortnoxCredentials")
            .field("access_token", &crate::fortnox::preview(&self.access_token))
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Endpoints and fallback credentials for the accounting system.
#[derive(Debug, Clone)]
pub struct FortnoxConfig {
    /// REST API root. Default: `https://api.fortnox.se`.
    pub api_base_url: String,
    /// OAuth root holding `/auth` and `/token`. Default: `https://apps.fortnox.se/oauth-v1`.
    pub oauth_base_url: String,
    /// Per-request timeout in seconds. Default: 60.
    pub timeout_secs: u64,
    /// Static credentials consulted only when a caller supplies none.
    pub fallback: Option<FortnoxCredentials>,
}

impl Default for FortnoxConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.fortnox.se".to_string(),
            oauth_base_url: "https://apps.fortnox.se/oauth-v1".to_string(),
            timeout_secs: 60,
            fallback: None,
        }
    }
}

impl FortnoxConfig {
    /// Defaults plus fallback credentials from `FORTNOX_ACCESS_TOKEN` and
    /// `FORTNOX_CLIENT_SECRET`. The fallback is only set when both are present.
    pub fn from_env() -> Self {
        let token = std::env::var("FORTNOX_ACCESS_TOKEN").ok().filter(|s| !s.is_empty());
        let secret = std::env::var("FORTNOX_CLIENT_SECRET").ok().filter(|s| !s.is_empty());
        let fallback = match (token, secret) {
            (Some(t), Some(s)) => Some(FortnoxCredentials::new(t, s)),
            _ => None,
        };
        Self {
            fallback,
            ..Self::default()
        }
    }

    /// Point both roots at one base URL, e.g. a local stand-in.
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        self.oauth_base_url = format!("{base}/oauth-v1");
        self.api_base_url = base;
        self
    }
}

// ── HTTP backend ────────────────────────────────────────────────────────

/// Settings for the HTTP backend.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}
