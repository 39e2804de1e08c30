//! Error types for the pdf2po library.
//!
//! Every fallible operation at the extraction or gateway boundary returns
//! [`Pdf2PoError`]. The queue never lets one escape: it renders the error
//! with `Display` and stores the text on the owning queue item, so one bad
//! document never aborts its siblings.
//!
//! [`ErrorKind`] collapses the variants into the four classes callers act
//! on differently: a caller mistake ([`ErrorKind::Validation`]), a broken or
//! missing collaborator ([`ErrorKind::Dependency`]), an upstream refusal
//! ([`ErrorKind::UpstreamRejection`]) and an unreadable upstream answer
//! ([`ErrorKind::Parse`]).

use std::path::PathBuf;
use thiserror::Error;

/// Coarse error taxonomy used for HTTP status mapping and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input supplied by the caller.
    Validation,
    /// Rasteriser, model provider or remote API unavailable or misconfigured.
    Dependency,
    /// The vision model or accounting API answered with a failure.
    UpstreamRejection,
    /// An upstream answer was not the JSON we expected.
    Parse,
}

/// All fatal errors returned by the pdf2po library.
#[derive(Debug, Error)]
pub enum Pdf2PoError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Required fields were absent from a request.
    #[error("Missing required parameters: {}", missing.join(", "))]
    MissingParameters { missing: Vec<&'static str> },

    /// The uploaded bytes are not a PDF.
    #[error("File is not a valid PDF: '{name}'\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// The uploaded file is empty.
    #[error("Uploaded file '{name}' is empty")]
    EmptyUpload { name: String },

    /// A queue operation referenced an item that does not exist.
    #[error("Queue item '{id}' not found")]
    ItemNotFound { id: String },

    /// A queue operation is not legal in the item's current status.
    #[error("Queue item '{id}' is {status}, expected {expected}")]
    InvalidTransition {
        id: String,
        status: String,
        expected: &'static str,
    },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// pdfium could not be loaded.
    #[error(
        "Failed to convert PDF to image: pdfium library unavailable: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium."
    )]
    PdfiumBindingFailed(String),

    /// The PDF could not be opened or page 1 could not be rendered.
    #[error("Failed to convert PDF to image: {detail}")]
    RasterisationFailed { detail: String },

    /// The document has no pages to render.
    #[error("Failed to convert PDF to image: document has no pages")]
    EmptyDocument,

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The model call exceeded the configured timeout.
    #[error("LLM call timed out after {secs}s")]
    LlmTimeout { secs: u64 },

    /// The model returned no content.
    #[error("No response from the vision model")]
    EmptyResponse,

    /// The model content was not the expected JSON shape.
    #[error("Failed to parse extraction response: {detail}")]
    InvalidResponse { detail: String },

    // ── Gateway errors ────────────────────────────────────────────────────
    /// Neither the caller nor the fallback source supplied credentials.
    #[error(
        "Fortnox credentials not configured. Provide an access token and client secret, \
or set FORTNOX_ACCESS_TOKEN and FORTNOX_CLIENT_SECRET"
    )]
    CredentialsNotConfigured,

    /// The purchase-order endpoint rejected the submission.
    #[error("Failed to create purchase order: {message}")]
    SubmissionRejected { status: Option<u16>, message: String },

    /// The connection check against the company endpoint failed.
    #[error("Fortnox connection failed: {message}")]
    ConnectionCheckFailed { status: Option<u16>, message: String },

    /// A response from the accounting system could not be decoded.
    #[error("Unexpected response from Fortnox: {detail}")]
    GatewayResponse { detail: String },

    // ── OAuth errors ──────────────────────────────────────────────────────
    /// The token endpoint rejected the authorization code.
    #[error("Failed to exchange authorization code: {message}")]
    TokenExchangeFailed { status: Option<u16>, message: String },

    /// The authorization redirect carried an error instead of a code.
    #[error("Authorization was denied: {message}")]
    AuthorizationDenied { error: String, message: String },

    /// The authorization redirect carried neither a code nor an error.
    #[error("No authorization code received from Fortnox")]
    MissingAuthorizationCode,

    /// The stored credential blob is missing when it is required.
    #[error("API keys are missing. Configure them with `pdf2po auth set` first.")]
    CredentialsMissing,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read or write the credential file.
    #[error("Credential store '{path}' is unusable: {detail}")]
    CredentialStore { path: PathBuf, detail: String },

    /// Scratch-space I/O failed.
    #[error("Temporary storage error: {0}")]
    Scratch(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2PoError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        use Pdf2PoError::*;
        match self {
            MissingParameters { .. }
            | NotAPdf { .. }
            | EmptyUpload { .. }
            | ItemNotFound { .. }
            | InvalidTransition { .. }
            | AuthorizationDenied { .. }
            | MissingAuthorizationCode
            | InvalidConfig(_) => ErrorKind::Validation,

            PdfiumBindingFailed(_)
            | RasterisationFailed { .. }
            | EmptyDocument
            | ProviderNotConfigured { .. }
            | LlmTimeout { .. }
            | CredentialsNotConfigured
            | CredentialsMissing
            | CredentialStore { .. }
            | Scratch(_)
            | Internal(_) => ErrorKind::Dependency,

            LlmApiError { .. }
            | SubmissionRejected { .. }
            | ConnectionCheckFailed { .. }
            | TokenExchangeFailed { .. } => ErrorKind::UpstreamRejection,

            EmptyResponse | InvalidResponse { .. } | GatewayResponse { .. } => ErrorKind::Parse,
        }
    }

    /// The upstream HTTP status carried by this error, if any.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Pdf2PoError::SubmissionRejected { status, .. }
            | Pdf2PoError::ConnectionCheckFailed { status, .. }
            | Pdf2PoError::TokenExchangeFailed { status, .. } => *status,
            _ => None,
        }
    }
}
