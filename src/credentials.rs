//! Credential store: the single API-key blob shared by the CLI, the OAuth
//! flow and every gateway call.
//!
//! The blob is always read and written wholesale. Callers load it, change
//! the fields they need and save the whole thing back.

use crate::config::FortnoxCredentials;
use crate::error::Pdf2PoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Redirect URI registered for the local backend.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/oauth-callback";

/// Everything needed to authorise against and call the accounting API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiKeys {
    pub fortnox_client_id: String,
    pub fortnox_client_secret: String,
    pub fortnox_access_token: String,
    pub fortnox_redirect_uri: String,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            fortnox_client_id: String::new(),
            fortnox_client_secret: String::new(),
            fortnox_access_token: String::new(),
            fortnox_redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }
}

impl ApiKeys {
    /// Ready to call the API: access token and client secret present.
    pub fn has_api_keys(&self) -> bool {
        !self.fortnox_access_token.is_empty() && !self.fortnox_client_secret.is_empty()
    }

    /// Ready to start the authorization-code flow.
    pub fn has_oauth_configured(&self) -> bool {
        !self.fortnox_client_id.is_empty() && !self.fortnox_client_secret.is_empty()
    }

    /// Per-call credentials, when complete.
    pub fn credentials(&self) -> Option<FortnoxCredentials> {
        self.has_api_keys().then(|| {
            FortnoxCredentials::new(&self.fortnox_access_token, &self.fortnox_client_secret)
        })
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.fortnox_access_token.is_empty() {
            String::new()
        } else {
            crate::fortnox::preview(&self.fortnox_access_token)
        };
        f.debug_struct("ApiKeys")
            .field("fortnox_client_id", &self.fortnox_client_id)
            .field("fortnox_client_secret", &"<redacted>")
            .field("fortnox_access_token", &token)
            .field("fortnox_redirect_uri", &self.fortnox_redirect_uri)
            .finish()
    }
}

/// Load/save capability for the [`ApiKeys`] blob.
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<ApiKeys>, Pdf2PoError>;
    fn save(&self, keys: &ApiKeys) -> Result<(), Pdf2PoError>;
    fn clear(&self) -> Result<(), Pdf2PoError>;
}

/// JSON file on disk, by default `<config_dir>/pdf2po/api-keys.json`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the platform configuration directory.
    pub fn default_location() -> Result<Self, Pdf2PoError> {
        let dir = dirs::config_dir().ok_or_else(|| Pdf2PoError::CredentialStore {
            path: PathBuf::from("api-keys.json"),
            detail: "no configuration directory on this platform".into(),
        })?;
        Ok(Self::new(dir.join("pdf2po").join("api-keys.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_err(&self, detail: impl fmt::Display) -> Pdf2PoError {
        Pdf2PoError::CredentialStore {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<ApiKeys>, Pdf2PoError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.store_err(e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| self.store_err(e))
    }

    fn save(&self, keys: &ApiKeys) -> Result<(), Pdf2PoError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| self.store_err(e))?;

        let json = serde_json::to_vec_pretty(keys).map_err(|e| self.store_err(e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.store_err(e))?;
        tmp.write_all(&json).map_err(|e| self.store_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.store_err(e.error))?;
        debug!("Saved API keys to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), Pdf2PoError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.store_err(e)),
        }
    }
}

/// In-process store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    keys: Mutex<Option<ApiKeys>>,
}

impl MemoryCredentialStore {
    pub fn new(keys: Option<ApiKeys>) -> Self {
        Self {
            keys: Mutex::new(keys),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<ApiKeys>>, Pdf2PoError> {
        self.keys
            .lock()
            .map_err(|_| Pdf2PoError::Internal("credential store lock poisoned".into()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<ApiKeys>, Pdf2PoError> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, keys: &ApiKeys) -> Result<(), Pdf2PoError> {
        *self.lock()? = Some(keys.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), Pdf2PoError> {
        *self.lock()? = None;
        Ok(())
    }
}
