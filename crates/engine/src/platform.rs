//! Concrete implementations of the capability traits.
//!
//! - [`ReqwestDirectory`]: the ContactBook REST API over reqwest
//! - [`MemoryDirectory`]: in-process directory for offline use and tests
//! - [`FileCredentialStore`]: API key kept in a small text file
//! - [`MemoryCredentialStore`]: API key kept in memory

use crate::contacts::{Contact, ContactDraft, ContactId, ValidationError};
use crate::traits::*;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

pub const DEFAULT_API_URL: &str = "https://api.itvarsity.org/api/ContactBook/";
pub const DEFAULT_API_KEY: &str = "appacademy@itvarsity.org";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Connection settings for [`ReqwestDirectory`].
#[derive(Debug, Clone)]
pub struct DirectorySettings {
    pub api_url: String,
    /// Used when the credential store holds no key.
    pub default_api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            default_api_key: Some(DEFAULT_API_KEY.to_string()),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

// ===========================================================================
// HTTP directory – wraps reqwest
// ===========================================================================

pub struct ReqwestDirectory {
    client: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialStore>,
    default_api_key: Option<String>,
}

impl ReqwestDirectory {
    pub fn new(settings: &DirectorySettings, credentials: Arc<dyn CredentialStore>) -> CapResult<Self> {
        // reqwest is built without a bundled crypto provider; another caller
        // may already have installed one.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let mut api_url = settings.api_url.trim().to_string();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }
        let base_url = Url::parse(&api_url)
            .map_err(|e| CapError::Other(format!("invalid directory url {}: {}", api_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| CapError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            credentials,
            default_api_key: settings
                .default_api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from),
        })
    }

    fn api_key(&self) -> CapResult<String> {
        match self.credentials.get()? {
            Some(key) => Ok(key),
            None => self
                .default_api_key
                .clone()
                .ok_or_else(|| ValidationError::EmptyApiKey.into()),
        }
    }

    /// `{base}{action}[/{id}]?apiKey={key}`
    fn endpoint(&self, action: &str, id: Option<&ContactId>) -> CapResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CapError::Other(format!("directory url cannot be a base: {}", self.base_url)))?;
            segments.pop_if_empty().push(action);
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        url.query_pairs_mut().append_pair("apiKey", &self.api_key()?);
        Ok(url)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> CapResult<reqwest::Response> {
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CapError::Timeout
            } else {
                CapError::Network(format!("{}: {}", operation, e.without_url()))
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            debug!(operation, status = status.as_u16(), "directory request ok");
            return Ok(resp);
        }
        warn!(operation, status = status.as_u16(), "directory request failed");
        Err(CapError::Rejected {
            operation,
            status: status.as_u16(),
        })
    }
}

/// Map a 404 from an id-addressed request onto [`CapError::NotFound`].
fn not_found_as(id: &ContactId, err: CapError) -> CapError {
    match err {
        CapError::Rejected { status: 404, .. } => CapError::NotFound(id.clone()),
        other => other,
    }
}

#[async_trait::async_trait]
impl DirectoryService for ReqwestDirectory {
    async fn list(&self) -> CapResult<Vec<Contact>> {
        let url = self.endpoint("GetContacts", None)?;
        let resp = self.send("list", self.client.get(url)).await?;
        resp.json::<Vec<Contact>>()
            .await
            .map_err(|e| CapError::Decode(e.without_url().to_string()))
    }

    async fn get(&self, id: &ContactId) -> CapResult<Contact> {
        let url = self.endpoint("GetContact", Some(id))?;
        let resp = self
            .send("get", self.client.get(url))
            .await
            .map_err(|e| not_found_as(id, e))?;
        resp.json::<Contact>()
            .await
            .map_err(|e| CapError::Decode(e.without_url().to_string()))
    }

    async fn create(&self, draft: &ContactDraft) -> CapResult<()> {
        draft.validate()?;
        let body = draft.normalized();
        let url = self.endpoint("AddContact", None)?;
        self.send("create", self.client.post(url).json(&body)).await?;
        info!(name = %body.name, surname = %body.surname, "contact added");
        Ok(())
    }

    async fn update(&self, id: &ContactId, draft: &ContactDraft) -> CapResult<()> {
        draft.validate()?;
        let body = draft.normalized().into_contact(id.clone());
        let url = self.endpoint("UpdateContact", Some(id))?;
        self.send("update", self.client.put(url).json(&body))
            .await
            .map_err(|e| not_found_as(id, e))?;
        info!(%id, "contact updated");
        Ok(())
    }

    async fn delete(&self, id: &ContactId) -> CapResult<()> {
        let url = self.endpoint("DeleteContact", Some(id))?;
        self.send("delete", self.client.delete(url))
            .await
            .map_err(|e| not_found_as(id, e))?;
        info!(%id, "contact deleted");
        Ok(())
    }
}

// ===========================================================================
// In-memory directory
// ===========================================================================

/// Directory held in process memory with sequential integer ids.
pub struct MemoryDirectory {
    contacts: RwLock<Vec<Contact>>,
    next_id: AtomicU64,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            contacts: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Directory pre-filled with two sample contacts.
    pub fn with_sample_data() -> Self {
        let dir = Self::new();
        let samples = [
            ("John", "Doe", "john@example.com", "1234567890"),
            ("Jane", "Smith", "jane@example.com", "0987654321"),
        ];
        if let Ok(mut contacts) = dir.contacts.write() {
            for (name, surname, email, phone) in samples {
                let id = dir.allocate_id();
                contacts.push(Contact {
                    id,
                    name: name.into(),
                    surname: surname.into(),
                    email: email.into(),
                    phone: phone.into(),
                    address: None,
                });
            }
        }
        dir
    }

    fn allocate_id(&self) -> ContactId {
        ContactId(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> CapError {
    CapError::Other("directory lock poisoned".into())
}

#[async_trait::async_trait]
impl DirectoryService for MemoryDirectory {
    async fn list(&self) -> CapResult<Vec<Contact>> {
        Ok(self.contacts.read().map_err(poisoned)?.clone())
    }

    async fn get(&self, id: &ContactId) -> CapResult<Contact> {
        self.contacts
            .read()
            .map_err(poisoned)?
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .ok_or_else(|| CapError::NotFound(id.clone()))
    }

    async fn create(&self, draft: &ContactDraft) -> CapResult<()> {
        draft.validate()?;
        let mut contacts = self.contacts.write().map_err(poisoned)?;
        let contact = draft.normalized().into_contact(self.allocate_id());
        info!(id = %contact.id, "contact added");
        contacts.push(contact);
        Ok(())
    }

    async fn update(&self, id: &ContactId, draft: &ContactDraft) -> CapResult<()> {
        draft.validate()?;
        let mut contacts = self.contacts.write().map_err(poisoned)?;
        let slot = contacts
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| CapError::NotFound(id.clone()))?;
        *slot = draft.normalized().into_contact(id.clone());
        info!(%id, "contact updated");
        Ok(())
    }

    async fn delete(&self, id: &ContactId) -> CapResult<()> {
        let mut contacts = self.contacts.write().map_err(poisoned)?;
        let before = contacts.len();
        contacts.retain(|c| &c.id != id);
        if contacts.len() == before {
            return Err(CapError::NotFound(id.clone()));
        }
        info!(%id, "contact deleted");
        Ok(())
    }
}

// ===========================================================================
// Credential stores
// ===========================================================================

/// API key persisted as a single line of text.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> CapResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => {
                let token = s.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CapError::Io(e)),
        }
    }

    fn set(&self, token: &str) -> CapResult<()> {
        let token = sanitize_token(token)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, format!("{}\n", token))?;
        info!(path = %self.path.display(), "api key saved");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: RwLock::new(Some(token.to_string())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> CapResult<Option<String>> {
        Ok(self.token.read().map_err(poisoned)?.clone())
    }

    fn set(&self, token: &str) -> CapResult<()> {
        let token = sanitize_token(token)?;
        *self.token.write().map_err(poisoned)? = Some(token);
        Ok(())
    }
}
