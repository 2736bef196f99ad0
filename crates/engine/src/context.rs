//! Application context – holds capability trait objects and settings.

use crate::calculator::{Calculator, DEFAULT_MAX_DISPLAY_LENGTH};
use crate::platform::{
    DirectorySettings, FileCredentialStore, MemoryCredentialStore, MemoryDirectory,
    ReqwestDirectory,
};
use crate::traits::*;
use std::path::Path;
use std::sync::Arc;

/// Central context passed to all engine commands.
///
/// Holds trait-object capabilities so front ends can swap implementations
/// (HTTP directory vs in-memory directory, file vs memory credentials).
pub struct AppContext {
    directory: Box<dyn DirectoryService>,
    credentials: Arc<dyn CredentialStore>,
    /// Display cap for calculators created through this context.
    pub max_display_length: usize,
}

impl AppContext {
    pub fn new(directory: Box<dyn DirectoryService>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            directory,
            credentials,
            max_display_length: DEFAULT_MAX_DISPLAY_LENGTH,
        }
    }

    /// Sample in-memory directory and an empty in-memory credential store.
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryDirectory::with_sample_data()),
            Arc::new(MemoryCredentialStore::new()),
        )
    }

    /// Remote ContactBook directory with the API key stored at
    /// `credential_path`.
    pub fn http(settings: &DirectorySettings, credential_path: &Path) -> CapResult<Self> {
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(credential_path));
        let directory = ReqwestDirectory::new(settings, credentials.clone())?;
        Ok(Self::new(Box::new(directory), credentials))
    }

    pub fn with_max_display_length(mut self, max_display_length: usize) -> Self {
        self.max_display_length = max_display_length;
        self
    }

    pub fn directory(&self) -> &dyn DirectoryService {
        self.directory.as_ref()
    }

    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    pub fn new_calculator(&self) -> Calculator {
        Calculator::with_max_display_length(self.max_display_length)
    }
}
