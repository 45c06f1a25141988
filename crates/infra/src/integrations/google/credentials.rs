//! Keychain-backed credential storage for provider integrations.
//!
//! The OAuth token set never touches SQLite: it is serialized as JSON into
//! one OS keychain entry per user, keyed by the configured service name.

use async_trait::async_trait;
use keyring::Entry;
use tandem_core::CredentialStore;
use tandem_domain::{ProviderCredential, Result, TandemError};
use tracing::{debug, instrument};

use crate::errors::InfraError;

const KEYCHAIN_SERVICE_PREFIX: &str = "Tandem.calendar";

/// Keychain implementation of `CredentialStore`.
pub struct KeychainCredentialStore {
    service: String,
}

impl KeychainCredentialStore {
    /// Store scoped to the given provider name (e.g. "google").
    pub fn new(provider: &str) -> Self {
        Self { service: format!("{KEYCHAIN_SERVICE_PREFIX}.{provider}") }
    }

    /// Store with an explicit keychain service name (primarily for tests).
    pub fn with_service_name(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }

    fn entry(&self, user_id: &str) -> Result<Entry> {
        Entry::new(&self.service, user_id).map_err(|e| InfraError::from(e).into())
    }
}

#[async_trait]
impl CredentialStore for KeychainCredentialStore {
    #[instrument(skip(self))]
    async fn get(&self, user_id: &str) -> Result<Option<ProviderCredential>> {
        let entry = self.entry(user_id)?;

        let payload = match entry.get_password() {
            Ok(payload) => payload,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(InfraError::from(e).into()),
        };

        let credential = serde_json::from_str(&payload).map_err(|e| {
            TandemError::Auth(format!("stored credential is not valid JSON: {e}"))
        })?;

        Ok(Some(credential))
    }

    #[instrument(skip(self, credential))]
    async fn store(&self, user_id: &str, credential: &ProviderCredential) -> Result<()> {
        let entry = self.entry(user_id)?;

        let payload = serde_json::to_string(credential).map_err(|e| {
            TandemError::Internal(format!("failed to serialize credential: {e}"))
        })?;

        entry.set_password(&payload).map_err(InfraError::from)?;
        debug!(user_id, "stored provider credential");
        Ok(())
    }
}
