//! Host key providers.

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::vault::cipher::{HostKey, HOST_KEY_LEN};
use crate::vault::VaultError;

/// Source of the host encryption key shared by all sessions of one host.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_key(&self) -> Result<HostKey, VaultError>;
}

/// Reads a hex-encoded key from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvSecretProvider {
    var: String,
}

impl EnvSecretProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_key(&self) -> Result<HostKey, VaultError> {
        let encoded = Zeroizing::new(
            std::env::var(&self.var)
                .map_err(|_| VaultError::SecretUnavailable(format!("environment variable {} not set", self.var)))?,
        );
        let key = HostKey::from_hex(&encoded)?;
        if key.len() != HOST_KEY_LEN {
            return Err(VaultError::KeyMismatch {
                expected: HOST_KEY_LEN,
                actual: key.len(),
            });
        }
        Ok(key)
    }
}

/// Fixed in-process key, for tests and embedding.
#[derive(Debug, Clone)]
pub struct StaticSecretProvider {
    key: HostKey,
}

impl StaticSecretProvider {
    pub fn new(key: HostKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_key(&self) -> Result<HostKey, VaultError> {
        Ok(self.key.clone())
    }
}
