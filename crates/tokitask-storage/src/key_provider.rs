use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// Environment variable holding a base64 data key for headless machines.
pub const DATA_KEY_ENV: &str = "TOKITASK_DATA_KEY";

/// 256-bit key sealing user documents at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey {
    /// Where the key came from; safe to log.
    pub source: &'static str,
    pub bytes: [u8; 32],
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("key unavailable: {0}")]
    Unavailable(String),
}

/// Source of the data key.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn data_key(&self) -> Result<DataKey, KeyError>;
}

#[async_trait]
impl KeyProvider for Box<dyn KeyProvider> {
    async fn data_key(&self) -> Result<DataKey, KeyError> {
        (**self).data_key().await
    }
}

/// OS keychain provider; creates the key on first use.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn data_key(&self) -> Result<DataKey, KeyError> {
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        match entry.get_password() {
            Ok(secret) => decode_key(&secret, "keyring"),
            Err(keyring::Error::NoEntry) => {
                let key = random_key("keyring");
                entry
                    .set_password(&general_purpose::STANDARD.encode(key.bytes))
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                Ok(key)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

/// Reads the key from [`DATA_KEY_ENV`].
#[derive(Debug, Default, Clone)]
pub struct EnvKeyProvider;

#[async_trait]
impl KeyProvider for EnvKeyProvider {
    async fn data_key(&self) -> Result<DataKey, KeyError> {
        let secret = std::env::var(DATA_KEY_ENV)
            .map_err(|_| KeyError::Unavailable(format!("{DATA_KEY_ENV} is not set")))?;
        decode_key(secret.trim(), "env")
    }
}

/// Process-local key for tests and throwaway sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<DataKey>>>,
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn data_key(&self) -> Result<DataKey, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Unavailable(format!("lock poisoned: {err}")))?;
        Ok(guard.get_or_insert_with(|| random_key("memory")).clone())
    }
}

fn random_key(source: &'static str) -> DataKey {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    DataKey { source, bytes }
}

fn decode_key(secret: &str, source: &'static str) -> Result<DataKey, KeyError> {
    let raw = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|raw: Vec<u8>| KeyError::Decode(format!("expected 32 bytes, got {}", raw.len())))?;
    Ok(DataKey { source, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_provider_is_stable_per_instance() {
        let provider = InMemoryKeyProvider::default();
        let first = provider.data_key().await.unwrap();
        let second = provider.data_key().await.unwrap();
        assert_eq!(first, second);

        let other = InMemoryKeyProvider::default().data_key().await.unwrap();
        assert_ne!(first.bytes, other.bytes);
    }

    #[test]
    fn decode_checks_length() {
        let err = decode_key("abcd", "env").expect_err("short key");
        assert!(matches!(err, KeyError::Decode(_)));

        let encoded = general_purpose::STANDARD.encode([7u8; 32]);
        let key = decode_key(&encoded, "env").expect("valid key");
        assert_eq!(key.bytes, [7u8; 32]);
    }

    #[test]
    fn debug_output_hides_key_bytes() {
        let key = DataKey {
            source: "memory",
            bytes: [42u8; 32],
        };
        let rendered = format!("{key:?}");
        assert!(rendered.contains("memory"));
        assert!(!rendered.contains("42"));
    }
}
