use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokitask_core::storage::{DocumentStore, StoreError};
use tracing::{debug, instrument};

use crate::key_provider::{DataKey, KeyProvider};

const ENVELOPE_VERSION: u8 = 1;
const EXTENSION: &str = "toki";

/// File-backed document store. Each document key (`users/<id>`) maps to one
/// sealed file under `root`; the key itself is bound as associated data so a
/// document cannot be replayed under another user's key.
pub struct EncryptedFileStore<P: KeyProvider> {
    root: PathBuf,
    keys: P,
}

/// On-disk envelope.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u8,
    nonce: String,
    ciphertext: String,
}

impl<P: KeyProvider> EncryptedFileStore<P> {
    pub fn new(root: impl Into<PathBuf>, keys: P) -> Self {
        Self {
            root: root.into(),
            keys,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        let mut segments = key.split('/').peekable();
        while let Some(segment) = segments.next() {
            let valid = !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
            if !valid {
                return Err(StoreError::Storage {
                    reason: format!("invalid document key: {key}"),
                });
            }
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                // Appended, not set: ids may contain dots ("john.doe").
                path.push(format!("{segment}.{EXTENSION}"));
            }
        }
        Ok(path)
    }

    async fn cipher(&self) -> Result<Aes256Gcm, StoreError> {
        let key: DataKey = self.keys.data_key().await.map_err(storage_err)?;
        debug!(source = key.source, "data key loaded");
        Aes256Gcm::new_from_slice(&key.bytes).map_err(storage_err)
    }
}

#[async_trait]
impl<P: KeyProvider> DocumentStore for EncryptedFileStore<P> {
    #[instrument(skip(self, document), fields(bytes = document.len()))]
    async fn put(&self, key: &str, document: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let cipher = self.cipher().await?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: document,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|e| StoreError::Storage {
                reason: format!("seal failed: {e}"),
            })?;

        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            nonce: STANDARD.encode(nonce.as_slice()),
            ciphertext: STANDARD.encode(ciphertext),
        };
        write_atomically(&path, &serde_json::to_vec_pretty(&envelope).map_err(storage_err)?)
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(err) => return Err(storage_err(err)),
        };

        let envelope: Envelope = serde_json::from_slice(&bytes).map_err(storage_err)?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(StoreError::Storage {
                reason: format!("unsupported envelope version {}", envelope.version),
            });
        }
        let nonce = STANDARD.decode(envelope.nonce).map_err(storage_err)?;
        if nonce.len() != 12 {
            return Err(StoreError::Storage {
                reason: "corrupt nonce".to_string(),
            });
        }
        let ciphertext = STANDARD.decode(envelope.ciphertext).map_err(storage_err)?;

        self.cipher()
            .await?
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| StoreError::Storage {
                reason: "document could not be opened with the current data key".to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Storage {
        reason: "document path has no parent".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(bytes).map_err(storage_err)?;
    tmp.as_file().sync_all().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tokitask_core::storage::user_document_key;

    use super::*;
    use crate::key_provider::InMemoryKeyProvider;

    #[tokio::test]
    async fn documents_are_sealed_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EncryptedFileStore::new(dir.path(), InMemoryKeyProvider::default());
        let key = user_document_key("alice");

        store
            .put(&key, br#"{"endOfDay":"21:30"}"#)
            .await
            .expect("put");
        assert_eq!(
            store.get(&key).await.expect("get"),
            br#"{"endOfDay":"21:30"}"#
        );

        let path = dir.path().join("users").join("alice.toki");
        let on_disk = fs::read_to_string(path).expect("sealed file exists");
        assert!(!on_disk.contains("endOfDay"));
    }

    #[tokio::test]
    async fn document_cannot_be_moved_between_users() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EncryptedFileStore::new(dir.path(), InMemoryKeyProvider::default());
        store
            .put(&user_document_key("alice"), b"secret")
            .await
            .expect("put");

        let users = dir.path().join("users");
        fs::copy(users.join("alice.toki"), users.join("mallory.toki")).expect("copy");

        let err = store
            .get(&user_document_key("mallory"))
            .await
            .expect_err("aad mismatch must fail");
        assert!(matches!(err, StoreError::Storage { .. }));
    }

    #[tokio::test]
    async fn dotted_user_ids_get_separate_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EncryptedFileStore::new(dir.path(), InMemoryKeyProvider::default());
        let doe = user_document_key("john.doe");
        let smith = user_document_key("john.smith");

        store.put(&doe, b"doe").await.expect("put doe");
        store.put(&smith, b"smith").await.expect("put smith");

        assert_eq!(store.get(&doe).await.expect("get doe"), b"doe");
        assert_eq!(store.get(&smith).await.expect("get smith"), b"smith");

        let mut files: Vec<String> = fs::read_dir(dir.path().join("users"))
            .expect("users dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, ["john.doe.toki", "john.smith.toki"]);
    }

    #[tokio::test]
    async fn rejects_path_escaping_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EncryptedFileStore::new(dir.path(), InMemoryKeyProvider::default());
        for key in ["../etc/passwd", "users//x", "users/a b"] {
            let err = store.put(key, b"x").await.expect_err(key);
            assert!(matches!(err, StoreError::Storage { .. }), "{key}");
        }
    }

    #[tokio::test]
    async fn missing_and_deleted_documents_are_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EncryptedFileStore::new(dir.path(), InMemoryKeyProvider::default());
        let key = user_document_key("bob");

        assert!(matches!(
            store.get(&key).await,
            Err(StoreError::NotFound { .. })
        ));
        store.put(&key, b"v").await.expect("put");
        store.delete(&key).await.expect("delete");
        store.delete(&key).await.expect("delete again");
        assert!(matches!(
            store.get(&key).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
