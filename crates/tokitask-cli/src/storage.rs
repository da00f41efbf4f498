use std::path::PathBuf;

use color_eyre::Result;
use dirs::data_dir;
use tokitask_storage::{
    file_store::EncryptedFileStore,
    key_provider::{EnvKeyProvider, KeyProvider, KeyringProvider, DATA_KEY_ENV},
};
use tokitask_task::{DaySession, StoreUserRepo};
use tracing::debug;

use crate::config::Config;

pub type FileStore = EncryptedFileStore<Box<dyn KeyProvider>>;
pub type Session = DaySession<StoreUserRepo<FileStore>>;

/// Resolve the default data directory for TokiTask.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("tokitask"))
}

/// Build the sealed document store, honoring config and key overrides.
pub fn store_from_config(config: &Config) -> Result<FileStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    let keys: Box<dyn KeyProvider> = if std::env::var_os(DATA_KEY_ENV).is_some() {
        debug!(?root, "initializing document store (env key)");
        Box::new(EnvKeyProvider)
    } else {
        debug!(?root, "initializing document store (keyring)");
        Box::new(KeyringProvider::new("tokitask", "data-key"))
    };
    Ok(EncryptedFileStore::new(root, keys))
}

/// Open the configured user's day session.
pub async fn open_session(config: &Config) -> Result<Session> {
    let repo = StoreUserRepo::new(store_from_config(config)?, config.user_id());
    Ok(DaySession::open(repo).await?)
}

/// Helper for tests to construct a store rooted at a temp dir with an in-memory key.
#[cfg(test)]
pub fn test_store(root: impl Into<PathBuf>) -> FileStore {
    EncryptedFileStore::new(
        root,
        Box::new(tokitask_storage::key_provider::InMemoryKeyProvider::default()),
    )
}
