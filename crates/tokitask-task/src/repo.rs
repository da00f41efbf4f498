use std::sync::Arc;

use async_trait::async_trait;
use tokitask_core::{
    storage::{user_document_key, DocumentStore, StoreError},
    tasks::{UserData, UserDataRepository},
    TokiError,
};
use tracing::instrument;

/// User document repository over any [`DocumentStore`].
pub struct StoreUserRepo<S: DocumentStore> {
    store: Arc<S>,
    key: String,
}

impl<S: DocumentStore> StoreUserRepo<S> {
    pub fn new(store: S, user_id: &str) -> Self {
        Self {
            store: Arc::new(store),
            key: user_document_key(user_id),
        }
    }

    pub fn document_key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl<S: DocumentStore> UserDataRepository for StoreUserRepo<S> {
    #[instrument(skip(self), fields(key = %self.key))]
    async fn load(&self) -> Result<UserData, TokiError> {
        match self.store.get(&self.key).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(StoreError::NotFound { .. }) => Ok(UserData::default()),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, data), fields(key = %self.key, day_tasks = data.day_tasks.len()))]
    async fn save(&self, data: &UserData) -> Result<(), TokiError> {
        let bytes = serde_json::to_vec(data)?;
        self.store.put(&self.key, &bytes).await?;
        Ok(())
    }
}
