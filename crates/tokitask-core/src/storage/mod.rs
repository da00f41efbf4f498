mod document_store;

pub use document_store::{user_document_key, DocumentStore, InMemoryDocumentStore, StoreError};
