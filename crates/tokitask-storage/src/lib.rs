//! Document store backends: per-user JSON documents sealed with AES-GCM.
//! Keys come from the OS keyring, an environment variable, or memory in tests.

pub mod file_store;
pub mod key_provider;
