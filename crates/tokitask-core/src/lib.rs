//! Core abstractions for TokiTask: the task model, schedule agent contract,
//! document store contract and the shared error taxonomy.
//! No I/O lives here; backends and providers are in sibling crates.

pub mod agent;
pub mod clock;
pub mod duration;
pub mod error;
pub mod storage;
pub mod tasks;

pub use error::TokiError;
