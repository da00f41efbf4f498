//! User document persistence and the day session that commits every change
//! (manual edits and AI plans) with rollback on failure.

mod repo;
mod session;

pub use repo::StoreUserRepo;
pub use session::{DaySession, SyncOutcome};
