// Database layer module

pub mod pool;
pub mod repositories;
pub mod session;
pub mod store;

pub use pool::DbPool;
pub use session::{Committed, Session, Stageable, Ticket};
pub use store::{ChangeSet, MemoryStore, Persisted, PgStore, Staged, Store};
