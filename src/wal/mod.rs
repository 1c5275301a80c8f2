//! Durable local state
//!
//! The WAL module provides crash-safe persistence for everything the engine
//! keeps on disk. Placements are logged before execution and marked complete
//! after, enabling inspection and rollback of interrupted moves on restart.
//!
//! ## Modules
//! - `io` - Safe I/O utilities (atomic writes, fsync, advisory locks, symlink detection)
//! - `store` - JSON load/save helpers and the shared `StoreError`
//! - `transaction` - Transaction records and the transaction log

pub mod io;
pub mod store;
pub mod transaction;

pub use io::{atomic_write, ensure_not_symlink, is_symlink, safe_read_prefix, SafeIoError};
pub use store::{load_json, save_json, StoreError};
pub use transaction::*;
