//! Read-through query cache for relational lookups.
//!
//! A [`CacheSession`] sits in front of an opaque database backend and a
//! TTL-capable key-value store. It derives a deterministic key from a
//! call's identity (model, operation, and parameters, or raw query
//! text), serves the stored result when present, and otherwise executes the
//! query, normalizes the result into a plain serializable value, and
//! stores it with a time-to-live.
//!
//! The collaborators stay behind traits: implement [`QueryBackend`] for
//! your query engine and [`CacheStore`] for your key-value client.
//! [`MemoryStore`] is a ready-made process-local store.
//!
//! Sessions are single-call at a time and report whether the last call
//! was a cache hit; explicit invalidation deletes the derived key
//! without touching the database.

mod backend;
mod config;
mod error;
mod key;
mod lock;
mod operation;
mod params;
mod result;
mod session;
mod store;

pub use backend::QueryBackend;
pub use config::CacherConfig;
pub use error::{CacherError, ConfigError, QueryError, StoreError};
pub use operation::Operation;
pub use params::{ModelRef, ParamValue, SharedParams};
pub use result::{Association, QueryResult, Record, normalize};
pub use session::CacheSession;
pub use store::{CacheStore, MemoryStore};
