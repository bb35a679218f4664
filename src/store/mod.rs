//! Persistence layer: libSQL-backed storage for sessions and leads.

pub mod adapter;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use adapter::SessionStore;
pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, LeadRecord};
