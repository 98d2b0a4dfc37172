//! Persistence layer: libSQL-backed storage for sessions, activity, and purchase intents.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::*;
