//! Data models shared by the datasources and the HTTP layer.
//!
//! `file` is the metadata record persisted in SQLite; `listing` holds the
//! transient wire shapes of the remote bucket API.

pub mod file;
pub mod listing;
