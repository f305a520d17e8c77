//! HTTP handlers. Object bytes are streamed, never buffered, on the read
//! path; storage concerns are delegated to the injected datasource.

pub mod auth;
pub mod file_handlers;
pub mod health_handlers;
pub mod raw_handlers;
