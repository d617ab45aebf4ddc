//! Domain types and pure policy for video generation jobs.
//!
//! Nothing in this crate performs IO. The polling client in
//! `vidgen-client` drives these types against the remote service.

pub mod backoff;
pub mod error;
pub mod progress;
pub mod types;
