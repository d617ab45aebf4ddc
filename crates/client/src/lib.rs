//! Polling client for long-running video generation jobs.
//!
//! Provides the collaborator traits ([`service::GenerationService`],
//! [`service::AssetFetcher`]), their HTTP implementations for the Veo
//! REST API, environment configuration, and the [`job::JobClient`] that
//! drives one request from submission to downloaded bytes.

pub mod api;
pub mod config;
pub mod fetcher;
pub mod job;
pub mod service;
