//! Pump Collector - pump controller telemetry ingestion and cycle reporting
//!
//! This library exposes the core modules for testing and reuse.

pub mod common;
pub mod config;
pub mod cycles;
pub mod entity;
pub mod error;
pub mod ingest;
pub mod routes;
pub mod store;
pub mod versions;
