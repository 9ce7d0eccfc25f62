//! Persistence layer: connection management, row types, and queries for the
//! job orchestration engine.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
