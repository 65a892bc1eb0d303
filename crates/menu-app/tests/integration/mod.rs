//! Integration tests for menu-app.
//!
//! These tests drive the whole pipeline:
//! - WebSocket connection lifecycle
//! - Tick ingestion and metadata resolution
//! - Failure handling without losing applied state

pub mod common;
