//! Core domain types
//!
//! This module contains the core domain structures used across the analytics services.
//! Pipelines are only stored and shared here; nothing in this workspace executes them.

pub mod permission;
pub mod pipeline;
pub mod statistics;
