//! Analytics Core
//!
//! Core types and abstractions for the analytics pipeline registry.
//!
//! This crate contains:
//! - Domain types: Pipeline definitions, permission records and statistics
//! - DTOs: Request and response bodies exchanged with the HTTP API
//! - Query: Filtering, paging and ordering arguments for pipeline listings

pub mod domain;
pub mod dto;
pub mod query;
