//! Data Transfer Objects for the HTTP API
//!
//! Request and response bodies exchanged between the pipeline service and its
//! clients.

pub mod pipeline;
