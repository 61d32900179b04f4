//! Service Module
//!
//! Business logic layer. The registry composes the document store and the
//! permission service behind the operations the HTTP layer exposes.

pub mod reconcile;
pub mod registry;

pub use registry::{PIPELINE_TOPIC, Registry, RegistryError};
