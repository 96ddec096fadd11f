//! Optional JSON Schema validation of event payloads.
//!
//! Validate the `data` of incoming envelopes against JSON Schema 2020-12,
//! keyed by event name. Payloads that violate their contract are dropped at
//! the dispatch gate instead of reaching listeners.

pub mod config;
pub mod error;
pub mod registry;
pub mod validator;

pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use registry::SchemaRegistry;
