//! alertflow-core — domain model and matching engine for the alert data plane.
//!
//! This crate holds everything the service binaries share: the wire types and
//! codecs for every topic message, the error taxonomy, the rule snapshot
//! model, the inverted index engine, and the storage/publish port traits.
//! Adapter crates (alertflow-kafka, alertflow-postgres, alertflow-redis)
//! implement the ports; `store_memory` provides in-memory implementations
//! that back the test suites.

pub mod codec;
pub mod error;
pub mod index;
pub mod ports;
pub mod snapshot;
pub mod store_memory;
pub mod types;

pub use error::{FlowError, Result};
