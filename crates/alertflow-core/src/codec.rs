//! Wire codecs for topic messages.
//!
//! Every message carries an integer `schema_version`. Decoding probes that
//! field first so an unknown version surfaces as `SchemaUnsupported` (a
//! deliberate drop) rather than `PayloadMalformed` (garbage input). Unknown
//! fields are ignored on decode, which is what gives the wire its forward
//! compatibility.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// The schema version this build reads and writes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Deserialize)]
struct VersionProbe {
    schema_version: u32,
}

pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(msg).map_err(|e| FlowError::Internal(e.into()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let probe: VersionProbe = serde_json::from_slice(bytes)
        .map_err(|e| FlowError::PayloadMalformed(e.to_string()))?;
    if probe.schema_version != SCHEMA_VERSION {
        return Err(FlowError::SchemaUnsupported(probe.schema_version));
    }
    serde_json::from_slice(bytes).map_err(|e| FlowError::PayloadMalformed(e.to_string()))
}
