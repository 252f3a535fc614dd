//! JSON form of the persisted collection.
//!
//! The stored value is a bare array of records in creation order, each
//! `{id, type, content, timestamp, shape, styleColor}`. The same layout is
//! used for export files, so an export can be dropped back into storage
//! unchanged.

use crate::collection::MemoryCollection;
use crate::error::{JarError, Result};

/// Compact form written to the key-value store.
pub fn encode_collection(collection: &MemoryCollection) -> Result<String> {
    serde_json::to_string(collection).map_err(|e| JarError::InvalidData(e.to_string()))
}

/// Decode a stored or exported collection. Duplicate ids are rejected.
pub fn decode_collection(json: &str) -> Result<MemoryCollection> {
    serde_json::from_str(json).map_err(|e| JarError::InvalidData(e.to_string()))
}

/// Human-readable form for export files.
pub fn export_json(collection: &MemoryCollection) -> Result<String> {
    serde_json::to_string_pretty(collection).map_err(|e| JarError::InvalidData(e.to_string()))
}

pub fn import_json(json: &str) -> Result<MemoryCollection> {
    decode_collection(json)
}
