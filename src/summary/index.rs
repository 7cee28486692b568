//! The batch index returned to the host summary protocol.
//!
//! Stream files carry no in-band framing; every payload is located through
//! the (offset, size, checksum) tuples recorded here and persisted by the
//! host as the summary value for one (tag, step).

use serde::{Deserialize, Serialize};

use crate::util::{Error, Result};

/// Index format version embedded in every serialized value.
pub const INDEX_VERSION: u32 = 1;

/// Byte range and checksum of one auxiliary sub-record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRecord {
    pub start: u64,
    pub size: u64,
    pub masked_crc32c: u32,
}

/// Location of one written payload within a stream file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchIndexEntry {
    /// Byte offset of the payload.
    pub start: u64,
    /// Payload size in bytes.
    pub size: u64,
    /// Masked CRC32C of the payload.
    pub masked_crc32c: u32,
    /// Label/confidence sub-record written directly after the payload.
    pub aux: Option<SubRecord>,
}

/// Byte ranges for every element of one written batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchIndex {
    /// Physical file the ranges refer to; set by the first element.
    pub filename: String,
    pub entries: Vec<BatchIndexEntry>,
}

/// Back-reference to a property written at an earlier step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyReference {
    pub property: String,
    pub step_ref: i64,
}

/// The serialized summary value for one (tag, step).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeometryMetadata {
    pub version: u32,
    pub batch_index: BatchIndex,
    pub property_references: Vec<PropertyReference>,
}

impl Default for GeometryMetadata {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            batch_index: BatchIndex::default(),
            property_references: Vec::new(),
        }
    }
}

impl GeometryMetadata {
    /// Serialize for handoff to the host summary protocol.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::IndexSerialization(e.to_string()))
    }

    /// Deserialize a previously returned summary value.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| Error::IndexSerialization(e.to_string()))
    }
}

/// Label/confidence pair attached to one geometry element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub label: i32,
    pub confidence: f32,
}

/// Serialize the aux sub-record for one batch element.
pub fn serialize_aux(results: &[InferenceResult]) -> Result<Vec<u8>> {
    bincode::serialize(results).map_err(|e| Error::IndexSerialization(e.to_string()))
}

/// Deserialize an aux sub-record fetched back from a stream file.
pub fn deserialize_aux(data: &[u8]) -> Result<Vec<InferenceResult>> {
    bincode::deserialize(data).map_err(|e| Error::IndexSerialization(e.to_string()))
}

/// Accumulates per-element byte ranges as payloads are enqueued.
#[derive(Debug, Default)]
pub(crate) struct BatchIndexBuilder {
    index: BatchIndex,
}

impl BatchIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the range of a batch element's payload. The filename is
    /// captured from the first element; later elements land in the same
    /// stream file by construction.
    pub fn record(&mut self, filename: &str, start: u64, size: u64, masked_crc32c: u32) {
        if self.index.entries.is_empty() {
            self.index.filename = filename.to_string();
        }
        self.index.entries.push(BatchIndexEntry {
            start,
            size,
            masked_crc32c,
            aux: None,
        });
    }

    /// Attach an aux sub-record to the most recently recorded element.
    pub fn record_aux(&mut self, start: u64, size: u64, masked_crc32c: u32) {
        if let Some(entry) = self.index.entries.last_mut() {
            entry.aux = Some(SubRecord {
                start,
                size,
                masked_crc32c,
            });
        }
    }

    /// Build the final metadata value.
    pub fn finish(self, property_references: Vec<PropertyReference>) -> GeometryMetadata {
        GeometryMetadata {
            version: INDEX_VERSION,
            batch_index: self.index,
            property_references,
        }
    }
}
