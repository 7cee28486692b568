//! Error types for the geolog library.

use thiserror::Error;

/// Main error type for geometry logging operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The mandatory geometry property is missing from the batch
    #[error("Primary key 'vertex_positions' not provided")]
    MissingPrimaryKey,

    /// Property name is neither predefined nor an arbitrary vertex feature
    #[error("Unknown geometry property: {0}")]
    UnknownProperty(String),

    /// Property tensor shape disagrees with the established batch shape
    #[error("Property {property} should have {expected} but has {actual}")]
    ShapeMismatch {
        property: String,
        expected: String,
        actual: String,
    },

    /// Step reference is negative or does not point to an earlier step
    #[error("Out of order step reference {step_ref} for property {property} at step {step}")]
    StepReferenceOutOfRange {
        property: String,
        step_ref: i64,
        step: i64,
    },

    /// Step references are only valid for predefined geometry properties
    #[error("Property {0} cannot be a step reference")]
    StepRefNotAllowed(String),

    /// Bounding boxes must be written without any other property
    #[error("Saving bounding boxes: add other geometry data with a separate call")]
    MixedBoundingBoxes,

    /// max_outputs must be at least 1
    #[error("max_outputs ({0}) should be a positive integer")]
    InvalidMaxOutputs(usize),

    /// External encoder rejected a batch element
    #[error("Geometry data serialization for tag {tag} step {step} failed: {reason}")]
    EncodeFailed {
        tag: String,
        step: i64,
        reason: String,
    },

    /// An earlier background write to this stream failed
    #[error("Stream {0} is poisoned by an earlier write error")]
    StreamPoisoned(String),

    /// Writer has been closed and accepts no new jobs
    #[error("Writer is closed")]
    WriterClosed,

    /// Stored checksum does not match the payload read back
    #[error("Checksum mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    /// Requested payload range lies outside the stream file
    #[error("Byte range {start}+{size} out of bounds (file size {len})")]
    RangeOutOfBounds { start: u64, size: u64, len: u64 },

    /// Serialization of the batch index or an aux record failed
    #[error("Index serialization failed: {0}")]
    IndexSerialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a shape mismatch error for a property.
    pub fn shape(
        property: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ShapeMismatch {
            property: property.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result type alias for geometry logging operations.
pub type Result<T> = std::result::Result<T, Error>;
