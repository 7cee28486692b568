//! # geolog
//!
//! Append-only binary logging of step-indexed 3D geometry batches.
//!
//! Training code hands over batches of geometry tensors (point positions,
//! per-vertex attributes, mesh and line topology, bounding boxes) once per
//! step; geolog validates and normalizes them, encodes each batch element
//! into an opaque buffer, appends the buffers to per-tag stream files from
//! a single background thread, and returns a compact serialized index
//! (offset, size, checksum per element) that a viewer later uses to fetch
//! payloads by byte range.
//!
//! ## Modules
//!
//! - [`util`] - Errors and masked checksums
//! - [`tensor`] - Tensor containers and the zero-copy adapter boundary
//! - [`writer`] - Asynchronous multi-stream append writer
//! - [`summary`] - Batch validation, encoding, and index construction
//! - [`reader`] - Checksum-verified read-back by index entry
//!
//! ## Example
//!
//! ```no_run
//! use geolog::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> geolog::Result<()> {
//! let logger = GeometryLogger::new();
//! let mut props = PropertyMap::new();
//! props.insert(
//!     "vertex_positions".to_string(),
//!     Tensor::from_f32(&[1, 3, 3], &[0.0; 9])?.into(),
//! );
//! let index = logger.write_geometry_batch(Path::new("logs"), "scene/points", 0, &props, 1)?;
//! logger.close();
//! # let _ = index;
//! # Ok(())
//! # }
//! ```

pub mod reader;
pub mod summary;
pub mod tensor;
pub mod util;
pub mod writer;

// Re-export commonly used types
pub use summary::{GeometryLogger, GeometryMetadata, PropertyMap, PropertyValue};
pub use tensor::{Dtype, Tensor, TensorBuffer};
pub use util::{Error, Result};
pub use writer::{DataWriter, WriterConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::reader::StreamReader;
    pub use crate::summary::{
        BoundingBox, GeometryEncoder, GeometryKind, GeometryLogger, GeometryMetadata,
        GeometrySample, PropertyMap, PropertyValue,
    };
    pub use crate::tensor::{Dtype, Tensor, TensorBuffer};
    pub use crate::util::{Error, Result};
    pub use crate::writer::{DataWriter, WriterConfig};
}
