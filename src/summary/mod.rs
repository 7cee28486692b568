//! Geometry batch summaries: validation, role dispatch, encoding, and
//! index construction.
//!
//! One call to [`GeometryLogger::write_geometry_batch`] validates a batch,
//! encodes each element, hands the buffers to the background writer, and
//! returns the serialized [`GeometryMetadata`] index for the host summary
//! protocol to persist.

mod bbox;
mod encoder;
mod index;
mod preprocess;
mod properties;

pub use bbox::{BoundingBox, LINES_PER_BBOX, VERTICES_PER_BBOX};
pub use encoder::{FramedEncoder, GeometryEncoder, GeometrySample};
pub use index::{
    deserialize_aux, serialize_aux, BatchIndex, BatchIndexEntry, GeometryMetadata,
    InferenceResult, PropertyReference, SubRecord, INDEX_VERSION,
};
pub use properties::{
    is_predefined, predefined_dim, role_of, GeometryKind, Role, GEOMETRY_PROPERTY_DIMS,
};

use std::collections::BTreeMap;
use std::path::Path;

use index::BatchIndexBuilder;
use preprocess::{check_prop_shape, preprocess};

use crate::tensor::Tensor;
use crate::util::{masked_crc32c, Error, Result};
use crate::writer::{DataWriter, WriterConfig};

/// One property's value in a batch submission.
#[derive(Clone, Debug)]
pub enum PropertyValue {
    /// A single `(N, D)` tensor (batch size 1) or a `(B, N, D)` tensor.
    Tensor(Tensor),
    /// B separate `(N, D)` tensors.
    Batch(Vec<Tensor>),
    /// Reuse the tensor written at an earlier step instead of new data.
    StepRef(i64),
    /// Bounding boxes, `(B, Nbb)`; exclusive with every other property.
    BoundingBoxes(Vec<Vec<BoundingBox>>),
}

impl PropertyValue {
    /// Boxes for a single-element batch.
    pub fn bboxes(boxes: Vec<BoundingBox>) -> Self {
        Self::BoundingBoxes(vec![boxes])
    }
}

impl From<Tensor> for PropertyValue {
    fn from(t: Tensor) -> Self {
        Self::Tensor(t)
    }
}

impl From<Vec<Tensor>> for PropertyValue {
    fn from(tensors: Vec<Tensor>) -> Self {
        Self::Batch(tensors)
    }
}

/// Property name to value mapping for one batch.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Writes step-indexed geometry batches for later viewer retrieval.
///
/// Owns the background [`DataWriter`] and the payload encoder. Construct
/// one per output target and share it by reference between producer
/// threads; validation runs on the calling thread, disk I/O does not.
pub struct GeometryLogger {
    writer: DataWriter,
    encoder: Box<dyn GeometryEncoder>,
}

impl GeometryLogger {
    /// Logger with default configuration and the built-in framed encoder.
    pub fn new() -> Self {
        Self::with_config(WriterConfig::default())
    }

    /// Logger with a custom writer configuration.
    pub fn with_config(config: WriterConfig) -> Self {
        Self::with_encoder(config, Box::new(FramedEncoder))
    }

    /// Logger delegating payload encoding to a caller-supplied encoder.
    pub fn with_encoder(config: WriterConfig, encoder: Box<dyn GeometryEncoder>) -> Self {
        Self {
            writer: DataWriter::new(config),
            encoder,
        }
    }

    /// The underlying writer.
    pub fn writer(&self) -> &DataWriter {
        &self.writer
    }

    /// Drain outstanding writes and flush stream files.
    pub fn close(&self) {
        self.writer.close();
    }

    /// Validate, encode, and enqueue one geometry batch for `tag` at
    /// `step`; returns the serialized batch index.
    ///
    /// Validation and index construction are synchronous; disk durability
    /// is not. At most `max_outputs` batch elements are written, the rest
    /// are silently discarded.
    pub fn write_geometry_batch(
        &self,
        write_dir: &Path,
        tag: &str,
        step: i64,
        properties: &PropertyMap,
        max_outputs: usize,
    ) -> Result<Vec<u8>> {
        if max_outputs == 0 {
            return Err(Error::InvalidMaxOutputs(max_outputs));
        }

        // Bounding boxes are expanded into ordinary line-set properties
        // plus a label/confidence side channel, and never mix with other
        // properties in the same call.
        let converted = match properties.get("bboxes") {
            Some(PropertyValue::BoundingBoxes(batches)) => {
                if properties.len() > 1 {
                    return Err(Error::MixedBoundingBoxes);
                }
                Some(bbox::convert_bboxes(batches)?)
            }
            Some(PropertyValue::StepRef(_)) => {
                return Err(Error::StepRefNotAllowed("bboxes".to_string()))
            }
            Some(_) => {
                return Err(Error::other("property bboxes expects bounding box data"))
            }
            None => None,
        };
        let (props, aux): (Vec<(&str, &PropertyValue)>, Option<&Vec<Vec<InferenceResult>>>) =
            match &converted {
                Some((props, aux)) => (
                    props.iter().map(|(n, v)| (n.as_str(), v)).collect(),
                    Some(aux),
                ),
                None => (
                    properties.iter().map(|(n, v)| (n.as_str(), v)).collect(),
                    None,
                ),
            };

        if !props.iter().any(|(name, _)| *name == "vertex_positions") {
            return Err(Error::MissingPrimaryKey);
        }

        let mut refs = Vec::new();
        let mut kind = GeometryKind::PointCloud;
        let mut batch_size: Option<usize> = None;
        let mut n_vertices: Option<Vec<usize>> = None;
        let mut n_triangles: Option<Vec<usize>> = None;
        let mut n_lines: Option<Vec<usize>> = None;
        let mut vertex_data: BTreeMap<&str, Vec<Tensor>> = BTreeMap::new();
        let mut triangle_data: BTreeMap<&str, Vec<Tensor>> = BTreeMap::new();
        let mut line_data: BTreeMap<&str, Vec<Tensor>> = BTreeMap::new();

        for (prop, value) in props {
            let Some(role) = role_of(prop) else {
                return Err(Error::UnknownProperty(prop.to_string()));
            };
            match role {
                Role::Triangle => kind = GeometryKind::TriangleMesh,
                Role::Line => {
                    if kind != GeometryKind::TriangleMesh {
                        kind = GeometryKind::LineSet;
                    }
                }
                Role::Vertex => {}
            }
            let Some(tensors) = preprocess(prop, value, step, max_outputs, &mut refs)? else {
                continue;
            };
            let bsize = *batch_size.get_or_insert(tensors.len());
            let counts = match role {
                Role::Vertex => &mut n_vertices,
                Role::Triangle => &mut n_triangles,
                Role::Line => &mut n_lines,
            }
            .get_or_insert_with(|| tensors.iter().map(|t| t.dim(0)).collect());
            check_prop_shape(prop, &tensors, bsize, counts, predefined_dim(prop))?;

            let stripped = &prop[role.prefix_len()..];
            match role {
                Role::Vertex => vertex_data.insert(stripped, tensors),
                Role::Triangle => triangle_data.insert(stripped, tensors),
                Role::Line => line_data.insert(stripped, tensors),
            };
        }

        let vertices = vertex_data.remove("positions");
        let faces = triangle_data.remove("indices");
        let lines = line_data.remove("indices");
        let batch_size = batch_size.unwrap_or(0);

        tracing::debug!(tag, step, batch_size, kind = kind.name(), "writing geometry batch");

        let stream_key = write_dir
            .join(tag.replace('/', "-"))
            .to_string_lossy()
            .into_owned();
        let mut builder = BatchIndexBuilder::new();

        for bidx in 0..batch_size {
            let mut sample = GeometrySample {
                tag,
                step,
                kind,
                vertices: vertices.as_ref().map(|t| &t[bidx]),
                faces: faces.as_ref().map(|t| &t[bidx]),
                lines: lines.as_ref().map(|t| &t[bidx]),
                ..Default::default()
            };
            for (&name, tensors) in &vertex_data {
                sample.vertex_attributes.insert(name, &tensors[bidx]);
            }
            for (&name, tensors) in &triangle_data {
                sample.face_attributes.insert(name, &tensors[bidx]);
            }
            for (&name, tensors) in &line_data {
                sample.line_attributes.insert(name, &tensors[bidx]);
            }

            let payload = self.encoder.encode(&sample).map_err(|e| Error::EncodeFailed {
                tag: tag.to_string(),
                step,
                reason: e.to_string(),
            })?;
            let size = payload.len() as u64;
            let crc = masked_crc32c(&payload);
            let (filename, offset) = self.writer.enqueue(&stream_key, payload)?;
            builder.record(&filename, offset, size, crc);

            if let Some(aux_batches) = aux {
                let results = aux_batches.get(bidx).map(Vec::as_slice).unwrap_or(&[]);
                let aux_bytes = serialize_aux(results)?;
                let aux_size = aux_bytes.len() as u64;
                let aux_crc = masked_crc32c(&aux_bytes);
                let (_, aux_offset) = self.writer.enqueue(&stream_key, aux_bytes)?;
                builder.record_aux(aux_offset, aux_size, aux_crc);
            }
        }

        builder.finish(refs).to_bytes()
    }
}

impl Default for GeometryLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use tempfile::tempdir;

    fn positions(b: usize, n: usize) -> PropertyValue {
        PropertyValue::Tensor(Tensor::from_f32(&[b, n, 3], &vec![0.5; b * n * 3]).unwrap())
    }

    #[test]
    fn test_missing_primary_key() {
        let dir = tempdir().unwrap();
        let logger = GeometryLogger::new();
        // Colors alone are not enough; positions (or a reference to them)
        // must be present.
        let mut props = PropertyMap::new();
        props.insert(
            "vertex_colors".to_string(),
            PropertyValue::Tensor(Tensor::from_u8(&[2, 3], &[0; 6]).unwrap()),
        );
        let err = logger
            .write_geometry_batch(dir.path(), "tag", 0, &props, 1)
            .unwrap_err();
        assert!(matches!(err, Error::MissingPrimaryKey));
    }

    #[test]
    fn test_unknown_property_rejected() {
        let dir = tempdir().unwrap();
        let logger = GeometryLogger::new();
        let mut props = PropertyMap::new();
        props.insert("vertex_positions".to_string(), positions(1, 4));
        props.insert(
            "triangle_custom".to_string(),
            PropertyValue::Tensor(Tensor::from_f32(&[4, 3], &[0.0; 12]).unwrap()),
        );
        let err = logger
            .write_geometry_batch(dir.path(), "tag", 0, &props, 1)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownProperty(_)));
    }

    #[test]
    fn test_zero_max_outputs_rejected() {
        let dir = tempdir().unwrap();
        let logger = GeometryLogger::new();
        let mut props = PropertyMap::new();
        props.insert("vertex_positions".to_string(), positions(1, 4));
        let err = logger
            .write_geometry_batch(dir.path(), "tag", 0, &props, 0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMaxOutputs(0)));
    }

    #[test]
    fn test_mixed_bboxes_rejected_before_any_write() {
        let dir = tempdir().unwrap();
        let logger = GeometryLogger::new();
        let mut props = PropertyMap::new();
        props.insert("vertex_positions".to_string(), positions(1, 4));
        props.insert(
            "bboxes".to_string(),
            PropertyValue::bboxes(vec![BoundingBox::axis_aligned(
                Vec3::ZERO,
                Vec3::ONE,
                0,
                1.0,
            )]),
        );
        let err = logger
            .write_geometry_batch(dir.path(), "tag", 0, &props, 1)
            .unwrap_err();
        assert!(matches!(err, Error::MixedBoundingBoxes));
        // Nothing was enqueued, so no stream file exists.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_shape_mismatch_across_properties() {
        let dir = tempdir().unwrap();
        let logger = GeometryLogger::new();
        let mut props = PropertyMap::new();
        props.insert("vertex_positions".to_string(), positions(2, 4));
        props.insert(
            "vertex_normals".to_string(),
            PropertyValue::Tensor(Tensor::from_f32(&[2, 5, 3], &[0.0; 30]).unwrap()),
        );
        let err = logger
            .write_geometry_batch(dir.path(), "tag", 0, &props, 4)
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_bboxes_step_ref_rejected() {
        let dir = tempdir().unwrap();
        let logger = GeometryLogger::new();
        let mut props = PropertyMap::new();
        props.insert("bboxes".to_string(), PropertyValue::StepRef(0));
        let err = logger
            .write_geometry_batch(dir.path(), "tag", 1, &props, 1)
            .unwrap_err();
        assert!(matches!(err, Error::StepRefNotAllowed(_)));
    }
}
