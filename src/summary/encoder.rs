//! Geometry payload encoders.
//!
//! Turning a validated batch element into the opaque on-disk buffer is an
//! external concern; the pipeline only ever calls [`GeometryEncoder::encode`].
//! [`FramedEncoder`] is a self-contained little-endian framing so the crate
//! works without a host encoding service.

use std::collections::BTreeMap;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::tensor::{Tensor, TensorBuffer};
use crate::util::Result;

use super::properties::GeometryKind;

/// One batch element ready for encoding.
///
/// Attribute maps are keyed by the property name with its role prefix
/// stripped (`vertex_normals` appears as `normals`).
#[derive(Debug, Default)]
pub struct GeometrySample<'a> {
    pub tag: &'a str,
    pub step: i64,
    pub kind: GeometryKind,
    pub vertices: Option<&'a Tensor>,
    pub vertex_attributes: BTreeMap<&'a str, &'a Tensor>,
    pub faces: Option<&'a Tensor>,
    pub face_attributes: BTreeMap<&'a str, &'a Tensor>,
    pub lines: Option<&'a Tensor>,
    pub line_attributes: BTreeMap<&'a str, &'a Tensor>,
}

/// Turns one validated batch element into an opaque byte buffer.
///
/// Implementations must be infallible with respect to ordering: the
/// returned buffer is appended to the stream file exactly once, at the
/// offset reserved for it.
pub trait GeometryEncoder: Send + Sync {
    fn encode(&self, sample: &GeometrySample<'_>) -> Result<Vec<u8>>;
}

const FRAME_MAGIC: u32 = 0x474c_4f47; // "GLOG"

/// Default encoder: magic, tag, step, kind, then one length-framed section
/// per tensor with its full property name, dtype, and shape.
#[derive(Clone, Copy, Debug, Default)]
pub struct FramedEncoder;

impl GeometryEncoder for FramedEncoder {
    fn encode(&self, sample: &GeometrySample<'_>) -> Result<Vec<u8>> {
        let mut sections: Vec<(String, &Tensor)> = Vec::new();
        if let Some(t) = sample.vertices {
            sections.push(("vertex_positions".to_string(), t));
        }
        for (name, t) in &sample.vertex_attributes {
            sections.push((format!("vertex_{name}"), t));
        }
        if let Some(t) = sample.faces {
            sections.push(("triangle_indices".to_string(), t));
        }
        for (name, t) in &sample.face_attributes {
            sections.push((format!("triangle_{name}"), t));
        }
        if let Some(t) = sample.lines {
            sections.push(("line_indices".to_string(), t));
        }
        for (name, t) in &sample.line_attributes {
            sections.push((format!("line_{name}"), t));
        }

        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(FRAME_MAGIC)?;
        write_str(&mut buf, sample.tag)?;
        buf.write_i64::<LittleEndian>(sample.step)?;
        buf.write_u8(sample.kind.tag())?;
        buf.write_u16::<LittleEndian>(sections.len() as u16)?;
        for (name, tensor) in &sections {
            write_tensor(&mut buf, name, tensor)?;
        }
        Ok(buf)
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    buf.write_u16::<LittleEndian>(s.len() as u16)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_tensor(buf: &mut Vec<u8>, name: &str, t: &Tensor) -> Result<()> {
    write_str(buf, name)?;
    buf.write_u8(t.dtype().tag())?;
    buf.write_u8(t.rank() as u8)?;
    for &dim in t.shape() {
        buf.write_u64::<LittleEndian>(dim as u64)?;
    }
    let bytes = t.as_bytes();
    buf.write_u64::<LittleEndian>(bytes.len() as u64)?;
    buf.extend_from_slice(bytes);
    Ok(())
}
