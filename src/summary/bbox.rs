//! Oriented bounding boxes and their expansion into line-set properties.
//!
//! Boxes are logged as ordinary line-set geometry: each box contributes a
//! fixed block of vertices and line segments, and its classification
//! result travels in an auxiliary sub-record next to the payload.

use glam::Vec3;

use crate::tensor::Tensor;
use crate::util::Result;

use super::index::InferenceResult;
use super::PropertyValue;

/// Vertices generated per box: 8 corners plus a 6-point heading arrow.
pub const VERTICES_PER_BBOX: usize = 14;
/// Line segments per box: 12 edges, the arrow shaft, and 4 arrow head lines.
pub const LINES_PER_BBOX: usize = 17;

/// An oriented 3D bounding box with an attached classification result.
#[derive(Clone, Debug)]
pub struct BoundingBox {
    /// Box center.
    pub center: Vec3,
    /// Unit heading direction.
    pub front: Vec3,
    /// Unit up direction.
    pub up: Vec3,
    /// Unit left direction.
    pub left: Vec3,
    /// Full extents along (left, up, front).
    pub size: Vec3,
    /// Class label.
    pub label: i32,
    /// Detection confidence.
    pub confidence: f32,
}

impl BoundingBox {
    /// An axis-aligned box: left = +X, up = +Y, front = +Z.
    pub fn axis_aligned(center: Vec3, size: Vec3, label: i32, confidence: f32) -> Self {
        Self {
            center,
            front: Vec3::Z,
            up: Vec3::Y,
            left: Vec3::X,
            size,
            label,
            confidence,
        }
    }

    /// The 14 vertices of this box's wireframe: corners 0..8 (indexed by
    /// the sign bits of left/up/front), the front face center, the arrow
    /// tip, and 4 arrow head points.
    fn wire_vertices(&self) -> [Vec3; VERTICES_PER_BBOX] {
        let hl = self.left * (self.size.x * 0.5);
        let hu = self.up * (self.size.y * 0.5);
        let hf = self.front * (self.size.z * 0.5);

        let mut verts = [Vec3::ZERO; VERTICES_PER_BBOX];
        for (i, v) in verts.iter_mut().enumerate().take(8) {
            let sl = if i & 1 == 0 { -1.0 } else { 1.0 };
            let su = if i & 2 == 0 { -1.0 } else { 1.0 };
            let sf = if i & 4 == 0 { -1.0 } else { 1.0 };
            *v = self.center + hl * sl + hu * su + hf * sf;
        }
        let face = self.center + hf;
        let tip = self.center + self.front * self.size.z;
        let head = tip - self.front * (0.2 * self.size.z);
        verts[8] = face;
        verts[9] = tip;
        verts[10] = head + self.up * (0.1 * self.size.y);
        verts[11] = head - self.up * (0.1 * self.size.y);
        verts[12] = head + self.left * (0.1 * self.size.x);
        verts[13] = head - self.left * (0.1 * self.size.x);
        verts
    }
}

/// Corner pairs (differing in one sign bit) forming the 12 box edges.
const BOX_EDGES: [(i32, i32); 12] = [
    (0, 1),
    (0, 2),
    (0, 4),
    (1, 3),
    (1, 5),
    (2, 3),
    (2, 6),
    (3, 7),
    (4, 5),
    (4, 6),
    (5, 7),
    (6, 7),
];

/// Arrow segments: shaft from the front face center to the tip, then the
/// four head lines.
const ARROW_LINES: [(i32, i32); 5] = [(8, 9), (9, 10), (9, 11), (9, 12), (9, 13)];

/// Build the wireframe for one batch element's boxes.
///
/// Returns the `(Nbb * 14, 3)` f32 position tensor and the `(Nbb * 17, 2)`
/// i32 line index tensor.
fn create_lines(boxes: &[BoundingBox]) -> Result<(Tensor, Tensor)> {
    let mut positions = Vec::with_capacity(boxes.len() * VERTICES_PER_BBOX * 3);
    let mut lines = Vec::with_capacity(boxes.len() * LINES_PER_BBOX * 2);

    for (i, bbox) in boxes.iter().enumerate() {
        for v in bbox.wire_vertices() {
            positions.extend_from_slice(&[v.x, v.y, v.z]);
        }
        let base = (i * VERTICES_PER_BBOX) as i32;
        for (a, b) in BOX_EDGES.iter().chain(ARROW_LINES.iter()) {
            lines.push(base + a);
            lines.push(base + b);
        }
    }

    let positions = Tensor::from_f32(&[boxes.len() * VERTICES_PER_BBOX, 3], &positions)?;
    let lines = Tensor::from_i32(&[boxes.len() * LINES_PER_BBOX, 2], &lines)?;
    Ok((positions, lines))
}

/// Expand batched boxes into the property set the pipeline expects, plus
/// the per-element (label, confidence) side channel.
pub(crate) fn convert_bboxes(
    batches: &[Vec<BoundingBox>],
) -> Result<(
    Vec<(String, PropertyValue)>,
    Vec<Vec<InferenceResult>>,
)> {
    let mut position_tensors = Vec::with_capacity(batches.len());
    let mut line_tensors = Vec::with_capacity(batches.len());
    let mut aux = Vec::with_capacity(batches.len());

    for boxes in batches {
        let (positions, lines) = create_lines(boxes)?;
        position_tensors.push(positions);
        line_tensors.push(lines);
        aux.push(
            boxes
                .iter()
                .map(|b| InferenceResult {
                    label: b.label,
                    confidence: b.confidence,
                })
                .collect(),
        );
    }

    let properties = vec![
        (
            "vertex_positions".to_string(),
            PropertyValue::Batch(position_tensors),
        ),
        (
            "line_indices".to_string(),
            PropertyValue::Batch(line_tensors),
        ),
    ];
    Ok((properties, aux))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorBuffer;

    fn sample_box() -> BoundingBox {
        BoundingBox::axis_aligned(Vec3::new(1.0, 2.0, 3.0), Vec3::new(2.0, 4.0, 6.0), 5, 0.9)
    }

    #[test]
    fn test_wireframe_counts() {
        let (positions, lines) = create_lines(&[sample_box(), sample_box()]).unwrap();
        assert_eq!(positions.shape(), &[2 * VERTICES_PER_BBOX, 3]);
        assert_eq!(lines.shape(), &[2 * LINES_PER_BBOX, 2]);
    }

    #[test]
    fn test_corners_span_extents() {
        let (positions, _) = create_lines(&[sample_box()]).unwrap();
        let values = positions.to_vec::<f32>();
        let xs: Vec<f32> = values.chunks(3).take(8).map(|v| v[0]).collect();
        let ys: Vec<f32> = values.chunks(3).take(8).map(|v| v[1]).collect();
        // Center (1, 2, 3), size (2, 4, 6): corners span x in [0, 2], y in [0, 4].
        assert_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), 0.0);
        assert_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 2.0);
        assert_eq!(ys.iter().cloned().fold(f32::MAX, f32::min), 0.0);
        assert_eq!(ys.iter().cloned().fold(f32::MIN, f32::max), 4.0);
    }

    #[test]
    fn test_line_indices_offset_per_box() {
        let (_, lines) = create_lines(&[sample_box(), sample_box()]).unwrap();
        let values = lines.to_vec::<i32>();
        let first_box_max = values[..LINES_PER_BBOX * 2].iter().max().copied();
        let second_box_min = values[LINES_PER_BBOX * 2..].iter().min().copied();
        assert_eq!(first_box_max, Some(VERTICES_PER_BBOX as i32 - 1));
        assert_eq!(second_box_min, Some(VERTICES_PER_BBOX as i32));
    }

    #[test]
    fn test_convert_bboxes_side_channel() {
        let batches = vec![vec![sample_box()], vec![sample_box(), sample_box()]];
        let (properties, aux) = convert_bboxes(&batches).unwrap();
        assert_eq!(properties.len(), 2);
        assert_eq!(aux.len(), 2);
        assert_eq!(aux[0].len(), 1);
        assert_eq!(aux[1].len(), 2);
        assert_eq!(aux[0][0].label, 5);
        assert_eq!(aux[0][0].confidence, 0.9);

        let (name, value) = &properties[0];
        assert_eq!(name, "vertex_positions");
        match value {
            PropertyValue::Batch(tensors) => {
                assert_eq!(tensors.len(), 2);
                assert_eq!(tensors[1].dim(0), 2 * VERTICES_PER_BBOX);
            }
            _ => panic!("expected batch value"),
        }
    }
}
