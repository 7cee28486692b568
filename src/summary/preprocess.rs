//! Batch normalization and shape validation ahead of encoding.

use crate::tensor::{cast_to_f32, cast_to_i32, color_to_u8, Tensor, TensorBuffer};
use crate::util::{Error, Result};

use super::index::PropertyReference;
use super::properties::is_predefined;
use super::PropertyValue;

/// Normalize one property's value into per-element tensors.
///
/// Returns `Ok(None)` when the value is a legal back-reference to an
/// earlier step; the reference is recorded in `refs` instead of producing
/// a payload. Batches larger than `max_outputs` are silently truncated.
pub(crate) fn preprocess(
    prop: &str,
    value: &PropertyValue,
    step: i64,
    max_outputs: usize,
    refs: &mut Vec<PropertyReference>,
) -> Result<Option<Vec<Tensor>>> {
    let elements: Vec<Tensor> = match value {
        PropertyValue::StepRef(step_ref) => {
            if !is_predefined(prop) {
                return Err(Error::StepRefNotAllowed(prop.to_string()));
            }
            if *step_ref < 0 || *step_ref >= step {
                return Err(Error::StepReferenceOutOfRange {
                    property: prop.to_string(),
                    step_ref: *step_ref,
                    step,
                });
            }
            refs.push(PropertyReference {
                property: prop.to_string(),
                step_ref: *step_ref,
            });
            return Ok(None);
        }
        PropertyValue::Tensor(t) => match t.rank() {
            // Batch size 1.
            2 => vec![t.clone()],
            3 => {
                let count = t.dim(0).min(max_outputs);
                (0..count)
                    .map(|k| t.index_batch(k))
                    .collect::<Result<Vec<_>>>()?
            }
            _ => {
                return Err(Error::shape(
                    prop,
                    "shape (N, D) or (B, N, D)",
                    format!("shape {:?}", t.shape()),
                ))
            }
        },
        PropertyValue::Batch(tensors) => {
            let count = tensors.len().min(max_outputs);
            tensors[..count]
                .iter()
                .map(|t| {
                    if t.rank() == 2 {
                        Ok(t.clone())
                    } else {
                        Err(Error::shape(
                            prop,
                            "rank-2 batch elements",
                            format!("rank-{} element", t.rank()),
                        ))
                    }
                })
                .collect::<Result<Vec<_>>>()?
        }
        PropertyValue::BoundingBoxes(_) => {
            return Err(Error::other(format!(
                "property {prop} cannot carry bounding box data"
            )))
        }
    };

    // Dtype normalization by name suffix.
    let elements = if prop.ends_with("_colors") {
        elements.iter().map(color_to_u8).collect()
    } else if prop.ends_with("_indices") {
        elements.iter().map(cast_to_i32).collect()
    } else {
        elements.iter().map(cast_to_f32).collect()
    };

    Ok(Some(elements))
}

/// Validate a property's per-element tensors against the established batch
/// shape.
///
/// `counts` holds the per-element counts fixed by the first property of
/// the same role. `dim` is the role-specific innermost width; `None`
/// admits any width as long as it is identical across the batch.
pub(crate) fn check_prop_shape(
    prop: &str,
    tensors: &[Tensor],
    batch_size: usize,
    counts: &[usize],
    dim: Option<usize>,
) -> Result<()> {
    if tensors.len() != batch_size {
        return Err(Error::shape(
            prop,
            format!("batch length {batch_size}"),
            format!("batch length {}", tensors.len()),
        ));
    }
    if tensors.is_empty() {
        return Ok(());
    }
    let actual_counts: Vec<usize> = tensors.iter().map(|t| t.dim(0)).collect();
    if actual_counts != counts {
        return Err(Error::shape(
            prop,
            format!("element counts {counts:?}"),
            format!("element counts {actual_counts:?}"),
        ));
    }
    let expected_dim = dim.unwrap_or_else(|| tensors[0].dim(1));
    if let Some(t) = tensors.iter().find(|t| t.dim(1) != expected_dim) {
        return Err(Error::shape(
            prop,
            format!("innermost dimension {expected_dim}"),
            format!("innermost dimension {}", t.dim(1)),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Dtype;

    fn positions(b: usize, n: usize) -> Tensor {
        Tensor::from_f32(&[b, n, 3], &vec![0.5; b * n * 3]).unwrap()
    }

    #[test]
    fn test_step_reference_valid() {
        let mut refs = Vec::new();
        let out = preprocess(
            "vertex_colors",
            &PropertyValue::StepRef(2),
            5,
            1,
            &mut refs,
        )
        .unwrap();
        assert!(out.is_none());
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].property, "vertex_colors");
        assert_eq!(refs[0].step_ref, 2);
    }

    #[test]
    fn test_step_reference_out_of_range() {
        let mut refs = Vec::new();
        for bad in [5i64, 7, -1] {
            let err = preprocess(
                "vertex_colors",
                &PropertyValue::StepRef(bad),
                5,
                1,
                &mut refs,
            )
            .unwrap_err();
            assert!(matches!(err, Error::StepReferenceOutOfRange { .. }));
        }
        assert!(refs.is_empty());
    }

    #[test]
    fn test_step_reference_rejected_for_features() {
        let mut refs = Vec::new();
        let err = preprocess(
            "vertex_my_feature",
            &PropertyValue::StepRef(0),
            5,
            1,
            &mut refs,
        )
        .unwrap_err();
        assert!(matches!(err, Error::StepRefNotAllowed(_)));
    }

    #[test]
    fn test_rank2_is_batch_of_one() {
        let mut refs = Vec::new();
        let t = Tensor::from_f32(&[4, 3], &[0.0; 12]).unwrap();
        let out = preprocess(
            "vertex_positions",
            &PropertyValue::Tensor(t),
            0,
            8,
            &mut refs,
        )
        .unwrap()
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].shape(), &[4, 3]);
    }

    #[test]
    fn test_rank3_truncates_to_max_outputs() {
        let mut refs = Vec::new();
        let out = preprocess(
            "vertex_positions",
            &PropertyValue::Tensor(positions(3, 4)),
            0,
            2,
            &mut refs,
        )
        .unwrap()
        .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_rank1_rejected() {
        let mut refs = Vec::new();
        let t = Tensor::from_f32(&[3], &[0.0; 3]).unwrap();
        let err = preprocess(
            "vertex_positions",
            &PropertyValue::Tensor(t),
            0,
            1,
            &mut refs,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_suffix_dtype_dispatch() {
        let mut refs = Vec::new();
        let colors = Tensor::from_f32(&[2, 3], &[1.0; 6]).unwrap();
        let out = preprocess(
            "vertex_colors",
            &PropertyValue::Tensor(colors),
            0,
            1,
            &mut refs,
        )
        .unwrap()
        .unwrap();
        assert_eq!(out[0].dtype(), Dtype::U8);

        let indices = Tensor::from_i64(&[2, 2], &[0, 1, 1, 2]).unwrap();
        let out = preprocess(
            "line_indices",
            &PropertyValue::Tensor(indices),
            0,
            1,
            &mut refs,
        )
        .unwrap()
        .unwrap();
        assert_eq!(out[0].dtype(), Dtype::I32);

        let normals = Tensor::from_f64(&[2, 3], &[0.0; 6]).unwrap();
        let out = preprocess(
            "vertex_normals",
            &PropertyValue::Tensor(normals),
            0,
            1,
            &mut refs,
        )
        .unwrap()
        .unwrap();
        assert_eq!(out[0].dtype(), Dtype::F32);
    }

    #[test]
    fn test_check_prop_shape_accepts_uniform_batch() {
        let tensors = vec![
            Tensor::from_f32(&[4, 3], &[0.0; 12]).unwrap(),
            Tensor::from_f32(&[4, 3], &[0.0; 12]).unwrap(),
        ];
        assert!(check_prop_shape("vertex_positions", &tensors, 2, &[4, 4], Some(3)).is_ok());
    }

    #[test]
    fn test_check_prop_shape_rejects_count_mismatch() {
        let tensors = vec![
            Tensor::from_f32(&[4, 3], &[0.0; 12]).unwrap(),
            Tensor::from_f32(&[5, 3], &[0.0; 15]).unwrap(),
        ];
        let err =
            check_prop_shape("vertex_positions", &tensors, 2, &[4, 4], Some(3)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_check_prop_shape_rejects_batch_length_mismatch() {
        let tensors = vec![Tensor::from_f32(&[4, 3], &[0.0; 12]).unwrap()];
        assert!(check_prop_shape("vertex_positions", &tensors, 2, &[4, 4], Some(3)).is_err());
    }

    #[test]
    fn test_check_prop_shape_free_dim_must_agree() {
        let tensors = vec![
            Tensor::from_f32(&[2, 5], &[0.0; 10]).unwrap(),
            Tensor::from_f32(&[2, 6], &[0.0; 12]).unwrap(),
        ];
        let err = check_prop_shape("vertex_my_feature", &tensors, 2, &[2, 2], None).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        let tensors = vec![
            Tensor::from_f32(&[2, 5], &[0.0; 10]).unwrap(),
            Tensor::from_f32(&[2, 5], &[0.0; 10]).unwrap(),
        ];
        assert!(check_prop_shape("vertex_my_feature", &tensors, 2, &[2, 2], None).is_ok());
    }
}
