//! Dtype normalization kernels applied before serialization.
//!
//! Property values arrive in whatever type the producing framework used;
//! the on-disk convention is f32 for continuous data, i32 for indices, and
//! u8 for colors.

use half::f16;

use super::{Dtype, Shape, Tensor, TensorBuffer};

/// Widen every element to f64 for lossless intermediate math.
fn to_f64_values(t: &Tensor) -> Vec<f64> {
    match t.dtype() {
        Dtype::U8 => t.as_bytes().iter().map(|&v| v as f64).collect(),
        Dtype::U16 => t.to_vec::<u16>().iter().map(|&v| v as f64).collect(),
        Dtype::I32 => t.to_vec::<i32>().iter().map(|&v| v as f64).collect(),
        Dtype::I64 => t.to_vec::<i64>().iter().map(|&v| v as f64).collect(),
        Dtype::F16 => t.to_vec::<f16>().iter().map(|v| v.to_f64()).collect(),
        Dtype::F32 => t.to_vec::<f32>().iter().map(|&v| v as f64).collect(),
        Dtype::F64 => t.to_vec::<f64>(),
    }
}

/// Rebuild a tensor with the same shape but new element data.
fn with_values<T: bytemuck::NoUninit>(t: &Tensor, dtype: Dtype, values: &[T]) -> Tensor {
    Tensor {
        dtype,
        shape: Shape::from_slice(t.shape()),
        data: bytemuck::cast_slice(values).to_vec(),
    }
}

/// Cast any numeric tensor to f32.
pub fn cast_to_f32(t: &Tensor) -> Tensor {
    if t.dtype() == Dtype::F32 {
        return t.clone();
    }
    let values: Vec<f32> = to_f64_values(t).iter().map(|&v| v as f32).collect();
    with_values(t, Dtype::F32, &values)
}

/// Cast any numeric tensor to i32 (floats are truncated).
pub fn cast_to_i32(t: &Tensor) -> Tensor {
    if t.dtype() == Dtype::I32 {
        return t.clone();
    }
    let values: Vec<i32> = to_f64_values(t).iter().map(|&v| v as i32).collect();
    with_values(t, Dtype::I32, &values)
}

/// Rescale color data into u8.
///
/// u8 passes through unchanged; u16 covers the full 16-bit range and is
/// divided down; everything else is treated as normalized float data,
/// clamped to [0, 1] and scaled to [0, 255].
pub fn color_to_u8(t: &Tensor) -> Tensor {
    match t.dtype() {
        Dtype::U8 => t.clone(),
        Dtype::U16 => {
            let values: Vec<u8> = t.to_vec::<u16>().iter().map(|&v| (v / 256) as u8).collect();
            with_values(t, Dtype::U8, &values)
        }
        _ => {
            let values: Vec<u8> = to_f64_values(t)
                .iter()
                .map(|&v| (255.0 * v.clamp(0.0, 1.0)) as u8)
                .collect();
            with_values(t, Dtype::U8, &values)
        }
    }
}
