//! Tensor containers and the zero-copy buffer adapter boundary.
//!
//! The logging pipeline never talks to a numeric framework directly; input
//! crosses the narrow [`TensorBuffer`] contract (dtype + shape + contiguous
//! bytes) and is copied once into an owned [`Tensor`].

mod cast;

pub use cast::{cast_to_f32, cast_to_i32, color_to_u8};

use smallvec::SmallVec;

use crate::util::{Error, Result};

/// Tensor shape; geometry tensors are at most rank 3.
pub type Shape = SmallVec<[usize; 3]>;

/// Element type of a tensor buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dtype {
    U8,
    U16,
    I32,
    I64,
    F16,
    F32,
    F64,
}

impl Dtype {
    /// Size of one element in bytes.
    #[inline]
    pub const fn num_bytes(&self) -> usize {
        match self {
            Dtype::U8 => 1,
            Dtype::U16 | Dtype::F16 => 2,
            Dtype::I32 | Dtype::F32 => 4,
            Dtype::I64 | Dtype::F64 => 8,
        }
    }

    /// Human-readable type name.
    pub const fn name(&self) -> &'static str {
        match self {
            Dtype::U8 => "uint8",
            Dtype::U16 => "uint16",
            Dtype::I32 => "int32",
            Dtype::I64 => "int64",
            Dtype::F16 => "float16",
            Dtype::F32 => "float32",
            Dtype::F64 => "float64",
        }
    }

    /// Stable wire tag for the framed encoder.
    #[inline]
    pub const fn tag(&self) -> u8 {
        match self {
            Dtype::U8 => 0,
            Dtype::U16 => 1,
            Dtype::I32 => 2,
            Dtype::I64 => 3,
            Dtype::F16 => 4,
            Dtype::F32 => 5,
            Dtype::F64 => 6,
        }
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Zero-copy adapter contract for tensors from any numeric framework.
///
/// A source type only has to expose its element type, shape, and a
/// contiguous native-endian byte view. Host-framework integrations
/// implement this once; the pipeline depends on nothing else.
pub trait TensorBuffer {
    /// Element type of the buffer.
    fn dtype(&self) -> Dtype;
    /// Dimensions, outermost first.
    fn shape(&self) -> &[usize];
    /// Contiguous bytes in row-major order.
    fn as_bytes(&self) -> &[u8];

    /// Total number of elements.
    fn num_elements(&self) -> usize {
        self.shape().iter().product()
    }
}

/// Owned contiguous tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    dtype: Dtype,
    shape: Shape,
    data: Vec<u8>,
}

impl Tensor {
    /// Create a tensor from raw bytes, validating the buffer length.
    pub fn new(dtype: Dtype, shape: &[usize], data: Vec<u8>) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * dtype.num_bytes();
        if data.len() != expected {
            return Err(Error::other(format!(
                "tensor buffer of {} bytes does not match {} {:?} ({} bytes)",
                data.len(),
                dtype,
                shape,
                expected
            )));
        }
        Ok(Self {
            dtype,
            shape: Shape::from_slice(shape),
            data,
        })
    }

    /// Copy a tensor out of any [`TensorBuffer`] source.
    pub fn from_buffer(buf: &dyn TensorBuffer) -> Result<Self> {
        Self::new(buf.dtype(), buf.shape(), buf.as_bytes().to_vec())
    }

    /// Build an f32 tensor from values.
    pub fn from_f32(shape: &[usize], values: &[f32]) -> Result<Self> {
        Self::new(Dtype::F32, shape, bytemuck::cast_slice(values).to_vec())
    }

    /// Build an f64 tensor from values.
    pub fn from_f64(shape: &[usize], values: &[f64]) -> Result<Self> {
        Self::new(Dtype::F64, shape, bytemuck::cast_slice(values).to_vec())
    }

    /// Build an i32 tensor from values.
    pub fn from_i32(shape: &[usize], values: &[i32]) -> Result<Self> {
        Self::new(Dtype::I32, shape, bytemuck::cast_slice(values).to_vec())
    }

    /// Build an i64 tensor from values.
    pub fn from_i64(shape: &[usize], values: &[i64]) -> Result<Self> {
        Self::new(Dtype::I64, shape, bytemuck::cast_slice(values).to_vec())
    }

    /// Build a u8 tensor from values.
    pub fn from_u8(shape: &[usize], values: &[u8]) -> Result<Self> {
        Self::new(Dtype::U8, shape, values.to_vec())
    }

    /// Build a u16 tensor from values.
    pub fn from_u16(shape: &[usize], values: &[u16]) -> Result<Self> {
        Self::new(Dtype::U16, shape, bytemuck::cast_slice(values).to_vec())
    }

    /// Build an f16 tensor from values.
    pub fn from_f16(shape: &[usize], values: &[half::f16]) -> Result<Self> {
        Self::new(Dtype::F16, shape, bytemuck::cast_slice(values).to_vec())
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Size of dimension `i`.
    #[inline]
    pub fn dim(&self, i: usize) -> usize {
        self.shape[i]
    }

    /// Copy batch element `k` out of a rank-3 `(B, N, D)` tensor.
    pub fn index_batch(&self, k: usize) -> Result<Tensor> {
        if self.rank() != 3 {
            return Err(Error::other(format!(
                "cannot index batch element of rank-{} tensor",
                self.rank()
            )));
        }
        let b = self.dim(0);
        if k >= b {
            return Err(Error::other(format!(
                "batch element {k} out of bounds (batch size {b})"
            )));
        }
        let element_bytes = self.dim(1) * self.dim(2) * self.dtype.num_bytes();
        let start = k * element_bytes;
        Tensor::new(
            self.dtype,
            &[self.dim(1), self.dim(2)],
            self.data[start..start + element_bytes].to_vec(),
        )
    }

    /// Read the elements as a typed vector (copies; alignment-safe).
    pub fn to_vec<T: bytemuck::AnyBitPattern + bytemuck::NoUninit>(&self) -> Vec<T> {
        bytemuck::pod_collect_to_vec(&self.data)
    }
}

impl TensorBuffer for Tensor {
    fn dtype(&self) -> Dtype {
        self.dtype
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
