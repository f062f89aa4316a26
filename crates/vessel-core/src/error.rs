use crate::{DType, Device};

/// Errors raised by tensor construction, access, and memory operations.
#[derive(Debug, thiserror::Error)]
pub enum VesselError {
    #[error(
        "Tensor data type does not match requested type: tensor is {got}, requested {expected}"
    )]
    DTypeMismatch { expected: DType, got: DType },

    #[error("No allocator registered for device {0}")]
    UnsupportedDevice(Device),

    #[error("Backend for device {0} is not compiled in (enable the `cuda` feature)")]
    BackendUnavailable(Device),

    #[error("Allocation of {nbytes} bytes failed on {device}")]
    AllocationFailed { device: Device, nbytes: usize },

    #[error("Size of {dims:?} x {dtype} overflows usize")]
    SizeOverflow { dims: Vec<usize>, dtype: DType },

    #[error("Invalid reshape of {numel} elements to {target:?}: {reason}")]
    InvalidReshape {
        numel: usize,
        target: Vec<isize>,
        reason: &'static str,
    },

    #[error("Slice begin={begin:?} size={size:?} out of bounds for shape {shape:?}")]
    SliceOutOfBounds {
        begin: Vec<usize>,
        size: Vec<usize>,
        shape: Vec<usize>,
    },

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("Tensor lives on {0}; host access requires a transfer to cpu first")]
    NotOnHost(Device),

    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    CudaError(String),
}
