//! # vessel-core
//!
//! Multi-device numeric array container.
//!
//! Provides the `Tensor` type with:
//! - Six element types (I32, I64, F32, F64, Complex32, Complex64)
//! - Host and CUDA device memory behind one allocator abstraction
//! - Owning and viewing buffers (views never allocate or free)
//! - Device/type specialized memory operations (resize, fill, copy, cast, release)
//!
//! Numeric kernels are not part of this crate. They receive raw typed
//! pointers from [`Tensor::data`] together with [`Tensor::numel`] and
//! [`Tensor::device`].

pub mod allocator;
pub mod buffer;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod device;
pub mod dtype;
pub mod error;
pub mod memory;
pub mod prelude;
pub mod shape;
pub mod tensor;

pub use allocator::{allocator_for, Allocator, CpuAllocator};
#[cfg(feature = "cuda")]
pub use allocator::GpuAllocator;
pub use buffer::Buffer;
pub use device::{CpuDevice, Device, DeviceKind, GpuDevice};
pub use dtype::{CastFrom, DType, Element};
pub use error::VesselError;
pub use shape::Shape;
pub use tensor::Tensor;

pub use num_complex::{Complex32, Complex64};

pub type Result<T> = std::result::Result<T, VesselError>;
