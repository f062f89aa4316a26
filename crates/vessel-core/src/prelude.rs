//! Convenience re-exports.
//!
//! ```
//! use vessel_core::prelude::*;
//!
//! let mut t = Tensor::new(DType::F32, [2, 3]).unwrap();
//! t.zero().unwrap();
//! t.reshape(&[-1]).unwrap();
//! assert_eq!(t.shape().dims(), &[6]);
//! ```

pub use crate::allocator::{allocator_for, Allocator};
pub use crate::device::{CpuDevice, Device, DeviceKind, GpuDevice};
pub use crate::dtype::{DType, Element};
pub use crate::error::VesselError;
pub use crate::memory::DeviceMemory;
pub use crate::shape::Shape;
pub use crate::tensor::Tensor;
pub use crate::Result;
pub use num_complex::{Complex32, Complex64};
