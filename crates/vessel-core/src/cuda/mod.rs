//! CUDA accelerator backend (behind the `cuda` feature).
//!
//! Provides:
//! - Lazy singleton device context for device 0
//! - Raw device allocate/free/memset and host↔device↔device copies
//!
//! Every call is synchronous from the caller's point of view.

pub mod context;
pub mod memory;

pub use context::{get_device, is_cuda_available, CudaError};
