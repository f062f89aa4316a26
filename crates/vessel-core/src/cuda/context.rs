//! CUDA device context management.
//!
//! Holds one lazily-initialized `CudaDevice` handle for the process. Raw
//! driver calls in `memory.rs` bind it to the calling thread first.

use std::sync::{Arc, OnceLock};

use cudarc::driver::CudaDevice;
use parking_lot::Mutex;

use crate::error::VesselError;

/// Device ordinal used for all accelerator memory.
pub const DEVICE_ORDINAL: usize = 0;

static DEVICE: OnceLock<Mutex<Option<Arc<CudaDevice>>>> = OnceLock::new();

fn device_slot() -> &'static Mutex<Option<Arc<CudaDevice>>> {
    DEVICE.get_or_init(|| Mutex::new(None))
}

/// Get or create the process-wide CUDA device handle.
pub fn get_device() -> Result<Arc<CudaDevice>, CudaError> {
    let mut slot = device_slot().lock();
    if let Some(dev) = slot.as_ref() {
        return Ok(Arc::clone(dev));
    }
    let dev = CudaDevice::new(DEVICE_ORDINAL)
        .map_err(|e| CudaError::DeviceInit(format!("device {}: {}", DEVICE_ORDINAL, e)))?;
    tracing::info!("CUDA context initialized on device {}", DEVICE_ORDINAL);
    *slot = Some(Arc::clone(&dev));
    Ok(dev)
}

/// Make the device context current on the calling thread.
pub fn bind() -> Result<(), CudaError> {
    get_device()?
        .bind_to_thread()
        .map_err(|e| CudaError::DeviceInit(format!("bind_to_thread: {}", e)))
}

/// Check if a CUDA device is available.
pub fn is_cuda_available() -> bool {
    get_device().is_ok()
}

/// CUDA-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum CudaError {
    #[error("CUDA device init failed: {0}")]
    DeviceInit(String),

    #[error("CUDA memory error: {0}")]
    MemoryError(String),
}

impl From<CudaError> for VesselError {
    fn from(e: CudaError) -> Self {
        VesselError::CudaError(e.to_string())
    }
}
