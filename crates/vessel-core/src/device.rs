use std::fmt;

/// Memory location of tensor storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,
    /// Accelerator memory (CUDA device 0)
    Gpu,
}

impl Device {
    /// Whether this is host memory.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// Whether this is accelerator memory.
    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Gpu)
    }

    /// Whether the backend for this device is compiled into this build.
    pub fn is_available(&self) -> bool {
        match self {
            Device::Cpu => true,
            Device::Gpu => cfg!(feature = "cuda"),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu => write!(f, "gpu"),
        }
    }
}

/// Compile-time device marker.
///
/// Memory operations are generic over a `DeviceKind`, so the (type, device)
/// specialization is picked by the compiler rather than a runtime branch.
pub trait DeviceKind: Copy + Default + fmt::Debug + Send + Sync + 'static {
    const DEVICE: Device;
}

/// Host memory marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuDevice;

/// Accelerator memory marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuDevice;

impl DeviceKind for CpuDevice {
    const DEVICE: Device = Device::Cpu;
}

impl DeviceKind for GpuDevice {
    const DEVICE: Device = Device::Gpu;
}
