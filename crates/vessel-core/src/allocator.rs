//! Raw memory allocators and the process-wide allocator registry.
//!
//! Memory obtained from an allocator must be released by the same allocator
//! (or one of identical kind). Allocators report failure as `None`, never by
//! panicking.

use std::fmt;
use std::ptr::NonNull;

use crate::device::Device;
use crate::Result;

/// Alignment used by callers that want SIMD-friendly host blocks.
pub const DEFAULT_ALIGNMENT: usize = 64;

/// Raw allocate/free capability for one kind of memory.
pub trait Allocator: fmt::Debug + Send + Sync {
    /// Allocate `size` bytes with the backend's default alignment.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Allocate `size` bytes aligned to `alignment` (a power of two).
    fn allocate_aligned(&self, size: usize, alignment: usize) -> Option<NonNull<u8>>;

    /// Free a block previously returned by this allocator.
    ///
    /// # Safety
    /// `ptr` must come from `allocate`/`allocate_aligned` on an allocator of the
    /// same kind and must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>);

    /// Size in bytes of the block behind `ptr`.
    ///
    /// # Panics
    /// No backend here tracks per-pointer sizes, so the default panics.
    fn allocated_size(&self, ptr: NonNull<u8>) -> usize {
        panic!(
            "allocated_size({:p}) is not implemented for the {} allocator",
            ptr,
            self.memory_type()
        )
    }

    /// Kind of memory this allocator hands out.
    fn memory_type(&self) -> Device;
}

// =============================================================================
// Host
// =============================================================================

/// Host heap allocator (`malloc` / `posix_memalign` / `free`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuAllocator;

impl Allocator for CpuAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let ptr = unsafe { libc::malloc(size) } as *mut u8;
        let block = NonNull::new(ptr);
        if block.is_none() {
            tracing::warn!("host allocation of {} bytes failed", size);
        }
        block
    }

    #[cfg(unix)]
    fn allocate_aligned(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        let mut ptr: *mut libc::c_void = std::ptr::null_mut();
        if unsafe { libc::posix_memalign(&mut ptr, alignment, size) } != 0 {
            tracing::warn!(
                "host allocation of {} bytes aligned to {} failed",
                size,
                alignment
            );
            return None;
        }
        NonNull::new(ptr as *mut u8)
    }

    // Without posix_memalign only the malloc guarantee is available.
    #[cfg(not(unix))]
    fn allocate_aligned(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        if alignment.is_power_of_two() && alignment <= 2 * std::mem::size_of::<usize>() {
            self.allocate(size)
        } else {
            tracing::warn!("aligned host allocation ({}) unsupported on this platform", alignment);
            None
        }
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        libc::free(ptr.as_ptr() as *mut libc::c_void);
    }

    fn memory_type(&self) -> Device {
        Device::Cpu
    }
}

// =============================================================================
// Accelerator
// =============================================================================

/// CUDA device allocator. Both allocate entry points issue one device
/// allocation; alignment is whatever the driver guarantees.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuAllocator;

#[cfg(feature = "cuda")]
impl Allocator for GpuAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        match crate::cuda::memory::malloc(size) {
            Ok(ptr) => Some(ptr),
            Err(e) => {
                tracing::warn!("device allocation of {} bytes failed: {}", size, e);
                None
            }
        }
    }

    fn allocate_aligned(&self, size: usize, _alignment: usize) -> Option<NonNull<u8>> {
        self.allocate(size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        if let Err(e) = crate::cuda::memory::free(ptr) {
            tracing::warn!("device free of {:p} failed: {}", ptr, e);
        }
    }

    fn memory_type(&self) -> Device {
        Device::Gpu
    }
}

// =============================================================================
// Registry
// =============================================================================

static CPU_ALLOCATOR: CpuAllocator = CpuAllocator;

#[cfg(feature = "cuda")]
static GPU_ALLOCATOR: GpuAllocator = GpuAllocator;

/// Look up the long-lived allocator for `device`.
///
/// Returns `UnsupportedDevice` when the backend for `device` is not compiled in.
pub fn allocator_for(device: Device) -> Result<&'static dyn Allocator> {
    match device {
        Device::Cpu => Ok(&CPU_ALLOCATOR),
        #[cfg(feature = "cuda")]
        Device::Gpu => Ok(&GPU_ALLOCATOR),
        #[cfg(not(feature = "cuda"))]
        Device::Gpu => Err(crate::error::VesselError::UnsupportedDevice(device)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_allocate_free() {
        let alloc = CpuAllocator;
        let ptr = alloc.allocate(128).unwrap();
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0xAB, 128);
            assert_eq!(*ptr.as_ptr().add(127), 0xAB);
            alloc.free(ptr);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_cpu_aligned() {
        let alloc = CpuAllocator;
        for &align in &[16usize, DEFAULT_ALIGNMENT, 256, 4096] {
            let ptr = alloc.allocate_aligned(100, align).unwrap();
            assert_eq!(ptr.as_ptr() as usize % align, 0, "not aligned to {}", align);
            unsafe { alloc.free(ptr) };
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_cpu_aligned_bad_alignment_is_none() {
        // posix_memalign rejects non power-of-two alignments
        assert!(CpuAllocator.allocate_aligned(64, 3).is_none());
    }

    #[test]
    fn test_memory_type() {
        assert_eq!(CpuAllocator.memory_type(), Device::Cpu);
    }

    #[test]
    #[should_panic(expected = "not implemented")]
    fn test_allocated_size_is_fatal() {
        let alloc = CpuAllocator;
        let ptr = alloc.allocate(8).unwrap();
        alloc.allocated_size(ptr);
    }

    #[test]
    fn test_registry_cpu() {
        let a = allocator_for(Device::Cpu).unwrap();
        assert_eq!(a.memory_type(), Device::Cpu);
        let b = allocator_for(Device::Cpu).unwrap();
        assert!(std::ptr::eq(
            a as *const dyn Allocator as *const u8,
            b as *const dyn Allocator as *const u8
        ));
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_registry_gpu_unavailable() {
        use crate::error::VesselError;
        assert!(matches!(
            allocator_for(Device::Gpu),
            Err(VesselError::UnsupportedDevice(Device::Gpu))
        ));
    }
}
