//! Raw device memory primitives.
//!
//! Device addresses travel through the crate as `*mut u8` / `NonNull<u8>` so
//! they fit the same `Allocator` and `Buffer` types as host memory. They must
//! never be dereferenced on the host.

use std::ptr::NonNull;

use cudarc::driver::{result, sys};

use super::context::{bind, CudaError};

fn dptr(ptr: *const u8) -> sys::CUdeviceptr {
    ptr as usize as sys::CUdeviceptr
}

/// Allocate `nbytes` of device memory.
pub fn malloc(nbytes: usize) -> Result<NonNull<u8>, CudaError> {
    bind()?;
    let raw = unsafe { result::malloc_sync(nbytes) }
        .map_err(|e| CudaError::MemoryError(format!("malloc({} bytes): {}", nbytes, e)))?;
    NonNull::new(raw as usize as *mut u8)
        .ok_or_else(|| CudaError::MemoryError(format!("malloc({} bytes) returned null", nbytes)))
}

/// Free device memory returned by [`malloc`].
///
/// # Safety
/// `ptr` must be a live device allocation.
pub unsafe fn free(ptr: NonNull<u8>) -> Result<(), CudaError> {
    bind()?;
    result::free_sync(dptr(ptr.as_ptr()))
        .map_err(|e| CudaError::MemoryError(format!("free: {}", e)))
}

/// Fill `nbytes` of device memory with `value`.
///
/// # Safety
/// `dst` must be a device address valid for `nbytes` bytes.
pub unsafe fn memset(dst: *mut u8, value: u8, nbytes: usize) -> Result<(), CudaError> {
    if nbytes == 0 {
        return Ok(());
    }
    bind()?;
    result::memset_d8_sync(dptr(dst), value, nbytes)
        .map_err(|e| CudaError::MemoryError(format!("memset({} bytes): {}", nbytes, e)))
}

/// Host → device copy.
///
/// # Safety
/// `dst` must be a device address and `src` a host address, both valid for `nbytes`.
pub unsafe fn copy_htod(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<(), CudaError> {
    if nbytes == 0 {
        return Ok(());
    }
    bind()?;
    let host = std::slice::from_raw_parts(src, nbytes);
    result::memcpy_htod_sync(dptr(dst), host)
        .map_err(|e| CudaError::MemoryError(format!("htod({} bytes): {}", nbytes, e)))
}

/// Device → host copy.
///
/// # Safety
/// `dst` must be a host address and `src` a device address, both valid for `nbytes`.
pub unsafe fn copy_dtoh(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<(), CudaError> {
    if nbytes == 0 {
        return Ok(());
    }
    bind()?;
    let host = std::slice::from_raw_parts_mut(dst, nbytes);
    result::memcpy_dtoh_sync(host, dptr(src))
        .map_err(|e| CudaError::MemoryError(format!("dtoh({} bytes): {}", nbytes, e)))
}

/// Device → device copy.
///
/// # Safety
/// `dst` and `src` must be device addresses valid for `nbytes`.
pub unsafe fn copy_dtod(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<(), CudaError> {
    if nbytes == 0 {
        return Ok(());
    }
    bind()?;
    result::memcpy_dtod_sync(dptr(dst), dptr(src), nbytes)
        .map_err(|e| CudaError::MemoryError(format!("dtod({} bytes): {}", nbytes, e)))
}
