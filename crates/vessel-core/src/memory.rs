//! Device- and type-specialized memory operations on raw typed pointers.
//!
//! Five operations: resize, fill (byte-wise), synchronize (same-type copy,
//! possibly cross-device), cast (converting copy) and release. Each is a
//! generic function over an [`Element`] type and one or two device markers,
//! so the specialization is chosen at compile time. [`dispatch_dtype!`] and
//! [`dispatch_device!`] lift a runtime `(DType, Device)` pair onto those
//! generics.
//!
//! With the `cuda` feature off, every accelerator specialization returns
//! [`VesselError::BackendUnavailable`] instead of silently doing nothing.

use std::ptr::{self, NonNull};

use crate::allocator::allocator_for;
use crate::device::{CpuDevice, DeviceKind, GpuDevice};
use crate::dtype::{CastFrom, Element};
use crate::error::VesselError;
use crate::Result;

// =============================================================================
// Backend primitives
// =============================================================================

/// Raw byte-level primitives for one device kind.
///
/// All pointers are addresses in the memory of the named device; "host" is
/// always ordinary process memory.
pub trait DeviceMemory: DeviceKind + Transfer<CpuDevice> + Transfer<GpuDevice> {
    /// Fill `nbytes` bytes at `dst` with `value`.
    ///
    /// # Safety
    /// `dst` must be valid for writes of `nbytes` bytes on this device.
    unsafe fn fill_bytes(dst: *mut u8, value: u8, nbytes: usize) -> Result<()>;

    /// Copy `nbytes` from host memory into this device's memory.
    ///
    /// # Safety
    /// `src` must be host-readable and `dst` device-writable for `nbytes`.
    unsafe fn copy_from_host(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()>;

    /// Copy `nbytes` from this device's memory into host memory.
    ///
    /// # Safety
    /// `src` must be device-readable and `dst` host-writable for `nbytes`.
    unsafe fn copy_to_host(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()>;

    /// Copy `nbytes` within this device's memory. Regions must not overlap.
    ///
    /// # Safety
    /// Both pointers must be valid on this device for `nbytes`.
    unsafe fn copy_within(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()>;
}

/// Byte copy into `Self`'s memory from `Src`'s memory.
pub trait Transfer<Src: DeviceKind>: DeviceKind {
    /// # Safety
    /// `src` must be readable on `Src` and `dst` writable on `Self` for `nbytes`.
    unsafe fn transfer(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()>;
}

unsafe fn host_copy(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
    if nbytes > 0 {
        ptr::copy_nonoverlapping(src, dst, nbytes);
    }
    Ok(())
}

impl DeviceMemory for CpuDevice {
    unsafe fn fill_bytes(dst: *mut u8, value: u8, nbytes: usize) -> Result<()> {
        if nbytes > 0 {
            ptr::write_bytes(dst, value, nbytes);
        }
        Ok(())
    }

    unsafe fn copy_from_host(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
        host_copy(dst, src, nbytes)
    }

    unsafe fn copy_to_host(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
        host_copy(dst, src, nbytes)
    }

    unsafe fn copy_within(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
        host_copy(dst, src, nbytes)
    }
}

#[cfg(feature = "cuda")]
impl DeviceMemory for GpuDevice {
    unsafe fn fill_bytes(dst: *mut u8, value: u8, nbytes: usize) -> Result<()> {
        Ok(crate::cuda::memory::memset(dst, value, nbytes)?)
    }

    unsafe fn copy_from_host(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
        Ok(crate::cuda::memory::copy_htod(dst, src, nbytes)?)
    }

    unsafe fn copy_to_host(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
        Ok(crate::cuda::memory::copy_dtoh(dst, src, nbytes)?)
    }

    unsafe fn copy_within(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
        Ok(crate::cuda::memory::copy_dtod(dst, src, nbytes)?)
    }
}

#[cfg(not(feature = "cuda"))]
impl DeviceMemory for GpuDevice {
    unsafe fn fill_bytes(_dst: *mut u8, _value: u8, _nbytes: usize) -> Result<()> {
        Err(VesselError::BackendUnavailable(GpuDevice::DEVICE))
    }

    unsafe fn copy_from_host(_dst: *mut u8, _src: *const u8, _nbytes: usize) -> Result<()> {
        Err(VesselError::BackendUnavailable(GpuDevice::DEVICE))
    }

    unsafe fn copy_to_host(_dst: *mut u8, _src: *const u8, _nbytes: usize) -> Result<()> {
        Err(VesselError::BackendUnavailable(GpuDevice::DEVICE))
    }

    unsafe fn copy_within(_dst: *mut u8, _src: *const u8, _nbytes: usize) -> Result<()> {
        Err(VesselError::BackendUnavailable(GpuDevice::DEVICE))
    }
}

impl Transfer<CpuDevice> for CpuDevice {
    unsafe fn transfer(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
        host_copy(dst, src, nbytes)
    }
}

impl Transfer<CpuDevice> for GpuDevice {
    unsafe fn transfer(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
        GpuDevice::copy_from_host(dst, src, nbytes)
    }
}

impl Transfer<GpuDevice> for CpuDevice {
    unsafe fn transfer(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
        GpuDevice::copy_to_host(dst, src, nbytes)
    }
}

impl Transfer<GpuDevice> for GpuDevice {
    unsafe fn transfer(dst: *mut u8, src: *const u8, nbytes: usize) -> Result<()> {
        GpuDevice::copy_within(dst, src, nbytes)
    }
}

// =============================================================================
// Typed operations
// =============================================================================

fn ensure_available<D: DeviceKind>() -> Result<()> {
    if D::DEVICE.is_available() {
        Ok(())
    } else {
        Err(VesselError::BackendUnavailable(D::DEVICE))
    }
}

/// Replace `*arr` with a fresh block of `count` elements on `D`.
///
/// The old block (if non-null) is released first; contents are not preserved.
/// A byte size that overflows `usize` fails before anything is released.
/// `tag` only labels the trace event.
///
/// # Safety
/// `*arr` must be null or a live block from `D`'s allocator.
pub unsafe fn resize_memory<T: Element, D: DeviceMemory>(
    arr: &mut *mut T,
    count: usize,
    tag: Option<&str>,
) -> Result<()> {
    ensure_available::<D>()?;
    let nbytes = T::DTYPE
        .checked_storage_bytes(count)
        .ok_or_else(|| VesselError::SizeOverflow {
            dims: vec![count],
            dtype: T::DTYPE,
        })?;
    let alloc = allocator_for(D::DEVICE)?;
    if let Some(old) = NonNull::new(*arr as *mut u8) {
        alloc.free(old);
        *arr = ptr::null_mut();
    }
    let block = alloc
        .allocate(nbytes.max(1))
        .ok_or(VesselError::AllocationFailed {
            device: D::DEVICE,
            nbytes,
        })?;
    tracing::trace!(
        "resize {}: {} x {} on {} at {:p}",
        tag.unwrap_or("-"),
        count,
        T::DTYPE,
        D::DEVICE,
        block
    );
    *arr = block.as_ptr() as *mut T;
    Ok(())
}

/// Write `value` into every byte of `count` elements at `arr`.
///
/// Zero gives a correct zero for every element type; other values give
/// whatever bit pattern the repeated byte spells.
///
/// # Safety
/// `arr` must be valid for `count` elements on `D`.
pub unsafe fn set_memory<T: Element, D: DeviceMemory>(
    arr: *mut T,
    value: u8,
    count: usize,
) -> Result<()> {
    tracing::trace!("set {} x {} on {} to {:#04x}", count, T::DTYPE, D::DEVICE, value);
    D::fill_bytes(arr as *mut u8, value, T::DTYPE.storage_bytes(count))
}

/// Copy `count` elements from `input` on `Src` to `out` on `Dst`.
///
/// # Safety
/// `input` must be valid for `count` reads on `Src`, `out` for `count`
/// writes on `Dst`, and the regions must not overlap.
pub unsafe fn synchronize_memory<T: Element, Dst: Transfer<Src>, Src: DeviceKind>(
    out: *mut T,
    input: *const T,
    count: usize,
) -> Result<()> {
    if Src::DEVICE != Dst::DEVICE {
        tracing::debug!(
            "sync {} x {}: {} -> {}",
            count,
            T::DTYPE,
            Src::DEVICE,
            Dst::DEVICE
        );
    }
    Dst::transfer(out as *mut u8, input as *const u8, T::DTYPE.storage_bytes(count))
}

/// Copy `count` elements from `input` on `Src` to `out` on `Dst`, converting
/// each element with [`CastFrom`].
///
/// Host-to-host casts convert in place. Any accelerator side is staged
/// through temporary host vectors.
///
/// # Safety
/// Same requirements as [`synchronize_memory`], for the respective element types.
pub unsafe fn cast_memory<O, I, Dst, Src>(out: *mut O, input: *const I, count: usize) -> Result<()>
where
    O: Element + CastFrom<I>,
    I: Element,
    Dst: DeviceMemory,
    Src: DeviceMemory,
{
    if count == 0 {
        return Ok(());
    }
    tracing::debug!(
        "cast {} x {} on {} -> {} on {}",
        count,
        I::DTYPE,
        Src::DEVICE,
        O::DTYPE,
        Dst::DEVICE
    );

    if Src::DEVICE.is_cpu() && Dst::DEVICE.is_cpu() {
        let src = std::slice::from_raw_parts(input, count);
        let dst = std::slice::from_raw_parts_mut(out, count);
        for (o, &i) in dst.iter_mut().zip(src) {
            *o = O::cast_from(i);
        }
        return Ok(());
    }

    let mut staged_in: Vec<I> = vec![<I as bytemuck::Zeroable>::zeroed(); count];
    Src::copy_to_host(
        staged_in.as_mut_ptr() as *mut u8,
        input as *const u8,
        I::DTYPE.storage_bytes(count),
    )?;
    let staged_out: Vec<O> = staged_in.into_iter().map(O::cast_from).collect();
    Dst::copy_from_host(
        out as *mut u8,
        staged_out.as_ptr() as *const u8,
        O::DTYPE.storage_bytes(count),
    )
}

/// Release a block obtained from `D`'s allocator. Null is a no-op.
///
/// # Safety
/// `arr` must be null or a live block from `D`'s allocator, unused afterwards.
pub unsafe fn delete_memory<T: Element, D: DeviceMemory>(arr: *mut T) -> Result<()> {
    let Some(block) = NonNull::new(arr as *mut u8) else {
        return Ok(());
    };
    ensure_available::<D>()?;
    tracing::trace!("delete {:p} on {}", block, D::DEVICE);
    allocator_for(D::DEVICE)?.free(block);
    Ok(())
}

// =============================================================================
// Runtime tag → static type dispatch
// =============================================================================

/// Bind `$T` to the Rust element type named by a runtime [`DType`](crate::DType)
/// and evaluate `$body` once for that type.
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::dtype::DType::I32 => {
                type $T = i32;
                $body
            }
            $crate::dtype::DType::I64 => {
                type $T = i64;
                $body
            }
            $crate::dtype::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::F64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::Complex32 => {
                type $T = ::num_complex::Complex32;
                $body
            }
            $crate::dtype::DType::Complex64 => {
                type $T = ::num_complex::Complex64;
                $body
            }
        }
    };
}

/// Bind `$D` to the device marker for a runtime [`Device`](crate::Device).
macro_rules! dispatch_device {
    ($device:expr, $D:ident => $body:expr) => {
        match $device {
            $crate::device::Device::Cpu => {
                type $D = $crate::device::CpuDevice;
                $body
            }
            $crate::device::Device::Gpu => {
                type $D = $crate::device::GpuDevice;
                $body
            }
        }
    };
}

pub(crate) use dispatch_device;
pub(crate) use dispatch_dtype;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::dtype::DType;
    use num_complex::Complex64;

    #[test]
    fn test_resize_and_delete_cpu() {
        let mut arr: *mut f64 = ptr::null_mut();
        unsafe {
            resize_memory::<f64, CpuDevice>(&mut arr, 16, Some("test")).unwrap();
            assert!(!arr.is_null());
            *arr.add(15) = 2.5;
            assert_eq!(*arr.add(15), 2.5);

            // resizing releases the old block and hands back a fresh one
            resize_memory::<f64, CpuDevice>(&mut arr, 4, None).unwrap();
            assert!(!arr.is_null());
            delete_memory::<f64, CpuDevice>(arr).unwrap();
        }
    }

    #[test]
    fn test_resize_zero_count() {
        let mut arr: *mut i32 = ptr::null_mut();
        unsafe {
            resize_memory::<i32, CpuDevice>(&mut arr, 0, None).unwrap();
            assert!(!arr.is_null());
            delete_memory::<i32, CpuDevice>(arr).unwrap();
        }
    }

    #[test]
    fn test_resize_overflow_keeps_old_block() {
        let mut arr: *mut f64 = ptr::null_mut();
        unsafe {
            resize_memory::<f64, CpuDevice>(&mut arr, 2, None).unwrap();
            let old = arr;
            assert!(matches!(
                resize_memory::<f64, CpuDevice>(&mut arr, 1usize << 62, None),
                Err(VesselError::SizeOverflow { .. })
            ));
            assert_eq!(arr, old);
            delete_memory::<f64, CpuDevice>(arr).unwrap();
        }
    }

    #[test]
    fn test_delete_null_is_noop() {
        unsafe {
            delete_memory::<f32, CpuDevice>(ptr::null_mut()).unwrap();
            delete_memory::<f32, GpuDevice>(ptr::null_mut()).unwrap();
        }
    }

    #[test]
    fn test_set_zero_complex() {
        let mut v = vec![Complex64::new(1.0, -1.0); 8];
        unsafe { set_memory::<Complex64, CpuDevice>(v.as_mut_ptr(), 0, v.len()).unwrap() };
        assert!(v.iter().all(|c| c.re == 0.0 && c.im == 0.0));
    }

    #[test]
    fn test_set_is_bytewise() {
        let mut v = vec![0i32; 4];
        unsafe { set_memory::<i32, CpuDevice>(v.as_mut_ptr(), 0x01, 4).unwrap() };
        assert!(v.iter().all(|&x| x == 0x0101_0101));
    }

    #[test]
    fn test_synchronize_cpu() {
        let src = [1i64, 2, 3, 4, 5];
        let mut dst = [0i64; 5];
        unsafe {
            synchronize_memory::<i64, CpuDevice, CpuDevice>(dst.as_mut_ptr(), src.as_ptr(), 5)
                .unwrap()
        };
        assert_eq!(src, dst);
    }

    #[test]
    fn test_cast_cpu() {
        let src = [1.5f32, -2.25, 3.0];
        let mut dst = [0f64; 3];
        unsafe {
            cast_memory::<f64, f32, CpuDevice, CpuDevice>(dst.as_mut_ptr(), src.as_ptr(), 3)
                .unwrap()
        };
        assert_eq!(dst, [1.5, -2.25, 3.0]);

        let mut cplx = [Complex64::new(9.0, 9.0); 3];
        unsafe {
            cast_memory::<Complex64, f32, CpuDevice, CpuDevice>(cplx.as_mut_ptr(), src.as_ptr(), 3)
                .unwrap()
        };
        assert_eq!(cplx[1], Complex64::new(-2.25, 0.0));
    }

    #[test]
    fn test_dispatch_dtype() {
        for dtype in [
            DType::I32,
            DType::I64,
            DType::F32,
            DType::F64,
            DType::Complex32,
            DType::Complex64,
        ] {
            let (tag, size) =
                dispatch_dtype!(dtype, T => (<T as Element>::DTYPE, std::mem::size_of::<T>()));
            assert_eq!(tag, dtype);
            assert_eq!(size, dtype.size());
        }
    }

    #[test]
    fn test_dispatch_device() {
        for device in [Device::Cpu, Device::Gpu] {
            assert_eq!(dispatch_device!(device, D => D::DEVICE), device);
        }
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_gpu_ops_fail_loudly_without_backend() {
        let unavailable = |r: Result<()>| {
            matches!(r, Err(VesselError::BackendUnavailable(Device::Gpu)))
        };
        let mut host = [1.0f32; 4];
        let mut arr: *mut f32 = ptr::null_mut();
        unsafe {
            assert!(unavailable(resize_memory::<f32, GpuDevice>(&mut arr, 4, None)));
            assert!(arr.is_null());
            assert!(unavailable(set_memory::<f32, GpuDevice>(host.as_mut_ptr(), 0, 4)));
            assert!(unavailable(synchronize_memory::<f32, GpuDevice, CpuDevice>(
                host.as_mut_ptr(),
                host.as_ptr(),
                4
            )));
            assert!(unavailable(cast_memory::<f64, f32, CpuDevice, GpuDevice>(
                ptr::null_mut(),
                host.as_ptr(),
                4
            )));
        }
        assert_eq!(host, [1.0; 4]);
    }
}
