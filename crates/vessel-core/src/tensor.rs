use std::fmt;
use std::ptr;

use crate::allocator::{allocator_for, Allocator};
use crate::buffer::Buffer;
use crate::device::{CpuDevice, Device, GpuDevice};
use crate::dtype::{DType, Element};
use crate::error::VesselError;
use crate::memory::{self, dispatch_device, dispatch_dtype, DeviceMemory};
use crate::shape::Shape;
use crate::Result;

/// A typed, shaped block of memory on one device.
///
/// A tensor either owns its block (allocated at construction, freed on drop)
/// or views caller-supplied memory (never allocated or freed here). Cloning
/// always yields an independent owning copy.
///
/// Holds raw pointers and is therefore neither `Send` nor `Sync`.
pub struct Tensor {
    dtype: DType,
    device: Device,
    shape: Shape,
    allocator: Option<&'static dyn Allocator>,
    buffer: Buffer,
}

impl Tensor {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Owning host tensor.
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Result<Self> {
        Self::new_on(dtype, Device::Cpu, shape)
    }

    /// Owning tensor on `device`, allocated through the registry allocator.
    pub fn new_on(dtype: DType, device: Device, shape: impl Into<Shape>) -> Result<Self> {
        Self::with_allocator(dtype, shape, allocator_for(device)?)
    }

    /// Owning tensor allocated through `allocator`. The device is the
    /// allocator's memory type.
    pub fn with_allocator(
        dtype: DType,
        shape: impl Into<Shape>,
        allocator: &'static dyn Allocator,
    ) -> Result<Self> {
        let shape = shape.into();
        let device = allocator.memory_type();
        let nbytes = checked_nbytes(dtype, &shape)?;
        // zero-extent tensors still get a distinct block
        let data = allocator
            .allocate(nbytes.max(1))
            .ok_or(VesselError::AllocationFailed { device, nbytes })?;
        tracing::trace!("alloc {} {} {} at {:p} on {}", shape, dtype, nbytes, data, device);
        let buffer = unsafe { Buffer::owned(allocator, data, nbytes) };
        Ok(Self {
            dtype,
            device,
            shape,
            allocator: Some(allocator),
            buffer,
        })
    }

    /// Non-owning view over caller memory. Never allocates, never frees.
    ///
    /// # Safety
    /// `data` must point to at least `shape.numel()` elements of `dtype` on
    /// `device`, suitably aligned, and must outlive the returned tensor and
    /// every borrow taken from it.
    pub unsafe fn from_raw(
        data: *mut u8,
        dtype: DType,
        device: Device,
        shape: impl Into<Shape>,
    ) -> Result<Self> {
        let shape = shape.into();
        let nbytes = checked_nbytes(dtype, &shape)?;
        Ok(Self {
            dtype,
            device,
            shape,
            allocator: None,
            buffer: Buffer::borrowed(data, nbytes),
        })
    }

    /// Owning host tensor holding a copy of `values`.
    pub fn from_slice<T: Element>(values: &[T], shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if shape.checked_numel() != Some(values.len()) {
            return Err(VesselError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![values.len()],
            });
        }
        let mut out = Self::new(T::DTYPE, shape)?;
        out.as_mut_slice::<T>()?.copy_from_slice(values);
        Ok(out)
    }

    /// Owning byte-for-byte copy on the same device.
    ///
    /// The copy is allocated by this tensor's allocator, or by the registry
    /// allocator for its device when this tensor is a view.
    pub fn try_clone(&self) -> Result<Self> {
        let allocator = match self.allocator {
            Some(alloc) => alloc,
            None => allocator_for(self.device)?,
        };
        let out = Self::with_allocator(self.dtype, self.shape.clone(), allocator)?;
        let nbytes = self.nbytes();
        dispatch_device!(self.device, D => unsafe {
            D::copy_within(out.raw_data(), self.raw_data(), nbytes)
        })?;
        Ok(out)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Element type tag.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Device the memory lives on.
    pub fn device(&self) -> Device {
        self.device
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Live bytes: `numel * dtype.size()`.
    pub fn nbytes(&self) -> usize {
        self.dtype.storage_bytes(self.numel())
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Allocator that produced the block, `None` for a view.
    pub fn allocator(&self) -> Option<&'static dyn Allocator> {
        self.allocator
    }

    pub fn owns_memory(&self) -> bool {
        self.buffer.owns_memory()
    }

    /// Untyped pointer to the block (device memory for non-host tensors).
    pub fn raw_data(&self) -> *mut u8 {
        self.buffer.data()
    }

    // =========================================================================
    // Typed access
    // =========================================================================

    fn check_dtype<T: Element>(&self) -> Result<()> {
        if T::DTYPE == self.dtype {
            Ok(())
        } else {
            Err(VesselError::DTypeMismatch {
                expected: T::DTYPE,
                got: self.dtype,
            })
        }
    }

    fn check_host(&self) -> Result<()> {
        if self.device.is_gpu() {
            return Err(VesselError::NotOnHost(self.device));
        }
        Ok(())
    }

    /// Typed pointer to the elements, for kernels.
    ///
    /// # Panics
    /// Panics if `T` does not match the tensor's dtype.
    pub fn data<T: Element>(&self) -> *const T {
        match self.try_data::<T>() {
            Ok(p) => p,
            Err(e) => panic!("{}", e),
        }
    }

    /// Mutable typed pointer to the elements.
    ///
    /// # Panics
    /// Panics if `T` does not match the tensor's dtype.
    pub fn data_mut<T: Element>(&mut self) -> *mut T {
        match self.try_data_mut::<T>() {
            Ok(p) => p,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn try_data<T: Element>(&self) -> Result<*const T> {
        self.check_dtype::<T>()?;
        Ok(self.raw_data() as *const T)
    }

    pub fn try_data_mut<T: Element>(&mut self) -> Result<*mut T> {
        self.check_dtype::<T>()?;
        Ok(self.raw_data() as *mut T)
    }

    /// Elements as a host slice. Fails for other dtypes or non-host tensors.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        self.check_dtype::<T>()?;
        self.check_host()?;
        if self.numel() == 0 {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(self.raw_data() as *const T, self.numel()) })
    }

    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        self.check_dtype::<T>()?;
        self.check_host()?;
        if self.numel() == 0 {
            return Ok(&mut []);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(self.raw_data() as *mut T, self.numel()) })
    }

    /// Copy the elements into a host `Vec`, staging from the device if needed.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.check_dtype::<T>()?;
        let count = self.numel();
        let mut host = vec![<T as bytemuck::Zeroable>::zeroed(); count];
        if count > 0 {
            let src = self.raw_data() as *const T;
            dispatch_device!(self.device, S => unsafe {
                memory::synchronize_memory::<T, CpuDevice, S>(host.as_mut_ptr(), src, count)
            })?;
        }
        Ok(host)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Fill every element with zero bytes.
    pub fn zero(&mut self) -> Result<()> {
        let count = self.numel();
        let data = self.raw_data();
        dispatch_dtype!(self.dtype, T => dispatch_device!(self.device, D => unsafe {
            memory::set_memory::<T, D>(data as *mut T, 0, count)
        }))
    }

    /// New owning tensor on device `D` with the same dtype, shape and values.
    pub fn to_device<D: DeviceMemory>(&self) -> Result<Tensor> {
        let out = Tensor::new_on(self.dtype, D::DEVICE, self.shape.clone())?;
        let count = self.numel();
        let (dst, src) = (out.raw_data(), self.raw_data());
        dispatch_dtype!(self.dtype, T => dispatch_device!(self.device, S => unsafe {
            memory::synchronize_memory::<T, D, S>(dst as *mut T, src as *const T, count)
        }))?;
        Ok(out)
    }

    /// Runtime-device form of [`Tensor::to_device`].
    pub fn to(&self, device: Device) -> Result<Tensor> {
        dispatch_device!(device, D => self.to_device::<D>())
    }

    pub fn cpu(&self) -> Result<Tensor> {
        self.to_device::<CpuDevice>()
    }

    pub fn gpu(&self) -> Result<Tensor> {
        self.to_device::<GpuDevice>()
    }

    /// Replace the shape in place; the buffer is untouched.
    ///
    /// Each target extent must be ≥ 1, except at most one `-1` which is
    /// inferred from the element count. On error the shape is unchanged.
    pub fn reshape(&mut self, dims: &[isize]) -> Result<()> {
        self.shape = self.shape.resolve_reshape(dims)?;
        Ok(())
    }

    /// New owning tensor on the same device with every element converted to `dtype`.
    pub fn cast(&self, dtype: DType) -> Result<Tensor> {
        let out = Tensor::new_on(dtype, self.device, self.shape.clone())?;
        let count = self.numel();
        let (dst, src) = (out.raw_data(), self.raw_data());
        dispatch_dtype!(dtype, O => dispatch_dtype!(self.dtype, I => {
            dispatch_device!(self.device, D => unsafe {
                memory::cast_memory::<O, I, D, D>(dst as *mut O, src as *const I, count)
            })
        }))?;
        Ok(out)
    }

    /// Owning copy of the axis-aligned block starting at `begin` with extents `size`.
    ///
    /// Never aliases `self`. Both slices must have one entry per axis and
    /// `begin[i] + size[i]` must not exceed the axis extent.
    pub fn slice(&self, begin: &[usize], size: &[usize]) -> Result<Tensor> {
        let dims = self.shape.dims();
        if begin.len() != dims.len() || size.len() != dims.len() {
            return Err(VesselError::ShapeMismatch {
                expected: dims.to_vec(),
                got: if begin.len() != dims.len() {
                    begin.to_vec()
                } else {
                    size.to_vec()
                },
            });
        }
        let in_bounds = dims
            .iter()
            .zip(begin.iter().zip(size))
            .all(|(&extent, (&b, &s))| b.checked_add(s).map_or(false, |end| end <= extent));
        if !in_bounds {
            return Err(VesselError::SliceOutOfBounds {
                begin: begin.to_vec(),
                size: size.to_vec(),
                shape: dims.to_vec(),
            });
        }

        let out = Tensor::new_on(self.dtype, self.device, size)?;
        if out.numel() > 0 {
            dispatch_device!(self.device, D => self.copy_block::<D>(&out, begin, size))?;
        }
        Ok(out)
    }

    /// Copy a validated block into `out`, one innermost-axis run at a time.
    ///
    /// Device addresses are not Rust allocations; offsets use `wrapping_add`.
    fn copy_block<D: DeviceMemory>(
        &self,
        out: &Tensor,
        begin: &[usize],
        size: &[usize],
    ) -> Result<()> {
        let elem = self.dtype.size();
        if self.shape.is_scalar() {
            return unsafe { D::copy_within(out.raw_data(), self.raw_data(), elem) };
        }
        let strides = self.shape.contiguous_strides();
        let outer = size.len() - 1;
        let (run, run_start) = (size[outer], begin[outer]);
        let runs = out.numel() / run;
        let mut idx = vec![0usize; outer];

        for r in 0..runs {
            let mut offset = run_start;
            for (axis, &i) in idx.iter().enumerate() {
                offset += (begin[axis] + i) * strides[axis];
            }
            unsafe {
                D::copy_within(
                    out.raw_data().wrapping_add(r * run * elem),
                    self.raw_data().wrapping_add(offset * elem),
                    run * elem,
                )?;
            }
            for axis in (0..outer).rev() {
                idx[axis] += 1;
                if idx[axis] < size[axis] {
                    break;
                }
                idx[axis] = 0;
            }
        }
        Ok(())
    }

    fn write_elements<T: Element>(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.numel();
        if count == 0 {
            return Ok(());
        }
        if self.device.is_cpu() {
            let values = unsafe { std::slice::from_raw_parts(self.raw_data() as *const T, count) };
            return write_list(f, values);
        }

        let mut host: *mut T = ptr::null_mut();
        let staging =
            unsafe { memory::resize_memory::<T, CpuDevice>(&mut host, count, Some("display")) };
        if let Err(e) = staging {
            return write!(f, "<{}>", e);
        }
        let src = self.raw_data() as *const T;
        let staged = dispatch_device!(self.device, S => unsafe {
            memory::synchronize_memory::<T, CpuDevice, S>(host, src, count)
        });
        let result = match staged {
            Ok(()) => write_list(f, unsafe { std::slice::from_raw_parts(host, count) }),
            Err(e) => write!(f, "<{}>", e),
        };
        if let Err(e) = unsafe { memory::delete_memory::<T, CpuDevice>(host) } {
            tracing::warn!("failed to release display staging block: {}", e);
        }
        result
    }
}

/// Byte size of `shape` elements of `dtype`, rejecting overflow of either product.
fn checked_nbytes(dtype: DType, shape: &Shape) -> Result<usize> {
    shape
        .checked_numel()
        .and_then(|n| dtype.checked_storage_bytes(n))
        .ok_or_else(|| VesselError::SizeOverflow {
            dims: shape.dims().to_vec(),
            dtype,
        })
}

fn write_list<T: Element>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        v.write_element(f)?;
    }
    Ok(())
}

impl Clone for Tensor {
    /// # Panics
    /// Panics if the copy cannot be allocated; use [`Tensor::try_clone`] to recover.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(t) => t,
            Err(e) => panic!("Tensor clone failed: {}", e),
        }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={}, data_type={}, device_type={}, buffer=[",
            self.shape, self.dtype, self.device
        )?;
        dispatch_dtype!(self.dtype, T => self.write_elements::<T>(f))?;
        write!(f, "])")
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype)
            .field("device", &self.device)
            .field("shape", &self.shape)
            .field("owns_memory", &self.owns_memory())
            .finish()
    }
}
