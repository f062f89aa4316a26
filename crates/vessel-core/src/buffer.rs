use std::fmt;
use std::ptr::NonNull;

use crate::allocator::Allocator;
use crate::device::Device;

/// A raw memory block that is either owned or viewed.
///
/// An owning buffer releases its block through the allocator that produced
/// it when dropped. A viewing buffer wraps memory of unspecified origin and
/// never frees it. The ownership state is fixed at construction.
pub struct Buffer {
    data: *mut u8,
    nbytes: usize,
    allocator: Option<&'static dyn Allocator>,
}

impl Buffer {
    /// Wrap a block returned by `allocator`; the buffer frees it on drop.
    ///
    /// # Safety
    /// `data` must have been returned by `allocator` (or one of the same kind),
    /// must span at least `nbytes` bytes, and must not be freed elsewhere.
    pub unsafe fn owned(
        allocator: &'static dyn Allocator,
        data: NonNull<u8>,
        nbytes: usize,
    ) -> Self {
        Self {
            data: data.as_ptr(),
            nbytes,
            allocator: Some(allocator),
        }
    }

    /// Wrap caller-supplied memory without taking ownership.
    ///
    /// # Safety
    /// `data` must stay valid for `nbytes` bytes for as long as the buffer
    /// (or anything reading through it) is alive.
    pub unsafe fn borrowed(data: *mut u8, nbytes: usize) -> Self {
        Self {
            data,
            nbytes,
            allocator: None,
        }
    }

    /// Raw pointer to the start of the block.
    pub fn data(&self) -> *mut u8 {
        self.data
    }

    /// Extent of the block in bytes, as requested at construction.
    pub fn nbytes(&self) -> usize {
        self.nbytes
    }

    /// Allocator that will free this block, or `None` for a view.
    pub fn allocator(&self) -> Option<&'static dyn Allocator> {
        self.allocator
    }

    /// Whether dropping this buffer frees the block.
    pub fn owns_memory(&self) -> bool {
        self.allocator.is_some()
    }

    /// Bytes reported by the owning allocator; 0 for a view.
    ///
    /// # Panics
    /// Panics for owning buffers whose allocator does not track sizes.
    pub fn allocated_bytes(&self) -> usize {
        match (self.allocator, NonNull::new(self.data)) {
            (Some(alloc), Some(ptr)) => alloc.allocated_size(ptr),
            _ => 0,
        }
    }

    /// Memory kind of the owning allocator, or `None` ("unknown") for a view.
    pub fn memory_type(&self) -> Option<Device> {
        self.allocator.map(|a| a.memory_type())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let (Some(alloc), Some(ptr)) = (self.allocator, NonNull::new(self.data)) {
            tracing::trace!(
                "free {} bytes at {:p} on {}",
                self.nbytes,
                ptr,
                alloc.memory_type()
            );
            unsafe { alloc.free(ptr) };
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("data", &self.data)
            .field("nbytes", &self.nbytes)
            .field("owns_memory", &self.owns_memory())
            .finish()
    }
}
