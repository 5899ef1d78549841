//! Aligned memory for direct IO
//!
//! O_DIRECT transfers require the user buffer to start on a boundary the
//! device accepts (typically 512 or 4096 bytes). `AlignedBuffer` owns one such
//! region for its whole lifetime; the descriptor pool pairs one buffer with
//! each request slot so nothing is allocated once the pipeline is running.

use crate::Result;
use std::alloc::{alloc_zeroed, dealloc, Layout};

/// Memory-aligned buffer suitable for O_DIRECT operations
///
/// The region is zero-initialized at allocation. Zero-fill runs rely on this:
/// their buffers are only ever used as write sources and stay zeroed.
pub struct AlignedBuffer {
    ptr: *mut u8,
    size: usize,
    alignment: usize,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate a zeroed buffer of `size` bytes aligned to `alignment`
    ///
    /// # Errors
    ///
    /// Fails if `alignment` is not a power of two, `size` is zero, or the
    /// allocator cannot satisfy the request.
    pub fn new(size: usize, alignment: usize) -> Result<Self> {
        if !alignment.is_power_of_two() {
            anyhow::bail!("Alignment must be a power of 2, got {}", alignment);
        }
        if size == 0 {
            anyhow::bail!("Buffer size must be greater than 0");
        }

        let layout = Layout::from_size_align(size, alignment)
            .map_err(|e| anyhow::anyhow!("Invalid layout (size={}, align={}): {}", size, alignment, e))?;

        // SAFETY: layout has a non-zero size (checked above)
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            anyhow::bail!("Failed to allocate {} byte buffer aligned to {}", size, alignment);
        }

        Ok(AlignedBuffer {
            ptr,
            size,
            alignment,
            layout,
        })
    }

    /// Get a mutable raw pointer to the buffer
    ///
    /// This is the address handed to the kernel; it stays valid until the
    /// buffer is dropped.
    #[inline(always)]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    /// Get the buffer as a slice
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    /// Get the buffer as a mutable slice
    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }

    /// Get the size of the buffer in bytes
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the alignment of the buffer
    #[inline(always)]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Verify that the buffer is properly aligned
    #[inline(always)]
    pub fn is_aligned(&self) -> bool {
        (self.ptr as usize) % self.alignment == 0
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.ptr, self.layout);
        }
    }
}

// AlignedBuffer is Send because it owns its memory
unsafe impl Send for AlignedBuffer {}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_buffer_creation() {
        let buffer = AlignedBuffer::new(4096, 512).unwrap();
        assert_eq!(buffer.size(), 4096);
        assert_eq!(buffer.alignment(), 512);
        assert!(buffer.is_aligned());
    }

    #[test]
    fn test_aligned_buffer_4k_alignment() {
        let buffer = AlignedBuffer::new(65536, 4096).unwrap();
        assert_eq!(buffer.size(), 65536);
        assert!(buffer.is_aligned());
    }

    #[test]
    fn test_aligned_buffer_odd_size() {
        // Size need not be a multiple of the alignment
        let buffer = AlignedBuffer::new(1000, 512).unwrap();
        assert_eq!(buffer.size(), 1000);
        assert!(buffer.is_aligned());
    }

    #[test]
    fn test_invalid_alignment() {
        let err = AlignedBuffer::new(4096, 513).unwrap_err();
        assert!(err.to_string().contains("power of 2"));
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(AlignedBuffer::new(0, 512).is_err());
    }

    #[test]
    fn test_buffer_starts_zeroed() {
        let buffer = AlignedBuffer::new(8192, 4096).unwrap();
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_buffer_write_read_back() {
        let mut buffer = AlignedBuffer::new(512, 512).unwrap();
        for (i, byte) in buffer.as_mut_slice().iter_mut().enumerate() {
            *byte = (i % 256) as u8;
        }
        let slice = buffer.as_slice();
        assert_eq!(slice[0], 0);
        assert_eq!(slice[255], 255);
        assert_eq!(slice[256], 0);
    }
}
