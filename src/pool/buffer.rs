//! Owning frame-buffer handle
//!
//! Move-only RAII view over one pooled region. Exactly one live handle owns
//! a region; dropping the handle returns the storage to its pool for the
//! next frame.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::Arc;

use super::registry::{FrameElement, PoolError, PoolInner, Region};

/// Element counts below this have `resize` write the fill value to every
/// slot. Larger buffers are left uninitialized on purpose: every capture
/// path that resizes a full frame overwrites all of it before reading, and
/// zero-filling megapixel frames would dominate the per-frame cost.
pub const INIT_FILL_THRESHOLD: usize = 1024;

/// An owning handle over one pooled frame region.
///
/// Created through [`FramePool::buffer`](super::FramePool::buffer) (empty)
/// or [`FramePool::acquire`](super::FramePool::acquire) (sized,
/// uninitialized). Ownership transfers only by move; there is no clone.
pub struct FrameBuffer<T: FrameElement> {
    ptr: NonNull<T>,
    len: usize,
    pool: Arc<PoolInner<T>>,
}

// The handle is the sole owner of its region; FrameElement already bounds
// T by Send + Sync.
unsafe impl<T: FrameElement> Send for FrameBuffer<T> {}
unsafe impl<T: FrameElement> Sync for FrameBuffer<T> {}

impl<T: FrameElement> FrameBuffer<T> {
    pub(crate) fn empty(pool: Arc<PoolInner<T>>) -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            pool,
        }
    }

    pub(crate) fn from_region(region: Region<T>, pool: Arc<PoolInner<T>>) -> Self {
        Self {
            ptr: region.ptr,
            len: region.len,
            pool,
        }
    }

    /// Release the held region (if any) and acquire a fresh one of `len`
    /// elements with unspecified contents.
    fn reallocate(&mut self, len: usize) -> Result<(), PoolError> {
        self.release();
        let region = self.pool.take_region(len)?;
        self.ptr = region.ptr;
        self.len = region.len;
        Ok(())
    }

    /// Return the held region to the pool and leave the handle empty.
    fn release(&mut self) {
        if self.len != 0 {
            self.pool.put_region(Region {
                ptr: self.ptr,
                len: self.len,
            });
        }
        self.ptr = NonNull::dangling();
        self.len = 0;
    }

    /// Copy a contiguous range into freshly acquired storage (bulk copy
    /// fast path).
    pub fn assign_from_slice(&mut self, src: &[T]) -> Result<(), PoolError> {
        self.reallocate(src.len())?;
        // Safety: the region was just sized to exactly src.len() elements
        // and the source cannot alias storage this handle owns.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr(), src.len()) };
        Ok(())
    }

    /// Element-wise copy from any exact-size iterator.
    pub fn assign<I>(&mut self, range: I) -> Result<(), PoolError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = range.into_iter();
        let len = iter.len();
        self.reallocate(len)?;
        // ExactSizeIterator is not a soundness guarantee, so never write
        // past the region even if the iterator misreports its length.
        for (i, value) in iter.enumerate().take(len) {
            // Safety: i < len by the take() above
            unsafe { self.ptr.as_ptr().add(i).write(value) };
        }
        Ok(())
    }

    /// Resize to `len` elements.
    ///
    /// Below [`INIT_FILL_THRESHOLD`] every slot is written to `fill`. At or
    /// above it, initialization is skipped entirely and contents are
    /// unspecified; the caller must write every element it later reads.
    /// This split is a deliberate policy, not an accident of implementation.
    pub fn resize(&mut self, len: usize, fill: T) -> Result<(), PoolError> {
        self.reallocate(len)?;
        if len < INIT_FILL_THRESHOLD {
            for i in 0..len {
                // Safety: i < len, the region holds len elements
                unsafe { self.ptr.as_ptr().add(i).write(fill) };
            }
        }
        Ok(())
    }

    /// Move the contents out, leaving this handle empty and reusable.
    pub fn take(&mut self) -> FrameBuffer<T> {
        let taken = FrameBuffer {
            ptr: self.ptr,
            len: self.len,
            pool: self.pool.clone(),
        };
        self.ptr = NonNull::dangling();
        self.len = 0;
        taken
    }

    /// Element count
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether the handle holds no region
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw read pointer to the first element
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Raw write pointer to the first element
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// View the buffer as a slice
    pub fn as_slice(&self) -> &[T] {
        // Safety: the handle owns ptr..ptr+len and FrameElement makes any
        // bit pattern in that range a valid T.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the buffer as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // Safety: as as_slice, plus exclusive ownership through &mut self
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: FrameElement> Deref for FrameBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: FrameElement> DerefMut for FrameBuffer<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T: FrameElement> Drop for FrameBuffer<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: FrameElement> fmt::Debug for FrameBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::FramePool;
    use super::*;

    #[test]
    fn test_default_buffer_is_empty() {
        let pool: FramePool<u8> = FramePool::new();
        let buf = pool.buffer();
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.as_slice(), &[] as &[u8]);
    }

    #[test]
    fn test_assign_slice_round_trip() {
        let pool: FramePool<u8> = FramePool::new();
        let mut buf = pool.buffer();

        for n in 0..64usize {
            let src: Vec<u8> = (0..n as u8).collect();
            buf.assign_from_slice(&src).unwrap();
            assert_eq!(buf.as_slice(), src.as_slice());
        }
    }

    #[test]
    fn test_assign_iterator_round_trip() {
        let pool: FramePool<u16> = FramePool::new();
        let mut buf = pool.buffer();

        buf.assign((0..500u16).map(|x| x * 3)).unwrap();
        assert_eq!(buf.len(), 500);
        assert!(buf.iter().enumerate().all(|(i, &v)| v == i as u16 * 3));
    }

    #[test]
    fn test_assign_releases_previous_region() {
        let pool: FramePool<u8> = FramePool::new();
        let mut buf = pool.buffer();

        buf.assign_from_slice(&[1, 2, 3]).unwrap();
        let old_ptr = buf.as_ptr();
        buf.assign_from_slice(&[9; 8]).unwrap();

        // the three-element region went back to the registry
        let reuse = pool.acquire(3).unwrap();
        assert_eq!(reuse.as_ptr(), old_ptr);
    }

    #[test]
    fn test_resize_small_fills_every_slot() {
        let pool: FramePool<u8> = FramePool::new();
        let mut buf = pool.buffer();

        buf.resize(10, 7).unwrap();
        assert_eq!(buf.len(), 10);
        assert!(buf.iter().all(|&v| v == 7));
    }

    #[test]
    fn test_resize_large_skips_initialization() {
        let pool: FramePool<u8> = FramePool::new();
        let mut buf = pool.buffer();

        // at or above the threshold contents are unspecified; the call must
        // still produce a buffer of the requested length
        buf.resize(2000, 0).unwrap();
        assert_eq!(buf.len(), 2000);

        // writing then reading the full buffer is the supported pattern
        buf.as_mut_slice().fill(0xAB);
        assert!(buf.iter().all(|&v| v == 0xAB));
    }

    #[test]
    fn test_resize_threshold_boundary() {
        let pool: FramePool<u8> = FramePool::new();
        let mut buf = pool.buffer();

        buf.resize(INIT_FILL_THRESHOLD - 1, 5).unwrap();
        assert!(buf.iter().all(|&v| v == 5));

        buf.resize(INIT_FILL_THRESHOLD, 5).unwrap();
        assert_eq!(buf.len(), INIT_FILL_THRESHOLD);
    }

    #[test]
    fn test_take_empties_source() {
        let pool: FramePool<u8> = FramePool::new();
        let mut a = pool.buffer();
        a.assign_from_slice(&[1, 2, 3, 4]).unwrap();

        let b = a.take();
        assert!(a.is_empty());
        assert_eq!(a.len(), 0);
        assert_eq!(b.as_slice(), &[1, 2, 3, 4]);

        // dropping the emptied source must not disturb b's storage
        drop(a);
        assert_eq!(b.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_drop_returns_storage() {
        let pool: FramePool<u8> = FramePool::new();
        {
            let mut buf = pool.buffer();
            buf.resize(100, 1).unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.live_buffers, 0);
        assert_eq!(stats.free_regions, 1);
    }

    #[test]
    fn test_buffer_outlives_pool_value() {
        let pool: FramePool<u8> = FramePool::new();
        let mut buf = pool.buffer();
        buf.assign_from_slice(&[42; 16]).unwrap();

        drop(pool);
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|&v| v == 42));
    }
}
