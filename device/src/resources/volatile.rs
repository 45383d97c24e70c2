//! Volatile geometry pools.
//!
//! A volatile pool streams short-lived vertex or index data to the GPU. It
//! hands out consecutive element ranges from one large buffer, appending
//! behind data the GPU may still be reading, and wraps to the start with a
//! discard lock once the next range would not fit.
//!
//! ```text
//!  count=0          lock(40)         lock(40)         lock(40): 80+40 > 100
//!  [..........]     [####......]     [########..]     [####......]
//!                   NoOverwrite 0    NoOverwrite 40   Discard, start 0
//! ```
//!
//! With `buffered_frames > 1` a pool owns one backing buffer per frame in
//! flight and moves to the next one at every [`end_frame`], so a frame never
//! appends into storage the GPU is still drawing from.
//!
//! Pools are keyed by [`BufferShape`]; the device keeps one pool per shape
//! and registers each as a resource so it takes part in context resets.
//!
//! [`end_frame`]: VolatileBuffer::end_frame

use crate::backend::{GpuBackend, GpuBuffer, LockPolicy};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferShape, BufferType, BufferUsage};

use super::{GpuResource, ResourceHandle, ResourceHeader, ResourceKind};

/// Element range granted by [`VolatileBuffer::lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolatileLock {
    /// First locked element.
    pub start: u32,
    /// Last locked element, inclusive.
    pub end: u32,
    /// Policy the backend was asked to lock with.
    pub policy: LockPolicy,
}

impl VolatileLock {
    /// Number of locked elements.
    pub fn count(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// A locked range of a device-owned volatile pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolatileAllocation {
    /// The pool to bind.
    pub buffer: ResourceHandle,
    /// First element of the range; the base vertex or first index of the draw.
    pub start_offset: u32,
    /// Number of elements in the range.
    pub count: u32,
    /// Byte offset of the range inside the pool's current storage.
    pub byte_offset: u64,
    /// Policy the range was locked with.
    pub policy: LockPolicy,
}

/// Lock counters of a volatile pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VolatileStats {
    /// Locks since the last `end_frame`.
    pub frame_locks: u32,
    /// Discard locks since the last `end_frame`.
    pub frame_discards: u32,
    /// Locks since creation.
    pub total_locks: u64,
    /// Discard locks since creation.
    pub total_discards: u64,
}

/// A ring-allocated pool of transient vertex or index storage.
pub struct VolatileBuffer {
    header: ResourceHeader,
    shape: BufferShape,
    descriptor: BufferDescriptor,
    capacity: u32,
    frames: Vec<Option<GpuBuffer>>,
    frame_slot: usize,
    count: u32,
    locked: bool,
    locked_start: u32,
    locked_end: u32,
    stats: VolatileStats,
}

impl VolatileBuffer {
    /// Create a pool of `capacity` elements with one backing buffer per
    /// buffered frame (called by GraphicsDevice).
    pub(crate) fn create(
        backend: &dyn GpuBackend,
        shape: BufferShape,
        capacity: u32,
        buffered_frames: u32,
    ) -> Result<Self, GraphicsError> {
        if capacity == 0 {
            return Err(GraphicsError::InvalidParameter(
                "volatile pool capacity cannot be zero".to_string(),
            ));
        }
        let element_size = shape.element_size();
        if element_size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "volatile pool element size cannot be zero".to_string(),
            ));
        }

        let (usage, label) = match &shape {
            BufferShape::Index => (BufferUsage::INDEX, "volatile_indices".to_string()),
            BufferShape::Vertex(layout) => (
                BufferUsage::VERTEX,
                format!("volatile_vertices_{}", layout.stride),
            ),
        };
        let descriptor = BufferDescriptor::new(
            u64::from(capacity) * element_size,
            usage | BufferUsage::MAP_WRITE | BufferUsage::RING,
        )
        .with_label(label)
        .with_type(BufferType::Volatile);

        let mut pool = Self {
            header: ResourceHeader::default(),
            shape,
            descriptor,
            capacity,
            frames: (0..buffered_frames.max(1)).map(|_| None).collect(),
            frame_slot: 0,
            count: 0,
            locked: false,
            locked_start: 0,
            locked_end: 0,
            stats: VolatileStats::default(),
        };
        pool.rebuild(backend)?;
        Ok(pool)
    }

    /// The shape this pool serves.
    pub fn shape(&self) -> &BufferShape {
        &self.shape
    }

    /// Capacity in elements.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Write cursor: elements handed out in the current wrap epoch.
    ///
    /// Equals the number of elements written, so the next lock starts here
    /// and a wrapped 40-element lock leaves it at 40.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Number of backing buffers.
    pub fn buffered_frames(&self) -> usize {
        self.frames.len()
    }

    /// Index of the backing buffer currently written.
    pub fn frame_slot(&self) -> usize {
        self.frame_slot
    }

    /// Whether a lock is outstanding.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// First element of the outstanding lock, 0 when unlocked.
    pub fn locked_start(&self) -> u32 {
        self.locked_start
    }

    /// Last element of the outstanding lock, 0 when unlocked.
    pub fn locked_end(&self) -> u32 {
        self.locked_end
    }

    /// Lock counters.
    pub fn stats(&self) -> VolatileStats {
        self.stats
    }

    pub(crate) fn native(&self) -> Option<&GpuBuffer> {
        self.frames.get(self.frame_slot).and_then(Option::as_ref)
    }

    /// Lock the next `count_needed` elements.
    ///
    /// Appends behind the write cursor with [`LockPolicy::NoOverwrite`] when
    /// the range fits, otherwise wraps to element 0 and discards the whole
    /// buffer.
    ///
    /// # Panics
    ///
    /// Panics if `count_needed` is zero or larger than the capacity, or if a
    /// lock is already outstanding.
    pub fn lock(
        &mut self,
        backend: &dyn GpuBackend,
        count_needed: u32,
    ) -> Result<VolatileLock, GraphicsError> {
        assert!(count_needed > 0, "volatile lock of zero elements");
        assert!(
            count_needed <= self.capacity,
            "volatile lock of {count_needed} elements exceeds pool capacity {}",
            self.capacity
        );
        assert!(!self.locked, "volatile pool is already locked");

        let native = self.native().ok_or(GraphicsError::DeviceLost)?;
        let element_size = self.shape.element_size();
        let wraps = u64::from(self.count) + u64::from(count_needed) > u64::from(self.capacity);
        let (start, policy) = if wraps {
            (0, LockPolicy::Discard)
        } else {
            (self.count, LockPolicy::NoOverwrite)
        };
        match policy {
            LockPolicy::Discard => backend.lock_buffer(native, 0, native.size(), policy)?,
            LockPolicy::NoOverwrite => backend.lock_buffer(
                native,
                u64::from(start) * element_size,
                u64::from(count_needed) * element_size,
                policy,
            )?,
        }

        self.locked = true;
        self.locked_start = start;
        self.locked_end = start + count_needed - 1;
        self.count = self.locked_end + 1;

        self.stats.frame_locks += 1;
        self.stats.total_locks += 1;
        if wraps {
            self.stats.frame_discards += 1;
            self.stats.total_discards += 1;
            log::trace!(
                "VolatileBuffer: {:?} wrapped (capacity {})",
                self.descriptor.label,
                self.capacity
            );
        }

        Ok(VolatileLock {
            start,
            end: self.locked_end,
            policy,
        })
    }

    /// Copy element bytes into the locked range, starting at its first element.
    ///
    /// # Panics
    ///
    /// Panics if no lock is outstanding or `data` is larger than the locked range.
    pub fn write(&mut self, backend: &dyn GpuBackend, data: &[u8]) -> Result<(), GraphicsError> {
        assert!(self.locked, "volatile write without a lock");
        let element_size = self.shape.element_size();
        let locked_bytes = u64::from(self.locked_end - self.locked_start + 1) * element_size;
        assert!(
            data.len() as u64 <= locked_bytes,
            "volatile write of {} bytes exceeds locked range of {locked_bytes} bytes",
            data.len()
        );
        let native = self.native().ok_or(GraphicsError::DeviceLost)?;
        backend.write_buffer(native, u64::from(self.locked_start) * element_size, data)
    }

    /// Commit the outstanding lock.
    ///
    /// # Panics
    ///
    /// Panics if no lock is outstanding.
    pub fn unlock(&mut self, backend: &dyn GpuBackend) {
        assert!(self.locked, "volatile unlock without a lock");
        if let Some(native) = self.native() {
            backend.unlock_buffer(native);
        }
        self.clear_lock();
    }

    /// Per-frame reset.
    ///
    /// Clears the per-frame counters and, for multi-buffered pools, moves to
    /// the next backing buffer with an empty write cursor.
    ///
    /// # Panics
    ///
    /// Panics if a lock is outstanding.
    pub fn end_frame(&mut self) {
        assert!(!self.locked, "end_frame with an outstanding volatile lock");
        self.stats.frame_locks = 0;
        self.stats.frame_discards = 0;
        if self.frames.len() > 1 {
            self.frame_slot = (self.frame_slot + 1) % self.frames.len();
            self.count = 0;
        }
    }

    fn clear_lock(&mut self) {
        self.locked = false;
        self.locked_start = 0;
        self.locked_end = 0;
    }

    fn reset_cursor(&mut self) {
        self.count = 0;
        self.frame_slot = 0;
        self.clear_lock();
    }
}

impl GpuResource for VolatileBuffer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::VolatileBuffer
    }

    fn header(&self) -> &ResourceHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ResourceHeader {
        &mut self.header
    }

    fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    fn is_valid(&self) -> bool {
        self.frames.iter().all(Option::is_some)
    }

    fn invalidate(&mut self, backend: &dyn GpuBackend) {
        if self.locked {
            log::warn!(
                "VolatileBuffer: {:?} invalidated while locked",
                self.descriptor.label
            );
            if let Some(native) = self.native() {
                backend.unlock_buffer(native);
            }
        }
        for frame in &mut self.frames {
            if let Some(native) = frame.take() {
                backend.destroy_buffer(native);
            }
        }
        self.reset_cursor();
    }

    fn rebuild(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        if self.is_valid() {
            return Ok(());
        }
        for index in 0..self.frames.len() {
            if self.frames[index].is_some() {
                continue;
            }
            match backend.create_buffer(&self.descriptor) {
                Ok(native) => self.frames[index] = Some(native),
                Err(err) => {
                    // leave no partially rebuilt pool behind
                    for frame in &mut self.frames {
                        if let Some(native) = frame.take() {
                            backend.destroy_buffer(native);
                        }
                    }
                    return Err(err);
                }
            }
        }
        self.reset_cursor();
        Ok(())
    }
}

impl std::fmt::Debug for VolatileBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatileBuffer")
            .field("label", &self.descriptor.label)
            .field("capacity", &self.capacity)
            .field("count", &self.count)
            .field("frame_slot", &self.frame_slot)
            .field("locked", &self.locked)
            .finish()
    }
}
