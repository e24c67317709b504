// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;

use super::{CaptureRequest, CaptureResult, SnapshotSource, SourceKind};
use crate::bitmap::{Bitmap, PixelFormat};
use crate::error::SnapshotError;
use crate::properties::{self, SharedMemoryDescriptor, SHM_INFO_ATOM};
use crate::window_system::{WindowHandle, WindowSystem};

/// A read-only attachment to a shared-memory segment. Dropping it detaches.
pub trait AttachedSegment {
    fn bytes(&self) -> &[u8];
}

/// Access to segments published by other processes.
pub trait SharedMemory: Send + Sync {
    /// Attach segment `shm_id` read-only.
    fn attach(&self, shm_id: i32) -> Result<Box<dyn AttachedSegment>, SnapshotError>;
}

/// System V shared memory through `shmat(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysvSharedMemory;

struct SysvSegment {
    addr: *const libc::c_void,
    len: usize,
}

impl AttachedSegment for SysvSegment {
    fn bytes(&self) -> &[u8] {
        // SAFETY: `addr` is a live read-only attachment of `len` bytes until
        // drop, and the returned slice borrows `self`.
        unsafe { std::slice::from_raw_parts(self.addr.cast::<u8>(), self.len) }
    }
}

impl Drop for SysvSegment {
    fn drop(&mut self) {
        // SAFETY: `addr` came from a successful `shmat` and is detached once.
        if unsafe { libc::shmdt(self.addr) } != 0 {
            tracing::warn!("shmdt failed: {}", std::io::Error::last_os_error());
        }
    }
}

impl SharedMemory for SysvSharedMemory {
    fn attach(&self, shm_id: i32) -> Result<Box<dyn AttachedSegment>, SnapshotError> {
        let attach_error = |source| SnapshotError::Attach { shm_id, source };

        // SAFETY: `shmid_ds` is plain data and IPC_STAT only writes into it.
        let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
        if unsafe { libc::shmctl(shm_id, libc::IPC_STAT, &mut stat) } != 0 {
            return Err(attach_error(std::io::Error::last_os_error()));
        }

        // SAFETY: a null address lets the kernel choose the mapping.
        let addr = unsafe { libc::shmat(shm_id, std::ptr::null(), libc::SHM_RDONLY) };
        if addr as isize == -1 {
            return Err(attach_error(std::io::Error::last_os_error()));
        }

        Ok(Box::new(SysvSegment {
            addr: addr.cast_const(),
            len: stat.shm_segsz as usize,
        }))
    }
}

/// Copies the window image that DXCB applications publish in shared memory.
pub struct SharedMemorySource {
    windows: Arc<dyn WindowSystem>,
    memory: Arc<dyn SharedMemory>,
}

impl SharedMemorySource {
    #[must_use]
    pub fn new(windows: Arc<dyn WindowSystem>, memory: Arc<dyn SharedMemory>) -> Self {
        Self { windows, memory }
    }

    fn copy_segment(
        &self,
        descriptor: &SharedMemoryDescriptor,
    ) -> Result<CaptureResult, SnapshotError> {
        let format = PixelFormat::from_qimage_format(descriptor.format)
            .ok_or(SnapshotError::UnsupportedFormat(descriptor.format))?;
        let len = descriptor.bytes_per_line as usize * descriptor.height as usize;

        let segment = self.memory.attach(descriptor.shm_id)?;
        let pixels = segment.bytes().get(..len).map(<[u8]>::to_vec);
        let available = segment.bytes().len();
        drop(segment);

        let pixels = pixels.ok_or_else(|| {
            SnapshotError::Malformed(format!(
                "segment {} holds {available} bytes, descriptor needs {len}",
                descriptor.shm_id
            ))
        })?;
        let bitmap = Bitmap::from_raw(
            descriptor.width,
            descriptor.height,
            descriptor.bytes_per_line as usize,
            format,
            pixels,
        )?;
        CaptureResult::new(bitmap, descriptor.rect)
    }
}

#[async_trait]
impl SnapshotSource for SharedMemorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::SharedMemory
    }

    async fn is_available(&self) -> bool {
        matches!(self.windows.intern_atom(SHM_INFO_ATOM), Ok(Some(_)))
    }

    async fn acquire(&self, request: &CaptureRequest) -> Result<Option<CaptureResult>, SnapshotError> {
        let window: WindowHandle = request.window;
        let Some(descriptor) = properties::shared_memory_descriptor(self.windows.as_ref(), window)
        else {
            return Ok(None);
        };

        tracing::debug!(%window, shm_id = descriptor.shm_id, "reading window image from shared memory");
        self.copy_segment(&descriptor).map(Some)
    }
}
