// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;

use super::{CaptureRequest, CaptureResult, SnapshotSource, SourceKind};
use crate::bitmap::{Bitmap, PixelFormat};
use crate::error::SnapshotError;
use crate::properties;
use crate::window_system::{RawImage, WindowSystem};

/// Bytes per pixel of a Z-pixmap at depth 24 or 32.
const BYTES_PER_PIXEL: usize = 4;

/// Captures window pixels with a synchronous X11 `GetImage` of the whole
/// window. Slowest of the sources and tried last.
pub struct DirectSource {
    windows: Arc<dyn WindowSystem>,
}

impl DirectSource {
    #[must_use]
    pub fn new(windows: Arc<dyn WindowSystem>) -> Self {
        Self { windows }
    }
}

/// Take ownership of the transferred pixels as an RGB32 bitmap.
fn into_bitmap(image: RawImage) -> Result<Bitmap, SnapshotError> {
    if image.depth != 24 && image.depth != 32 {
        return Err(SnapshotError::Malformed(format!(
            "unsupported image depth {}",
            image.depth
        )));
    }
    let stride = image.bytes_per_line();
    if stride < usize::from(image.width) * BYTES_PER_PIXEL {
        return Err(SnapshotError::Malformed(format!(
            "{} bytes per line for a {} pixel wide image",
            stride, image.width
        )));
    }
    Bitmap::from_raw(
        u32::from(image.width),
        u32::from(image.height),
        stride,
        PixelFormat::Rgb32,
        image.data,
    )
}

#[async_trait]
impl SnapshotSource for DirectSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Direct
    }

    async fn is_available(&self) -> bool {
        self.windows.intern_atom("WM_NAME").is_ok()
    }

    async fn acquire(&self, request: &CaptureRequest) -> Result<Option<CaptureResult>, SnapshotError> {
        let window = request.window;
        let geometry = self.windows.geometry(window)?;
        if geometry.width == 0 || geometry.height == 0 {
            return Err(SnapshotError::Malformed(format!(
                "window {window} has no area"
            )));
        }

        tracing::debug!(%window, width = geometry.width, height = geometry.height, "transferring window image");
        let image = self.windows.get_image(window, geometry.width, geometry.height)?;
        let bitmap = into_bitmap(image)?;

        let bounds = bitmap.bounds();
        let source_rect = properties::shadow_extents(self.windows.as_ref(), window)
            .and_then(|extents| extents.content_rect(bitmap.width(), bitmap.height()))
            .unwrap_or(bounds);

        CaptureResult::new(bitmap, source_rect).map(Some)
    }
}
