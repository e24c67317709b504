// SPDX-License-Identifier: GPL-3.0-only

//! Window snapshots for task-switcher previews
//!
//! This crate captures the current contents of a top-level X11 window and
//! fits it into a preview budget. It tries the KWin screenshot effect first,
//! then images DXCB applications publish in shared memory, and finally a
//! direct `GetImage` transfer from the X server.

pub mod bitmap;
pub mod error;
pub mod error_handling;
pub mod geometry;
pub mod logging;
pub mod properties;
pub mod settings;
pub mod snapshot;
pub mod view;
pub mod window_system;

#[cfg(test)]
mod testing;

// Re-export main types for easier usage
pub use bitmap::{Bitmap, PixelFormat};
pub use error::{CaptureFailure, SnapshotError};
pub use geometry::{DisplayBudget, Rect};
pub use snapshot::{
    CaptureRequest, CaptureResult, HostSignal, SnapshotCapturer, SnapshotSource, SourceKind,
};
pub use view::SnapshotView;
pub use window_system::{WindowHandle, WindowSystem, X11Session};

/// The current version of the window-snapshot library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
