// SPDX-License-Identifier: GPL-3.0-only

use std::io;
use std::time::Duration;

use crate::window_system::WindowHandle;

/// Errors raised by the windowing, shared-memory and compositor backends.
///
/// Snapshot sources never hand these to the host; they log them and report
/// absence so the next source can be tried.
#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("X11 connection unavailable: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),
    #[error("X11 connection error: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),
    #[error("X11 reply error: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),
    #[error("DBus error: {0}")]
    DBus(#[from] zbus::Error),
    #[error("DBus method error: {0}")]
    DBusMethod(#[from] zbus::fdo::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Shared memory segment {shm_id} could not be attached: {source}")]
    Attach { shm_id: i32, source: io::Error },
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("Unsupported pixel format {0}")]
    UnsupportedFormat(u32),
    #[error("Malformed data: {0}")]
    Malformed(String),
}

/// Why the orchestrator published nothing for a composited window.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFailure {
    /// Every source declined or failed; the window may have been destroyed.
    #[error("no snapshot source could capture window {0}")]
    Exhausted(WindowHandle),
    /// The display budget has no area left to draw into.
    #[error("display budget is empty")]
    EmptyBudget,
}
