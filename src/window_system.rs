// SPDX-License-Identifier: GPL-3.0-only

//! Windowing-system session used by the property reader and the direct
//! image source.
//!
//! Everything that talks to the X server goes through the [`WindowSystem`]
//! trait so that sources receive an explicit session handle. [`X11Session`]
//! is the real implementation. It opens its own connection lazily, which also
//! covers hosts running under a Wayland compositor where the toolkit exposes
//! no X connection and a secondary one to Xwayland is needed.

use std::sync::{Arc, Mutex, PoisonError};

use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt as _, ImageFormat};
use x11rb::rust_connection::RustConnection;

use crate::error::SnapshotError;

pub type Atom = u32;

/// Opaque identifier of a top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u32);

impl WindowHandle {
    #[must_use]
    pub fn xid(self) -> u32 {
        self.0
    }
}

impl From<u32> for WindowHandle {
    fn from(xid: u32) -> Self {
        Self(xid)
    }
}

impl From<WindowHandle> for u64 {
    fn from(handle: WindowHandle) -> Self {
        u64::from(handle.0)
    }
}

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Type filter for a property request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Any,
    Atom,
    Cardinal,
}

impl From<PropertyType> for AtomEnum {
    fn from(kind: PropertyType) -> Self {
        match kind {
            PropertyType::Any => AtomEnum::ANY,
            PropertyType::Atom => AtomEnum::ATOM,
            PropertyType::Cardinal => AtomEnum::CARDINAL,
        }
    }
}

/// Owned copy of a window property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyReply {
    /// Actual type atom of the stored value
    pub type_: Atom,
    /// Item size in bits: 8, 16 or 32
    pub format: u8,
    /// Raw items in the connection's byte order
    pub value: Vec<u8>,
}

impl PropertyReply {
    /// Build a format-32 reply from items, as the server would send them.
    #[must_use]
    pub fn from_u32s(type_: Atom, items: &[u32]) -> Self {
        Self {
            type_,
            format: 32,
            value: items.iter().flat_map(|item| item.to_ne_bytes()).collect(),
        }
    }

    /// Items of a format-32 property, or `None` for any other format.
    #[must_use]
    pub fn value32(&self) -> Option<Vec<u32>> {
        if self.format != 32 {
            return None;
        }
        Some(
            self.value
                .chunks_exact(4)
                .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }
}

/// Size of a window as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub width: u16,
    pub height: u16,
    pub depth: u8,
}

/// Pixels returned by a full-plane image transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u16,
    pub height: u16,
    pub depth: u8,
    pub data: Vec<u8>,
}

impl RawImage {
    /// Bytes between the start of consecutive rows.
    #[must_use]
    pub fn bytes_per_line(&self) -> usize {
        if self.height == 0 {
            0
        } else {
            self.data.len() / usize::from(self.height)
        }
    }
}

/// Protocol queries needed to capture a window.
///
/// `Ok(None)` from the lookups means the server does not know the atom or the
/// window has no such property. `Err` is a transport or protocol failure.
pub trait WindowSystem: Send + Sync {
    /// Resolve `name` without creating it.
    fn intern_atom(&self, name: &str) -> Result<Option<Atom>, SnapshotError>;

    /// Read up to `long_length` 32-bit units of `property` from `window`.
    fn get_property(
        &self,
        window: WindowHandle,
        property: Atom,
        kind: PropertyType,
        long_length: u32,
    ) -> Result<Option<PropertyReply>, SnapshotError>;

    fn geometry(&self, window: WindowHandle) -> Result<WindowGeometry, SnapshotError>;

    /// Synchronously transfer the `width` x `height` Z-pixmap of `window`.
    fn get_image(
        &self,
        window: WindowHandle,
        width: u16,
        height: u16,
    ) -> Result<RawImage, SnapshotError>;
}

/// X11 session with a lazily opened connection.
///
/// A connection that fails is dropped so the next query reconnects.
pub struct X11Session {
    display: Option<String>,
    conn: Mutex<Option<Arc<RustConnection>>>,
}

impl X11Session {
    /// Session for `display`, or `$DISPLAY` when `None`. No connection is made
    /// until the first query.
    #[must_use]
    pub fn new(display: Option<String>) -> Self {
        Self {
            display,
            conn: Mutex::new(None),
        }
    }

    /// Whether a connection to the server can be established.
    pub fn is_connected(&self) -> bool {
        self.connection().is_ok()
    }

    fn connection(&self) -> Result<Arc<RustConnection>, SnapshotError> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(conn) = guard.as_ref() {
            return Ok(Arc::clone(conn));
        }

        let (conn, screen) = x11rb::connect(self.display.as_deref())?;
        tracing::debug!(
            display = self.display.as_deref().unwrap_or("$DISPLAY"),
            screen,
            "X11 connection established"
        );
        let conn = Arc::new(conn);
        *guard = Some(Arc::clone(&conn));
        Ok(conn)
    }

    fn with_connection<T>(
        &self,
        query: impl FnOnce(&RustConnection) -> Result<T, SnapshotError>,
    ) -> Result<T, SnapshotError> {
        let conn = self.connection()?;
        let result = query(&conn);
        if matches!(
            result,
            Err(SnapshotError::Connection(_) | SnapshotError::Reply(ReplyError::ConnectionError(_)))
        ) {
            tracing::warn!("X11 connection is broken, reconnecting on next query");
            *self.conn.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
        result
    }
}

impl WindowSystem for X11Session {
    fn intern_atom(&self, name: &str) -> Result<Option<Atom>, SnapshotError> {
        self.with_connection(|conn| {
            let atom = conn.intern_atom(true, name.as_bytes())?.reply()?.atom;
            Ok((atom != u32::from(AtomEnum::NONE)).then_some(atom))
        })
    }

    fn get_property(
        &self,
        window: WindowHandle,
        property: Atom,
        kind: PropertyType,
        long_length: u32,
    ) -> Result<Option<PropertyReply>, SnapshotError> {
        self.with_connection(|conn| {
            let reply = conn
                .get_property(false, window.xid(), property, AtomEnum::from(kind), 0, long_length)?
                .reply()?;
            if reply.type_ == u32::from(AtomEnum::NONE) {
                return Ok(None);
            }
            Ok(Some(PropertyReply {
                type_: reply.type_,
                format: reply.format,
                value: reply.value,
            }))
        })
    }

    fn geometry(&self, window: WindowHandle) -> Result<WindowGeometry, SnapshotError> {
        self.with_connection(|conn| {
            let reply = conn.get_geometry(window.xid())?.reply()?;
            Ok(WindowGeometry {
                width: reply.width,
                height: reply.height,
                depth: reply.depth,
            })
        })
    }

    fn get_image(
        &self,
        window: WindowHandle,
        width: u16,
        height: u16,
    ) -> Result<RawImage, SnapshotError> {
        self.with_connection(|conn| {
            let reply = conn
                .get_image(ImageFormat::Z_PIXMAP, window.xid(), 0, 0, width, height, !0)?
                .reply()?;
            Ok(RawImage {
                width,
                height,
                depth: reply.depth,
                data: reply.data,
            })
        })
    }
}
