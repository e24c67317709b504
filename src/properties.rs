// SPDX-License-Identifier: GPL-3.0-only

//! Typed readers for the window-manager properties snapshot capture relies on.
//!
//! Missing atoms and missing properties are the normal "not supported" case
//! and read as `None`. Transport failures are logged as warnings here and also
//! read as `None`, so callers can simply move on.

use crate::geometry::Rect;
use crate::window_system::{PropertyReply, PropertyType, WindowHandle, WindowSystem};

/// Shared-memory image descriptor published by DXCB applications.
pub const SHM_INFO_ATOM: &str = "_DEEPIN_DXCB_SHM_INFO";
/// Client-side decoration margins published by GTK.
pub const FRAME_EXTENTS_ATOM: &str = "_GTK_FRAME_EXTENTS";
pub const WM_STATE_ATOM: &str = "_NET_WM_STATE";
pub const WM_STATE_HIDDEN_ATOM: &str = "_NET_WM_STATE_HIDDEN";

/// Nine items, read with a generous cap.
const SHM_INFO_LENGTH: u32 = 32 * 9;
const SHM_INFO_ITEMS: usize = 9;
const FRAME_EXTENTS_ITEMS: u32 = 4;
const WM_STATE_LENGTH: u32 = 1024;

/// Read `name` from `window`.
///
/// Returns `None` when the atom is unknown to the server, the window lacks
/// the property, or the query failed.
pub fn read_property(
    session: &dyn WindowSystem,
    window: WindowHandle,
    name: &str,
    kind: PropertyType,
    long_length: u32,
) -> Option<PropertyReply> {
    let atom = match session.intern_atom(name) {
        Ok(Some(atom)) => atom,
        Ok(None) => {
            tracing::debug!(property = name, "atom not known to the server");
            return None;
        }
        Err(err) => {
            tracing::warn!(property = name, %window, "resolving atom failed: {err}");
            return None;
        }
    };

    match session.get_property(window, atom, kind, long_length) {
        Ok(reply) => reply,
        Err(err) => {
            tracing::warn!(property = name, %window, "reading property failed: {err}");
            None
        }
    }
}

/// Description of a window image published in a SysV shared-memory segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedMemoryDescriptor {
    pub shm_id: i32,
    pub width: u32,
    pub height: u32,
    pub bytes_per_line: u32,
    /// `QImage::Format` number of the buffer
    pub format: u32,
    /// Window content inside the buffer, excluding decoration and shadow
    pub rect: Rect,
}

impl SharedMemoryDescriptor {
    /// Decode the nine 32-bit items of the descriptor property.
    ///
    /// Anything other than a format-32 property with at least nine items, or
    /// a descriptor with negative sizes, is rejected.
    #[must_use]
    pub fn parse(reply: &PropertyReply) -> Option<Self> {
        let items = reply.value32()?;
        if items.len() < SHM_INFO_ITEMS {
            return None;
        }

        // Items are C longs truncated to 32 bits on the wire.
        #[allow(clippy::cast_possible_wrap)]
        let signed = |index: usize| items[index] as i32;
        let unsigned = |index: usize| u32::try_from(signed(index)).ok();

        Some(Self {
            shm_id: signed(0),
            width: unsigned(1)?,
            height: unsigned(2)?,
            bytes_per_line: unsigned(3)?,
            format: unsigned(4)?,
            rect: Rect::new(signed(5), signed(6), unsigned(7)?, unsigned(8)?),
        })
    }
}

/// Read the shared-memory descriptor of `window`.
pub fn shared_memory_descriptor(
    session: &dyn WindowSystem,
    window: WindowHandle,
) -> Option<SharedMemoryDescriptor> {
    let reply = read_property(session, window, SHM_INFO_ATOM, PropertyType::Any, SHM_INFO_LENGTH)?;
    let descriptor = SharedMemoryDescriptor::parse(&reply);
    if descriptor.is_none() {
        tracing::debug!(%window, "ignoring malformed {SHM_INFO_ATOM}");
    }
    descriptor
}

/// Shadow margins drawn around a window's real content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowExtents {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl ShadowExtents {
    /// Decode `left, right, top, bottom` from a format-32 property.
    #[must_use]
    pub fn parse(reply: &PropertyReply) -> Option<Self> {
        match reply.value32()?.as_slice() {
            [left, right, top, bottom] => Some(Self {
                left: *left,
                right: *right,
                top: *top,
                bottom: *bottom,
            }),
            _ => None,
        }
    }

    /// Content rectangle of a `width` x `height` capture, or `None` when the
    /// margins leave nothing.
    #[must_use]
    pub fn content_rect(&self, width: u32, height: u32) -> Option<Rect> {
        let horizontal = self.left.checked_add(self.right)?;
        let vertical = self.top.checked_add(self.bottom)?;
        if horizontal >= width || vertical >= height {
            return None;
        }
        Some(Rect::new(
            i32::try_from(self.left).ok()?,
            i32::try_from(self.top).ok()?,
            width - horizontal,
            height - vertical,
        ))
    }
}

/// Read the shadow extents of `window`. `None` means no margins are known.
pub fn shadow_extents(session: &dyn WindowSystem, window: WindowHandle) -> Option<ShadowExtents> {
    let reply = read_property(
        session,
        window,
        FRAME_EXTENTS_ATOM,
        PropertyType::Cardinal,
        FRAME_EXTENTS_ITEMS,
    )?;
    let extents = ShadowExtents::parse(&reply);
    if extents.is_none() {
        tracing::debug!(%window, "ignoring malformed {FRAME_EXTENTS_ATOM}");
    }
    extents
}

/// Whether `window` is hidden (minimized) according to its EWMH state.
///
/// Computed from the server on every call.
pub fn window_hidden(session: &dyn WindowSystem, window: WindowHandle) -> bool {
    let hidden = match session.intern_atom(WM_STATE_HIDDEN_ATOM) {
        Ok(Some(atom)) => atom,
        Ok(None) => return false,
        Err(err) => {
            tracing::warn!(%window, "resolving {WM_STATE_HIDDEN_ATOM} failed: {err}");
            return false;
        }
    };

    read_property(session, window, WM_STATE_ATOM, PropertyType::Atom, WM_STATE_LENGTH)
        .and_then(|reply| reply.value32())
        .is_some_and(|states| states.contains(&hidden))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeWindowSystem;

    const WINDOW: WindowHandle = WindowHandle(0x0400_0001);

    #[test]
    fn descriptor_decodes_nine_items() {
        let reply = PropertyReply::from_u32s(6, &[77, 200, 160, 800, 4, 4, 4, 100, 80]);
        let descriptor = SharedMemoryDescriptor::parse(&reply).unwrap();

        assert_eq!(descriptor.shm_id, 77);
        assert_eq!((descriptor.width, descriptor.height), (200, 160));
        assert_eq!(descriptor.bytes_per_line, 800);
        assert_eq!(descriptor.format, 4);
        assert_eq!(descriptor.rect, Rect::new(4, 4, 100, 80));
    }

    #[test]
    fn descriptor_rejects_short_or_negative_data() {
        let short = PropertyReply::from_u32s(6, &[77, 200, 160, 800, 4]);
        assert!(SharedMemoryDescriptor::parse(&short).is_none());

        let negative = PropertyReply::from_u32s(6, &[77, u32::MAX, 160, 800, 4, 0, 0, 1, 1]);
        assert!(SharedMemoryDescriptor::parse(&negative).is_none());

        let bytes = PropertyReply {
            type_: 31,
            format: 8,
            value: vec![0; 36],
        };
        assert!(SharedMemoryDescriptor::parse(&bytes).is_none());
    }

    #[test]
    fn extents_trim_capture() {
        let extents = ShadowExtents {
            left: 10,
            right: 10,
            top: 5,
            bottom: 15,
        };
        assert_eq!(extents.content_rect(300, 200), Some(Rect::new(10, 5, 280, 180)));
        assert_eq!(extents.content_rect(20, 200), None);
        assert_eq!(ShadowExtents::default().content_rect(3, 4), Some(Rect::from_size(3, 4)));
    }

    #[test]
    fn extents_need_exactly_four_items() {
        assert!(ShadowExtents::parse(&PropertyReply::from_u32s(6, &[1, 2, 3])).is_none());
        assert!(ShadowExtents::parse(&PropertyReply::from_u32s(6, &[1, 2, 3, 4, 5])).is_none());
        assert_eq!(
            ShadowExtents::parse(&PropertyReply::from_u32s(6, &[1, 2, 3, 4])),
            Some(ShadowExtents {
                left: 1,
                right: 2,
                top: 3,
                bottom: 4
            })
        );
    }

    #[test]
    fn unknown_atom_reads_as_absent() {
        let session = FakeWindowSystem::new();
        assert!(read_property(&session, WINDOW, SHM_INFO_ATOM, PropertyType::Any, 9).is_none());
        assert_eq!(session.property_reads(), 0);
    }

    #[test]
    fn broken_connection_reads_as_absent() {
        let session = FakeWindowSystem::new();
        session.set_u32_property(WINDOW, FRAME_EXTENTS_ATOM, &[1, 1, 1, 1]);
        session.fail_connection(true);

        assert!(shadow_extents(&session, WINDOW).is_none());
        assert!(!window_hidden(&session, WINDOW));
    }

    #[test]
    fn hidden_state_is_found_in_state_list() {
        let session = FakeWindowSystem::new();
        let hidden = session.atom(WM_STATE_HIDDEN_ATOM);
        let above = session.atom("_NET_WM_STATE_ABOVE");

        session.set_u32_property(WINDOW, WM_STATE_ATOM, &[above]);
        assert!(!window_hidden(&session, WINDOW));

        session.set_u32_property(WINDOW, WM_STATE_ATOM, &[above, hidden]);
        assert!(window_hidden(&session, WINDOW));
    }

    #[test]
    fn hidden_state_without_property_is_visible() {
        let session = FakeWindowSystem::new();
        session.atom(WM_STATE_HIDDEN_ATOM);
        session.atom(WM_STATE_ATOM);
        assert!(!window_hidden(&session, WINDOW));
    }
}
