// SPDX-License-Identifier: GPL-3.0-only

//! Rectangles, display budgets and the fit-and-rescale arithmetic applied to
//! every published snapshot.

use serde::{Deserialize, Serialize};

/// Integer rectangle in bitmap pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle anchored at the origin covering `width` x `height`.
    #[must_use]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    #[must_use]
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Whether `other` lies entirely inside `self`.
    #[must_use]
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Largest device pixel ratio a budget accepts.
pub const MAX_DEVICE_SCALE: f64 = 8.0;

/// Space the host can spend on a snapshot: logical size plus the device
/// pixel ratio of the output it is shown on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayBudget {
    pub width: u32,
    pub height: u32,
    pub device_scale: f64,
}

impl DisplayBudget {
    #[must_use]
    pub const fn new(width: u32, height: u32, device_scale: f64) -> Self {
        Self {
            width,
            height,
            device_scale,
        }
    }

    /// Budget for a preview view of `width` x `height` logical pixels with
    /// `margin` pixels kept free on every side.
    #[must_use]
    pub fn from_view_size(width: u32, height: u32, margin: u32, device_scale: f64) -> Self {
        Self::new(
            width.saturating_sub(margin.saturating_mul(2)),
            height.saturating_sub(margin.saturating_mul(2)),
            device_scale,
        )
    }

    /// Budget in physical pixels.
    #[must_use]
    pub fn physical_size(&self) -> (f64, f64) {
        (
            f64::from(self.width) * self.device_scale,
            f64::from(self.height) * self.device_scale,
        )
    }

    /// Whether nothing can be drawn: under one physical pixel on either axis,
    /// or a device scale that is not a finite ratio up to [`MAX_DEVICE_SCALE`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        if !(self.device_scale > 0.0 && self.device_scale <= MAX_DEVICE_SCALE) {
            return true;
        }
        let (width, height) = self.physical_size();
        !(width >= 1.0 && height >= 1.0)
    }
}

/// Largest size with the aspect ratio of `width` x `height` that fits inside
/// `max_width` x `max_height`. The limiting dimension touches the bound.
#[must_use]
pub fn fit_size(width: f64, height: f64, max_width: f64, max_height: f64) -> (f64, f64) {
    let scaled_width = max_height * width / height;
    if scaled_width <= max_width {
        (scaled_width, max_height)
    } else {
        (max_width, max_width * height / width)
    }
}

/// Result of fitting a capture into a display budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescale {
    pub bitmap_width: u32,
    pub bitmap_height: u32,
    /// Content rectangle inside the rescaled bitmap.
    pub source_rect: Rect,
}

/// Plan the rescale of a `bitmap_width` x `bitmap_height` capture whose real
/// content is `source_rect`, so that the content fits `budget`.
///
/// Offsets are rounded with a +0.5 bias and the content size loses half a
/// pixel, truncated, so the rectangle never bleeds past the scaled content
/// when used as a clip, but never below one pixel. Returns `None` only when
/// the content rectangle or the budget is empty.
#[must_use]
pub fn plan_rescale(
    bitmap_width: u32,
    bitmap_height: u32,
    source_rect: Rect,
    budget: &DisplayBudget,
) -> Option<Rescale> {
    if source_rect.is_empty() || budget.is_empty() {
        return None;
    }

    let (max_width, max_height) = budget.physical_size();
    let (target_width, target_height) = fit_size(
        f64::from(source_rect.width),
        f64::from(source_rect.height),
        max_width,
        max_height,
    );
    let scale = target_width / f64::from(source_rect.width);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = |value: u32| -> u32 { (f64::from(value) * scale).round().max(1.0) as u32 };
    let bitmap_width = scaled(bitmap_width);
    let bitmap_height = scaled(bitmap_height);

    // Offsets stay inside the bitmap so at least one pixel column and row remain
    let last = |size: u32| i32::try_from(size - 1).unwrap_or(i32::MAX);
    #[allow(clippy::cast_possible_truncation)]
    let offset = |value: i32| -> i32 { (f64::from(value) * scale + 0.5) as i32 };
    let x = offset(source_rect.x).clamp(0, last(bitmap_width));
    let y = offset(source_rect.y).clamp(0, last(bitmap_height));

    // A content edge thinner than the half-pixel trim keeps one pixel
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let trimmed = |value: f64| -> u32 { (value - 0.5).max(1.0) as u32 };
    #[allow(clippy::cast_sign_loss)]
    let width = trimmed(target_width).min(bitmap_width - x as u32);
    #[allow(clippy::cast_sign_loss)]
    let height = trimmed(target_height).min(bitmap_height - y as u32);

    Some(Rescale {
        bitmap_width,
        bitmap_height,
        source_rect,
    })
}
