// SPDX-License-Identifier: GPL-3.0-only

//! Host-facing snapshot session.
//!
//! [`SnapshotView`] tracks the window being previewed, whether the desktop
//! is composited and the size of the area the preview is drawn in. Any change
//! to those triggers a fresh capture that replaces the published snapshot.

use std::sync::Arc;

use crate::error::CaptureFailure;
use crate::geometry::DisplayBudget;
use crate::properties;
use crate::settings::SnapshotSettings;
use crate::snapshot::{CaptureResult, SnapshotCapturer};
use crate::window_system::{WindowHandle, WindowSystem};

pub struct SnapshotView {
    capturer: SnapshotCapturer,
    session: Arc<dyn WindowSystem>,
    window: Option<WindowHandle>,
    compositing: bool,
    width: u32,
    height: u32,
    margin: u32,
    device_scale: f64,
    snapshot: Option<CaptureResult>,
}

impl SnapshotView {
    /// View sized from `settings`, with compositing assumed on and no window.
    #[must_use]
    pub fn new(
        capturer: SnapshotCapturer,
        session: Arc<dyn WindowSystem>,
        settings: &SnapshotSettings,
    ) -> Self {
        Self {
            capturer,
            session,
            window: None,
            compositing: true,
            width: settings.budget_width,
            height: settings.budget_height,
            margin: settings.budget_margin,
            device_scale: settings.device_scale,
            snapshot: None,
        }
    }

    #[must_use]
    pub fn window(&self) -> Option<WindowHandle> {
        self.window
    }

    #[must_use]
    pub fn compositing(&self) -> bool {
        self.compositing
    }

    /// The published snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<&CaptureResult> {
        self.snapshot.as_ref()
    }

    #[must_use]
    pub fn budget(&self) -> DisplayBudget {
        DisplayBudget::from_view_size(self.width, self.height, self.margin, self.device_scale)
    }

    /// Where to draw the published bitmap so its content is centred.
    #[must_use]
    pub fn paint_offset(&self) -> Option<(f64, f64)> {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.paint_offset(self.width, self.height, self.device_scale))
    }

    /// Whether the current window is minimized. Always asks the server.
    pub fn is_window_hidden(&self) -> bool {
        self.window
            .is_some_and(|window| properties::window_hidden(self.session.as_ref(), window))
    }

    /// Switch compositing on or off. Turning it off clears the snapshot.
    ///
    /// # Errors
    /// See [`SnapshotView::refresh`].
    pub async fn set_compositing(&mut self, enabled: bool) -> Result<(), CaptureFailure> {
        if self.compositing == enabled {
            return Ok(());
        }
        self.compositing = enabled;
        self.refresh().await
    }

    /// Resize the view and recapture for the new budget.
    ///
    /// # Errors
    /// See [`SnapshotView::refresh`].
    pub async fn resize(
        &mut self,
        width: u32,
        height: u32,
        device_scale: f64,
    ) -> Result<(), CaptureFailure> {
        self.width = width;
        self.height = height;
        self.device_scale = device_scale;
        self.refresh().await
    }

    /// Preview `window` instead of the current one.
    ///
    /// # Errors
    /// See [`SnapshotView::refresh`].
    pub async fn set_window(&mut self, window: WindowHandle) -> Result<(), CaptureFailure> {
        self.window = Some(window);
        self.refresh().await
    }

    /// Capture the current window again and publish the result.
    ///
    /// On failure the previous snapshot is dropped.
    ///
    /// # Errors
    /// Whatever the capture reported, see [`SnapshotCapturer::capture`].
    pub async fn refresh(&mut self) -> Result<(), CaptureFailure> {
        let Some(window) = self.window else {
            self.snapshot = None;
            return Ok(());
        };

        match self
            .capturer
            .capture(window, self.compositing, &self.budget())
            .await
        {
            Ok(snapshot) => {
                if snapshot.is_none() {
                    crate::report_info!("Snapshot Cleared", &format!("compositing off for {window}"));
                }
                self.snapshot = snapshot;
                Ok(())
            }
            Err(err) => {
                self.snapshot = None;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::{Bitmap, PixelFormat};
    use crate::geometry::Rect;
    use crate::properties::{WM_STATE_ATOM, WM_STATE_HIDDEN_ATOM};
    use crate::snapshot::{SnapshotSource, SourceKind};
    use crate::testing::{CountingSource, FakeWindowSystem};

    const WINDOW: WindowHandle = WindowHandle(0x0700_0001);

    fn captured(width: u32, height: u32) -> CaptureResult {
        let data = vec![0xff; width as usize * height as usize * 4];
        let bitmap = Bitmap::from_raw(width, height, width as usize * 4, PixelFormat::Rgb32, data).unwrap();
        CaptureResult::full(bitmap)
    }

    fn view(source: &CountingSource) -> (SnapshotView, Arc<FakeWindowSystem>) {
        let session = Arc::new(FakeWindowSystem::new());
        let capturer = SnapshotCapturer::new(vec![Box::new(source.clone()) as Box<dyn SnapshotSource>]);
        let view = SnapshotView::new(capturer, session.clone(), &SnapshotSettings::default());
        (view, session)
    }

    #[tokio::test]
    async fn setting_window_publishes_snapshot() {
        let source = CountingSource::returning(SourceKind::Direct, captured(368, 228));
        let (mut view, _) = view(&source);

        view.set_window(WINDOW).await.unwrap();

        let snapshot = view.snapshot().unwrap();
        assert_eq!((snapshot.bitmap.width(), snapshot.bitmap.height()), (184, 114));
        assert_eq!(snapshot.source_rect, Rect::new(0, 0, 183, 113));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn disabling_compositing_clears_snapshot() {
        let source = CountingSource::returning(SourceKind::Direct, captured(100, 100));
        let (mut view, _) = view(&source);
        view.set_window(WINDOW).await.unwrap();
        assert!(view.snapshot().is_some());

        view.set_compositing(false).await.unwrap();
        assert!(view.snapshot().is_none());
        assert_eq!(source.calls(), 1);

        // Unchanged flag does not recapture
        view.set_compositing(false).await.unwrap();
        assert_eq!(source.calls(), 1);

        view.set_compositing(true).await.unwrap();
        assert!(view.snapshot().is_some());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn resize_recaptures_for_new_budget() {
        let source = CountingSource::returning(SourceKind::Direct, captured(400, 400));
        let (mut view, _) = view(&source);
        view.set_window(WINDOW).await.unwrap();

        view.resize(116, 116, 2.0).await.unwrap();

        let snapshot = view.snapshot().unwrap();
        assert_eq!((snapshot.bitmap.width(), snapshot.bitmap.height()), (200, 200));
        assert_eq!(source.calls(), 2);
        assert_eq!(view.paint_offset(), Some((8.25, 8.25)));
    }

    #[tokio::test]
    async fn failed_capture_drops_previous_snapshot() {
        let source = CountingSource::empty(SourceKind::Direct);
        let (mut view, _) = view(&source);

        assert_eq!(view.set_window(WINDOW).await, Err(CaptureFailure::Exhausted(WINDOW)));
        assert!(view.snapshot().is_none());
        assert!(view.paint_offset().is_none());
    }

    #[tokio::test]
    async fn refresh_without_window_captures_nothing() {
        let source = CountingSource::returning(SourceKind::Direct, captured(10, 10));
        let (mut view, _) = view(&source);

        view.refresh().await.unwrap();
        assert!(view.snapshot().is_none());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn hidden_state_follows_server() {
        let source = CountingSource::empty(SourceKind::Direct);
        let (mut view, session) = view(&source);
        assert!(!view.is_window_hidden());

        let _ = view.set_window(WINDOW).await;
        let hidden = session.atom(WM_STATE_HIDDEN_ATOM);
        session.set_u32_property(WINDOW, WM_STATE_ATOM, &[hidden]);
        assert!(view.is_window_hidden());

        session.set_u32_property(WINDOW, WM_STATE_ATOM, &[]);
        assert!(!view.is_window_hidden());
    }
}
