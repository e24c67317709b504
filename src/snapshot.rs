// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::bitmap::Bitmap;
use crate::error::{CaptureFailure, SnapshotError};
use crate::error_handling::{
    report_error, report_source_failure, report_source_unsupported, ErrorSeverity,
};
use crate::geometry::{plan_rescale, DisplayBudget, Rect};
use crate::settings::SnapshotSettings;
use crate::window_system::{WindowHandle, WindowSystem};

pub mod compositor;
pub mod direct;
pub mod shared_memory;

/// The acquisition strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Compositor,
    SharedMemory,
    Direct,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compositor => write!(f, "KWin screenshot effect"),
            Self::SharedMemory => write!(f, "DXCB shared memory"),
            Self::Direct => write!(f, "X11 GetImage"),
        }
    }
}

/// What a source is asked to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub window: WindowHandle,
    /// Largest output the compositor should render, in physical pixels
    pub max_width: u32,
    pub max_height: u32,
}

impl CaptureRequest {
    #[must_use]
    pub fn new(window: WindowHandle, budget: &DisplayBudget) -> Self {
        let (width, height) = budget.physical_size();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (max_width, max_height) = (width.ceil().max(0.0) as u32, height.ceil().max(0.0) as u32);
        Self {
            window,
            max_width,
            max_height,
        }
    }
}

/// A snapshot ready to paint: the bitmap and the part of it that shows the
/// window's own content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub bitmap: Bitmap,
    pub source_rect: Rect,
}

impl CaptureResult {
    /// Pair `bitmap` with `source_rect`, refusing rectangles that reach
    /// outside the bitmap.
    ///
    /// # Errors
    /// Returns `SnapshotError::Malformed` when `source_rect` is empty or not
    /// contained in the bitmap.
    pub fn new(bitmap: Bitmap, source_rect: Rect) -> Result<Self, SnapshotError> {
        if source_rect.is_empty() || !bitmap.bounds().contains_rect(&source_rect) {
            return Err(SnapshotError::Malformed(format!(
                "content rectangle {source_rect} outside {}x{} bitmap",
                bitmap.width(),
                bitmap.height()
            )));
        }
        Ok(Self {
            bitmap,
            source_rect,
        })
    }

    /// Result whose content is the whole bitmap.
    #[must_use]
    pub fn full(bitmap: Bitmap) -> Self {
        let source_rect = bitmap.bounds();
        Self {
            bitmap,
            source_rect,
        }
    }

    /// Translation, in logical pixels, that centres the content rectangle in a
    /// `view_width` x `view_height` view.
    #[must_use]
    pub fn paint_offset(&self, view_width: u32, view_height: u32, device_scale: f64) -> (f64, f64) {
        let rect = self.source_rect;
        let x = f64::from(view_width) / 2.0
            - f64::from(rect.width) / device_scale / 2.0
            - f64::from(rect.x) / device_scale;
        let y = f64::from(view_height) / 2.0
            - f64::from(rect.height) / device_scale / 2.0
            - f64::from(rect.y) / device_scale;
        (x, y)
    }

    /// Fit into `budget`, resampling the bitmap and mapping the content
    /// rectangle into the new pixel grid.
    #[must_use]
    pub fn rescaled(&self, budget: &DisplayBudget) -> Option<Self> {
        let plan = plan_rescale(
            self.bitmap.width(),
            self.bitmap.height(),
            self.source_rect,
            budget,
        )?;
        Some(Self {
            bitmap: self.bitmap.resample(plan.bitmap_width, plan.bitmap_height),
            source_rect: plan.source_rect,
        })
    }
}

/// Signals sent back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// No source could capture the window; it may have been destroyed.
    RecheckWindow(WindowHandle),
}

/// One acquisition strategy.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Quick check used when listing sources.
    async fn is_available(&self) -> bool;

    /// `Ok(None)` means the source is not offered for this window, `Err` means
    /// it is offered but failed this time.
    async fn acquire(&self, request: &CaptureRequest) -> Result<Option<CaptureResult>, SnapshotError>;

    /// Acquire, logging the reason for any absence.
    async fn try_acquire(&self, request: &CaptureRequest) -> Option<CaptureResult> {
        match self.acquire(request).await {
            Ok(Some(result)) => Some(result),
            Ok(None) => {
                report_source_unsupported(self.kind(), &format!("window {}", request.window));
                None
            }
            Err(err) => {
                report_source_failure(self.kind(), &err.to_string());
                None
            }
        }
    }
}

/// Tries each source in order and publishes the first capture, fitted to the
/// display budget.
pub struct SnapshotCapturer {
    sources: Vec<Box<dyn SnapshotSource>>,
    signals: Option<UnboundedSender<HostSignal>>,
}

impl SnapshotCapturer {
    /// Capturer over `sources`, tried in the given order.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn SnapshotSource>>) -> Self {
        Self {
            sources,
            signals: None,
        }
    }

    /// Capturer for the running desktop: the KWin screenshot effect on the
    /// session bus, then DXCB shared memory, then a direct transfer over
    /// `session`, skipping sources disabled in `settings`.
    pub async fn for_session(settings: &SnapshotSettings, session: Arc<dyn WindowSystem>) -> Self {
        let mut sources: Vec<Box<dyn SnapshotSource>> = Vec::new();

        if settings.use_compositor {
            let service = compositor::KWinCompositor::session().await;
            sources.push(Box::new(compositor::CompositorSource::new(Arc::new(service))));
        }
        if settings.use_shared_memory {
            sources.push(Box::new(shared_memory::SharedMemorySource::new(
                Arc::clone(&session),
                Arc::new(shared_memory::SysvSharedMemory),
            )));
        }
        sources.push(Box::new(direct::DirectSource::new(session)));

        Self::new(sources)
    }

    /// Send [`HostSignal`]s to `sender`.
    #[must_use]
    pub fn with_signals(mut self, sender: UnboundedSender<HostSignal>) -> Self {
        self.signals = Some(sender);
        self
    }

    pub fn source_kinds(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.sources.iter().map(|source| source.kind())
    }

    pub async fn available_sources(&self) -> Vec<SourceKind> {
        let mut available = Vec::new();
        for source in &self.sources {
            if source.is_available().await {
                available.push(source.kind());
            }
        }
        available
    }

    /// Capture `window` for display within `budget`.
    ///
    /// Returns `Ok(None)` without touching any source when compositing is
    /// off, since only a hover highlight is drawn then.
    ///
    /// # Errors
    /// `CaptureFailure::Exhausted` when every source came back empty, after
    /// one [`HostSignal::RecheckWindow`] has been sent.
    /// `CaptureFailure::EmptyBudget` when `budget` has no drawable area.
    pub async fn capture(
        &self,
        window: WindowHandle,
        compositing_enabled: bool,
        budget: &DisplayBudget,
    ) -> Result<Option<CaptureResult>, CaptureFailure> {
        if !compositing_enabled {
            return Ok(None);
        }
        if budget.is_empty() {
            return Err(CaptureFailure::EmptyBudget);
        }

        let request = CaptureRequest::new(window, budget);
        let Some((kind, captured)) = self.acquire(&request).await else {
            report_error(
                ErrorSeverity::Error,
                "Capture Failed",
                &format!("no source could capture window {window}, requesting a re-check"),
            );
            self.signal(HostSignal::RecheckWindow(window));
            return Err(CaptureFailure::Exhausted(window));
        };

        let Some(published) = captured.rescaled(budget) else {
            return Err(CaptureFailure::EmptyBudget);
        };

        tracing::info!(
            %window,
            source = %kind,
            width = published.bitmap.width(),
            height = published.bitmap.height(),
            rect = %published.source_rect,
            "snapshot captured"
        );
        Ok(Some(published))
    }

    async fn acquire(&self, request: &CaptureRequest) -> Option<(SourceKind, CaptureResult)> {
        for source in &self.sources {
            if let Some(result) = source.try_acquire(request).await {
                return Some((source.kind(), result));
            }
        }
        None
    }

    fn signal(&self, signal: HostSignal) {
        if let Some(sender) = &self.signals {
            if sender.send(signal).is_err() {
                tracing::debug!(?signal, "host stopped listening for signals");
            }
        }
    }
}
