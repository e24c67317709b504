// SPDX-License-Identifier: GPL-3.0-only

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use zbus::fdo::DBusProxy;
use zbus::names::BusName;
use zbus::{proxy, Connection};

use super::{CaptureRequest, CaptureResult, SnapshotSource, SourceKind};
use crate::bitmap::Bitmap;
use crate::error::SnapshotError;
use crate::window_system::WindowHandle;

const KWIN_SERVICE: &str = "org.kde.KWin";
const SCREENSHOT_EFFECT: &str = "screenshot";
/// Default D-Bus reply timeout
pub const RPC_TIMEOUT: Duration = Duration::from_secs(25);

#[proxy(
    interface = "org.kde.kwin.Effects",
    default_service = "org.kde.KWin",
    default_path = "/Effects",
    gen_blocking = false
)]
trait KWinEffects {
    /// Whether the named effect is loaded
    #[zbus(name = "isEffectLoaded")]
    fn is_effect_loaded(&self, name: &str) -> zbus::Result<bool>;
}

#[proxy(
    interface = "org.kde.kwin.Screenshot",
    default_service = "org.kde.KWin",
    default_path = "/Screenshot",
    gen_blocking = false
)]
trait KWinScreenshot {
    /// Render `window` scaled to fit `width` x `height` into a temporary file
    /// and return its path
    #[zbus(name = "screenshotForWindowExtend")]
    fn screenshot_for_window_extend(
        &self,
        window: u64,
        width: u32,
        height: u32,
    ) -> zbus::Result<String>;
}

/// A compositor able to render a window into a file.
#[async_trait]
pub trait CompositorService: Send + Sync {
    /// Whether the service is running with its screenshot capability loaded.
    async fn screenshot_available(&self) -> Result<bool, SnapshotError>;

    /// Render `window` no larger than `max_width` x `max_height` and return
    /// the path of the temporary file holding it.
    async fn screenshot_for_window(
        &self,
        window: WindowHandle,
        max_width: u32,
        max_height: u32,
    ) -> Result<PathBuf, SnapshotError>;
}

/// KWin's screenshot effect on the session bus.
pub struct KWinCompositor {
    connection: Option<Connection>,
}

impl KWinCompositor {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    /// Connect to the session bus. Without one the compositor simply reports
    /// itself unavailable.
    pub async fn session() -> Self {
        match Connection::session().await {
            Ok(connection) => Self::new(connection),
            Err(err) => {
                tracing::warn!("session bus unavailable, compositor snapshots disabled: {err}");
                Self { connection: None }
            }
        }
    }
}

#[async_trait]
impl CompositorService for KWinCompositor {
    async fn screenshot_available(&self) -> Result<bool, SnapshotError> {
        let Some(connection) = &self.connection else {
            return Ok(false);
        };

        let name = BusName::try_from(KWIN_SERVICE).map_err(zbus::Error::from)?;
        if !DBusProxy::new(connection).await?.name_has_owner(name).await? {
            return Ok(false);
        }

        let effects = KWinEffectsProxy::new(connection).await?;
        Ok(effects.is_effect_loaded(SCREENSHOT_EFFECT).await?)
    }

    async fn screenshot_for_window(
        &self,
        window: WindowHandle,
        max_width: u32,
        max_height: u32,
    ) -> Result<PathBuf, SnapshotError> {
        let Some(connection) = &self.connection else {
            return Err(SnapshotError::Malformed("no session bus".to_string()));
        };

        let proxy = KWinScreenshotProxy::new(connection).await?;
        let path = proxy
            .screenshot_for_window_extend(window.into(), max_width, max_height)
            .await?;
        Ok(PathBuf::from(path))
    }
}

/// Temporary file written by the compositor, removed on drop.
pub struct TempSnapshotFile {
    path: PathBuf,
}

impl TempSnapshotFile {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempSnapshotFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed compositor snapshot"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "removing compositor snapshot failed: {err}");
            }
        }
    }
}

/// Asks the compositor for an already cropped window image.
pub struct CompositorSource {
    service: Arc<dyn CompositorService>,
    timeout: Duration,
}

impl CompositorSource {
    #[must_use]
    pub fn new(service: Arc<dyn CompositorService>) -> Self {
        Self {
            service,
            timeout: RPC_TIMEOUT,
        }
    }

    /// Give up on a compositor call after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn deadline<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, SnapshotError>>,
    ) -> Result<T, SnapshotError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| SnapshotError::Timeout {
                operation,
                after: self.timeout,
            })?
    }
}

#[async_trait]
impl SnapshotSource for CompositorSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Compositor
    }

    async fn is_available(&self) -> bool {
        matches!(
            self.deadline("isEffectLoaded", self.service.screenshot_available()).await,
            Ok(true)
        )
    }

    async fn acquire(&self, request: &CaptureRequest) -> Result<Option<CaptureResult>, SnapshotError> {
        match self
            .deadline("isEffectLoaded", self.service.screenshot_available())
            .await
        {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(err @ SnapshotError::Timeout { .. }) => return Err(err),
            Err(err) => {
                tracing::debug!("compositor availability check failed: {err}");
                return Ok(None);
            }
        }

        let path = self
            .deadline(
                "screenshotForWindowExtend",
                self.service
                    .screenshot_for_window(request.window, request.max_width, request.max_height),
            )
            .await?;
        let file = TempSnapshotFile::new(path);
        if !file.path().exists() {
            return Err(SnapshotError::Malformed(format!(
                "compositor snapshot {} does not exist",
                file.path().display()
            )));
        }

        let loaded = image::open(file.path());
        drop(file);

        let bitmap = Bitmap::from_rgba(loaded?.to_rgba8());
        if bitmap.bounds().is_empty() {
            return Err(SnapshotError::Malformed("compositor returned an empty image".to_string()));
        }
        Ok(Some(CaptureResult::full(bitmap)))
    }
}
