// SPDX-License-Identifier: GPL-3.0-only

//! In-memory stand-ins for the window system, shared memory and the
//! compositor, plus a scripted source for orchestrator tests.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use x11rb::errors::ConnectionError;

use crate::error::SnapshotError;
use crate::snapshot::compositor::CompositorService;
use crate::snapshot::shared_memory::{AttachedSegment, SharedMemory};
use crate::snapshot::{CaptureRequest, CaptureResult, SnapshotSource, SourceKind};
use crate::window_system::{
    Atom, PropertyReply, PropertyType, RawImage, WindowGeometry, WindowHandle, WindowSystem,
};

const CARDINAL: Atom = 6;
const FIRST_ATOM: Atom = 300;

fn broken() -> SnapshotError {
    SnapshotError::Connection(ConnectionError::UnknownError)
}

/// Window system whose atoms, properties and windows are set up by the test.
/// Atoms only exist once a test mentions them.
#[derive(Default)]
pub struct FakeWindowSystem {
    atoms: Mutex<HashMap<String, Atom>>,
    properties: Mutex<HashMap<(WindowHandle, Atom), PropertyReply>>,
    windows: Mutex<HashMap<WindowHandle, (u16, u16)>>,
    broken: AtomicBool,
    image_fails: AtomicBool,
    property_reads: AtomicUsize,
    image_requests: AtomicUsize,
}

impl FakeWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, creating it if needed.
    pub fn atom(&self, name: &str) -> Atom {
        let mut atoms = self.atoms.lock().unwrap();
        let next = FIRST_ATOM + atoms.len() as Atom;
        *atoms.entry(name.to_string()).or_insert(next)
    }

    pub fn set_u32_property(&self, window: WindowHandle, name: &str, items: &[u32]) {
        let atom = self.atom(name);
        self.properties
            .lock()
            .unwrap()
            .insert((window, atom), PropertyReply::from_u32s(CARDINAL, items));
    }

    pub fn set_window(&self, window: WindowHandle, width: u16, height: u16) {
        self.windows.lock().unwrap().insert(window, (width, height));
    }

    /// Make every query fail as if the connection dropped.
    pub fn fail_connection(&self, fail: bool) {
        self.broken.store(fail, Ordering::SeqCst);
    }

    pub fn fail_image(&self, fail: bool) {
        self.image_fails.store(fail, Ordering::SeqCst);
    }

    pub fn property_reads(&self) -> usize {
        self.property_reads.load(Ordering::SeqCst)
    }

    pub fn image_requests(&self) -> usize {
        self.image_requests.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), SnapshotError> {
        if self.broken.load(Ordering::SeqCst) {
            Err(broken())
        } else {
            Ok(())
        }
    }
}

impl WindowSystem for FakeWindowSystem {
    fn intern_atom(&self, name: &str) -> Result<Option<Atom>, SnapshotError> {
        self.check()?;
        Ok(self.atoms.lock().unwrap().get(name).copied())
    }

    fn get_property(
        &self,
        window: WindowHandle,
        property: Atom,
        _kind: PropertyType,
        long_length: u32,
    ) -> Result<Option<PropertyReply>, SnapshotError> {
        self.check()?;
        self.property_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .properties
            .lock()
            .unwrap()
            .get(&(window, property))
            .map(|reply| {
                let mut reply = reply.clone();
                reply.value.truncate(long_length as usize * 4);
                reply
            }))
    }

    fn geometry(&self, window: WindowHandle) -> Result<WindowGeometry, SnapshotError> {
        self.check()?;
        let (width, height) = self
            .windows
            .lock()
            .unwrap()
            .get(&window)
            .copied()
            .ok_or_else(|| SnapshotError::Malformed(format!("bad window {window}")))?;
        Ok(WindowGeometry {
            width,
            height,
            depth: 24,
        })
    }

    fn get_image(
        &self,
        window: WindowHandle,
        width: u16,
        height: u16,
    ) -> Result<RawImage, SnapshotError> {
        self.check()?;
        self.image_requests.fetch_add(1, Ordering::SeqCst);
        if self.image_fails.load(Ordering::SeqCst) {
            return Err(SnapshotError::Malformed(format!("no image for {window}")));
        }
        Ok(RawImage {
            width,
            height,
            depth: 24,
            data: vec![0x80; usize::from(width) * usize::from(height) * 4],
        })
    }
}

/// Shared memory backed by test-provided byte vectors, counting attaches and
/// detaches.
#[derive(Default)]
pub struct FakeSharedMemory {
    segments: Mutex<HashMap<i32, Vec<u8>>>,
    attaches: AtomicUsize,
    detaches: Arc<AtomicUsize>,
}

struct FakeSegment {
    bytes: Vec<u8>,
    detaches: Arc<AtomicUsize>,
}

impl AttachedSegment for FakeSegment {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for FakeSegment {
    fn drop(&mut self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

impl FakeSharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, shm_id: i32, bytes: Vec<u8>) {
        self.segments.lock().unwrap().insert(shm_id, bytes);
    }

    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }
}

impl SharedMemory for FakeSharedMemory {
    fn attach(&self, shm_id: i32) -> Result<Box<dyn AttachedSegment>, SnapshotError> {
        let bytes = self
            .segments
            .lock()
            .unwrap()
            .get(&shm_id)
            .cloned()
            .ok_or_else(|| SnapshotError::Attach {
                shm_id,
                source: io::Error::from(io::ErrorKind::InvalidInput),
            })?;
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSegment {
            bytes,
            detaches: Arc::clone(&self.detaches),
        }))
    }
}

/// What [`FakeCompositor`] answers to a screenshot request.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Path(PathBuf),
    Error,
    /// Never answers
    Stall,
}

/// How [`FakeCompositor`] answers the availability check.
#[derive(Debug, Clone, Copy)]
pub enum FakeAvailability {
    Available,
    Unavailable,
    Fails,
    Stalls,
}

pub struct FakeCompositor {
    availability: FakeAvailability,
    reply: FakeReply,
    requests: Mutex<Vec<(WindowHandle, u32, u32)>>,
}

impl FakeCompositor {
    pub fn new(reply: FakeReply) -> Self {
        Self {
            availability: FakeAvailability::Available,
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(FakeReply::Error).with_availability(FakeAvailability::Unavailable)
    }

    pub fn with_availability(mut self, availability: FakeAvailability) -> Self {
        self.availability = availability;
        self
    }

    pub fn requests(&self) -> Vec<(WindowHandle, u32, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompositorService for FakeCompositor {
    async fn screenshot_available(&self) -> Result<bool, SnapshotError> {
        match self.availability {
            FakeAvailability::Available => Ok(true),
            FakeAvailability::Unavailable => Ok(false),
            FakeAvailability::Fails => Err(SnapshotError::DBus(zbus::Error::Failure(
                "name has no owner".to_string(),
            ))),
            FakeAvailability::Stalls => std::future::pending().await,
        }
    }

    async fn screenshot_for_window(
        &self,
        window: WindowHandle,
        max_width: u32,
        max_height: u32,
    ) -> Result<PathBuf, SnapshotError> {
        self.requests
            .lock()
            .unwrap()
            .push((window, max_width, max_height));
        match &self.reply {
            FakeReply::Path(path) => Ok(path.clone()),
            FakeReply::Error => Err(SnapshotError::DBus(zbus::Error::Failure(
                "screenshot effect refused".to_string(),
            ))),
            FakeReply::Stall => std::future::pending().await,
        }
    }
}

#[derive(Clone)]
enum Outcome {
    Empty,
    Failing,
    Returning(CaptureResult),
}

/// Source with a scripted outcome. Clones share the call counter.
#[derive(Clone)]
pub struct CountingSource {
    kind: SourceKind,
    outcome: Outcome,
    calls: Arc<AtomicUsize>,
}

impl CountingSource {
    fn with(kind: SourceKind, outcome: Outcome) -> Self {
        Self {
            kind,
            outcome,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn empty(kind: SourceKind) -> Self {
        Self::with(kind, Outcome::Empty)
    }

    pub fn failing(kind: SourceKind) -> Self {
        Self::with(kind, Outcome::Failing)
    }

    pub fn returning(kind: SourceKind, result: CaptureResult) -> Self {
        Self::with(kind, Outcome::Returning(result))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for CountingSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn is_available(&self) -> bool {
        !matches!(self.outcome, Outcome::Failing)
    }

    async fn acquire(&self, _request: &CaptureRequest) -> Result<Option<CaptureResult>, SnapshotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Outcome::Empty => Ok(None),
            Outcome::Failing => Err(SnapshotError::Malformed("scripted failure".to_string())),
            Outcome::Returning(result) => Ok(Some(result.clone())),
        }
    }
}
