//! Persistent input surfaces.
//!
//! A surface outlives the store call that created it: producers queue frames
//! into it and any number of components attach to read them.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::component::ComponentId;

#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceFrame {
    pub timestamp_us: i64,
    pub data: Bytes,
}

#[derive(Clone, Debug)]
enum SurfaceCmd {
    Frame(SurfaceFrame),
    Eof,
}

pub type SurfaceFrameStream = Pin<Box<dyn Stream<Item = SurfaceFrame> + Send>>;

pub trait InputSurface: Send + Sync {
    fn id(&self) -> u64;

    /// Returns how many attached readers will see the frame.
    fn queue_frame(&self, frame: SurfaceFrame) -> anyhow::Result<usize>;

    fn attach(&self, component: ComponentId) -> anyhow::Result<SurfaceFrameStream>;

    fn detach(&self, component: ComponentId) -> anyhow::Result<()>;

    /// Ends every attached stream. Further frames are rejected.
    fn close(&self);
}

/// Builds surfaces for the store.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, cancel: &CancellationToken) -> anyhow::Result<Arc<dyn InputSurface>>;
}

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

pub struct PersistentSurface {
    id: u64,
    sender: tokio::sync::broadcast::Sender<SurfaceCmd>,
    attached: Mutex<HashSet<ComponentId>>,
    closed: AtomicBool,
}

impl PersistentSurface {
    pub fn new(depth: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(depth.max(1));
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            sender,
            attached: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn attached(&self) -> Vec<ComponentId> {
        let mut ids: Vec<ComponentId> = self.attached.lock().iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl InputSurface for PersistentSurface {
    fn id(&self) -> u64 {
        self.id
    }

    fn queue_frame(&self, frame: SurfaceFrame) -> anyhow::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(anyhow::anyhow!("surface {} is closed", self.id));
        }
        // no reader yet is not an error, the frame is just dropped
        Ok(self.sender.send(SurfaceCmd::Frame(frame)).unwrap_or(0))
    }

    fn attach(&self, component: ComponentId) -> anyhow::Result<SurfaceFrameStream> {
        if self.closed.load(Ordering::Acquire) {
            return Err(anyhow::anyhow!("surface {} is closed", self.id));
        }
        if !self.attached.lock().insert(component) {
            return Err(anyhow::anyhow!(
                "component {} already attached to surface {}",
                component,
                self.id
            ));
        }
        let surface_id = self.id;
        let stream = BroadcastStream::new(self.sender.subscribe())
            .take_while(|cmd| futures::future::ready(!matches!(cmd, Ok(SurfaceCmd::Eof))))
            .filter_map(move |cmd| async move {
                match cmd {
                    Ok(SurfaceCmd::Frame(frame)) => Some(frame),
                    Ok(SurfaceCmd::Eof) => None,
                    Err(e) => {
                        log::warn!("surface {} reader fell behind: {}", surface_id, e);
                        None
                    }
                }
            });
        log::debug!("component {} attached to surface {}", component, self.id);
        Ok(Box::pin(stream))
    }

    fn detach(&self, component: ComponentId) -> anyhow::Result<()> {
        if self.attached.lock().remove(&component) {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "component {} is not attached to surface {}",
                component,
                self.id
            ))
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.sender.send(SurfaceCmd::Eof);
        }
    }
}

pub struct PersistentSurfaceFactory {
    depth: usize,
}

impl PersistentSurfaceFactory {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }
}

impl SurfaceFactory for PersistentSurfaceFactory {
    fn create(&self, _cancel: &CancellationToken) -> anyhow::Result<Arc<dyn InputSurface>> {
        Ok(Arc::new(PersistentSurface::new(self.depth)))
    }
}
