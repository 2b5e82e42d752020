//! Cross-process buffer-pool client manager capability.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

pub type ConnectionId = u64;

/// Shared by every component built through one store.
pub type PoolHandle = Arc<dyn PoolClientManager>;

/// Buffer-pool manager handed to components so they can exchange pooled
/// buffers with a peer instead of copying them.
pub trait PoolClientManager: Send + Sync {
    /// Connection id of this manager's own local pool.
    fn connection_id(&self) -> ConnectionId;

    /// Registers `receiver` as a destination for buffers sent by this
    /// manager and returns the connection to use for transfers.
    fn register_sender(&self, receiver: ConnectionId) -> anyhow::Result<ConnectionId>;

    /// Drops a connection returned by `register_sender`.
    fn close(&self, connection: ConnectionId) -> anyhow::Result<()>;
}

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

fn next_connection() -> ConnectionId {
    NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed)
}

/// Single-process manager: connections are bookkeeping only.
pub struct InProcessPoolManager {
    id: ConnectionId,
    senders: Mutex<HashMap<ConnectionId, ConnectionId>>,
}

impl InProcessPoolManager {
    pub fn new() -> Self {
        Self {
            id: next_connection(),
            senders: Mutex::new(HashMap::new()),
        }
    }

    pub fn connections(&self) -> usize {
        self.senders.lock().len()
    }
}

impl Default for InProcessPoolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolClientManager for InProcessPoolManager {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn register_sender(&self, receiver: ConnectionId) -> anyhow::Result<ConnectionId> {
        if receiver == self.id {
            return Err(anyhow::anyhow!("cannot register a pool as its own receiver"));
        }
        let mut senders = self.senders.lock();
        // one connection per receiver
        if let Some((conn, _)) = senders.iter().find(|(_, r)| **r == receiver) {
            return Ok(*conn);
        }
        let conn = next_connection();
        senders.insert(conn, receiver);
        log::debug!("pool {} connected to {} as {}", self.id, receiver, conn);
        Ok(conn)
    }

    fn close(&self, connection: ConnectionId) -> anyhow::Result<()> {
        self.senders
            .lock()
            .remove(&connection)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("unknown pool connection {}", connection))
    }
}
