// Live-connection registry for the hub role.
//
// Every accepted connection is registered here so the relay can fan a frame
// out to everyone except its sender. Receive threads add and remove entries
// while broadcasts iterate, so the map sits behind one coarse mutex that
// covers membership changes and the whole iterate-and-write pass. That
// single lock is what keeps a broadcast from racing a removal; what it
// covers per peer is a few dozen buffered bytes.
//
// A connection is live exactly as long as it is present in the map. A
// failed write is contained: logged, the dead entry pruned in the same
// pass, and delivery continues to the remaining connections.

use std::collections::BTreeMap;
use std::io::{self, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, warn};
use starsync_protocol::{PeerId, framing};

/// One accepted connection's write half. The matching read half lives in
/// that connection's receive thread.
struct Connection {
    writer: BufWriter<TcpStream>,
}

impl Connection {
    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        framing::write_frame(&mut self.writer, payload)
    }

    fn close(&self) {
        if let Err(e) = self.writer.get_ref().shutdown(Shutdown::Both) {
            // Usually the peer hung up first; nothing left to do.
            debug!("closing connection: {e}");
        }
    }
}

/// Thread-safe set of the hub's live connections.
#[derive(Default)]
pub struct Registry {
    connections: Mutex<BTreeMap<PeerId, Connection>>,
    next_id: AtomicU32,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted stream under a fresh id. Ids are never reused.
    pub fn add(&self, stream: TcpStream) -> PeerId {
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(
            id,
            Connection {
                writer: BufWriter::new(stream),
            },
        );
        id
    }

    /// Drop a connection if it is still present, closing its stream.
    /// Removing an id twice — or one already pruned by a failed broadcast —
    /// is a no-op.
    pub fn remove(&self, id: PeerId) {
        if let Some(conn) = self.lock().remove(&id) {
            conn.close();
        }
    }

    /// Write `payload` as one frame to every connection except `skip`.
    /// A failed write is logged and that connection is pruned without
    /// aborting delivery to the rest. Returns the number of successful
    /// deliveries.
    pub fn broadcast_except(&self, payload: &[u8], skip: Option<PeerId>) -> usize {
        let mut connections = self.lock();
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (&id, conn) in connections.iter_mut() {
            if Some(id) == skip {
                continue;
            }
            match conn.send(payload) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("dropping {id} after failed relay write: {e}");
                    dead.push(id);
                }
            }
        }
        for id in dead {
            if let Some(conn) = connections.remove(&id) {
                conn.close();
            }
        }
        delivered
    }

    /// Shut down and forget every connection.
    pub fn close_all(&self) {
        let mut connections = self.lock();
        for (_, conn) in std::mem::take(&mut *connections) {
            conn.close();
        }
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PeerId, Connection>> {
        self.connections.lock().expect("connection registry lock poisoned")
    }
}
