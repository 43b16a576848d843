// Test-only peer for end-to-end relay tests.
//
// Wraps a real `Endpoint` in the peer role together with the minimal
// consumer the transport is designed to feed: an entity store that creates
// or moves one entry per applied update. The only test-specific code is the
// synchronous polling wrappers (bounded loops around `drain()`); everything
// else runs the same code paths a real client would.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use starsync_net::endpoint::{Endpoint, HubConfig, PeerConfig};
use starsync_protocol::StateUpdate;

/// Default timeout for the blocking poll helpers.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Entity positions as applied by the consumer loop: id -> (x, y).
pub type EntityStore = Arc<Mutex<BTreeMap<String, (f32, f32)>>>;

/// Start a hub with a no-op consumer on an OS-assigned port. Returns the
/// endpoint and the localhost address peers should dial.
pub fn start_hub() -> (Endpoint, SocketAddr) {
    let mut hub = Endpoint::new(|_| {});
    let addr = hub
        .start_hub(&HubConfig { port: 0 })
        .expect("hub start failed");
    (hub, SocketAddr::from(([127, 0, 0, 1], addr.port())))
}

/// Block until the hub has registered exactly `n` connections.
pub fn wait_for_peers(hub: &Endpoint, n: usize) {
    let start = Instant::now();
    while hub.peer_count() != n {
        assert!(
            start.elapsed() < POLL_TIMEOUT,
            "timed out waiting for {n} connections (have {})",
            hub.peer_count()
        );
        thread::sleep(POLL_INTERVAL);
    }
}

/// A peer endpoint plus the entity store its apply callback writes to.
pub struct TestPeer {
    pub endpoint: Endpoint,
    pub entities: EntityStore,
    applied: Arc<Mutex<Vec<StateUpdate>>>,
}

impl TestPeer {
    /// Connect a peer to the hub at `addr`. Panics on failure — these are
    /// test fixtures.
    pub fn connect(addr: SocketAddr) -> Self {
        let entities: EntityStore = Arc::default();
        let applied = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&entities);
        let journal = Arc::clone(&applied);
        let mut endpoint = Endpoint::new(move |update: StateUpdate| {
            // Create-or-move: the whole consumer contract for one update.
            store
                .lock()
                .unwrap()
                .insert(update.entity_id.clone(), (update.x, update.y));
            journal.lock().unwrap().push(update);
        });
        endpoint
            .connect(&PeerConfig {
                addr: addr.to_string(),
            })
            .expect("peer connect failed");
        Self {
            endpoint,
            entities,
            applied,
        }
    }

    /// Send one position update for `entity_id`.
    pub fn send(&self, entity_id: &str, x: f32, y: f32) {
        self.endpoint
            .send_state(&StateUpdate {
                entity_id: entity_id.into(),
                x,
                y,
            })
            .expect("send_state failed");
    }

    /// Drain once, as the host's tick would.
    pub fn tick(&self) -> usize {
        self.endpoint.drain()
    }

    /// Tick until `entity_id` shows up in the store, panicking on timeout.
    pub fn wait_for_entity(&self, entity_id: &str) -> (f32, f32) {
        let start = Instant::now();
        loop {
            self.tick();
            if let Some(pos) = self.entities.lock().unwrap().get(entity_id).copied() {
                return pos;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for entity {entity_id}"
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Tick until at least `n` updates have been applied in total.
    pub fn wait_for_applied(&self, n: usize) {
        let start = Instant::now();
        loop {
            self.tick();
            if self.applied.lock().unwrap().len() >= n {
                return;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for {n} applied updates"
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Tick for `window` and return how many updates were applied in it.
    pub fn applied_within(&self, window: Duration) -> usize {
        let before = self.applied.lock().unwrap().len();
        let start = Instant::now();
        while start.elapsed() < window {
            self.tick();
            thread::sleep(POLL_INTERVAL);
        }
        self.applied.lock().unwrap().len() - before
    }

    /// Every update applied so far, in application order.
    pub fn applied(&self) -> Vec<StateUpdate> {
        self.applied.lock().unwrap().clone()
    }
}
