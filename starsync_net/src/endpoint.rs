// Transport endpoint: lifecycle, worker threads, and the send path.
//
// One `Endpoint` instance plays one of two roles for its whole life:
// - **Hub**: binds a listener, accepts peers, and relays every update it
//   receives to all the other peers.
// - **Peer**: connects out to a hub and receives the updates relayed back.
//
// Thread layout is blocking, thread-per-connection: the hub owns one
// accept-loop thread plus one receive thread per connection; a peer owns a
// single receive thread. Receive threads touch nothing shared beyond the
// connection registry and the task queue — every decoded update is handed
// to the consumer loop as a queued action, and all hub-side stream writes
// go through the registry.
//
// Shutdown is cooperative: the running flag flips first, then sockets are
// shut down to kick any thread out of a blocking read, then the workers are
// joined with a bounded wait. The listener itself is polled non-blocking
// (WouldBlock → short sleep) so the accept loop can watch the flag without
// needing a wake-up connection trick.

use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use starsync_protocol::{PeerId, StateUpdate, decode_update, encode_update, framing};

use crate::error::NetError;
use crate::queue::TaskQueue;
use crate::registry::Registry;

/// Poll interval for the non-blocking accept loop and the bounded join.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long `shutdown` waits for each worker thread before giving up on it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Where an endpoint is in its life. The role is decided by which start
/// call runs; both roles pass through `Starting` to `Running` and end at
/// `Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// Hub start-up parameters.
pub struct HubConfig {
    /// Listen port; 0 lets the OS pick (the bound address is returned).
    pub port: u16,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { port: 7777 }
    }
}

/// Peer start-up parameters.
pub struct PeerConfig {
    /// Hub address, e.g. "127.0.0.1:7777".
    pub addr: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7777".into(),
        }
    }
}

/// Callback applied (on the consumer thread, during `drain`) for every
/// update received from the network.
pub type UpdateHandler = dyn Fn(StateUpdate) + Send + Sync;

/// State shared between the endpoint and its worker threads.
struct Shared {
    phase: Mutex<Phase>,
    running: AtomicBool,
    registry: Registry,
    queue: TaskQueue,
    on_update: Box<UpdateHandler>,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn phase(&self) -> Phase {
        *self.lock_phase()
    }

    fn set_phase(&self, next: Phase) {
        *self.lock_phase() = next;
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().expect("phase lock poisoned")
    }

    /// Queue the consumer-side application of one decoded update.
    fn dispatch(self: &Arc<Self>, update: StateUpdate) {
        let shared = Arc::clone(self);
        self.queue.enqueue(move || (shared.on_update)(update));
    }
}

/// One end of a starsync session — either the hub or a peer.
pub struct Endpoint {
    shared: Arc<Shared>,
    /// The accept thread (hub) or the receive thread (peer).
    workers: Vec<JoinHandle<()>>,
    /// Per-connection receive threads, spawned by the accept loop.
    conn_workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    /// Write half of the hub link (peer role only).
    outbound: Option<TcpStream>,
}

impl Endpoint {
    /// Create an idle endpoint. `on_update` runs on the consumer thread for
    /// every received update once `drain` gets to it — it is the only
    /// coupling between the transport and the entity layer it feeds.
    pub fn new(on_update: impl Fn(StateUpdate) + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                phase: Mutex::new(Phase::Idle),
                running: AtomicBool::new(false),
                registry: Registry::new(),
                queue: TaskQueue::new(),
                on_update: Box::new(on_update),
            }),
            workers: Vec::new(),
            conn_workers: Arc::new(Mutex::new(Vec::new())),
            outbound: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    /// Number of hub-registered connections (always 0 for a peer).
    pub fn peer_count(&self) -> usize {
        self.shared.registry.count()
    }

    /// Run every pending apply action on the calling thread. Invoke once
    /// per tick from the thread that owns entity state.
    pub fn drain(&self) -> usize {
        self.shared.queue.drain()
    }

    /// Bind the listener and launch the accept loop. Returns the bound
    /// address (useful with port 0).
    pub fn start_hub(&mut self, config: &HubConfig) -> Result<SocketAddr, NetError> {
        self.begin_start()?;

        let bound = bind_listener(config.port).and_then(|listener| {
            let addr = listener.local_addr()?;
            Ok((listener, addr))
        });
        let (listener, addr) = match bound {
            Ok(pair) => pair,
            Err(e) => {
                self.shared.set_phase(Phase::Stopped);
                return Err(NetError::Bind(e));
            }
        };

        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let conn_workers = Arc::clone(&self.conn_workers);
        self.workers.push(thread::spawn(move || {
            accept_loop(&listener, &shared, &conn_workers);
        }));

        self.shared.set_phase(Phase::Running);
        info!("hub listening on {addr}");
        Ok(addr)
    }

    /// Connect out to a hub and launch the receive loop. On failure the
    /// endpoint ends up `Stopped`; reconnecting is the caller's business.
    pub fn connect(&mut self, config: &PeerConfig) -> Result<(), NetError> {
        self.begin_start()?;

        let connected = TcpStream::connect(&config.addr)
            .and_then(|stream| Ok((stream.try_clone()?, stream)));
        let (reader, stream) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                self.shared.set_phase(Phase::Stopped);
                return Err(NetError::Connect(e));
            }
        };

        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        self.workers.push(thread::spawn(move || {
            if let Err(e) = peer_receive_loop(BufReader::new(reader), &shared) {
                if shared.is_running() {
                    warn!("hub link: {e}");
                }
            } else {
                debug!("hub link closed");
            }
        }));
        self.outbound = Some(stream);

        self.shared.set_phase(Phase::Running);
        info!("connected to hub at {}", config.addr);
        Ok(())
    }

    /// Encode and transmit one update. Fire-and-forget from the caller's
    /// point of view: before the endpoint is running the update is dropped
    /// with a warning instead of an error, so a realtime loop can call this
    /// unconditionally.
    pub fn send_state(&self, update: &StateUpdate) -> Result<(), NetError> {
        if self.shared.phase() != Phase::Running {
            warn!(
                "dropping update for {}: endpoint not running",
                update.entity_id
            );
            return Ok(());
        }
        let payload = encode_update(update);
        match &self.outbound {
            // Peer: one write to the hub link.
            Some(stream) => {
                framing::write_frame(&mut &*stream, &payload).map_err(NetError::Send)
            }
            // Hub: locally-originated state fans out to every connection.
            None => {
                self.shared.registry.broadcast_except(&payload, None);
                Ok(())
            }
        }
    }

    /// Tear the endpoint down: stop the workers, close every socket, clear
    /// the registry, and join the threads with a bounded wait. Calling it
    /// again — or on an endpoint that never started — is harmless.
    pub fn shutdown(&mut self) {
        {
            let mut phase = self.shared.lock_phase();
            match *phase {
                Phase::ShuttingDown | Phase::Stopped => return,
                Phase::Idle => {
                    *phase = Phase::Stopped;
                    return;
                }
                Phase::Starting | Phase::Running => *phase = Phase::ShuttingDown,
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);

        // Kick the peer link out of its blocking read.
        if let Some(stream) = self.outbound.take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("closing hub link: {e}");
            }
        }
        // Same for every hub-side connection, then forget them all.
        self.shared.registry.close_all();

        // Join the accept (or peer receive) thread first: once it is gone,
        // no new connection can register behind our back.
        for worker in std::mem::take(&mut self.workers) {
            join_with_timeout(worker, JOIN_TIMEOUT);
        }

        // Sweep any connection that slipped in while shutdown was in
        // flight, then collect the per-connection threads.
        self.shared.registry.close_all();
        let conn_workers: Vec<_> = self.lock_conn_workers().drain(..).collect();
        for worker in conn_workers {
            join_with_timeout(worker, JOIN_TIMEOUT);
        }

        self.shared.set_phase(Phase::Stopped);
        info!("endpoint stopped");
    }

    /// Move `Idle → Starting`; reject anything else. An endpoint plays one
    /// role, once — a stopped endpoint stays stopped.
    fn begin_start(&self) -> Result<(), NetError> {
        let mut phase = self.shared.lock_phase();
        if *phase != Phase::Idle {
            return Err(NetError::AlreadyStarted);
        }
        *phase = Phase::Starting;
        Ok(())
    }

    fn lock_conn_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.conn_workers.lock().expect("worker list lock poisoned")
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bind on all interfaces and switch the listener to non-blocking so the
/// accept loop can poll the running flag between attempts.
fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Hub accept loop. Polls the listener until the endpoint stops; every
/// accepted stream gets a registry entry and a receive thread of its own.
fn accept_loop(
    listener: &TcpListener,
    shared: &Arc<Shared>,
    conn_workers: &Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    while shared.is_running() {
        match listener.accept() {
            Ok((stream, addr)) => {
                // The accepted stream inherits non-blocking mode on some
                // platforms; the receive loop needs blocking reads.
                let prepared = stream
                    .set_nonblocking(false)
                    .and_then(|()| stream.try_clone());
                let reader = match prepared {
                    Ok(reader) => reader,
                    Err(e) => {
                        warn!("dropping connection from {addr}: {e}");
                        continue;
                    }
                };

                let peer_id = shared.registry.add(stream);
                info!("{peer_id} connected from {addr}");

                let shared = Arc::clone(shared);
                let handle = thread::spawn(move || {
                    let result = hub_receive_loop(BufReader::new(reader), peer_id, &shared);
                    shared.registry.remove(peer_id);
                    match result {
                        Ok(()) => debug!("{peer_id} disconnected"),
                        Err(e) => {
                            if shared.is_running() {
                                warn!("{peer_id}: {e}");
                            }
                        }
                    }
                });
                let mut conn_workers = conn_workers.lock().expect("worker list lock poisoned");
                // Handles of loops that already ended are dead weight.
                conn_workers.retain(|worker| !worker.is_finished());
                conn_workers.push(handle);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                if shared.is_running() {
                    warn!("hub: {}", NetError::Accept(e));
                }
                // Transient per-connection failures must not take the
                // listener down; back off and keep accepting.
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// Per-connection hub loop: relay each frame to everyone else, then queue
/// the decoded update for the consumer. Returns when the peer closes (`Ok`)
/// or its stream dies (`Err`); the caller unregisters the connection either
/// way.
fn hub_receive_loop(
    mut reader: BufReader<TcpStream>,
    peer_id: PeerId,
    shared: &Arc<Shared>,
) -> Result<(), NetError> {
    while shared.is_running() {
        let frame = match framing::read_frame(&mut reader) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(e) => return Err(NetError::Read(e)),
        };
        match decode_update(&frame) {
            Ok(update) => {
                // Relay the raw bytes verbatim; the sender never hears its
                // own update back.
                shared.registry.broadcast_except(&frame, Some(peer_id));
                shared.dispatch(update);
            }
            Err(e) => {
                // A garbled record is dropped; the connection survives.
                if shared.is_running() {
                    warn!("{peer_id}: {}", NetError::Malformed(e));
                }
            }
        }
    }
    Ok(())
}

/// Peer receive loop: like the hub's, minus the relay step — decoded
/// updates go straight to the task queue.
fn peer_receive_loop(
    mut reader: BufReader<TcpStream>,
    shared: &Arc<Shared>,
) -> Result<(), NetError> {
    while shared.is_running() {
        let frame = match framing::read_frame(&mut reader) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(e) => return Err(NetError::Read(e)),
        };
        match decode_update(&frame) {
            Ok(update) => shared.dispatch(update),
            Err(e) => {
                if shared.is_running() {
                    warn!("hub link: {}", NetError::Malformed(e));
                }
            }
        }
    }
    Ok(())
}

/// Join a worker, giving up (and detaching it) after `timeout`.
fn join_with_timeout(worker: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !worker.is_finished() {
        if Instant::now() >= deadline {
            warn!("worker thread did not stop within {timeout:?}; detaching");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    if worker.join().is_err() {
        warn!("worker thread panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_endpoint_is_idle() {
        let endpoint = Endpoint::new(|_| {});
        assert_eq!(endpoint.phase(), Phase::Idle);
        assert_eq!(endpoint.peer_count(), 0);
    }

    #[test]
    fn send_before_start_is_a_warning_noop() {
        let endpoint = Endpoint::new(|_| {});
        let result = endpoint.send_state(&StateUpdate {
            entity_id: "early".into(),
            x: 1.0,
            y: 2.0,
        });
        assert!(result.is_ok());
        assert_eq!(endpoint.phase(), Phase::Idle);
    }

    #[test]
    fn shutdown_before_start_parks_at_stopped() {
        let mut endpoint = Endpoint::new(|_| {});
        endpoint.shutdown();
        assert_eq!(endpoint.phase(), Phase::Stopped);
        endpoint.shutdown();
        assert_eq!(endpoint.phase(), Phase::Stopped);
    }

    #[test]
    fn start_is_rejected_after_stop() {
        let mut endpoint = Endpoint::new(|_| {});
        endpoint.shutdown();
        let err = endpoint.start_hub(&HubConfig { port: 0 }).unwrap_err();
        assert!(matches!(err, NetError::AlreadyStarted));
    }

    #[test]
    fn drain_applies_dispatched_updates_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let endpoint = Endpoint::new(move |update| sink.lock().unwrap().push(update.entity_id));

        for id in ["a", "b", "c"] {
            endpoint.shared.dispatch(StateUpdate {
                entity_id: id.into(),
                x: 0.0,
                y: 0.0,
            });
        }
        assert_eq!(endpoint.drain(), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }
}
