// starsync_net — star-topology transport for realtime position sync.
//
// One process runs as the hub; every other participant connects to it as a
// peer. Each peer sends its own entity's position updates to the hub, the
// hub relays every update to all the other peers, and each side applies
// what it receives through a single-threaded consumer loop it drives once
// per tick.
//
// Module overview:
// - `endpoint.rs`: `Endpoint` — lifecycle state machine, accept and receive
//                  threads, and the outbound send path. The type the host
//                  application owns.
// - `registry.rs`: thread-safe map of the hub's live connections;
//                  `broadcast_except` is the relay fan-out.
// - `queue.rs`:    `TaskQueue` — the only bridge between receive threads
//                  and the consumer loop that owns entity state.
// - `error.rs`:    `NetError` — start-up and per-connection failures.
//
// Dependencies: `starsync_protocol` (wire records and framing), `log` for
// the diagnostics channel. No async runtime — blocking sockets and a
// thread per connection keep the concurrency model small enough to reason
// about with two coarse locks (registry, queue).
//
// The crate also ships the standalone `hub` binary (`main.rs`) for running
// the relay outside any game process.

pub mod endpoint;
pub mod error;
pub mod queue;
pub mod registry;

pub use endpoint::{Endpoint, HubConfig, PeerConfig, Phase};
pub use error::NetError;
pub use queue::TaskQueue;
