// Error taxonomy for the transport layer.
//
// Two delivery channels. Start-up failures (`Bind`, `Connect`,
// `AlreadyStarted`) come back synchronously from the call that started the
// endpoint. Everything scoped to one live connection (`Accept`, `Read`,
// `Send`, `Malformed`) is logged where it happens and never travels further
// than the connection it belongs to — a dead peer quiesces its own loop,
// not the endpoint.

use std::io;

use starsync_protocol::DecodeError;
use thiserror::Error;

/// Errors surfaced by the transport endpoint.
#[derive(Debug, Error)]
pub enum NetError {
    /// The hub could not bind its listening socket.
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    /// The peer could not reach the hub.
    #[error("failed to connect to hub: {0}")]
    Connect(#[source] io::Error),

    /// A start call arrived on an endpoint that already ran one. An
    /// endpoint plays one role, once.
    #[error("endpoint already started")]
    AlreadyStarted,

    /// A received buffer did not parse as a state update. The buffer is
    /// discarded; the connection lives on.
    #[error(transparent)]
    Malformed(#[from] DecodeError),

    /// A write to a connection failed.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// The listener failed to accept a connection. Transient — the accept
    /// loop keeps going.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// A connection's stream died mid-read. Fatal to that connection's
    /// receive loop only.
    #[error("connection read failed: {0}")]
    Read(#[source] io::Error),
}
