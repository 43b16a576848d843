// starsync_protocol — wire format for the starsync position relay.
//
// Defines everything both ends of a relay link agree on: the state-update
// record peers exchange, the length-delimited framing that carries it over
// TCP, and the compact id the hub assigns to accepted connections. No
// networking and no async runtime — framing works over any `Read`/`Write`,
// so the same code path serves live sockets and in-memory test buffers.
//
// Module overview:
// - `update.rs`:  `StateUpdate` (entity id + 2D position), its JSON
//                 encode/decode, and the decode error type.
// - `framing.rs`: 4-byte big-endian length prefix over any `Read`/`Write`.
// - `peer_id.rs`: `PeerId` — hub-assigned connection identifier.
//
// Design decisions:
// - **JSON records.** One self-describing textual record per update keeps
//   the wire inspectable with tcpdump and a pair of eyes; at a handful of
//   updates per peer per second, compactness buys nothing.
// - **Framing is payload-agnostic.** `read_frame`/`write_frame` move raw
//   bytes. The hub relays a received frame verbatim without re-encoding,
//   so the framing layer must not care what is inside.

pub mod framing;
pub mod peer_id;
pub mod update;

pub use framing::{MAX_FRAME_SIZE, read_frame, write_frame};
pub use peer_id::PeerId;
pub use update::{DecodeError, StateUpdate, decode_update, encode_update};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Encode an update, frame it, read it back, decode it.
    fn framed_roundtrip(update: &StateUpdate) {
        let payload = encode_update(update);
        let mut wire = Vec::new();
        write_frame(&mut wire, &payload).unwrap();

        let mut cursor = Cursor::new(&wire);
        let recovered_payload = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(recovered_payload, payload);
        let recovered = decode_update(&recovered_payload).unwrap();
        assert_eq!(&recovered, update);
    }

    #[test]
    fn framed_roundtrip_typical_update() {
        framed_roundtrip(&StateUpdate {
            entity_id: "d6a1f7c2".into(),
            x: 3.5,
            y: -4.25,
        });
    }

    #[test]
    fn framed_roundtrip_origin() {
        framed_roundtrip(&StateUpdate {
            entity_id: "hub-entity".into(),
            x: 0.0,
            y: 0.0,
        });
    }

    #[test]
    fn framed_stream_of_updates_in_order() {
        let updates = [
            StateUpdate {
                entity_id: "a".into(),
                x: 1.0,
                y: 1.0,
            },
            StateUpdate {
                entity_id: "a".into(),
                x: 2.0,
                y: 1.0,
            },
            StateUpdate {
                entity_id: "b".into(),
                x: -1.0,
                y: 0.5,
            },
        ];
        let mut wire = Vec::new();
        for update in &updates {
            write_frame(&mut wire, &encode_update(update)).unwrap();
        }

        let mut cursor = Cursor::new(&wire);
        for expected in &updates {
            let payload = read_frame(&mut cursor).unwrap().unwrap();
            assert_eq!(&decode_update(&payload).unwrap(), expected);
        }
        assert_eq!(read_frame(&mut cursor).unwrap(), None);
    }

    #[test]
    fn well_framed_garbage_still_fails_decode() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"{\"wrong\":\"shape\"}").unwrap();

        let mut cursor = Cursor::new(&wire);
        let payload = read_frame(&mut cursor).unwrap().unwrap();
        assert!(decode_update(&payload).is_err());
    }
}
