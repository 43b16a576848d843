// State-update record and its JSON codec.
//
// A `StateUpdate` is the only payload peers exchange: an opaque entity
// identifier plus a 2D position. The sending side constructs one immediately
// before each send; the receiving side decodes it into a transient value,
// applies it, and drops it. Nothing is persisted.
//
// `decode_update` must survive arbitrary bytes. Peers are trusted, but a
// truncated or garbled buffer still has to come back as a typed error, never
// as a panic — the receive loops discard bad buffers and keep reading.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One position report for a single entity.
///
/// `entity_id` is chosen by the owning peer, stays fixed for the life of its
/// session, and is the only identity carried on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub entity_id: String,
    pub x: f32,
    pub y: f32,
}

/// Failure to turn received bytes back into a `StateUpdate`: truncated
/// input, non-JSON bytes, a missing field, or a wrong field type.
#[derive(Debug, Error)]
#[error("malformed state update: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Serialize an update to its JSON wire record.
pub fn encode_update(update: &StateUpdate) -> Vec<u8> {
    serde_json::to_vec(update).expect("a state update always serializes")
}

/// Parse a JSON wire record back into a `StateUpdate`.
pub fn decode_update(bytes: &[u8]) -> Result<StateUpdate, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(update: StateUpdate) {
        let bytes = encode_update(&update);
        let recovered = decode_update(&bytes).unwrap();
        assert_eq!(recovered, update);
    }

    #[test]
    fn roundtrip_simple() {
        roundtrip(StateUpdate {
            entity_id: "player-1".into(),
            x: 1.0,
            y: 2.0,
        });
    }

    #[test]
    fn roundtrip_negative_and_fractional() {
        roundtrip(StateUpdate {
            entity_id: "e".into(),
            x: -13.75,
            y: 0.015625,
        });
    }

    #[test]
    fn roundtrip_unicode_entity_id() {
        roundtrip(StateUpdate {
            entity_id: "플레이어-α".into(),
            x: 0.0,
            y: -0.0,
        });
    }

    #[test]
    fn decode_rejects_non_json() {
        assert!(decode_update(b"not json at all").is_err());
    }

    #[test]
    fn decode_rejects_truncated_record() {
        let mut bytes = encode_update(&StateUpdate {
            entity_id: "player-1".into(),
            x: 1.0,
            y: 2.0,
        });
        bytes.truncate(bytes.len() / 2);
        assert!(decode_update(&bytes).is_err());
    }

    #[test]
    fn decode_rejects_missing_field() {
        assert!(decode_update(br#"{"entity_id":"a","x":1.0}"#).is_err());
    }

    #[test]
    fn decode_rejects_wrong_field_type() {
        assert!(decode_update(br#"{"entity_id":"a","x":"east","y":2.0}"#).is_err());
    }

    #[test]
    fn decode_rejects_empty_input() {
        assert!(decode_update(b"").is_err());
    }

    #[test]
    fn decode_error_is_displayable() {
        let err = decode_update(b"{").unwrap_err();
        assert!(err.to_string().starts_with("malformed state update"));
    }
}
