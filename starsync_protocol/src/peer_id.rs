// Hub-assigned connection identifier.
//
// The hub tags every accepted connection with a compact id so the relay can
// exclude the sender when fanning a frame back out. Ids are registry-scoped
// bookkeeping: they never appear on the wire and are unrelated to the
// `entity_id` strings inside state updates.

use std::fmt;

/// Compact identifier for one accepted connection. Unique for the lifetime
/// of a hub; never reused after the connection goes away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_form() {
        assert_eq!(PeerId(7).to_string(), "peer#7");
    }

    #[test]
    fn ordering_follows_the_counter() {
        assert!(PeerId(0) < PeerId(1));
        assert!(PeerId(1) < PeerId(100));
    }
}
