//! The DRAM tree's value domain: either a handle into the object store or
//! the tombstone sentinel.

/// A small integer handle into [`crate::router::object_store::DramObjectStore`].
///
/// Replaces a pointer-in-value hack: the tree stores this handle, and the
/// side store owns the actual payload bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(pub u64);

/// Sentinel raw encoding for [`Value::Tombstone`] in the fixed-width i64
/// storage domain shared with the hashed/compressed leaf layout.
const TOMBSTONE_RAW: i64 = -1;

/// Either a live handle or the tombstone sentinel meaning "any previous
/// mapping for this key is invalid; continue searching later tiers."
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Value {
    /// A live object is cached under this handle.
    Live(Handle),
    /// The key was last written as a large object; later tiers decide.
    Tombstone,
}

impl Value {
    /// Encodes to the fixed-width `i64` domain the base tree and hashed
    /// leaf layout actually store.
    #[must_use]
    pub fn to_raw(self) -> i64 {
        match self {
            Value::Live(Handle(h)) => {
                debug_assert!(h <= i64::MAX as u64, "handle does not fit in i64 domain");
                #[allow(clippy::cast_possible_wrap)]
                let raw = h as i64;
                raw
            }
            Value::Tombstone => TOMBSTONE_RAW,
        }
    }

    /// Decodes a raw `i64` back into a [`Value`].
    #[must_use]
    pub fn from_raw(raw: i64) -> Value {
        if raw == TOMBSTONE_RAW {
            Value::Tombstone
        } else {
            #[allow(clippy::cast_sign_loss)]
            Value::Live(Handle(raw as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_round_trips() {
        let v = Value::Live(Handle(42));
        assert_eq!(Value::from_raw(v.to_raw()), v);
    }

    #[test]
    fn tombstone_round_trips() {
        assert_eq!(Value::from_raw(Value::Tombstone.to_raw()), Value::Tombstone);
    }
}
