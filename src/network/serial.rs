//! Serialization and deserialization of messages sent between nodes.
//!
//! Everything on the wire is JSON with named fields, so nodes built from slightly different
//! versions can still read each other.

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes a message for the wire.
pub fn encode<T: Serialize>(msg: &T) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec(msg).with_context(|| format!("could not serialize {}", short_name::<T>()))
}

/// Deserializes a message from the wire.
///
/// ## Returns
/// An error naming the expected type if `bytes` is not a valid message. Callers propagate it,
/// which ends the receiving task.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(bytes).with_context(|| format!("malformed {} message", short_name::<T>()))
}

fn short_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Call, CallDir, SoldTo, Bid};

    #[test]
    fn decode_reads_what_encode_wrote() {
        let sold = SoldTo { bid: Bid { call: Call::hall(2, CallDir::Up), price: 11, bidder_id: "n2".into() } };
        let back: SoldTo = decode(&encode(&sold).unwrap()).unwrap();
        assert_eq!(back, sold);
    }

    #[test]
    fn malformed_message_names_type() {
        let err = decode::<SoldTo>(b"{\"bid\": 3}").unwrap_err();
        assert!(err.to_string().contains("malformed SoldTo message"));
    }
}
