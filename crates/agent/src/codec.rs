use serde::{de::DeserializeOwned, Serialize};

/// Encode/decode the self-describing text wire format (JSON) used for
/// every bus payload (C2). Malformed frames are logged and discarded —
/// callers get `None`, never an error, so a bad frame never changes
/// state and never propagates past the dispatch loop.
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("payload types are always serializable")
}

pub fn decode<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Option<T> {
    match serde_json::from_slice(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(topic, error = %e, "malformed frame, discarding");
            None
        }
    }
}

/// Whether a directed message's `device_id` matches our own identity.
/// A recipient ignores any directed message addressed to someone else.
pub fn is_for_me(device_id: &loomwright_common::DeviceId, self_id: &loomwright_common::DeviceId) -> bool {
    device_id == self_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomwright_common::types::Command;
    use loomwright_common::DeviceId;

    #[test]
    fn round_trips_through_encode_and_decode() {
        let command = Command {
            device_id: DeviceId::new("A-001"),
            value: "running".to_string(),
        };

        let payload = encode(&command);
        let decoded: Command = decode("loomwright/command", &payload).unwrap();

        assert_eq!(decoded.device_id, command.device_id);
        assert_eq!(decoded.value, command.value);
    }

    #[test]
    fn malformed_payload_decodes_to_none() {
        let decoded: Option<Command> = decode("loomwright/command", b"not json");
        assert!(decoded.is_none());
    }

    #[test]
    fn is_for_me_matches_only_the_same_device() {
        let me = DeviceId::new("A-001");
        let also_me = DeviceId::new("A-001");
        let someone_else = DeviceId::new("B-002");

        assert!(is_for_me(&also_me, &me));
        assert!(!is_for_me(&someone_else, &me));
    }
}
