//! Status recovery: one XOR keystream byte for broadcasts, plaintext for notifications

use std::fmt;

use crate::keys::SessionKey;

/// Status reported by a sensor, available only after authenticity and
/// freshness checks have passed
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum DecodedStatus {
    Free,
    Occupied,
    /// Reserved byte value from a newer sensor firmware
    Unknown(u8),
    /// Text notification payload that is not a known status word
    Text(String),
}

impl DecodedStatus {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0 => Self::Occupied,
            1 => Self::Free,
            other => Self::Unknown(other),
        }
    }

    pub fn from_text(payload: &str) -> Self {
        match payload.trim().to_ascii_lowercase().as_str() {
            "free" | "libre" => Self::Free,
            "occupied" | "ocupado" => Self::Occupied,
            _ => Self::Text(payload.to_string()),
        }
    }
}

impl fmt::Display for DecodedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => f.write_str("free"),
            Self::Occupied => f.write_str("occupied"),
            Self::Unknown(value) => write!(f, "unknown({value:#04x})"),
            Self::Text(text) => write!(f, "text({text:?})"),
        }
    }
}

/// `encrypted ^ session_key[0]`. Safe only because a session key is never
/// reused across counters.
pub fn unwrap_status(encrypted: u8, key: &SessionKey) -> u8 {
    encrypted ^ key.keystream_byte()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{MasterKey, derive_session_key};

    #[test]
    fn round_trips_both_status_values() {
        let master = MasterKey::from_bytes([0x11; 32]);
        for counter in [0, 1, 10, 65_535, u32::MAX] {
            let key = derive_session_key(&master, counter);
            for plain in [0u8, 1] {
                let wrapped = plain ^ key.keystream_byte();
                assert_eq!(unwrap_status(wrapped, &key), plain, "counter {counter}");
            }
        }
    }

    #[test]
    fn maps_byte_values() {
        assert_eq!(DecodedStatus::from_byte(0), DecodedStatus::Occupied);
        assert_eq!(DecodedStatus::from_byte(1), DecodedStatus::Free);
        assert_eq!(DecodedStatus::from_byte(7), DecodedStatus::Unknown(7));
        assert_eq!(DecodedStatus::from_byte(7).to_string(), "unknown(0x07)");
    }

    #[test]
    fn maps_text_payloads() {
        assert_eq!(DecodedStatus::from_text("FREE"), DecodedStatus::Free);
        assert_eq!(DecodedStatus::from_text("ocupado"), DecodedStatus::Occupied);
        assert_eq!(
            DecodedStatus::from_text("battery low"),
            DecodedStatus::Text("battery low".to_string())
        );
    }

    #[test]
    fn serializes_with_tag() {
        assert_eq!(
            serde_json::to_value(DecodedStatus::Free).unwrap(),
            serde_json::json!({"status": "free"})
        );
        assert_eq!(
            serde_json::to_value(DecodedStatus::Unknown(9)).unwrap(),
            serde_json::json!({"status": "unknown", "value": 9})
        );
    }
}
