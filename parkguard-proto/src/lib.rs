//! parkguard wire protocol - reception events and packet decoding
//!
//! Sensors report their status in one of two wire variants:
//!
//! - binary broadcast, 11 bytes under a manufacturer id:
//!   `counter (4, big-endian) | encrypted status (1) | truncated tag (6)`
//! - text notification on a GATT characteristic:
//!   `{"ctr": <u32>, "payload": <string>, "sig": <hex digest>}`
//!
//! [`PacketCodec`] turns a [`Reception`] into a [`Packet`]. Nothing in this
//! crate is authenticated; that happens in `parkguard-gateway`.

pub mod ble;
mod text;

use std::fmt;
use std::time::SystemTime;

use uuid::Uuid;

/// Length of the big-endian counter field
pub const COUNTER_LEN: usize = 4;

/// Length of the truncated tag in the binary variant
pub const TAG_LEN: usize = 6;

/// Length of the binary broadcast layout, without the optional prefix
pub const BINARY_PACKET_LEN: usize = COUNTER_LEN + 1 + TAG_LEN;

/// Length of the repeated manufacturer id some senders prepend
pub const PREFIX_LEN: usize = 2;

/// Which transport channel a reception arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Manufacturer-specific advertisement data under a 16-bit company id
    Manufacturer(u16),
    /// Notification on a connected GATT characteristic
    Characteristic(Uuid),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Manufacturer(id) => write!(f, "manufacturer {id:#06x}"),
            Selector::Characteristic(uuid) => write!(f, "characteristic {uuid}"),
        }
    }
}

/// One raw reception as handed over by the transport layer
#[derive(Debug, Clone)]
pub struct Reception {
    /// Identity reported by the transport, usually the hardware address
    pub device: String,
    pub selector: Selector,
    pub bytes: Vec<u8>,
    /// Received signal strength in dBm, when the adapter reports it
    pub rssi: Option<i16>,
    pub received_at: SystemTime,
}

impl Reception {
    pub fn new(device: impl Into<String>, selector: Selector, bytes: Vec<u8>) -> Self {
        Self {
            device: device.into(),
            selector,
            bytes,
            rssi: None,
            received_at: SystemTime::now(),
        }
    }

    pub fn with_rssi(mut self, rssi: Option<i16>) -> Self {
        self.rssi = rssi;
        self
    }
}

/// How the optional repeated manufacturer id in front of a binary payload is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixMode {
    /// Strip the prefix only when the payload is exactly prefix + 11 bytes and
    /// starts with the id. An 11-byte payload is never stripped, so a counter
    /// that happens to begin with the id bytes is read correctly.
    #[default]
    Auto,
    /// Every payload carries the prefix; a payload without it is malformed
    Always,
    /// Payloads never carry the prefix
    Never,
}

/// The signed part of a packet, as it appeared on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedContent {
    /// Binary broadcast: one XOR-encrypted status byte and a 6 byte tag
    Binary {
        encrypted_status: u8,
        tag: [u8; TAG_LEN],
    },
    /// Text notification: plaintext payload and the full hex digest
    Text { payload: String, sig: String },
}

/// Wire variant discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Binary,
    Text,
}

/// A structurally valid, not yet authenticated packet
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub device: String,
    pub counter: u32,
    pub content: SignedContent,
    pub rssi: Option<i16>,
    pub received_at: SystemTime,
    /// Logical payload after prefix stripping
    pub raw: Vec<u8>,
}

impl Packet {
    pub fn variant(&self) -> Variant {
        match self.content {
            SignedContent::Binary { .. } => Variant::Binary,
            SignedContent::Text { .. } => Variant::Text,
        }
    }

    /// Logical payload as lowercase hex, for operator output
    pub fn raw_hex(&self) -> String {
        data_encoding::HEXLOWER.encode(&self.raw)
    }
}

/// Structure of a reception does not match either wire variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("unexpected selector: {0}")]
    UnexpectedSelector(Selector),
    #[error("binary payload must be 11 bytes, got {0}")]
    BadLength(usize),
    #[error("binary payload does not start with the manufacturer id prefix")]
    MissingPrefix,
    #[error("text notification is not a JSON object")]
    NotAnObject,
    #[error("text notification is missing field `{0}`")]
    MissingField(&'static str),
    #[error("text notification field `{0}` has the wrong type")]
    InvalidField(&'static str),
    #[error("counter {0} does not fit in 32 bits")]
    CounterOutOfRange(u64),
}

/// Text notification is not well-formed UTF-8 JSON
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("notification is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("notification is not valid JSON: {0}")]
    Json(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Decodes receptions on the configured channels into packets
#[derive(Debug, Clone)]
pub struct PacketCodec {
    manufacturer_id: u16,
    characteristic: Uuid,
    prefix_mode: PrefixMode,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(ble::MANUFACTURER_ID, ble::DATA_CHAR_UUID)
    }
}

impl PacketCodec {
    pub fn new(manufacturer_id: u16, characteristic: Uuid) -> Self {
        Self {
            manufacturer_id,
            characteristic,
            prefix_mode: PrefixMode::Auto,
        }
    }

    pub fn with_prefix_mode(mut self, prefix_mode: PrefixMode) -> Self {
        self.prefix_mode = prefix_mode;
        self
    }

    pub fn manufacturer_id(&self) -> u16 {
        self.manufacturer_id
    }

    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    /// Decode one reception. Never panics on malformed input.
    pub fn decode(&self, reception: &Reception) -> Result<Packet, CodecError> {
        match reception.selector {
            Selector::Manufacturer(id) if id == self.manufacturer_id => {
                self.decode_binary(reception)
            }
            Selector::Characteristic(uuid) if uuid == self.characteristic => {
                Self::decode_text(reception)
            }
            other => Err(FormatError::UnexpectedSelector(other).into()),
        }
    }

    fn decode_binary(&self, reception: &Reception) -> Result<Packet, CodecError> {
        let payload = self.strip_prefix(&reception.bytes)?;
        let fixed: &[u8; BINARY_PACKET_LEN] = payload
            .try_into()
            .map_err(|_| FormatError::BadLength(payload.len()))?;

        let counter = u32::from_be_bytes([fixed[0], fixed[1], fixed[2], fixed[3]]);
        let encrypted_status = fixed[COUNTER_LEN];
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&fixed[COUNTER_LEN + 1..]);

        Ok(Packet {
            device: reception.device.clone(),
            counter,
            content: SignedContent::Binary {
                encrypted_status,
                tag,
            },
            rssi: reception.rssi,
            received_at: reception.received_at,
            raw: payload.to_vec(),
        })
    }

    fn decode_text(reception: &Reception) -> Result<Packet, CodecError> {
        let fields = text::decode(&reception.bytes)?;

        Ok(Packet {
            device: reception.device.clone(),
            counter: fields.counter,
            content: SignedContent::Text {
                payload: fields.payload,
                sig: fields.sig,
            },
            rssi: reception.rssi,
            received_at: reception.received_at,
            raw: reception.bytes.clone(),
        })
    }

    fn strip_prefix<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8], FormatError> {
        let prefix = self.manufacturer_id.to_le_bytes();
        let has_prefix = bytes.len() >= PREFIX_LEN && bytes[..PREFIX_LEN] == prefix;

        match self.prefix_mode {
            PrefixMode::Never => Ok(bytes),
            PrefixMode::Always if has_prefix => Ok(&bytes[PREFIX_LEN..]),
            PrefixMode::Always => Err(FormatError::MissingPrefix),
            PrefixMode::Auto if has_prefix && bytes.len() == PREFIX_LEN + BINARY_PACKET_LEN => {
                Ok(&bytes[PREFIX_LEN..])
            }
            PrefixMode::Auto => Ok(bytes),
        }
    }
}
