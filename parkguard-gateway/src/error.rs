use std::path::PathBuf;

use parkguard_proto::{CodecError, DecodeError, FormatError, Reception};

use crate::replay::ReplayError;

/// Why a single packet was dropped. None of these stop the gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionKind {
    #[error("format error: {0}")]
    Format(FormatError),
    #[error("decode error: {0}")]
    Decode(DecodeError),
    #[error("authentication tag mismatch")]
    Authentication,
    #[error("replayed or stale packet: {0}")]
    Replay(ReplayError),
}

impl RejectionKind {
    /// Short machine-readable name, used in structured output
    pub fn label(&self) -> &'static str {
        match self {
            Self::Format(_) => "format",
            Self::Decode(_) => "decode",
            Self::Authentication => "authentication",
            Self::Replay(_) => "replay",
        }
    }
}

/// A dropped packet, with enough context to tell the rejections apart and
/// without any key material
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rejected packet from {device}: {kind}")]
pub struct Rejection {
    pub device: String,
    /// Known once the packet has been decoded
    pub counter: Option<u32>,
    pub rssi: Option<i16>,
    pub kind: RejectionKind,
}

impl Rejection {
    pub(crate) fn undecodable(reception: &Reception, err: CodecError) -> Self {
        let kind = match err {
            CodecError::Format(e) => RejectionKind::Format(e),
            CodecError::Decode(e) => RejectionKind::Decode(e),
        };
        Self {
            device: reception.device.clone(),
            counter: None,
            rssi: reception.rssi,
            kind,
        }
    }
}

/// Master key could not be loaded or provisioned. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("master key not found: set PARKGUARD_MASTER_KEY or create {0}")]
    NotFound(PathBuf),
    #[error("master key already exists at {0}")]
    AlreadyExists(PathBuf),
    #[error("failed to access master key file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed master key: {0}")]
    Malformed(String),
}

/// Gateway configuration could not be read or written. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no home directory; set PARKGUARD_HOME")]
    NoHome,
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}
