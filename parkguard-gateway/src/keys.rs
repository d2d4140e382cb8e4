//! Master key handling and per-counter session key derivation

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::KeyError;

pub const KEY_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over the concatenation of `parts`
pub(crate) fn keyed_hash(key: &[u8; KEY_LEN], parts: &[&[u8]]) -> [u8; KEY_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Pre-shared 32 byte secret, shared with every sensor at provisioning time.
///
/// Never printed: `Debug` is redacted and there is no `Display`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random key, for provisioning a new deployment
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Lowercase hex, only for writing the key file
    pub(crate) fn to_hex(&self) -> String {
        data_encoding::HEXLOWER.encode(&self.0)
    }
}

impl FromStr for MasterKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = data_encoding::HEXLOWER_PERMISSIVE
            .decode(s.trim().as_bytes())
            .map_err(|e| KeyError::Malformed(e.to_string()))?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            KeyError::Malformed(format!("expected {KEY_LEN} bytes, got {}", b.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Ephemeral key for exactly one counter value.
///
/// Derived fresh for every packet and dropped (and zeroized) once that packet
/// has been evaluated.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// The single keystream byte used to mask the status byte
    pub(crate) fn keystream_byte(&self) -> u8 {
        self.0[0]
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// `HMAC-SHA256(master, counter as 4 big-endian bytes)`
///
/// Pure and intentionally not cached: a correct sender never repeats a counter.
pub fn derive_session_key(master: &MasterKey, counter: u32) -> SessionKey {
    SessionKey(keyed_hash(&master.0, &[&counter.to_be_bytes()[..]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER_HEX: &str = "96791c1dd46794227f562d02b70a566765bff0427a17d55a3e0f5af8309c83f0";

    #[test]
    fn parses_hex_key() {
        let key: MasterKey = MASTER_HEX.parse().unwrap();
        assert_eq!(key.to_hex(), MASTER_HEX);

        let upper: MasterKey = MASTER_HEX.to_uppercase().parse().unwrap();
        assert_eq!(upper.to_hex(), MASTER_HEX);
    }

    #[test]
    fn rejects_short_or_garbage_keys() {
        assert!(matches!(
            "abcd".parse::<MasterKey>(),
            Err(KeyError::Malformed(_))
        ));
        assert!(matches!(
            "zz".repeat(32).parse::<MasterKey>(),
            Err(KeyError::Malformed(_))
        ));
    }

    #[test]
    fn debug_never_shows_key_material() {
        let key: MasterKey = MASTER_HEX.parse().unwrap();
        let session = derive_session_key(&key, 1);
        assert_eq!(format!("{key:?}"), "MasterKey(<redacted>)");
        assert_eq!(format!("{session:?}"), "SessionKey(<redacted>)");
    }

    #[test]
    fn derivation_is_deterministic() {
        let key: MasterKey = MASTER_HEX.parse().unwrap();
        assert_eq!(derive_session_key(&key, 10), derive_session_key(&key, 10));
        assert_ne!(derive_session_key(&key, 10), derive_session_key(&key, 11));
    }

    #[test]
    fn derivation_matches_rfc_4231_construction() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let mut key = [0u8; KEY_LEN];
        key[..4].copy_from_slice(b"Jefe");
        // HMAC zero-pads short keys, so a zero-padded 32 byte key is equivalent
        let digest = keyed_hash(&key, &[&b"what do ya want "[..], &b"for nothing?"[..]]);
        assert_eq!(
            data_encoding::HEXLOWER.encode(&digest),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(MasterKey::generate().to_hex(), MasterKey::generate().to_hex());
    }
}
