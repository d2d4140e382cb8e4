//! Tag recomputation and constant-time comparison
//!
//! Binary packets sign `counter (4, big-endian) || encrypted status byte` and
//! carry the first 6 bytes of the digest. Text notifications sign the UTF-8
//! payload and carry the full digest as lowercase hex.

use parkguard_proto::{Packet, SignedContent, TAG_LEN};
use subtle::ConstantTimeEq;

use crate::keys::{SessionKey, keyed_hash};

pub(crate) fn binary_tag(counter: u32, encrypted_status: u8, key: &SessionKey) -> [u8; TAG_LEN] {
    let digest = keyed_hash(key.as_bytes(), &[&counter.to_be_bytes()[..], &[encrypted_status][..]]);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&digest[..TAG_LEN]);
    tag
}

pub(crate) fn text_sig(payload: &str, key: &SessionKey) -> String {
    data_encoding::HEXLOWER.encode(&keyed_hash(key.as_bytes(), &[payload.as_bytes()]))
}

/// Recompute the expected tag for `packet` under `key` and compare it against
/// the received one. The comparison time does not depend on the position of
/// the first mismatching byte.
pub fn verify(packet: &Packet, key: &SessionKey) -> bool {
    let matches = match &packet.content {
        SignedContent::Binary {
            encrypted_status,
            tag,
        } => {
            let expected = binary_tag(packet.counter, *encrypted_status, key);
            expected[..].ct_eq(&tag[..])
        }
        SignedContent::Text { payload, sig } => {
            let expected = text_sig(payload, key);
            expected.as_bytes().ct_eq(sig.as_bytes())
        }
    };
    matches.into()
}
