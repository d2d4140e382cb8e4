//! Sensor-side packet construction, computed directly with hmac/sha2 so the
//! gateway is checked against an independent implementation

#![allow(dead_code, unused_imports)]

use std::sync::Mutex;

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub use parkguard_gateway::{
    DecodedStatus, EventSink, Gateway, MasterKey, PacketCodec, PrefixMode, Reception, Rejection,
    RejectionKind, Selector, StatusEvent, Variant,
};
pub use parkguard_proto::ble::{DATA_CHAR_UUID, MANUFACTURER_ID};

pub const MASTER_HEX: &str = "96791c1dd46794227f562d02b70a566765bff0427a17d55a3e0f5af8309c83f0";

pub const OCCUPIED: u8 = 0;
pub const FREE: u8 = 1;

pub fn master_bytes() -> [u8; 32] {
    let bytes = data_encoding::HEXLOWER.decode(MASTER_HEX.as_bytes()).unwrap();
    bytes.try_into().unwrap()
}

pub fn master() -> MasterKey {
    MasterKey::from_bytes(master_bytes())
}

pub fn gateway() -> Gateway {
    Gateway::new(master(), PacketCodec::default())
}

fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().into()
}

pub fn session_key(master: &[u8; 32], counter: u32) -> [u8; 32] {
    hmac(master, &counter.to_be_bytes())
}

/// What a sensor broadcasts for `status` at `counter`
pub fn seal_binary(master: &[u8; 32], counter: u32, status: u8) -> Vec<u8> {
    let key = session_key(master, counter);
    let encrypted = status ^ key[0];

    let mut packet = counter.to_be_bytes().to_vec();
    packet.push(encrypted);
    let tag = hmac(&key, &packet);
    packet.extend_from_slice(&tag[..6]);
    packet
}

/// What a sensor notifies for `payload` at `counter`
pub fn seal_text(master: &[u8; 32], counter: u32, payload: &str) -> Vec<u8> {
    let key = session_key(master, counter);
    let sig = data_encoding::HEXLOWER.encode(&hmac(&key, payload.as_bytes()));
    serde_json::json!({"ctr": counter, "payload": payload, "sig": sig})
        .to_string()
        .into_bytes()
}

pub fn broadcast(device: &str, bytes: Vec<u8>) -> Reception {
    Reception::new(device, Selector::Manufacturer(MANUFACTURER_ID), bytes)
}

pub fn notification(device: &str, bytes: Vec<u8>) -> Reception {
    Reception::new(device, Selector::Characteristic(DATA_CHAR_UUID), bytes)
}

/// Collects everything the gateway reports
#[derive(Default)]
pub struct MemorySink {
    pub accepted: Mutex<Vec<StatusEvent>>,
    pub rejected: Mutex<Vec<Rejection>>,
}

impl EventSink for MemorySink {
    fn accepted(&self, event: &StatusEvent) {
        self.accepted.lock().unwrap().push(event.clone());
    }

    fn rejected(&self, rejection: &Rejection) {
        self.rejected.lock().unwrap().push(rejection.clone());
    }
}
