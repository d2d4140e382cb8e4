//! BLE identifiers used by parkguard sensors
//!
//! Broadcast packets travel as manufacturer-specific advertisement data,
//! connected notifications arrive on a custom GATT characteristic.

use uuid::Uuid;

/// Manufacturer identifier the sensors advertise under (0xFFFF is the
/// Bluetooth SIG "testing" company id).
pub const MANUFACTURER_ID: u16 = 0xFFFF;

/// GATT service exposed by sensors in connected mode:
/// 12345678-1234-5678-1234-56789abcdef0
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef0);

/// Characteristic carrying signed text notifications (notify):
/// 12345678-1234-5678-1234-56789abcdef2
pub const DATA_CHAR_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef2);

/// Local name sensors use while advertising in connected mode
pub const DEFAULT_DEVICE_NAME: &str = "Esp32KeyNode";

/// Eddystone service data prefix (16-bit UUID 0xFEAA), used by the raw dump only
pub const EDDYSTONE_UUID_PREFIX: &str = "0000feaa";
