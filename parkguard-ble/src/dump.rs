//! Raw advertisement dump for diagnosing senders. Nothing here is verified.

use std::time::Duration;

use btleplug::api::{Central, CentralEvent, ScanFilter};
use btleplug::platform::Adapter;
use futures::StreamExt;
use parkguard_proto::ble::EDDYSTONE_UUID_PREFIX;
use uuid::Uuid;

use crate::transport::{TransportError, identify};

pub fn is_eddystone(uuid: &Uuid) -> bool {
    uuid.to_string().starts_with(EDDYSTONE_UUID_PREFIX)
}

pub fn describe_manufacturer(company: u16, bytes: &[u8]) -> String {
    format!(
        "manufacturer {company:#06x}: {} ({} bytes)",
        data_encoding::HEXLOWER.encode(bytes),
        bytes.len()
    )
}

pub fn describe_service(uuid: &Uuid, bytes: &[u8]) -> String {
    let kind = if is_eddystone(uuid) { "eddystone" } else { "service" };
    format!(
        "{kind} {uuid}: {} ({} bytes)",
        data_encoding::HEXLOWER.encode(bytes),
        bytes.len()
    )
}

fn matches_target(target: Option<&str>, device: &str) -> bool {
    target.is_none_or(|t| t.eq_ignore_ascii_case(device))
}

/// Print every manufacturer-data and service-data entry seen for `duration`,
/// optionally only from the device at address `target`
pub async fn dump(
    adapter: &Adapter,
    target: Option<&str>,
    duration: Duration,
) -> Result<(), TransportError> {
    let mut events = adapter.events().await?;
    adapter.start_scan(ScanFilter::default()).await?;
    println!("Dumping advertisements for {} seconds...", duration.as_secs());

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        let event = tokio::select! {
            _ = &mut deadline => break,
            event = events.next() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let lines: Vec<String> = match &event {
            CentralEvent::ManufacturerDataAdvertisement {
                manufacturer_data, ..
            } => manufacturer_data
                .iter()
                .map(|(company, bytes)| describe_manufacturer(*company, bytes))
                .collect(),
            CentralEvent::ServiceDataAdvertisement { service_data, .. } => service_data
                .iter()
                .map(|(uuid, bytes)| describe_service(uuid, bytes))
                .collect(),
            _ => continue,
        };
        let id = match event {
            CentralEvent::ManufacturerDataAdvertisement { id, .. }
            | CentralEvent::ServiceDataAdvertisement { id, .. } => id,
            _ => continue,
        };

        let (device, rssi) = identify(adapter, &id).await;
        if !matches_target(target, &device) {
            continue;
        }
        let rssi = rssi
            .map(|r| format!("{r} dBm"))
            .unwrap_or_else(|| "N/A".to_string());
        for line in lines {
            println!("{device} RSSI: {rssi}  {line}");
        }
    }

    adapter.stop_scan().await?;
    println!("Dump finished.");
    Ok(())
}
