//! btleplug receivers: manufacturer-data broadcasts and GATT notifications

use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use parkguard_gateway::GatewayConfig;
use parkguard_proto::ble::SERVICE_UUID;
use parkguard_proto::{Reception, Selector};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace};
use uuid::Uuid;

/// How long to scan before looking for a named peripheral
const FIND_SCAN: Duration = Duration::from_secs(5);

/// The radio is unusable. Fatal: the gateway has nothing to verify.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),
    #[error("no device named or addressed {0:?} found")]
    DeviceNotFound(String),
    #[error("characteristic {0} not found on device")]
    CharacteristicNotFound(Uuid),
    #[error("adapter event stream ended")]
    EventsEnded,
    #[error("device {0} disconnected")]
    Disconnected(String),
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(TransportError::NoAdapter)
}

/// Hardware address and last seen RSSI of a peripheral
pub(crate) async fn identify(adapter: &Adapter, id: &PeripheralId) -> (String, Option<i16>) {
    match adapter.peripheral(id).await {
        Ok(peripheral) => {
            let rssi = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .and_then(|props| props.rssi);
            (peripheral.address().to_string(), rssi)
        }
        Err(_) => (format!("{id:?}"), None),
    }
}

/// Queue a reception without waiting. Returns false once the consumer is gone.
fn forward(tx: &mpsc::Sender<Reception>, reception: Reception) -> bool {
    match tx.try_send(reception) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            debug!(device = %dropped.device, "queue full, dropping reception");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Scan for broadcasts under the configured manufacturer id and queue every
/// payload from an allowed device. Runs until the consumer goes away or the
/// adapter stops delivering events.
pub async fn listen_broadcasts(
    adapter: &Adapter,
    config: &GatewayConfig,
    tx: mpsc::Sender<Reception>,
) -> Result<(), TransportError> {
    let mut events = adapter.events().await?;
    adapter.start_scan(ScanFilter::default()).await?;
    info!("scanning for manufacturer {:#06x}", config.manufacturer_id);

    while let Some(event) = events.next().await {
        let CentralEvent::ManufacturerDataAdvertisement {
            id,
            manufacturer_data,
        } = event
        else {
            continue;
        };
        let Some(bytes) = manufacturer_data.get(&config.manufacturer_id) else {
            continue;
        };

        let (device, rssi) = identify(adapter, &id).await;
        if !config.allows(&device) {
            trace!(%device, "not in allowed devices");
            continue;
        }

        let reception = Reception::new(
            device,
            Selector::Manufacturer(config.manufacturer_id),
            bytes.clone(),
        )
        .with_rssi(rssi);
        if !forward(&tx, reception) {
            return Ok(());
        }
    }

    Err(TransportError::EventsEnded)
}

/// Find a peripheral whose name contains `target` or whose address is `target`
pub async fn find_device(adapter: &Adapter, target: &str) -> Result<Peripheral, TransportError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(FIND_SCAN).await;

    let peripherals = adapter.peripherals().await?;
    let mut found = None;
    for peripheral in peripherals {
        let Some(props) = peripheral.properties().await? else {
            continue;
        };
        let name = props.local_name.unwrap_or_default();
        let address = peripheral.address().to_string();
        if name.contains(target) || address.eq_ignore_ascii_case(target) {
            info!("found {name} ({address})");
            found = Some(peripheral);
            break;
        }
    }

    adapter.stop_scan().await?;
    found.ok_or_else(|| TransportError::DeviceNotFound(target.to_string()))
}

/// Connect to `target`, subscribe to the data characteristic and queue every
/// notification. Returns an error when the device disconnects.
pub async fn listen_notifications(
    adapter: &Adapter,
    config: &GatewayConfig,
    target: &str,
    tx: mpsc::Sender<Reception>,
) -> Result<(), TransportError> {
    let peripheral = find_device(adapter, target).await?;
    let device = peripheral.address().to_string();

    peripheral.connect().await?;
    peripheral.discover_services().await?;
    if !peripheral.services().iter().any(|s| s.uuid == SERVICE_UUID) {
        debug!(%device, "sensor service {SERVICE_UUID} not advertised");
    }

    let characteristic = peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == config.data_characteristic)
        .ok_or(TransportError::CharacteristicNotFound(config.data_characteristic))?;

    let mut notifications = peripheral.notifications().await?;
    peripheral.subscribe(&characteristic).await?;
    info!("subscribed to {} on {device}", characteristic.uuid);

    while let Some(notification) = notifications.next().await {
        if notification.uuid != characteristic.uuid {
            continue;
        }
        let rssi = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|props| props.rssi);
        let reception = Reception::new(
            device.clone(),
            Selector::Characteristic(notification.uuid),
            notification.value,
        )
        .with_rssi(rssi);
        if !forward(&tx, reception) {
            let _ = peripheral.disconnect().await;
            return Ok(());
        }
    }

    Err(TransportError::Disconnected(device))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reception(device: &str) -> Reception {
        Reception::new(device, Selector::Manufacturer(0xFFFF), vec![0; 11])
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        assert!(forward(&tx, reception("D1")));
        assert!(forward(&tx, reception("D2")));

        assert_eq!(rx.try_recv().unwrap().device, "D1");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_queue_stops_the_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(!forward(&tx, reception("D1")));
    }
}
