//! BLE plumbing for the parkguard gateway
//!
//! The radio side pushes [`Reception`]s into a bounded channel; [`drain`] is the
//! single consumer that runs them through the [`Gateway`] in arrival order.

pub mod dump;
pub mod transport;

use std::time::{Duration, Instant};

use parkguard_gateway::{EventSink, Gateway, Reception};
use tokio::sync::mpsc;
use tracing::debug;

pub use transport::{TransportError, get_adapter, listen_broadcasts, listen_notifications};

/// Run every queued reception through `gateway` until the channel closes.
///
/// With `idle_retention` set, devices silent for longer than that are
/// forgotten, checked every half retention period.
pub async fn drain(
    gateway: Gateway,
    mut receptions: mpsc::Receiver<Reception>,
    sink: Box<dyn EventSink>,
    idle_retention: Option<Duration>,
) -> Gateway {
    let period = idle_retention
        .map(|r| (r / 2).max(Duration::from_secs(1)))
        .unwrap_or(Duration::from_secs(3600));
    let mut sweep = tokio::time::interval(period);

    loop {
        tokio::select! {
            reception = receptions.recv() => match reception {
                Some(reception) => gateway.handle(&reception, &*sink),
                None => break,
            },
            _ = sweep.tick(), if idle_retention.is_some() => {
                if let Some(retention) = idle_retention {
                    let removed = gateway.replay_guard().expire_idle(retention, Instant::now());
                    if removed > 0 {
                        debug!(removed, "expired idle devices");
                    }
                }
            }
        }
    }

    gateway
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use parkguard_gateway::{MasterKey, PacketCodec, Rejection, Selector, StatusEvent};

    use super::*;

    #[derive(Default, Clone)]
    struct Counting(Arc<Mutex<Vec<&'static str>>>);

    impl EventSink for Counting {
        fn accepted(&self, _event: &StatusEvent) {
            self.0.lock().unwrap().push("accepted");
        }

        fn rejected(&self, rejection: &Rejection) {
            self.0.lock().unwrap().push(rejection.kind.label());
        }
    }

    #[tokio::test]
    async fn drains_until_channel_closes() {
        let gateway = Gateway::new(MasterKey::from_bytes([1; 32]), PacketCodec::default());
        let sink = Counting::default();
        let (tx, rx) = mpsc::channel(8);

        for len in [0usize, 9, 11] {
            tx.send(Reception::new("D1", Selector::Manufacturer(0xFFFF), vec![0; len]))
                .await
                .unwrap();
        }
        drop(tx);

        let gateway = drain(gateway, rx, Box::new(sink.clone()), None).await;
        assert_eq!(
            *sink.0.lock().unwrap(),
            ["format", "format", "authentication"]
        );
        assert!(gateway.replay_guard().is_empty());
    }
}
