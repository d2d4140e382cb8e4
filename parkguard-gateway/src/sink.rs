//! Where pipeline outcomes go: structured logs, or one JSON object per line

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, trace, warn};

use crate::error::{Rejection, RejectionKind};
use crate::pipeline::StatusEvent;

/// Receives every outcome of [`crate::Gateway::handle`]
pub trait EventSink: Send + Sync {
    fn accepted(&self, event: &StatusEvent);
    fn rejected(&self, rejection: &Rejection);
}

/// Logs accepted events at info. Authentication and replay rejections are
/// warnings since they can mean an attack; malformed traffic from unrelated
/// devices is common and stays at debug/trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn accepted(&self, event: &StatusEvent) {
        info!(
            device = %event.device,
            counter = event.counter,
            rssi = ?event.rssi,
            first_contact = event.first_contact,
            "{}",
            event.status
        );
    }

    fn rejected(&self, rejection: &Rejection) {
        let device = rejection.device.as_str();
        let counter = rejection.counter;
        match &rejection.kind {
            RejectionKind::Authentication | RejectionKind::Replay(_) => {
                warn!(device, ?counter, reason = rejection.kind.label(), "{}", rejection.kind)
            }
            RejectionKind::Decode(_) => {
                debug!(device, reason = rejection.kind.label(), "{}", rejection.kind)
            }
            RejectionKind::Format(_) => {
                trace!(device, reason = rejection.kind.label(), "{}", rejection.kind)
            }
        }
    }
}

/// Writes accepted events as JSON lines. Rejections are written too when
/// `include_rejections` is set.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
    include_rejections: bool,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            include_rejections: false,
        }
    }

    pub fn with_rejections(mut self, include: bool) -> Self {
        self.include_rejections = include;
        self
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line(&self, value: &serde_json::Value) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{value}").and_then(|_| out.flush()) {
            warn!("failed to write event: {e}");
        }
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn accepted(&self, event: &StatusEvent) {
        match serde_json::to_value(event) {
            Ok(value) => self.write_line(&value),
            Err(e) => warn!("failed to serialize event: {e}"),
        }
    }

    fn rejected(&self, rejection: &Rejection) {
        if !self.include_rejections {
            return;
        }
        self.write_line(&serde_json::json!({
            "device": rejection.device,
            "counter": rejection.counter,
            "rssi": rejection.rssi,
            "rejected": rejection.kind.label(),
            "reason": rejection.kind.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use parkguard_proto::Variant;

    use super::*;
    use crate::replay::ReplayError;
    use crate::status::DecodedStatus;

    fn event() -> StatusEvent {
        StatusEvent {
            device: "AA:BB:CC:DD:EE:01".to_string(),
            counter: 10,
            rssi: Some(-60),
            received_at: SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123),
            status: DecodedStatus::Free,
            variant: Variant::Binary,
            first_contact: true,
            payload_hex: "0000000a00".to_string(),
        }
    }

    fn lines(sink: JsonLinesSink<Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(sink.into_inner())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn writes_one_object_per_accepted_event() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.accepted(&event());
        sink.accepted(&event());

        let lines = lines(sink);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["device"], "AA:BB:CC:DD:EE:01");
        assert_eq!(lines[0]["status"], "free");
        assert_eq!(lines[0]["variant"], "binary");
        assert_eq!(lines[0]["received_at"], 1_700_000_000_123u64);
        assert_eq!(lines[0]["first_contact"], true);
    }

    #[test]
    fn rejections_are_opt_in() {
        let rejection = Rejection {
            device: "D1".to_string(),
            counter: Some(10),
            rssi: None,
            kind: RejectionKind::Replay(ReplayError {
                counter: 10,
                last_accepted: 10,
            }),
        };

        let quiet = JsonLinesSink::new(Vec::new());
        quiet.rejected(&rejection);
        assert!(lines(quiet).is_empty());

        let verbose = JsonLinesSink::new(Vec::new()).with_rejections(true);
        verbose.rejected(&rejection);
        let lines = lines(verbose);
        assert_eq!(lines[0]["rejected"], "replay");
        assert_eq!(lines[0]["counter"], 10);
    }
}
