//! The per-reception pipeline: decode, derive, verify, replay check, unwrap

use std::time::SystemTime;

use parkguard_proto::{PacketCodec, Reception, SignedContent, Variant};
use tracing::trace;

use crate::error::{Rejection, RejectionKind};
use crate::keys::{MasterKey, derive_session_key};
use crate::replay::{Acceptance, ReplayGuard};
use crate::sink::EventSink;
use crate::status::{DecodedStatus, unwrap_status};
use crate::verify::verify;

/// An authentic, fresh status report
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StatusEvent {
    pub device: String,
    pub counter: u32,
    pub rssi: Option<i16>,
    #[serde(serialize_with = "unix_millis")]
    pub received_at: SystemTime,
    #[serde(flatten)]
    pub status: DecodedStatus,
    pub variant: Variant,
    /// First packet accepted from this device by this gateway
    pub first_contact: bool,
    pub payload_hex: String,
}

fn unix_millis<S: serde::Serializer>(at: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let millis = at
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    serializer.serialize_u64(millis)
}

/// Stateless verification pipeline; all persistent state lives in the
/// [`ReplayGuard`] it owns.
///
/// `process` takes `&self`, so one gateway can be shared between transport
/// threads. Per-device ordering is whatever order `process` is called in.
#[derive(Debug)]
pub struct Gateway {
    master_key: MasterKey,
    codec: PacketCodec,
    replay: ReplayGuard,
}

impl Gateway {
    pub fn new(master_key: MasterKey, codec: PacketCodec) -> Self {
        Self::with_replay_guard(master_key, codec, ReplayGuard::new())
    }

    pub fn with_replay_guard(master_key: MasterKey, codec: PacketCodec, replay: ReplayGuard) -> Self {
        Self {
            master_key,
            codec,
            replay,
        }
    }

    pub fn codec(&self) -> &PacketCodec {
        &self.codec
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.replay
    }

    /// Run one reception through every stage. The first failing stage short
    /// circuits; the replay guard is only touched once the tag has verified.
    pub fn process(&self, reception: &Reception) -> Result<StatusEvent, Rejection> {
        let packet = self
            .codec
            .decode(reception)
            .map_err(|e| Rejection::undecodable(reception, e))?;

        let reject = |kind| Rejection {
            device: packet.device.clone(),
            counter: Some(packet.counter),
            rssi: packet.rssi,
            kind,
        };

        let session_key = derive_session_key(&self.master_key, packet.counter);
        if !verify(&packet, &session_key) {
            return Err(reject(RejectionKind::Authentication));
        }

        let acceptance = self
            .replay
            .try_accept(&packet.device, packet.counter)
            .map_err(|e| reject(RejectionKind::Replay(e)))?;
        trace!(device = %packet.device, counter = packet.counter, ?acceptance, "counter accepted");

        let status = match &packet.content {
            SignedContent::Binary {
                encrypted_status, ..
            } => DecodedStatus::from_byte(unwrap_status(*encrypted_status, &session_key)),
            SignedContent::Text { payload, .. } => DecodedStatus::from_text(payload),
        };

        Ok(StatusEvent {
            variant: packet.variant(),
            payload_hex: packet.raw_hex(),
            device: packet.device,
            counter: packet.counter,
            rssi: packet.rssi,
            received_at: packet.received_at,
            status,
            first_contact: acceptance == Acceptance::FirstContact,
        })
    }

    /// Process a reception and hand the outcome to `sink`
    pub fn handle(&self, reception: &Reception, sink: &dyn EventSink) {
        match self.process(reception) {
            Ok(event) => sink.accepted(&event),
            Err(rejection) => sink.rejected(&rejection),
        }
    }
}
