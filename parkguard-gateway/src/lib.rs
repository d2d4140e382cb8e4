//! parkguard gateway - turns raw sensor receptions into trusted status events
//!
//! Every reception goes through the same stages, and the first failure drops
//! the packet:
//!
//! 1. decode (`parkguard-proto`)
//! 2. derive the session key for the packet's counter
//! 3. verify the tag in constant time
//! 4. replay check against the last accepted counter of the device
//! 5. recover the status
//!
//! Rejections are reported to an [`EventSink`] and never stop the gateway.

mod config;
mod error;
mod keys;
mod pipeline;
mod replay;
mod sink;
mod status;
mod verify;

pub use config::{
    GatewayConfig, HOME_ENV, MASTER_KEY_ENV, create_master_key, load_master_key, parkguard_home,
};
pub use error::{ConfigError, KeyError, Rejection, RejectionKind};
pub use keys::{KEY_LEN, MasterKey, SessionKey, derive_session_key};
pub use pipeline::{Gateway, StatusEvent};
pub use replay::{Acceptance, DeviceRecord, ReplayError, ReplayGuard};
pub use sink::{EventSink, JsonLinesSink, TracingSink};
pub use status::{DecodedStatus, unwrap_status};
pub use verify::verify;

pub use parkguard_proto::{PacketCodec, PrefixMode, Reception, Selector, Variant};
