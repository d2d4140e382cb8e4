//! Text notification variant: `{"ctr": 7, "payload": "free", "sig": "<hex>"}`

use serde_json::Value;

use crate::{CodecError, DecodeError, FormatError};

/// Fields of a text notification, not yet authenticated
pub(crate) struct TextFields {
    pub counter: u32,
    pub payload: String,
    pub sig: String,
}

pub(crate) fn decode(bytes: &[u8]) -> Result<TextFields, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(DecodeError::Utf8)?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;

    let object = value.as_object().ok_or(FormatError::NotAnObject)?;

    let ctr = object.get("ctr").ok_or(FormatError::MissingField("ctr"))?;
    let ctr = ctr.as_u64().ok_or(FormatError::InvalidField("ctr"))?;
    let counter = u32::try_from(ctr).map_err(|_| FormatError::CounterOutOfRange(ctr))?;

    let payload = string_field(object, "payload")?;
    let sig = string_field(object, "sig")?;

    Ok(TextFields { counter, payload, sig })
}

fn string_field(
    object: &serde_json::Map<String, Value>,
    name: &'static str,
) -> Result<String, FormatError> {
    object
        .get(name)
        .ok_or(FormatError::MissingField(name))?
        .as_str()
        .map(str::to_string)
        .ok_or(FormatError::InvalidField(name))
}
