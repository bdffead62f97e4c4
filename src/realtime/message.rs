//! Socket wire format.
//!
//! Every message in either direction is one JSON text frame:
//!
//! ```json
//! { "event": "training:update", "data": { "job_id": "..." } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }

    /// `error` event carrying a human-readable message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", serde_json::json!({ "message": message.into() }))
    }

    /// Serialize for the wire. `Event` holds only JSON values, so this
    /// cannot fail in practice; an empty object is sent if it ever does.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_defaults_to_null() {
        let ev: Event = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(ev.event, "ping");
        assert_eq!(ev.data, Value::Null);
    }

    #[test]
    fn missing_event_is_rejected() {
        assert!(serde_json::from_str::<Event>(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn error_event_shape() {
        let ev = Event::error("nope");
        let wire: Value = serde_json::from_str(&ev.to_json()).unwrap();
        assert_eq!(wire, json!({"event": "error", "data": {"message": "nope"}}));
    }
}
