//! Frame types for the Home Assistant WebSocket protocol.
//!
//! Every inbound text frame is decoded into [`Inbound`] at the transport
//! boundary, before any dispatch happens. Downstream code matches on the
//! variant instead of sniffing for `id` or `event` fields.
//!
//! Outbound traffic is modelled by [`Command`]; the correlation `id` is
//! not part of the command and is stamped on by
//! [`Correlator`](crate::Correlator) when the frame is encoded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::models::State;

// ── Outbound ─────────────────────────────────────────────────────────

/// A command sent to Home Assistant, awaiting a correlated `result`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "get_states")]
    GetStates,

    #[serde(rename = "config/device_registry/list")]
    DeviceRegistryList,

    #[serde(rename = "config/area_registry/list")]
    AreaRegistryList,

    #[serde(rename = "config/entity_registry/list")]
    EntityRegistryList,

    /// Subscribe to the event bus. `None` subscribes to every event type.
    #[serde(rename = "subscribe_events")]
    SubscribeEvents {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
    },

    #[serde(rename = "call_service")]
    CallService {
        domain: String,
        service: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        service_data: Option<Value>,
    },

    /// Heartbeat; answered with a `pong` frame carrying the same id.
    #[serde(rename = "ping")]
    Ping,
}

impl Command {
    /// Subscribe to `state_changed` events only.
    pub fn subscribe_state_changes() -> Self {
        Self::SubscribeEvents {
            event_type: Some(STATE_CHANGED.into()),
        }
    }

    /// The `type` string this command is sent with.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetStates => "get_states",
            Self::DeviceRegistryList => "config/device_registry/list",
            Self::AreaRegistryList => "config/area_registry/list",
            Self::EntityRegistryList => "config/entity_registry/list",
            Self::SubscribeEvents { .. } => "subscribe_events",
            Self::CallService { .. } => "call_service",
            Self::Ping => "ping",
        }
    }

    /// Encode the command as a JSON text frame carrying `id`.
    pub fn to_frame(&self, id: u64) -> Result<String, Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(ref mut map) = value {
            map.insert("id".into(), Value::from(id));
        }
        Ok(serde_json::to_string(&value)?)
    }
}

/// The first frame a client sends after `auth_required`.
#[derive(Debug, Serialize)]
pub(crate) struct AuthFrame<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub access_token: &'a str,
}

impl<'a> AuthFrame<'a> {
    pub(crate) fn new(access_token: &'a str) -> Self {
        Self {
            kind: "auth",
            access_token,
        }
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

pub const STATE_CHANGED: &str = "state_changed";

/// Every frame the server can send, discriminated by its `type` tag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result(ResultFrame),
    Event(EventFrame),
    Pong {
        id: u64,
    },
    #[serde(other)]
    Unknown,
}

impl Inbound {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })
    }

    /// Short name of the frame type, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthRequired { .. } => "auth_required",
            Self::AuthOk { .. } => "auth_ok",
            Self::AuthInvalid { .. } => "auth_invalid",
            Self::Result(_) => "result",
            Self::Event(_) => "event",
            Self::Pong { .. } => "pong",
            Self::Unknown => "unknown",
        }
    }
}

/// Response to a command, matched to it by `id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultFrame {
    pub id: u64,
    pub success: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<ServerError>,
}

/// Error payload of an unsuccessful `result` frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl ResultFrame {
    /// A successful empty result, used to resolve `ping` commands from
    /// their `pong` answer.
    pub fn pong(id: u64) -> Self {
        Self {
            id,
            success: true,
            result: Value::Null,
            error: None,
        }
    }

    /// Convert into the command's payload, or [`Error::Server`] when the
    /// server reported failure.
    pub fn into_result(self) -> Result<Value, Error> {
        if self.success {
            return Ok(self.result);
        }
        let error = self.error.unwrap_or_else(|| ServerError {
            code: "unknown_error".into(),
            message: "Service call failed".into(),
        });
        Err(Error::Server {
            code: error.code,
            message: error.message,
        })
    }

    /// Deserialize the payload of a successful result into `T`.
    pub fn parse<T: serde::de::DeserializeOwned>(self) -> Result<T, Error> {
        let value = self.into_result()?;
        let body = value.to_string();
        serde_json::from_value(value).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

/// Unsolicited push from a subscription. `id` is the id of the
/// `subscribe_events` command that created the subscription.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventFrame {
    pub id: u64,
    pub event: HassEvent,
}

/// Event payload, discriminated by `event_type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event_type")]
pub enum HassEvent {
    #[serde(rename = "state_changed")]
    StateChanged { data: StateChangedData },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    /// `None` when the entity was removed upstream.
    #[serde(default)]
    pub new_state: Option<State>,
    #[serde(default)]
    pub old_state: Option<State>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn command_frame_carries_id_and_type() {
        let frame = Command::GetStates.to_frame(7).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({ "id": 7, "type": "get_states" }));
    }

    #[test]
    fn call_service_frame_shape() {
        let cmd = Command::CallService {
            domain: "light".into(),
            service: "turn_on".into(),
            service_data: Some(json!({ "entity_id": "light.kitchen" })),
        };
        let value: Value = serde_json::from_str(&cmd.to_frame(3).unwrap()).unwrap();
        assert_eq!(value["type"], "call_service");
        assert_eq!(value["domain"], "light");
        assert_eq!(value["service"], "turn_on");
        assert_eq!(value["service_data"]["entity_id"], "light.kitchen");
        assert_eq!(value["id"], 3);
    }

    #[test]
    fn subscribe_frame_names_event_type() {
        let value: Value =
            serde_json::from_str(&Command::subscribe_state_changes().to_frame(5).unwrap())
                .unwrap();
        assert_eq!(
            value,
            json!({ "id": 5, "type": "subscribe_events", "event_type": "state_changed" })
        );
    }

    #[test]
    fn decode_auth_frames() {
        assert_eq!(
            Inbound::decode(r#"{"type":"auth_required","ha_version":"2026.2.1"}"#).unwrap(),
            Inbound::AuthRequired {
                ha_version: Some("2026.2.1".into())
            }
        );
        assert_eq!(
            Inbound::decode(r#"{"type":"auth_invalid","message":"Invalid password"}"#).unwrap(),
            Inbound::AuthInvalid {
                message: Some("Invalid password".into())
            }
        );
    }

    #[test]
    fn decode_result_frame() {
        let inbound =
            Inbound::decode(r#"{"id":4,"type":"result","success":true,"result":[1,2]}"#).unwrap();
        let Inbound::Result(frame) = inbound else {
            panic!("expected result frame");
        };
        assert_eq!(frame.id, 4);
        assert_eq!(frame.into_result().unwrap(), json!([1, 2]));
    }

    #[test]
    fn failed_result_becomes_server_error() {
        let inbound = Inbound::decode(
            r#"{"id":9,"type":"result","success":false,"error":{"code":"not_found","message":"Service light.explode not found."}}"#,
        )
        .unwrap();
        let Inbound::Result(frame) = inbound else {
            panic!("expected result frame");
        };
        match frame.into_result() {
            Err(Error::Server { code, message }) => {
                assert_eq!(code, "not_found");
                assert_eq!(message, "Service light.explode not found.");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn decode_state_changed_event() {
        let raw = json!({
            "id": 5,
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": {
                    "entity_id": "light.kitchen",
                    "old_state": { "entity_id": "light.kitchen", "state": "off" },
                    "new_state": {
                        "entity_id": "light.kitchen",
                        "state": "on",
                        "attributes": { "brightness": 191 }
                    }
                },
                "origin": "LOCAL",
                "time_fired": "2026-02-10T12:00:00+00:00"
            }
        });
        let Inbound::Event(frame) = Inbound::decode(&raw.to_string()).unwrap() else {
            panic!("expected event frame");
        };
        assert_eq!(frame.id, 5);
        let HassEvent::StateChanged { data } = frame.event else {
            panic!("expected state_changed");
        };
        assert_eq!(data.entity_id, "light.kitchen");
        let new_state = data.new_state.unwrap();
        assert_eq!(new_state.state, "on");
        assert_eq!(new_state.attributes["brightness"], 191);
    }

    #[test]
    fn other_event_types_are_tolerated() {
        let raw = r#"{"id":5,"type":"event","event":{"event_type":"call_service","data":{}}}"#;
        let Inbound::Event(frame) = Inbound::decode(raw).unwrap() else {
            panic!("expected event frame");
        };
        assert_eq!(frame.event, HassEvent::Other);
    }

    #[test]
    fn unknown_frame_type_decodes_to_unknown() {
        assert_eq!(
            Inbound::decode(r#"{"type":"supported_features"}"#).unwrap(),
            Inbound::Unknown
        );
    }

    #[test]
    fn malformed_frame_is_a_deserialization_error() {
        let err = Inbound::decode("not json at all").unwrap_err();
        assert!(matches!(err, Error::Deserialization { ref body, .. } if body == "not json at all"));
    }
}
