use crate::error::RelayError;
use serde::{Deserialize, Serialize};

// ========== RELAY WIRE SCHEMA ==========
// One JSON text frame per event: {"event": "<name>", "data": {...}}

/// binds a connection to its signaling id
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JoinPayload {
    pub id: String,
}

/// Call request; `id` is the sender's transport id, `room_id` its signaling id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub username: String,
    pub remote_id: String,
    pub id: String,
    pub room_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptPayload {
    pub remote_room_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeclinePayload {
    pub to: String,
}

/// informational ack for a sent request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    #[serde(default)]
    pub remote_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RelayMessage {
    JoinId(JoinPayload),
    Request(RequestPayload),
    RequestResponse(ResponsePayload),
    RequestAccept(AcceptPayload),
    RequestDecline(DeclinePayload),
}

impl RelayMessage {
    pub fn name(&self) -> &'static str {
        match self {
            RelayMessage::JoinId(_) => "joinId",
            RelayMessage::Request(_) => "request",
            RelayMessage::RequestResponse(_) => "requestResponse",
            RelayMessage::RequestAccept(_) => "requestAccept",
            RelayMessage::RequestDecline(_) => "requestDecline",
        }
    }

    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(RelayError::Encode)
    }

    pub fn decode(frame: &str) -> Result<Self, RelayError> {
        serde_json::from_str(frame).map_err(RelayError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_camel_case_field_names() {
        let msg = RelayMessage::Request(RequestPayload {
            username: "user-abcde".into(),
            remote_id: "fghij".into(),
            id: "a1b2c3".into(),
            room_id: "abcde".into(),
        });
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "request",
                "data": {
                    "username": "user-abcde",
                    "remoteId": "fghij",
                    "id": "a1b2c3",
                    "roomId": "abcde"
                }
            })
        );
    }

    #[test]
    fn decodes_accept_and_decline_frames() {
        let accept =
            RelayMessage::decode(r#"{"event":"requestAccept","data":{"remoteRoomId":"abcde"}}"#)
                .unwrap();
        assert_eq!(
            accept,
            RelayMessage::RequestAccept(AcceptPayload {
                remote_room_id: "abcde".into()
            })
        );

        let decline =
            RelayMessage::decode(r#"{"event":"requestDecline","data":{"to":"abcde"}}"#).unwrap();
        assert_eq!(decline.name(), "requestDecline");
    }

    #[test]
    fn response_payload_fields_are_optional() {
        let msg = RelayMessage::decode(r#"{"event":"requestResponse","data":{}}"#).unwrap();
        assert_eq!(msg, RelayMessage::RequestResponse(ResponsePayload::default()));
    }

    #[test]
    fn unknown_event_is_a_decode_error() {
        assert!(matches!(
            RelayMessage::decode(r#"{"event":"hangup","data":{}}"#),
            Err(RelayError::Decode(_))
        ));
    }
}
