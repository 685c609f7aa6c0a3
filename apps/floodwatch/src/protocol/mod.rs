//! Wire envelopes for the two realtime channels.
//!
//! Both channels speak JSON text frames shaped `{type, data}`. The tags are
//! matched exhaustively; a frame that fails to parse is the caller's cue to
//! log and drop it, never to tear the channel down.

use serde::{Deserialize, Serialize};

use crate::model::{Alert, ChatMessage, SensorReading};

/// Server-to-client envelope on `/ws/general`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GeneralEvent {
    SensorUpdate(SensorReading),
    NewAlert(Alert),
    AlertResolved(ResolvedAlert),
}

/// The resolution broadcast carries the full alert; only the key matters to
/// the client, the rest of the object is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAlert {
    pub id: i64,
}

/// Server-to-client envelope on `/chat/ws`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    NewMessage(ChatMessage),
}

/// A chat frame is either a tagged event or the server's ad hoc error shape
/// `{error, details}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChatFrame {
    Event(ChatEvent),
    Error {
        error: String,
        #[serde(default)]
        details: Option<String>,
    },
}

/// Client-to-server chat payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutbound {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlertLevel;

    #[test]
    fn sensor_update_envelope_parses() {
        let event: GeneralEvent = serde_json::from_str(
            r#"{"type":"sensor_update","data":{"id":1,"sensor_id":"S1","latitude":13.08,
                "longitude":80.27,"water_level":8.1,"rainfall":2.0,
                "timestamp":"2024-01-01T00:00:00Z"}}"#,
        )
        .unwrap();
        match event {
            GeneralEvent::SensorUpdate(reading) => assert_eq!(reading.sensor_id, "S1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn alert_resolution_only_needs_the_key() {
        let event: GeneralEvent = serde_json::from_str(
            r#"{"type":"alert_resolved","data":{"id":5,"title":"Flood Warning",
                "level":"high","timestamp":"2024-01-01T00:00:00Z","is_resolved":true}}"#,
        )
        .unwrap();
        assert_eq!(event, GeneralEvent::AlertResolved(ResolvedAlert { id: 5 }));
    }

    #[test]
    fn new_alert_envelope_parses() {
        let event: GeneralEvent = serde_json::from_str(
            r#"{"type":"new_alert","data":{"id":5,"title":"Flood Warning",
                "description":"River rising","level":"high","sensor_id":"S1",
                "timestamp":"2024-01-01T00:00:00Z","is_resolved":false}}"#,
        )
        .unwrap();
        match event {
            GeneralEvent::NewAlert(alert) => {
                assert_eq!(alert.id, 5);
                assert_eq!(alert.level, AlertLevel::High);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_tags_fail_to_parse() {
        let err = serde_json::from_str::<GeneralEvent>(r#"{"type":"shutdown","data":{}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn chat_frames_split_events_from_errors() {
        let frame: ChatFrame = serde_json::from_str(
            r#"{"type":"new_message","data":{"id":9,"username":"asha",
                "content":"water at 6m","timestamp":"2024-01-01T00:00:00Z"}}"#,
        )
        .unwrap();
        assert!(matches!(
            frame,
            ChatFrame::Event(ChatEvent::NewMessage(ref msg)) if msg.id == 9
        ));

        let frame: ChatFrame =
            serde_json::from_str(r#"{"error":"Could not process message","details":"bad json"}"#)
                .unwrap();
        assert!(matches!(frame, ChatFrame::Error { .. }));
    }

    #[test]
    fn outbound_payload_is_a_bare_content_object() {
        let payload = serde_json::to_string(&ChatOutbound {
            content: "evacuating".into(),
        })
        .unwrap();
        assert_eq!(payload, r#"{"content":"evacuating"}"#);
    }
}
