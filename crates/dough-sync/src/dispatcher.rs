use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use dough_core::model::parse_timestamp;
use dough_core::{
    decode_members, DecodeError, Envelope, FrontingEntry, Member, MentalState, PushEvent,
};

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    data: Value,
}

/// Decode one text frame `{type, timestamp, data}` into an [`Envelope`].
///
/// Unrecognised kinds decode to [`PushEvent::Unknown`]; malformed frames and
/// payloads are errors.
pub fn decode_frame(text: &str) -> Result<Envelope, DecodeError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let kind = raw.kind.ok_or(DecodeError::MissingField("type"))?;
    let sent_at = raw
        .timestamp
        .as_ref()
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    let event = decode_event(&kind, raw.data)?;
    Ok(Envelope { event, sent_at })
}

fn invalid(kind: &'static str, reason: impl ToString) -> DecodeError {
    DecodeError::InvalidShape {
        kind,
        reason: reason.to_string(),
    }
}

fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn decode_event(kind: &str, data: Value) -> Result<PushEvent, DecodeError> {
    match kind {
        "fronting_update" => {
            if is_empty_payload(&data) {
                return Ok(PushEvent::FrontingUpdate(FrontingEntry::default()));
            }
            let data = match data {
                Value::Array(_) => serde_json::json!({ "members": data }),
                other => other,
            };
            serde_json::from_value(data)
                .map(PushEvent::FrontingUpdate)
                .map_err(|e| invalid("fronting_update", e))
        }
        "mental_state_update" => {
            if is_empty_payload(&data) {
                return Ok(PushEvent::MentalStateUpdate(None));
            }
            serde_json::from_value::<MentalState>(data)
                .map(|s| PushEvent::MentalStateUpdate(Some(s)))
                .map_err(|e| invalid("mental_state_update", e))
        }
        "members_update" => {
            let list = match data {
                Value::Array(list) => list,
                Value::Object(mut map) => match map.remove("members") {
                    Some(Value::Array(list)) => list,
                    _ => return Err(invalid("members_update", "expected a members array")),
                },
                _ => return Err(invalid("members_update", "expected a members array")),
            };
            let (members, skipped) = decode_members(list);
            if skipped > 0 {
                warn!(skipped, "members_update: skipped malformed member records");
            }
            Ok(PushEvent::MembersUpdate(members))
        }
        "cofront_update" => {
            let record = match data {
                Value::Object(mut map) if map.contains_key("cofront") => {
                    map.remove("cofront").unwrap_or(Value::Null)
                }
                other => other,
            };
            serde_json::from_value::<Member>(record)
                .map(PushEvent::CofrontUpdate)
                .map_err(|e| invalid("cofront_update", e))
        }
        "force_refresh" => Ok(PushEvent::ForceRefresh {
            message: data.get("message").and_then(Value::as_str).map(String::from),
        }),
        other => Ok(PushEvent::Unknown {
            kind: other.to_string(),
        }),
    }
}

/// Routes decoded events to per-kind handlers.
pub trait PushHandler {
    fn on_fronting_update(&mut self, entry: FrontingEntry);
    fn on_mental_state_update(&mut self, state: Option<MentalState>);
    fn on_members_update(&mut self, members: Vec<Member>);
    fn on_cofront_update(&mut self, cofront: Member);
    fn on_force_refresh(&mut self, message: Option<String>);
}

pub fn dispatch<H: PushHandler + ?Sized>(event: PushEvent, handler: &mut H) {
    match event {
        PushEvent::FrontingUpdate(entry) => handler.on_fronting_update(entry),
        PushEvent::MentalStateUpdate(state) => handler.on_mental_state_update(state),
        PushEvent::MembersUpdate(members) => handler.on_members_update(members),
        PushEvent::CofrontUpdate(member) => handler.on_cofront_update(member),
        PushEvent::ForceRefresh { message } => handler.on_force_refresh(message),
        PushEvent::Unknown { kind } => debug!(kind = %kind, "ignoring unknown push event"),
    }
}

/// Counters kept by the dispatcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub accepted: u64,
    pub dropped: u64,
    pub unknown: u64,
}

/// Turns raw frames into envelopes, dropping what cannot be used.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    stats: DispatchStats,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Decode a frame. Malformed frames and unknown kinds yield `None`.
    pub fn accept(&mut self, text: &str) -> Option<Envelope> {
        match decode_frame(text) {
            Ok(Envelope {
                event: PushEvent::Unknown { kind },
                ..
            }) => {
                self.stats.unknown += 1;
                debug!(kind = %kind, "unknown push event kind");
                None
            }
            Ok(envelope) => {
                self.stats.accepted += 1;
                debug!(event_type = envelope.event.event_type(), "push event");
                Some(envelope)
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!(error = %e, kind = e.error_kind(), "dropping malformed frame");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dough_core::{MemberId, MentalLevel};
    use serde_json::json;

    fn frame(kind: &str, data: Value) -> String {
        json!({"type": kind, "timestamp": "2025-03-01T10:00:00.000001", "data": data}).to_string()
    }

    #[test]
    fn fronting_update_from_pluralkit_shape() {
        let env = decode_frame(&frame(
            "fronting_update",
            json!({"timestamp": "2025-03-01T09:59:00Z", "members": [{"id": "a", "name": "Alex"}, {"id": "b", "name": "Sam"}]}),
        ))
        .unwrap();
        assert!(env.sent_at.is_some());
        let PushEvent::FrontingUpdate(entry) = env.event else {
            panic!("wrong event");
        };
        assert_eq!(entry.members, vec![MemberId::from_raw("a"), MemberId::from_raw("b")]);
        assert!(entry.timestamp.is_some());
    }

    #[test]
    fn fronting_update_accepts_bare_id_list() {
        let env = decode_frame(&frame("fronting_update", json!(["a", "b"]))).unwrap();
        assert_eq!(
            env.event,
            PushEvent::FrontingUpdate(FrontingEntry::new(vec![
                MemberId::from_raw("a"),
                MemberId::from_raw("b")
            ]))
        );
    }

    #[test]
    fn empty_fronting_payload_is_empty_entry() {
        for data in [Value::Null, json!({})] {
            let env = decode_frame(&frame("fronting_update", data)).unwrap();
            assert_eq!(env.event, PushEvent::FrontingUpdate(FrontingEntry::default()));
        }
    }

    #[test]
    fn members_update_wrapped_or_bare() {
        let wrapped = decode_frame(&frame(
            "members_update",
            json!({"members": [{"id": "a", "name": "Alex"}, {"oops": true}]}),
        ))
        .unwrap();
        let PushEvent::MembersUpdate(list) = wrapped.event else {
            panic!("wrong event");
        };
        assert_eq!(list.len(), 1);

        let bare = decode_frame(&frame("members_update", json!([]))).unwrap();
        assert_eq!(bare.event, PushEvent::MembersUpdate(vec![]));
    }

    #[test]
    fn members_update_without_list_is_rejected() {
        let err = decode_frame(&frame("members_update", json!({"count": 3}))).unwrap_err();
        assert_eq!(err.error_kind(), "invalid_shape");
    }

    #[test]
    fn mental_state_update() {
        let env = decode_frame(&frame(
            "mental_state_update",
            json!({"level": "unstable", "notes": "rough day", "updated_at": "2025-03-01T10:00:00Z"}),
        ))
        .unwrap();
        let PushEvent::MentalStateUpdate(Some(state)) = env.event else {
            panic!("wrong event");
        };
        assert_eq!(state.level, MentalLevel::Unstable);

        let empty = decode_frame(&frame("mental_state_update", Value::Null)).unwrap();
        assert_eq!(empty.event, PushEvent::MentalStateUpdate(None));
    }

    #[test]
    fn cofront_update_unwraps_record() {
        let env = decode_frame(&frame(
            "cofront_update",
            json!({"cofront": {"id": "duo", "name": "Duo", "is_cofront": true, "component_members": ["a", "b"]}}),
        ))
        .unwrap();
        let PushEvent::CofrontUpdate(member) = env.event else {
            panic!("wrong event");
        };
        assert!(member.is_cofront());
        assert_eq!(member.component_members.len(), 2);
    }

    #[test]
    fn force_refresh_carries_message() {
        let env = decode_frame(&frame("force_refresh", json!({"message": "Admin initiated refresh"}))).unwrap();
        assert_eq!(
            env.event,
            PushEvent::ForceRefresh {
                message: Some("Admin initiated refresh".into())
            }
        );
    }

    #[test]
    fn malformed_frames() {
        assert!(matches!(decode_frame("pong"), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode_frame(r#"{"data": {}}"#),
            Err(DecodeError::MissingField("type"))
        ));
        assert!(matches!(decode_frame("[1,2]"), Err(DecodeError::Json(_))));
    }

    #[test]
    fn dispatcher_counts_and_filters() {
        let mut dispatcher = EventDispatcher::new();
        assert!(dispatcher.accept(&frame("fronting_update", json!({}))).is_some());
        assert!(dispatcher.accept(&frame("typing_indicator", json!({}))).is_none());
        assert!(dispatcher.accept("{not json").is_none());
        assert_eq!(
            dispatcher.stats(),
            DispatchStats {
                accepted: 1,
                dropped: 1,
                unknown: 1
            }
        );
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<&'static str>,
    }

    impl PushHandler for Recorder {
        fn on_fronting_update(&mut self, _: FrontingEntry) {
            self.calls.push("fronting");
        }
        fn on_mental_state_update(&mut self, _: Option<MentalState>) {
            self.calls.push("mental");
        }
        fn on_members_update(&mut self, _: Vec<Member>) {
            self.calls.push("members");
        }
        fn on_cofront_update(&mut self, _: Member) {
            self.calls.push("cofront");
        }
        fn on_force_refresh(&mut self, _: Option<String>) {
            self.calls.push("refresh");
        }
    }

    #[test]
    fn dispatch_routes_each_kind_once() {
        let mut rec = Recorder::default();
        dispatch(PushEvent::MembersUpdate(vec![]), &mut rec);
        dispatch(PushEvent::FrontingUpdate(FrontingEntry::default()), &mut rec);
        dispatch(PushEvent::Unknown { kind: "x".into() }, &mut rec);
        dispatch(PushEvent::ForceRefresh { message: None }, &mut rec);
        assert_eq!(rec.calls, vec!["members", "fronting", "refresh"]);
    }
}
