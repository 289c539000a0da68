use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ids::MemberId;

/// Longest status text the site displays.
pub const STATUS_TEXT_MAX_CHARS: usize = 100;

/// Canonical names of placeholder members and the label the site shows for each.
pub const SPECIAL_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("answer", "Answer Machine"),
    ("system", "Unsure"),
    ("sleeping", "I am sleeping"),
];

/// An identity record of the system.
///
/// Cofront members reference their components by id only; the member
/// collection owns every record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronouns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, rename = "is_private", deserialize_with = "null_as_default")]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Privacy>,
    #[serde(default, rename = "is_cofront", deserialize_with = "null_as_default")]
    pub cofront: bool,
    #[serde(default, rename = "is_special", deserialize_with = "null_as_default")]
    pub special: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, deserialize_with = "member_refs")]
    pub component_members: Vec<MemberId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub component_avatars: Vec<String>,
    #[serde(default, deserialize_with = "lenient_status", skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
}

/// Upstream privacy block; only `visibility` matters here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privacy {
    #[serde(default)]
    pub visibility: Option<String>,
}

impl Member {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: MemberId::from_raw(id),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Display name when set and non-blank, else the canonical name.
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => &self.name,
        }
    }

    pub fn is_cofront(&self) -> bool {
        self.cofront
    }

    pub fn is_private(&self) -> bool {
        self.private
            || self
                .privacy
                .as_ref()
                .and_then(|p| p.visibility.as_deref())
                .is_some_and(|v| v.eq_ignore_ascii_case("private"))
    }

    /// Placeholder members are flagged by the server; older payloads only
    /// carry the canonical name.
    pub fn is_special(&self) -> bool {
        if self.special {
            return true;
        }
        let canonical = self.original_name.as_deref().unwrap_or(&self.name);
        SPECIAL_DISPLAY_NAMES.iter().any(|(name, _)| *name == canonical)
    }

    pub fn is_untagged(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Short per-member annotation. Absence means "no status set".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStatus {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl MemberStatus {
    /// Parse a status value, truncating over-long text. Anything that is not
    /// a status object yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        let mut status: MemberStatus = serde_json::from_value(value).ok()?;
        if status.text.chars().count() > STATUS_TEXT_MAX_CHARS {
            status.text = status.text.chars().take(STATUS_TEXT_MAX_CHARS).collect();
        }
        Some(status)
    }
}

/// Who is fronting right now. Holds references only; records are looked up
/// in the member collection at expansion time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontingEntry {
    #[serde(default, deserialize_with = "member_refs")]
    pub members: Vec<MemberId>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl FrontingEntry {
    pub fn new(members: Vec<MemberId>) -> Self {
        Self {
            members,
            timestamp: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MentalLevel {
    Safe,
    Unstable,
    Idealizing,
    SelfHarming,
    HighlyAtRisk,
    /// A level this client does not know yet; kept verbatim.
    Other(String),
}

impl MentalLevel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Safe => "safe",
            Self::Unstable => "unstable",
            Self::Idealizing => "idealizing",
            Self::SelfHarming => "self-harming",
            Self::HighlyAtRisk => "highly at risk",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for MentalLevel {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "safe" => Self::Safe,
            "unstable" => Self::Unstable,
            "idealizing" => Self::Idealizing,
            "self-harming" => Self::SelfHarming,
            "highly at risk" => Self::HighlyAtRisk,
            _ => Self::Other(s),
        }
    }
}

impl From<MentalLevel> for String {
    fn from(level: MentalLevel) -> Self {
        level.as_str().to_string()
    }
}

impl std::fmt::Display for MentalLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System-wide mental state. Exactly one is current; updates replace it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentalState {
    pub level: MentalLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Decode a list of member records one by one. Records that fail to decode
/// are skipped; the count of skipped records is returned alongside.
pub fn decode_members(values: Vec<Value>) -> (Vec<Member>, usize) {
    let total = values.len();
    let members: Vec<Member> = values
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    let skipped = total - members.len();
    (members, skipped)
}

/// Parse RFC 3339, falling back to a naive ISO timestamp read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Accepts bare id strings or objects carrying an `id`; anything else is dropped.
fn member_refs<'de, D>(d: D) -> Result<Vec<MemberId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(d)?.unwrap_or_default();
    Ok(raw.iter().filter_map(member_ref).collect())
}

fn member_ref(value: &Value) -> Option<MemberId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(MemberId::from_raw(s.as_str())),
        Value::Object(map) => map
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(MemberId::from_raw),
        _ => None,
    }
}

fn lenient_timestamp<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(d)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

fn lenient_status<'de, D>(d: D) -> Result<Option<MemberStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(d)?;
    Ok(raw.and_then(MemberStatus::from_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn member_decodes_minimal_record() {
        let m: Member = serde_json::from_value(json!({"id": "abcde", "name": "Alex"})).unwrap();
        assert_eq!(m.id.as_str(), "abcde");
        assert_eq!(m.label(), "Alex");
        assert!(m.tags.is_empty());
        assert!(!m.is_cofront());
        assert!(m.status.is_none());
    }

    #[test]
    fn member_null_tags_are_untagged() {
        let m: Member =
            serde_json::from_value(json!({"id": "a", "name": "Alex", "tags": null})).unwrap();
        assert!(m.is_untagged());
    }

    #[test]
    fn label_prefers_display_name() {
        let mut m = Member::new("a", "alex");
        m.display_name = Some("Alex ✨".into());
        assert_eq!(m.label(), "Alex ✨");
        m.display_name = Some("   ".into());
        assert_eq!(m.label(), "alex");
    }

    #[test]
    fn cofront_components_accept_ids_and_records() {
        let m: Member = serde_json::from_value(json!({
            "id": "duo",
            "name": "Duo",
            "is_cofront": true,
            "component_members": ["a", {"id": "b", "name": "Sam"}, 42, ""]
        }))
        .unwrap();
        assert!(m.is_cofront());
        assert_eq!(
            m.component_members,
            vec![MemberId::from_raw("a"), MemberId::from_raw("b")]
        );
    }

    #[test]
    fn special_by_flag_or_canonical_name() {
        let flagged: Member = serde_json::from_value(json!({
            "id": "s", "name": "whatever", "is_special": true
        }))
        .unwrap();
        assert!(flagged.is_special());

        let mut by_name = Member::new("z", "sleeping");
        by_name.display_name = Some("I am sleeping".into());
        assert!(by_name.is_special());

        assert!(!Member::new("a", "Alex").is_special());
    }

    #[test]
    fn privacy_visibility_marks_private() {
        let m: Member = serde_json::from_value(json!({
            "id": "p", "name": "Pri", "privacy": {"visibility": "private"}
        }))
        .unwrap();
        assert!(m.is_private());
    }

    #[test]
    fn status_text_is_truncated() {
        let long = "x".repeat(150);
        let m: Member = serde_json::from_value(json!({
            "id": "a", "name": "Alex",
            "status": {"text": long, "emoji": "🌸", "last_updated": "2025-03-01T10:00:00+00:00"}
        }))
        .unwrap();
        let status = m.status.unwrap();
        assert_eq!(status.text.chars().count(), STATUS_TEXT_MAX_CHARS);
        assert_eq!(status.emoji.as_deref(), Some("🌸"));
        assert!(status.last_updated.is_some());
    }

    #[test]
    fn malformed_status_is_absent() {
        let m: Member = serde_json::from_value(json!({
            "id": "a", "name": "Alex", "status": "busy"
        }))
        .unwrap();
        assert!(m.status.is_none());
    }

    #[test]
    fn fronting_entry_reduces_records_to_ids() {
        let entry: FrontingEntry = serde_json::from_value(json!({
            "timestamp": "2025-03-01T10:00:00.123456Z",
            "members": [{"id": "a", "name": "Alex"}, "b"]
        }))
        .unwrap();
        assert_eq!(entry.members.len(), 2);
        assert!(entry.timestamp.is_some());
    }

    #[test]
    fn fronting_entry_from_empty_object() {
        let entry: FrontingEntry = serde_json::from_value(json!({})).unwrap();
        assert!(entry.is_empty());
    }

    #[test]
    fn mental_level_known_and_unknown() {
        let state: MentalState = serde_json::from_value(json!({
            "level": "highly at risk", "notes": "call someone"
        }))
        .unwrap();
        assert_eq!(state.level, MentalLevel::HighlyAtRisk);

        let odd: MentalState = serde_json::from_value(json!({"level": "sparkly"})).unwrap();
        assert_eq!(odd.level, MentalLevel::Other("sparkly".into()));
        assert_eq!(serde_json::to_value(&odd.level).unwrap(), json!("sparkly"));
    }

    #[test]
    fn decode_members_skips_bad_records() {
        let (members, skipped) = decode_members(vec![
            json!({"id": "a", "name": "Alex"}),
            json!({"name": "no id"}),
            json!("junk"),
            json!({"id": "b", "name": "Sam"}),
        ]);
        assert_eq!(members.len(), 2);
        assert_eq!(skipped, 2);
        assert_eq!(members[1].name, "Sam");
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let ts = parse_timestamp("2025-03-01T10:00:00.5").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-03-01T10:00:00.500+00:00");
        assert!(parse_timestamp("yesterday").is_none());
    }
}
