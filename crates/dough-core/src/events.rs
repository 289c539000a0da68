use chrono::{DateTime, Utc};

use crate::model::{FrontingEntry, Member, MentalState};

/// Inbound push events after decoding. Each variant carries a full
/// replacement for the aggregate it targets.
#[derive(Clone, Debug, PartialEq)]
pub enum PushEvent {
    FrontingUpdate(FrontingEntry),
    /// `None` means the server pushed an empty payload; the current state stays.
    MentalStateUpdate(Option<MentalState>),
    MembersUpdate(Vec<Member>),
    /// A dynamic cofront was created or changed.
    CofrontUpdate(Member),
    ForceRefresh { message: Option<String> },
    /// A kind this client does not understand yet.
    Unknown { kind: String },
}

impl PushEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::FrontingUpdate(_) => "fronting_update",
            Self::MentalStateUpdate(_) => "mental_state_update",
            Self::MembersUpdate(_) => "members_update",
            Self::CofrontUpdate(_) => "cofront_update",
            Self::ForceRefresh { .. } => "force_refresh",
            Self::Unknown { kind } => kind,
        }
    }
}

/// A decoded frame together with the server's send time.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub event: PushEvent,
    pub sent_at: Option<DateTime<Utc>>,
}
