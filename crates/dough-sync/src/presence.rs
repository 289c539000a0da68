use std::collections::{BTreeSet, HashMap};

use dough_core::{FrontingEntry, Member, MemberId, MentalState};
use icu_collator::{Collator, CollatorOptions, Strength};

use crate::cofront::MemberLookup;

/// Sort members by label using root-locale Unicode collation at secondary
/// strength: accents count, case does not. Stable, so labels that differ
/// only by case keep their input order.
pub fn collate(members: &mut [Member]) {
    let mut options = CollatorOptions::new();
    options.strength = Some(Strength::Secondary);
    match Collator::try_new(&Default::default(), options) {
        Ok(collator) => members.sort_by(|a, b| collator.compare(a.label(), b.label())),
        Err(error) => {
            tracing::warn!(%error, "collator unavailable, sorting by lowercase label");
            members.sort_by_cached_key(|m| m.label().to_lowercase());
        }
    }
}

/// Authoritative client-side copy of members, fronting and mental state.
///
/// Every mutation is a whole-aggregate replacement and reports whether the
/// stored value actually changed, so callers can skip recomputing views.
#[derive(Debug, Default)]
pub struct PresenceModel {
    members: Vec<Member>,
    index: HashMap<MemberId, usize>,
    fronting: FrontingEntry,
    mental_state: Option<MentalState>,
}

impl PresenceModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn fronting(&self) -> &FrontingEntry {
        &self.fronting
    }

    pub fn mental_state(&self) -> Option<&MentalState> {
        self.mental_state.as_ref()
    }

    pub fn member(&self, id: &MemberId) -> Option<&Member> {
        self.index.get(id).map(|&i| &self.members[i])
    }

    /// Replace the whole member list. An empty list clears it.
    pub fn replace_members(&mut self, mut members: Vec<Member>) -> bool {
        collate(&mut members);
        if members == self.members {
            return false;
        }
        self.index = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();
        self.members = members;
        true
    }

    pub fn replace_fronting(&mut self, entry: FrontingEntry) -> bool {
        if entry == self.fronting {
            return false;
        }
        self.fronting = entry;
        true
    }

    /// `None` keeps the current state.
    pub fn replace_mental_state(&mut self, state: Option<MentalState>) -> bool {
        match state {
            Some(state) if self.mental_state.as_ref() != Some(&state) => {
                self.mental_state = Some(state);
                true
            }
            _ => false,
        }
    }

    /// Insert or replace a single record (matched by id), then re-collate.
    pub fn upsert_member(&mut self, member: Member) -> bool {
        let mut next = self.members.clone();
        match self.index.get(&member.id) {
            Some(&i) => next[i] = member,
            None => next.push(member),
        }
        self.replace_members(next)
    }

    /// Drop everything, as after a forced reload.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Look a member up by id, or by name or display name ignoring case.
    pub fn find_member(&self, identifier: &str) -> Option<&Member> {
        if let Some(m) = self.member(&MemberId::from_raw(identifier)) {
            return Some(m);
        }
        let wanted = identifier.trim().to_lowercase();
        self.members.iter().find(|m| {
            m.name.to_lowercase() == wanted
                || m
                    .display_name
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase() == wanted)
        })
    }

    /// Distinct tags across all members, sorted.
    pub fn all_tags(&self) -> Vec<String> {
        self.members
            .iter()
            .flat_map(|m| m.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl MemberLookup for PresenceModel {
    fn lookup(&self, id: &MemberId) -> Option<&Member> {
        self.member(id)
    }
}
