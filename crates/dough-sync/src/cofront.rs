use chrono::{DateTime, Utc};

use dough_core::{FrontingEntry, Member, MemberId};

/// Resolves member references to records.
pub trait MemberLookup {
    fn lookup(&self, id: &MemberId) -> Option<&Member>;
}

impl MemberLookup for [Member] {
    fn lookup(&self, id: &MemberId) -> Option<&Member> {
        self.iter().find(|m| &m.id == id)
    }
}

impl MemberLookup for Vec<Member> {
    fn lookup(&self, id: &MemberId) -> Option<&Member> {
        self.as_slice().lookup(id)
    }
}

/// The cofront a fronter was expanded from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CofrontOrigin {
    pub id: MemberId,
    pub name: String,
    pub display_name: Option<String>,
}

impl CofrontOrigin {
    fn of(member: &Member) -> Self {
        Self {
            id: member.id.clone(),
            name: member.name.clone(),
            display_name: member.display_name.clone(),
        }
    }

    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => &self.name,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExpandedFronter {
    pub member: Member,
    pub from_cofront: Option<CofrontOrigin>,
}

impl ExpandedFronter {
    pub fn is_from_cofront(&self) -> bool {
        self.from_cofront.is_some()
    }
}

/// Fronters with every cofront replaced by its components.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpandedFrontingView {
    pub fronters: Vec<ExpandedFronter>,
    pub includes_cofront: bool,
    pub switched_at: Option<DateTime<Utc>>,
}

impl ExpandedFrontingView {
    pub fn len(&self) -> usize {
        self.fronters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fronters.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.fronters.iter().map(|f| f.member.label()).collect()
    }
}

/// Flatten cofronts in `entry` into their component members.
///
/// Expansion is one level deep: a component that is itself a cofront is
/// emitted as-is. References that do not resolve are skipped. A cofront
/// whose components are empty or all unknown is emitted unchanged so it
/// never disappears from the view. `includes_cofront` is set whenever a
/// top-level fronter is a cofront, expanded or not.
pub fn expand<L: MemberLookup + ?Sized>(entry: &FrontingEntry, lookup: &L) -> ExpandedFrontingView {
    let mut fronters = Vec::with_capacity(entry.members.len());
    let mut includes_cofront = false;

    for id in &entry.members {
        let Some(member) = lookup.lookup(id) else {
            tracing::debug!(member_id = %id, "fronting reference not in member list");
            continue;
        };

        if member.is_cofront() {
            includes_cofront = true;
            let origin = CofrontOrigin::of(member);
            let components: Vec<_> = member
                .component_members
                .iter()
                .filter_map(|cid| lookup.lookup(cid))
                .map(|c| ExpandedFronter {
                    member: c.clone(),
                    from_cofront: Some(origin.clone()),
                })
                .collect();
            if !components.is_empty() {
                fronters.extend(components);
                continue;
            }
        }

        fronters.push(ExpandedFronter {
            member: member.clone(),
            from_cofront: None,
        });
    }

    ExpandedFrontingView {
        fronters,
        includes_cofront,
        switched_at: entry.timestamp,
    }
}
