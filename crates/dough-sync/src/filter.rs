use dough_core::Member;

/// Tag constraint on the member list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagFilter {
    /// Exact, case-sensitive tag match.
    Tag(String),
    /// Members with no tags at all.
    Untagged,
}

impl TagFilter {
    /// `"untagged"` is the sentinel; anything else names a tag.
    pub fn parse(raw: &str) -> Self {
        if raw == "untagged" {
            Self::Untagged
        } else {
            Self::Tag(raw.to_string())
        }
    }

    pub fn matches(&self, member: &Member) -> bool {
        match self {
            Self::Tag(tag) => member.tags.iter().any(|t| t == tag),
            Self::Untagged => member.is_untagged(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterState {
    pub search: String,
    pub tag: Option<TagFilter>,
    /// Also search pronouns.
    pub match_pronouns: bool,
}

impl FilterState {
    pub fn new(search: impl Into<String>, tag: Option<TagFilter>) -> Self {
        Self {
            search: search.into(),
            tag,
            match_pronouns: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty() || self.tag.is_some()
    }
}

/// The shown label is searched, not a canonical name behind a display name.
fn matches_search(member: &Member, needle: &str, match_pronouns: bool) -> bool {
    if needle.is_empty() {
        return true;
    }
    member.label().to_lowercase().contains(needle)
        || member.tags.iter().any(|t| t.to_lowercase().contains(needle))
        || (match_pronouns
            && member
                .pronouns
                .as_deref()
                .is_some_and(|p| p.to_lowercase().contains(needle)))
}

/// Members matching both the search text and the tag filter, in input order.
pub fn filter(members: &[Member], state: &FilterState) -> Vec<Member> {
    let needle = state.search.trim().to_lowercase();
    members
        .iter()
        .filter(|m| matches_search(m, &needle, state.match_pronouns))
        .filter(|m| state.tag.as_ref().map_or(true, |t| t.matches(m)))
        .cloned()
        .collect()
}

/// Whether a member belongs on the public grid.
pub fn is_grid_visible(member: &Member) -> bool {
    !member.is_private() && !member.is_cofront() && !member.is_special()
}

/// Drop private, cofront and special members.
pub fn grid_view(members: &[Member]) -> Vec<Member> {
    members.iter().filter(|m| is_grid_visible(m)).cloned().collect()
}
