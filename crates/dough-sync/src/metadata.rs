use dough_settings::MetadataSettings;

use crate::cofront::ExpandedFrontingView;

/// Open Graph and Twitter card values for the page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocialTags {
    pub site_name: String,
    pub title: String,
    pub description: String,
    pub image: String,
    pub twitter_card: String,
    pub theme_color: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: String,
    pub favicon: String,
    pub social: SocialTags,
}

/// Where document metadata ends up (a browser document, a log, a test buffer).
pub trait MetadataSink: Send {
    fn set_title(&mut self, title: &str);
    fn set_favicon(&mut self, href: &str);
    fn set_social_tags(&mut self, tags: &SocialTags);
}

/// Normalise a colour to `#RRGGBB`, accepting an optional `#` and the
/// three-digit shorthand. Anything else yields `fallback`.
pub fn normalize_hex(color: Option<&str>, fallback: &str) -> String {
    let Some(raw) = color.map(str::trim) else {
        return fallback.to_string();
    };
    let digits = raw.strip_prefix('#').unwrap_or(raw);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return fallback.to_string();
    }
    match digits.len() {
        6 => format!("#{}", digits.to_ascii_uppercase()),
        3 => {
            let doubled: String = digits.chars().flat_map(|c| [c, c]).collect();
            format!("#{}", doubled.to_ascii_uppercase())
        }
        _ => fallback.to_string(),
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

/// Title text for the current fronters, or `None` when nobody is fronting.
pub fn fronting_title(view: &ExpandedFrontingView) -> Option<String> {
    match view.fronters.as_slice() {
        [] => None,
        [only] => {
            let mut title = format!("Currently Fronting: {}", only.member.label());
            if let Some(origin) = &only.from_cofront {
                title.push_str(&format!(" (part of {})", origin.label()));
            }
            Some(title)
        }
        many => {
            let mut names = many
                .iter()
                .take(3)
                .map(|f| f.member.label())
                .collect::<Vec<_>>()
                .join(", ");
            if many.len() > 3 {
                names.push_str(&format!(" +{} more", many.len() - 3));
            }
            let mut title = format!("Currently Fronting: {names}");
            if view.includes_cofront {
                title.push_str(" (including cofronts)");
            }
            Some(title)
        }
    }
}

/// Pure projection of the expanded fronting view onto document metadata.
pub fn project(view: &ExpandedFrontingView, defaults: &MetadataSettings) -> DocumentMetadata {
    let title = fronting_title(view).unwrap_or_else(|| defaults.default_title.clone());
    let first = view.fronters.first().map(|f| &f.member);

    let image = first
        .and_then(|m| {
            non_blank(m.avatar_url.as_deref())
                .or_else(|| non_blank(m.component_avatars.first().map(String::as_str)))
        })
        .unwrap_or(defaults.default_avatar.as_str())
        .to_string();

    let description = match view.fronters.as_slice() {
        [only] => non_blank(only.member.description.as_deref())
            .unwrap_or(defaults.default_description.as_str())
            .to_string(),
        _ => defaults.default_description.clone(),
    };

    let theme_color = normalize_hex(
        first.and_then(|m| m.color.as_deref()),
        &defaults.default_theme_color,
    );

    DocumentMetadata {
        favicon: image.clone(),
        social: SocialTags {
            site_name: defaults.site_name.clone(),
            title: title.clone(),
            description,
            image,
            twitter_card: "summary".to_string(),
            theme_color,
        },
        title,
    }
}

/// Pushes projected metadata into a sink, writing only the parts that
/// changed since the last sync.
pub struct MetadataSynchronizer<S> {
    sink: S,
    defaults: MetadataSettings,
    applied: Option<DocumentMetadata>,
}

impl<S: MetadataSink> MetadataSynchronizer<S> {
    pub fn new(sink: S, defaults: MetadataSettings) -> Self {
        Self {
            sink,
            defaults,
            applied: None,
        }
    }

    /// Returns whether anything was written.
    pub fn sync(&mut self, view: &ExpandedFrontingView) -> bool {
        let next = project(view, &self.defaults);
        let prev = self.applied.as_ref();
        let mut wrote = false;

        if prev.map(|p| &p.title) != Some(&next.title) {
            self.sink.set_title(&next.title);
            wrote = true;
        }
        if prev.map(|p| &p.favicon) != Some(&next.favicon) {
            self.sink.set_favicon(&next.favicon);
            wrote = true;
        }
        if prev.map(|p| &p.social) != Some(&next.social) {
            self.sink.set_social_tags(&next.social);
            wrote = true;
        }

        self.applied = Some(next);
        wrote
    }

    pub fn current(&self) -> Option<&DocumentMetadata> {
        self.applied.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
