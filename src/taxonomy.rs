/*!
 * Category taxonomy used to classify reviews.
 *
 * The taxonomy is a fixed, ordered list of named categories with
 * human-readable descriptions. Besides taxonomy categories the model may
 * answer with website names (e.g. `YouTube`); those are kept as extra labels
 * but never become the primary category of a review.
 */

use serde::{Deserialize, Serialize};

/// Label for positive feedback
pub const SATISFIED: &str = "Satisfied";

/// Catch-all label
pub const OTHER: &str = "Other";

/// Label recorded when classification failed for good
pub const UNCLASSIFIED: &str = "Unclassified";

/// Canonical spelling of commonly mentioned websites and the aliases the
/// model tends to produce for them
pub const WEBSITE_ALIASES: &[(&str, &[&str])] = &[
    ("YouTube", &["youtube", "youtube.com", "yt"]),
    ("Facebook", &["facebook", "fb", "facebook.com"]),
    ("Google", &["google", "google.com"]),
    ("Reddit", &["reddit", "reddit.com"]),
    ("Instagram", &["instagram", "ig", "instagram.com"]),
    ("Twitter", &["twitter", "x", "twitter.com", "x.com"]),
    ("TikTok", &["tiktok", "tiktok.com"]),
    ("Netflix", &["netflix", "netflix.com"]),
    ("Amazon", &["amazon", "amazon.com"]),
    ("WhatsApp", &["whatsapp", "whatsapp.com"]),
];

/// One named category with its description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub name: String,
    pub description: String,
}

impl CategoryDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Result of normalizing one label from a model answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    /// A taxonomy category, canonical spelling
    Category(String),
    /// A website name, canonical spelling
    Website(String),
}

impl Label {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Category(name) | Self::Website(name) => name,
        }
    }
}

/// Ordered set of categories with lookup helpers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    categories: Vec<CategoryDefinition>,
}

impl Taxonomy {
    pub fn new(categories: Vec<CategoryDefinition>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[CategoryDefinition] {
        &self.categories
    }

    /// Category names in taxonomy order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Case-insensitive lookup returning the canonical name
    pub fn canonical(&self, label: &str) -> Option<&str> {
        let wanted = label.trim();
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(wanted))
            .map(|c| c.name.as_str())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.canonical(label).is_some()
    }

    /// Map a raw label to a taxonomy category or website, or `None` when it
    /// is neither
    pub fn normalize(&self, raw: &str) -> Option<Label> {
        let label = raw
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '.' | '[' | ']'))
            .trim();
        if label.is_empty() {
            return None;
        }

        if let Some(name) = self.canonical(label) {
            return Some(Label::Category(name.to_string()));
        }

        let lowered = label.to_lowercase();
        for (canonical, aliases) in WEBSITE_ALIASES {
            if canonical.eq_ignore_ascii_case(label) || aliases.contains(&lowered.as_str()) {
                return Some(Label::Website((*canonical).to_string()));
            }
        }

        if is_website_label(label) {
            return Some(Label::Website(strip_domain_suffix(label)));
        }

        None
    }

    /// Lines of `Name: description` used in the classification prompt
    pub fn prompt_listing(&self) -> String {
        self.categories
            .iter()
            .map(|c| format!("{}: {}", c.name, c.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new(default_categories())
    }
}

/// Whether a label looks like a website name: starts upper-case, no spaces,
/// 2 to 20 characters of alphanumerics, dots and dashes
pub fn is_website_label(label: &str) -> bool {
    let len = label.chars().count();
    label.chars().next().is_some_and(|c| c.is_uppercase())
        && !label.contains(' ')
        && (2..=20).contains(&len)
        && label
            .chars()
            .filter(|c| *c != '.' && *c != '-')
            .all(|c| c.is_alphanumeric())
}

fn strip_domain_suffix(label: &str) -> String {
    const SUFFIXES: &[&str] = &[".com", ".org", ".net", ".io", ".co", ".tv"];
    let lowered = label.to_lowercase();
    for suffix in SUFFIXES {
        if lowered.ends_with(suffix) && label.len() > suffix.len() {
            return label[..label.len() - suffix.len()].to_string();
        }
    }
    label.to_string()
}

/// Categories shipped by default
pub fn default_categories() -> Vec<CategoryDefinition> {
    [
        ("Webcompat", "Website functionality or rendering problems. User may also report websites work in other browsers"),
        ("Slow", "General slowness or performance lag when using the browser"),
        ("Privacy", "Concerns about tracking, data collection, or permissions"),
        ("Policy", "Store or terms-of-service / content-policy issues"),
        ("Pageload", "Slow page-load times"),
        ("Audio", "Audio playback or recording problems"),
        ("Video", "Video playback or streaming problems"),
        ("Networking", "Connectivity, proxy, or offline-mode issues"),
        ("Battery", "Excessive battery drain or power use"),
        ("Memory", "High RAM usage or memory leaks"),
        ("Sync", "Account, bookmark, or settings sync failures"),
        ("Tabs", "Issues with tab reloading or tab performance, or any tab features"),
        ("Addons", "Anything negative related to addons or extensions"),
        ("Benchmark", "Performance test or benchmark comparisons"),
        ("Bookmarks", "Anything negative related to bookmarks"),
        ("Translations", "Automatic or manual page translation issues"),
        ("Crash", "Browser or tab crashes and hangs"),
        ("Scrolling", "Jumping, jittery, or non-smooth scrolling"),
        ("Stuttering", "Video or animation stutter / dropped frames"),
        ("Startup", "Slow launch or loading of browser itself"),
        ("UI", "User-interface layout or visual glitches"),
        ("Downloads", "Issues with downloading files or download manager"),
        ("Autofill", "Problems with password saving, autofill, or form filling"),
        ("Search", "Search engine, search bar, or address bar search issues"),
        ("History", "Browsing history problems or history management issues"),
        (SATISFIED, "Positive feedback / feature praise"),
        (OTHER, "Anything not covered by the above categories"),
    ]
    .into_iter()
    .map(|(name, description)| CategoryDefinition::new(name, description))
    .collect()
}
