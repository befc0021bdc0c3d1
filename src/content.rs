//! Card content model: validated once at construction, never re-checked
//! at render time.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum number of cards a content set may hold.
pub const MAX_CARDS: usize = 8;

/// Icon used when a requested icon token fails normalization.
pub const FALLBACK_ICON: &str = "article";

/// The only tag literals `desc` may contain. Anything else is rejected.
const ALLOWED_DESC_TAGS: [&str; 5] = ["<strong>", "</strong>", "<code>", "</code>", "<br/>"];

/// One card: a title, a short description limited to a tiny HTML subset,
/// and an icon token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub desc: String,
    pub icon: String,
}

impl Card {
    /// Build a card, enforcing the field invariants.
    ///
    /// `title` must be non-empty, `desc` may only use `<strong>`, `<code>`
    /// and `<br/>`, and `icon` must match the restricted token charset.
    pub fn new(title: &str, desc: &str, icon: &str) -> Result<Self> {
        if title.trim().is_empty() {
            return Err(Error::Validation("card title must not be empty".into()));
        }
        if let Some(tag) = first_disallowed_tag(desc) {
            return Err(Error::Validation(format!(
                "card desc contains disallowed tag '{}'",
                tag
            )));
        }
        if !is_valid_icon(icon) {
            return Err(Error::Validation(format!("invalid icon token '{}'", icon)));
        }
        Ok(Self {
            title: title.to_string(),
            desc: desc.to_string(),
            icon: icon.to_string(),
        })
    }
}

/// Structured content for one render: a main title plus 1..=8 cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardContent {
    pub main_title: String,
    pub cards: Vec<Card>,
}

impl CardContent {
    /// Build a content set, enforcing the 1..=8 card count and a non-empty
    /// main title. Card-level invariants are assumed to already hold (cards
    /// only exist via [`Card::new`]).
    pub fn new(main_title: &str, cards: Vec<Card>) -> Result<Self> {
        if main_title.trim().is_empty() {
            return Err(Error::Validation("main title must not be empty".into()));
        }
        if cards.is_empty() || cards.len() > MAX_CARDS {
            return Err(Error::Validation(format!(
                "card count must be between 1 and {}, got {}",
                MAX_CARDS,
                cards.len()
            )));
        }
        Ok(Self {
            main_title: main_title.to_string(),
            cards,
        })
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }
}

/// Restricted icon charset: lowercase ascii alphanumerics plus `_` and `-`.
pub fn is_valid_icon(icon: &str) -> bool {
    !icon.is_empty()
        && icon
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Normalize an icon token, silently substituting [`FALLBACK_ICON`] when the
/// token does not fit the charset. Used on the service ingest path, where a
/// malformed icon must never be a hard failure on its own.
pub fn normalize_icon(icon: &str) -> String {
    let trimmed = icon.trim().to_ascii_lowercase();
    if is_valid_icon(&trimmed) {
        trimmed
    } else {
        FALLBACK_ICON.to_string()
    }
}

/// Scan `desc` for any tag outside the permitted three; returns the first
/// offender, if any.
fn first_disallowed_tag(desc: &str) -> Option<String> {
    let mut rest = desc;
    while let Some(start) = rest.find('<') {
        let tail = &rest[start..];
        match tail.find('>') {
            Some(end) => {
                let tag = &tail[..=end];
                if !ALLOWED_DESC_TAGS.contains(&tag) {
                    return Some(tag.to_string());
                }
                rest = &tail[end + 1..];
            }
            // A bare '<' never closed cannot be classified; refuse it.
            None => return Some("<".to_string()),
        }
    }
    None
}
