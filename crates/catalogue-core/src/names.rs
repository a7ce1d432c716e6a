//! Person-name matching between dataset entries and scraped author names.
//!
//! Names are folded to lower-case ASCII tokens before comparison. A match is
//! reported together with the rule that produced it so that low-confidence
//! merges (surname only) can be told apart from exact ones downstream.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// Common surname prefixes (case-insensitive).
static SURNAME_PREFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "van", "von", "de", "del", "della", "di", "da", "al", "el", "la", "le", "ben", "ibn",
        "mac", "mc", "o", "du", "der", "ter",
    ]
    .into_iter()
    .collect()
});

/// Name suffixes to strip.
static NAME_SUFFIXES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["jr", "sr", "ii", "iii", "iv", "v"].into_iter().collect());

/// How two names were found to refer to the same person, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Exact,
    Substring,
    TokenOverlap,
    LastName,
}

impl MatchConfidence {
    /// Whether this tier counts as a match for [`names_match`].
    pub fn is_strong(self) -> bool {
        !matches!(self, MatchConfidence::LastName)
    }
}

/// Tunables for the token-overlap rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRules {
    /// How many tokens of the shorter name may be missing from the longer one.
    pub token_overlap_slack: usize,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            token_overlap_slack: 1,
        }
    }
}

/// Fold a name to lower-case ASCII words.
///
/// Diacritics are stripped via NFKD, `&` separates co-authors, and any other
/// punctuation is deleted in place (so `"Tse-tung"` becomes `"tsetung"`).
pub fn normalize_name(name: &str) -> String {
    // Letters with no NFKD decomposition to ASCII
    let name = name
        .replace('ł', "l")
        .replace('Ł', "L")
        .replace(['ø', 'Ø'], "o")
        .replace('ß', "ss")
        .replace(['æ', 'Æ'], "ae")
        .replace(['œ', 'Œ'], "oe")
        .replace(['đ', 'Đ'], "d")
        .replace('ı', "i");

    let folded: String = name.nfkd().filter(|c| c.is_ascii()).collect();

    let mut cleaned = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c == '&' || c.is_ascii_whitespace() {
            cleaned.push(' ');
        } else if c.is_ascii_alphanumeric() {
            cleaned.push(c.to_ascii_lowercase());
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decide whether two names denote the same person, with default rules.
pub fn names_match(a: &str, b: &str) -> bool {
    names_match_with(a, b, &MatchRules::default())
}

/// Decide whether two names denote the same person.
///
/// True for exact, substring and token-overlap matches. Surname-only
/// agreement is not enough; use [`classify_names`] to see that tier.
pub fn names_match_with(a: &str, b: &str, rules: &MatchRules) -> bool {
    classify_names_with(a, b, rules).is_some_and(MatchConfidence::is_strong)
}

/// Classify how two names match, with default rules.
pub fn classify_names(a: &str, b: &str) -> Option<MatchConfidence> {
    classify_names_with(a, b, &MatchRules::default())
}

/// Classify how two names match, returning the first rule that fires.
pub fn classify_names_with(a: &str, b: &str, rules: &MatchRules) -> Option<MatchConfidence> {
    let norm_a = normalize_name(a);
    let norm_b = normalize_name(b);

    if norm_a.is_empty() || norm_b.is_empty() {
        return None;
    }

    if norm_a == norm_b {
        return Some(MatchConfidence::Exact);
    }

    if norm_a.contains(norm_b.as_str()) || norm_b.contains(norm_a.as_str()) {
        return Some(MatchConfidence::Substring);
    }

    let tokens_a: HashSet<&str> = norm_a.split(' ').collect();
    let tokens_b: HashSet<&str> = norm_b.split(' ').collect();

    // Single-token names only match exactly or by containment
    if tokens_a.len() >= 2 && tokens_b.len() >= 2 {
        let shared = tokens_a.intersection(&tokens_b).count();
        let needed = tokens_a
            .len()
            .min(tokens_b.len())
            .saturating_sub(rules.token_overlap_slack);
        if shared > 0 && shared >= needed {
            return Some(MatchConfidence::TokenOverlap);
        }
    }

    let last_a = last_name(a);
    if !last_a.is_empty() && last_a == last_name(b) {
        return Some(MatchConfidence::LastName);
    }

    None
}

/// Extract the normalized surname, handling "Surname, Given" order,
/// multi-word surnames ("de la Cruz") and suffixes ("Jr.").
pub fn last_name(name: &str) -> String {
    let name = name.trim();

    if let Some((surname, _)) = name.split_once(',') {
        return normalize_name(surname);
    }

    let normalized = normalize_name(name);
    let parts: Vec<&str> = normalized.split_whitespace().collect();
    get_surname_from_parts(&parts)
}

/// Extract surname from name parts, handling multi-word surnames and suffixes.
fn get_surname_from_parts(parts: &[&str]) -> String {
    let mut parts = parts.to_vec();
    while parts.len() >= 2 && parts.last().is_some_and(|p| NAME_SUFFIXES.contains(p)) {
        parts.pop();
    }

    let Some(last) = parts.last() else {
        return String::new();
    };

    // Three-part surnames like "de la cruz"
    if parts.len() >= 4 && SURNAME_PREFIXES.contains(parts[parts.len() - 3]) {
        return parts[parts.len() - 3..].join(" ");
    }

    // Two-part surnames like "van gogh"
    if parts.len() >= 3 && SURNAME_PREFIXES.contains(parts[parts.len() - 2]) {
        return parts[parts.len() - 2..].join(" ");
    }

    last.to_string()
}

/// Lower-case ASCII slug: `"José Martí"` → `"jose-marti"`.
pub fn slugify(name: &str) -> String {
    let folded: String = name.nfkd().filter(|c| c.is_ascii()).collect();
    let mut slug = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for c in folded.chars() {
        if matches!(c, '\'' | '`') {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
