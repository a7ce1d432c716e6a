//! Mapping dataset thinkers to candidate archive author pages.

use std::collections::HashMap;

use reqwest::Url;

use crate::fetch::PageSource;
use crate::html::parse_author_index;
use crate::model::{AuthorEntry, MatchTier, SourceMatch, ZeroWorksRecord};
use crate::names::{MatchConfidence, MatchRules, classify_names_with, last_name, normalize_name};
use crate::rate_limit::FetchError;

pub const ARCHIVE_INDEX_URL: &str = "https://www.marxists.org/archive/index.htm";

pub const NOTE_LAST_NAME_ONLY: &str = "Matched on last name only";
pub const NOTE_UNMATCHED: &str = "No entry located on index page";

/// Name key: normalized, with the spaces removed.
pub fn lookup_key(name: &str) -> String {
    normalize_name(name).replace(' ', "")
}

/// Author index entries keyed by full name and by last name.
#[derive(Debug, Clone, Default)]
pub struct AuthorLookup {
    entries: Vec<AuthorEntry>,
    by_name: HashMap<String, Vec<usize>>,
    by_last_name: HashMap<String, Vec<usize>>,
}

impl AuthorLookup {
    pub fn build(entries: Vec<AuthorEntry>) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_last_name: HashMap<String, Vec<usize>> = HashMap::new();

        for (i, entry) in entries.iter().enumerate() {
            let key = lookup_key(&entry.text);
            if key.is_empty() {
                continue;
            }
            by_name.entry(key).or_default().push(i);

            if normalize_name(&entry.text).split(' ').count() > 1 {
                let last = last_name(&entry.text).replace(' ', "");
                if !last.is_empty() {
                    by_last_name.entry(last).or_default().push(i);
                }
            }
        }

        Self {
            entries,
            by_name,
            by_last_name,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn collect(&self, indices: &[usize]) -> Vec<AuthorEntry> {
        indices
            .iter()
            .filter_map(|&i| self.entries.get(i).cloned())
            .collect()
    }

    /// Candidate author pages for `thinker`, with the tier they were found at.
    ///
    /// Tiers are tried in order: exact key, a Name Matcher scan over
    /// multi-word entries, then the last-name key.
    pub fn resolve(
        &self,
        thinker: &str,
        rules: &MatchRules,
    ) -> (MatchTier, Option<MatchConfidence>, Vec<AuthorEntry>) {
        let key = lookup_key(thinker);
        if key.is_empty() {
            return (MatchTier::Unmatched, None, Vec::new());
        }

        if let Some(hits) = self.by_name.get(&key) {
            return (
                MatchTier::Matched,
                Some(MatchConfidence::Exact),
                self.collect(hits),
            );
        }

        let mut best: Option<MatchConfidence> = None;
        let mut scanned = Vec::new();
        for entry in &self.entries {
            if normalize_name(&entry.text).split(' ').count() < 2 {
                continue;
            }
            if let Some(conf) = classify_names_with(&entry.text, thinker, rules)
                && conf.is_strong()
            {
                best = Some(best.map_or(conf, |b| b.min(conf)));
                scanned.push(entry.clone());
            }
        }
        if !scanned.is_empty() {
            return (MatchTier::Matched, best, scanned);
        }

        let last = last_name(thinker).replace(' ', "");
        if !last.is_empty() {
            let hits: Vec<usize> = self
                .by_last_name
                .get(&last)
                .into_iter()
                .chain(self.by_name.get(&last))
                .flatten()
                .copied()
                .collect();
            if !hits.is_empty() {
                return (
                    MatchTier::LastNameMatch,
                    Some(MatchConfidence::LastName),
                    self.collect(&hits),
                );
            }
        }

        (MatchTier::Unmatched, None, Vec::new())
    }
}

/// Resolve every zero-works record against the author index.
pub fn map_sources(
    records: &[ZeroWorksRecord],
    lookup: &AuthorLookup,
    rules: &MatchRules,
) -> Vec<SourceMatch> {
    records
        .iter()
        .map(|record| {
            let (status, confidence, matches) = lookup.resolve(&record.thinker, rules);
            let notes = match status {
                MatchTier::Matched => Vec::new(),
                MatchTier::LastNameMatch => vec![NOTE_LAST_NAME_ONLY.to_string()],
                MatchTier::Unmatched => vec![NOTE_UNMATCHED.to_string()],
            };
            if status != MatchTier::Matched {
                tracing::debug!(thinker = %record.thinker, ?status, "no exact author page");
            }
            SourceMatch {
                collection: record.collection.clone(),
                thinker: record.thinker.clone(),
                slug: record.slug.clone(),
                matches,
                status,
                confidence,
                notes,
            }
        })
        .collect()
}

/// Fetch and parse the author index at `index_url`.
pub async fn fetch_author_index<S: PageSource + ?Sized>(
    source: &S,
    index_url: &str,
) -> Result<Vec<AuthorEntry>, FetchError> {
    let base = Url::parse(index_url).map_err(|_| FetchError::InvalidUrl(index_url.to_string()))?;
    let body = source.fetch_text(index_url).await?;
    let entries = parse_author_index(&body, &base);
    tracing::info!(url = index_url, entries = entries.len(), "parsed author index");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, href: &str) -> AuthorEntry {
        AuthorEntry {
            text: text.to_string(),
            href: href.to_string(),
            url: format!("https://www.marxists.org/archive/{href}"),
            category: "Authors".to_string(),
        }
    }

    fn lookup() -> AuthorLookup {
        AuthorLookup::build(vec![
            entry("Karl Kautsky", "kautsky/index.htm"),
            entry("Rosa Luxemburg", "luxemburg/index.htm"),
            entry("José Carlos Mariátegui", "mariateg/index.htm"),
            entry("Lenin", "lenin/index.htm"),
            entry("Anna Louise Strong", "strong-anna-louise/index.htm"),
        ])
    }

    fn zero(thinker: &str) -> ZeroWorksRecord {
        ZeroWorksRecord {
            collection: "test".into(),
            thinker: thinker.into(),
            slug: crate::names::slugify(thinker),
        }
    }

    #[test]
    fn test_lookup_key_folds_accents_and_spaces() {
        assert_eq!(lookup_key("José Carlos Mariátegui"), "josecarlosmariategui");
    }

    #[test]
    fn test_exact_match() {
        let (tier, conf, hits) = lookup().resolve("Jose Carlos Mariategui", &MatchRules::default());
        assert_eq!(tier, MatchTier::Matched);
        assert_eq!(conf, Some(MatchConfidence::Exact));
        assert_eq!(hits[0].href, "mariateg/index.htm");
    }

    #[test]
    fn test_scan_match_reports_confidence() {
        let (tier, conf, hits) = lookup().resolve("Rosa Luxemburg Jr", &MatchRules::default());
        assert_eq!(tier, MatchTier::Matched);
        assert_eq!(conf, Some(MatchConfidence::Substring));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_shared_surname_on_two_word_names_is_a_scan_match() {
        let (tier, conf, _) = lookup().resolve("Benedikt Kautsky", &MatchRules::default());
        assert_eq!(tier, MatchTier::Matched);
        assert_eq!(conf, Some(MatchConfidence::TokenOverlap));
    }

    #[test]
    fn test_last_name_fallback() {
        let results = map_sources(
            &[zero("Jacob Alan Strong"), zero("Vladimir Lenin"), zero("Nobody Known")],
            &lookup(),
            &MatchRules::default(),
        );
        assert_eq!(results[0].status, MatchTier::LastNameMatch);
        assert_eq!(results[0].notes, vec![NOTE_LAST_NAME_ONLY]);
        assert_eq!(results[0].matches[0].text, "Anna Louise Strong");

        assert_eq!(results[1].status, MatchTier::LastNameMatch);
        assert_eq!(results[1].matches[0].text, "Lenin");

        assert_eq!(results[2].status, MatchTier::Unmatched);
        assert_eq!(results[2].notes, vec![NOTE_UNMATCHED]);
        assert!(results[2].matches.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_author_index() {
        let html = r#"<html><body>
            <h2>Authors</h2>
            <a href="kautsky/index.htm">Karl Kautsky</a>
            <a href="../index.htm">Home</a>
        </body></html>"#;
        let source = crate::fetch::mock::MockSource::new().with_page(ARCHIVE_INDEX_URL, html);
        let entries = fetch_author_index(&source, ARCHIVE_INDEX_URL).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://www.marxists.org/archive/kautsky/index.htm");
        assert_eq!(entries[0].category, "Authors");
    }
}
