//! Deciding which scraped links are works, and deduplicating them.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use reqwest::Url;

use crate::html::{PageLinks, RawLink, SubjectSection};
use crate::model::WorkRecord;

static YEAR_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").unwrap());

/// Description given to recommended works that have none.
pub const RECOMMENDED_DESCRIPTION: &str = "Recommended";

/// Navigation and administrative anchor text that never names a work.
pub const DEFAULT_TITLE_DENYLIST: &[&str] = &[
    "click here",
    "home",
    "back",
    "next",
    "previous",
    "biography",
    "chronology",
    "contact us",
    "other languages",
    "archive.org",
    "gesamtausgabe",
    "foundation",
    "encyclopedia",
    "permission",
    "creative commons",
    "sharealike",
    "steering committee",
    "lawrence",
    "wishart",
    "mia",
];

/// URL patterns (case-insensitive regexes) for links that are not works.
pub const DEFAULT_URL_DENYLIST: &[&str] = &[
    r"\.(jpe?g|png|gif)$",
    r"^#",
    r"index\.htm$",
    r"bio/",
    r"biography",
    r"^mailto:",
    r"^javascript:",
    r"archive\.org/",
    r"wishart",
    r"permission",
    r"creativecommons",
    r"commons\.wikimedia\.org/wiki/",
    r"/contact",
    r"/encyclopedia/",
];

/// Thresholds and denylists for the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRules {
    pub min_title_chars: usize,
    pub max_title_chars: usize,
    pub min_title_tokens: usize,
    /// Terms rejected wherever they occur in the lower-cased title.
    pub title_denylist: Vec<String>,
    /// Regex patterns checked against the raw href and the stored URL,
    /// each with and without its query and fragment.
    pub url_denylist: Vec<String>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            min_title_chars: 5,
            max_title_chars: 200,
            min_title_tokens: 2,
            title_denylist: DEFAULT_TITLE_DENYLIST.iter().map(|s| s.to_string()).collect(),
            url_denylist: DEFAULT_URL_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Compiled form of [`ClassifierRules`].
#[derive(Debug, Clone)]
pub struct WorkClassifier {
    rules: ClassifierRules,
    title_deny: Vec<String>,
    url_deny: Vec<Regex>,
}

impl Default for WorkClassifier {
    fn default() -> Self {
        Self::new(ClassifierRules::default()).expect("built-in classifier patterns compile")
    }
}

impl WorkClassifier {
    pub fn new(rules: ClassifierRules) -> Result<Self, regex::Error> {
        let title_deny = rules
            .title_denylist
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let url_deny = rules
            .url_denylist
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            title_deny,
            url_deny,
        })
    }

    pub fn accepts_title(&self, title: &str) -> bool {
        let title = title.trim();
        let len = title.chars().count();
        if len < self.rules.min_title_chars || len > self.rules.max_title_chars {
            return false;
        }
        if YEAR_ONLY.is_match(title) {
            return false;
        }
        if title.split_whitespace().count() < self.rules.min_title_tokens {
            return false;
        }
        let lower = title.to_lowercase();
        !self.title_deny.iter().any(|term| lower.contains(term.as_str()))
    }

    /// Check the raw href and the URL that would be stored for it against
    /// the URL denylist. Anchored patterns like `index\.htm$` also see each
    /// candidate with its query and fragment cut off, so a stored work
    /// always passes the same check again.
    pub fn accepts_url(&self, raw_href: &str, resolved: &Url) -> bool {
        if !matches!(resolved.scheme(), "http" | "https") {
            return false;
        }
        let raw = raw_href.trim();
        let stored = strip_fragment(resolved.clone());
        let candidates = [raw, without_query(raw), stored.as_str(), without_query(&stored)];
        !self
            .url_deny
            .iter()
            .any(|re| candidates.iter().any(|c| re.is_match(c)))
    }

    /// Turn one scraped anchor into a work, or reject it.
    pub fn classify_link(&self, link: &RawLink, base: &Url) -> Option<WorkRecord> {
        let href = link.href.trim();
        if href.is_empty() || !self.accepts_title(&link.title) {
            return None;
        }
        let resolved = base.join(href).ok()?;
        if !self.accepts_url(href, &resolved) {
            return None;
        }

        let mut work = WorkRecord::new(link.title.trim(), strip_fragment(resolved));
        if link.recommended {
            work.recommended = true;
            work.description = Some(RECOMMENDED_DESCRIPTION.to_string());
        }
        Some(work)
    }

    /// Classify a list of anchors, keeping the first occurrence of each work.
    pub fn classify(&self, links: &[RawLink], base: &Url) -> Vec<WorkRecord> {
        let mut seen = WorkSet::default();
        links
            .iter()
            .filter_map(|link| self.classify_link(link, base))
            .filter(|work| seen.insert(work))
            .collect()
    }

    /// Classify the works section of a page, falling back to every anchor
    /// on the page when the section yields nothing.
    pub fn classify_page(&self, page: &PageLinks, base: &Url) -> Vec<WorkRecord> {
        let scoped = self.classify(&page.section, base);
        if !scoped.is_empty() {
            return scoped;
        }
        if !page.section.is_empty() {
            tracing::debug!(base = %base, "works section yielded nothing, scanning whole page");
        }
        self.classify(&page.all, base)
    }

    /// Re-apply the rules to stored works. Already-filtered input comes back unchanged.
    pub fn filter_works(&self, works: &[WorkRecord]) -> Vec<WorkRecord> {
        let mut seen = WorkSet::default();
        works
            .iter()
            .filter(|w| {
                self.accepts_title(&w.title)
                    && Url::parse(&w.url).is_ok_and(|u| self.accepts_url(&w.url, &u))
            })
            .filter(|w| seen.insert(w))
            .cloned()
            .collect()
    }

    /// Classify works grouped under subject headings.
    ///
    /// Each work is tagged with its subject. A URL seen under an earlier
    /// subject is not repeated. Recommended works are also collected into
    /// `major`, capped at `major_limit`.
    pub fn classify_subjects(
        &self,
        sections: &[SubjectSection],
        base: &Url,
        major_limit: usize,
    ) -> SubjectWorks {
        let mut seen = WorkSet::default();
        let mut out = SubjectWorks::default();
        for section in sections {
            for link in &section.links {
                let Some(mut work) = self.classify_link(link, base) else {
                    continue;
                };
                if !seen.insert(&work) {
                    continue;
                }
                work.subject = Some(section.subject.clone());
                if work.recommended && out.major.len() < major_limit {
                    out.major.push(work.clone());
                }
                out.works.push(work);
            }
        }
        out
    }
}

/// Works found under subject headings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectWorks {
    pub works: Vec<WorkRecord>,
    pub major: Vec<WorkRecord>,
}

fn strip_fragment(mut url: Url) -> String {
    url.set_fragment(None);
    url.to_string()
}

fn without_query(url: &str) -> &str {
    url.split(['#', '?']).next().unwrap_or(url)
}

/// Comparison key for a work URL: scheme, host, port and path, without
/// query, fragment or trailing slash.
pub fn dedup_key(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) => {
            let mut key = format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or(""));
            if let Some(port) = parsed.port() {
                key.push_str(&format!(":{port}"));
            }
            key.push_str(parsed.path().trim_end_matches('/'));
            key
        }
        Err(_) => {
            without_query(url.trim()).trim_end_matches('/').to_string()
        }
    }
}

/// First-occurrence-wins membership over work URLs and titles.
#[derive(Debug, Default, Clone)]
pub struct WorkSet {
    urls: HashSet<String>,
    titles: HashSet<String>,
}

impl WorkSet {
    pub fn from_works<'a>(works: impl IntoIterator<Item = &'a WorkRecord>) -> Self {
        let mut set = Self::default();
        for w in works {
            set.insert(w);
        }
        set
    }

    /// Record the work; false if its URL or its exact title was already seen.
    pub fn insert(&mut self, work: &WorkRecord) -> bool {
        let key = dedup_key(&work.url);
        if self.urls.contains(&key) || self.titles.contains(&work.title) {
            return false;
        }
        self.urls.insert(key);
        self.titles.insert(work.title.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Append `incoming` works not already present; returns how many were added.
pub fn merge_works(
    existing: &mut Vec<WorkRecord>,
    incoming: impl IntoIterator<Item = WorkRecord>,
) -> usize {
    let mut seen = WorkSet::from_works(existing.iter());
    let before = existing.len();
    existing.extend(incoming.into_iter().filter(|w| seen.insert(w)));
    existing.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::extract_page_links;

    fn base() -> Url {
        Url::parse("https://www.marxists.org/archive/marx/index.htm").unwrap()
    }

    fn link(title: &str, href: &str) -> RawLink {
        RawLink {
            title: title.to_string(),
            href: href.to_string(),
            recommended: false,
        }
    }

    #[test]
    fn test_title_rules() {
        let c = WorkClassifier::default();
        let titles = ["Home", "Biography", "1917", "The State and Revolution"];
        let passing: Vec<&str> = titles
            .iter()
            .copied()
            .filter(|t| c.accepts_title(t))
            .collect();
        assert_eq!(passing, vec!["The State and Revolution"]);
    }

    #[test]
    fn test_title_denylist_matches_substrings() {
        let c = WorkClassifier::default();
        assert!(!c.accepts_title("Back to top"));
        assert!(!c.accepts_title("Lenin Biography and Chronology"));
        assert!(!c.accepts_title("Marx-Engels Gesamtausgabe"));
        assert!(!c.accepts_title("Previously Unpublished Letters"));
        assert!(!c.accepts_title("Homecoming of the Exiles"));
        assert!(!c.accepts_title("Nextdoor to Revolution"));
        assert!(!c.accepts_title("An Autobiography of Sorts"));
        assert!(c.accepts_title("Homage to Catalonia"));
        assert!(c.accepts_title("The Poverty of Philosophy"));
    }

    #[test]
    fn test_title_length_bounds() {
        let c = WorkClassifier::default();
        assert!(!c.accepts_title("A b"));
        assert!(!c.accepts_title(&"word ".repeat(50)));
        assert!(c.accepts_title("On Contradiction"));
    }

    #[test]
    fn test_url_rules() {
        let c = WorkClassifier::default();
        let cases = [
            ("portrait.jpg", false),
            ("#top", false),
            ("../lenin/index.htm", false),
            ("bio/index.html", false),
            ("works/biography.htm", false),
            ("mailto:admin@marxists.org", false),
            ("https://archive.org/details/capital", false),
            ("/admin/legal/permission.htm", false),
            ("works/1875/gotha/", true),
            ("works/1847/poverty-philosophy/ch01.htm", true),
            ("works/1848/manifesto.pdf", true),
        ];
        for (href, expected) in cases {
            let resolved = base().join(href).unwrap();
            assert_eq!(c.accepts_url(href, &resolved), expected, "href {href}");
        }
    }

    #[test]
    fn test_url_rules_ignore_query_and_fragment() {
        let c = WorkClassifier::default();
        let lenin = Url::parse("https://www.marxists.org/archive/lenin/index.htm").unwrap();
        for href in [
            "works/1917/staterev/index.htm#ch01",
            "works/1917/staterev/index.htm?print=1",
            "images/lenin.jpg#x",
            "images/lenin.png?w=200",
            "bio/index.html?lang=en",
        ] {
            let resolved = lenin.join(href).unwrap();
            assert!(!c.accepts_url(href, &resolved), "href {href}");
            assert!(
                c.classify_link(&link("The State and Revolution", href), &lenin)
                    .is_none(),
                "href {href}"
            );
        }
        let resolved = lenin.join("works/1917/staterev/ch01.htm?print=1").unwrap();
        assert!(c.accepts_url("works/1917/staterev/ch01.htm?print=1", &resolved));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let c = WorkClassifier::default();
        let work = c.classify_link(&link("Some Real Title", "ftp://host/file.htm"), &base());
        assert!(work.is_none());
    }

    #[test]
    fn test_relative_href_resolved_and_fragment_dropped() {
        let c = WorkClassifier::default();
        let work = c
            .classify_link(&link("Wage Labour and Capital", "works/1847/wage-labour/#ch1"), &base())
            .unwrap();
        assert_eq!(
            work.url,
            "https://www.marxists.org/archive/marx/works/1847/wage-labour/"
        );
    }

    #[test]
    fn test_fragment_duplicate_keeps_first() {
        let c = WorkClassifier::default();
        let links = vec![
            link("The Civil War in France", "works/1871/civil-war-france/"),
            link("Class Struggles in France", "works/1850/class-struggles-france/"),
            link("Civil War in France (alt)", "works/1871/civil-war-france/#section"),
        ];
        let works = c.classify(&links, &base());
        let titles: Vec<&str> = works.iter().map(|w| w.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["The Civil War in France", "Class Struggles in France"]
        );
    }

    #[test]
    fn test_title_duplicate_is_dropped() {
        let c = WorkClassifier::default();
        let links = vec![
            link("Theses on Feuerbach", "works/1845/theses/theses.htm"),
            link("Theses on Feuerbach", "works/1845/theses/original.htm"),
        ];
        assert_eq!(c.classify(&links, &base()).len(), 1);
    }

    #[test]
    fn test_idempotent() {
        let c = WorkClassifier::default();
        let links = vec![
            link("Home", "../../index.htm"),
            link("Capital, Volume I", "works/1867-c1/"),
            link("Value, Price and Profit", "works/1865/value-price-profit/"),
            link("Value, Price and Profit", "works/1865/value-price-profit/index.html#x"),
        ];
        let once = c.classify(&links, &base());
        assert_eq!(once.len(), 2);
        assert_eq!(c.filter_works(&once), once);
    }

    #[test]
    fn test_idempotent_with_suffixed_links() {
        let c = WorkClassifier::default();
        let lenin = Url::parse("https://www.marxists.org/archive/lenin/index.htm").unwrap();
        let links = vec![
            link("The State and Revolution", "works/1917/staterev/index.htm#ch01"),
            link("The State and Revolution", "works/1917/staterev/"),
            link("Imperialism, the Highest Stage", "works/1916/imp-hsc/ch07.htm#v22pp72h-266"),
            link("What Is To Be Done?", "works/1901/witbd/ch02.htm?print=1"),
            link("What Is To Be Done? (reprint)", "works/1901/witbd/ch02.htm"),
            link("Lenin's Previously Lost Notes", "works/1920/notes.htm"),
            link("Portrait of Lenin in Zurich", "images/zurich.jpg?size=large"),
            link("Lenin Internet Archive Home", "https://www.marxists.org/archive/lenin/"),
        ];
        let once = c.classify(&links, &lenin);
        let titles: Vec<&str> = once.iter().map(|w| w.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "The State and Revolution",
                "Imperialism, the Highest Stage",
                "What Is To Be Done?",
            ]
        );
        assert_eq!(
            once[0].url,
            "https://www.marxists.org/archive/lenin/works/1917/staterev/"
        );
        assert_eq!(c.filter_works(&once), once);
        assert_eq!(c.filter_works(&c.filter_works(&once)), once);
    }

    #[test]
    fn test_filter_works_drops_stored_index_pages() {
        let c = WorkClassifier::default();
        let stored = vec![
            WorkRecord::new(
                "The State and Revolution",
                "https://www.marxists.org/archive/lenin/works/1917/staterev/index.htm",
            ),
            WorkRecord::new(
                "Left-Wing Communism",
                "https://www.marxists.org/archive/lenin/works/1920/lwc/",
            ),
        ];
        let kept = c.filter_works(&stored);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Left-Wing Communism");
    }

    #[test]
    fn test_gotha_page_end_to_end() {
        let html = r##"<html><body>
            <a href="#top">Home</a>
            <a href="/archive/marx/works/1875/gotha/">Critique of the Gotha Programme</a>
            <a href="/archive/marx/works/1875/gotha">Critique of the Gotha Programme</a>
        </body></html>"##;
        let base = base();
        let page = extract_page_links(html);
        let works = WorkClassifier::default().classify_page(&page, &base);
        assert_eq!(works.len(), 1);
        assert_eq!(works[0].title, "Critique of the Gotha Programme");
        assert_eq!(
            works[0].url,
            "https://www.marxists.org/archive/marx/works/1875/gotha/"
        );
    }

    #[test]
    fn test_section_fallback_to_all_links() {
        let html = r#"<html><body>
            <h3>Works</h3>
            <p><a href="../index.htm">Back</a></p>
            <h3>Elsewhere</h3>
            <p><a href="works/1852/18th-brumaire/">The Eighteenth Brumaire of Louis Bonaparte</a></p>
        </body></html>"#;
        let page = extract_page_links(html);
        assert!(!page.section.is_empty());
        let works = WorkClassifier::default().classify_page(&page, &base());
        assert_eq!(works.len(), 1);
        assert_eq!(works[0].title, "The Eighteenth Brumaire of Louis Bonaparte");
    }

    #[test]
    fn test_section_scoping_ignores_other_links() {
        let html = r#"<html><body>
            <p><a href="works/1844/manuscripts/">Economic and Philosophic Manuscripts</a></p>
            <h3>Selected Writings</h3>
            <ul><li><a href="works/1848/communist-manifesto/">Manifesto of the Communist Party</a></li></ul>
        </body></html>"#;
        let page = extract_page_links(html);
        let works = WorkClassifier::default().classify_page(&page, &base());
        assert_eq!(works.len(), 1);
        assert!(works[0].url.ends_with("/communist-manifesto/"));
    }

    #[test]
    fn test_recommended_sets_description() {
        let c = WorkClassifier::default();
        let mut raw = link("On Practice and Contradiction", "works/1937/on-practice.htm");
        raw.recommended = true;
        let work = c.classify_link(&raw, &base()).unwrap();
        assert!(work.recommended);
        assert_eq!(work.description.as_deref(), Some("Recommended"));
    }

    #[test]
    fn test_custom_rules() {
        let rules = ClassifierRules {
            title_denylist: vec!["draft".into()],
            url_denylist: vec![r"/drafts/".into()],
            min_title_tokens: 1,
            ..ClassifierRules::default()
        };
        let c = WorkClassifier::new(rules).unwrap();
        assert!(c.accepts_title("Grundrisse"));
        assert!(!c.accepts_title("First draft notes"));
        let url = base().join("drafts/a.htm").unwrap();
        assert!(!c.accepts_url("drafts/a.htm", &url));
    }

    #[test]
    fn test_invalid_url_pattern_is_an_error() {
        let rules = ClassifierRules {
            url_denylist: vec!["(".into()],
            ..ClassifierRules::default()
        };
        assert!(WorkClassifier::new(rules).is_err());
    }

    #[test]
    fn test_dedup_key() {
        assert_eq!(
            dedup_key("https://www.marxists.org/archive/marx/works/1875/gotha/?x=1#top"),
            "https://www.marxists.org/archive/marx/works/1875/gotha"
        );
        assert_eq!(
            dedup_key("HTTPS://WWW.Marxists.org/archive/"),
            "https://www.marxists.org/archive"
        );
        assert_eq!(dedup_key("not a url/#frag"), "not a url");
    }

    #[test]
    fn test_merge_works_is_idempotent() {
        let mut existing = vec![WorkRecord::new(
            "Capital, Volume I",
            "https://www.marxists.org/archive/marx/works/1867-c1/",
        )];
        let incoming = vec![
            WorkRecord::new(
                "Capital Volume One",
                "https://www.marxists.org/archive/marx/works/1867-c1",
            ),
            WorkRecord::new(
                "Capital, Volume II",
                "https://www.marxists.org/archive/marx/works/1885-c2/",
            ),
        ];
        assert_eq!(merge_works(&mut existing, incoming.clone()), 1);
        assert_eq!(merge_works(&mut existing, incoming), 0);
        assert_eq!(existing.len(), 2);
        assert_eq!(existing[0].title, "Capital, Volume I");
    }
}
