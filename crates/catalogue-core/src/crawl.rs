//! Breadth-first harvesting of one author's archive subtree.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::CoreError;
use crate::dataset::write_json;
use crate::fetch::PageSource;
use crate::html::{RawLink, extract_page_links};
use crate::model::{SourceMatch, WorkRecord};
use crate::pool::{PoolOptions, ProgressFn, make_jobs, run_pool};
use crate::roots::author_root;
use crate::works::{WorkClassifier, WorkSet, dedup_key};

/// Path fragments that mark a collection directory.
pub const LINK_KEYWORDS: &[&str] = &[
    "/works/",
    "/articles/",
    "/letters/",
    "/writings/",
    "/speeches/",
    "/pamphlets/",
    "/essays/",
    "/books/",
    "/chron/",
    "/texts/",
    "/docs/",
    "/poems/",
    "/verses/",
    "/interviews/",
];

pub const ALLOWED_EXTENSIONS: &[&str] = &[".htm", ".html", ".pdf", ".txt"];

/// Bounds and heuristics for a harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRules {
    /// Pages deeper than this are never fetched.
    pub max_depth: usize,
    pub link_keywords: Vec<String>,
    pub allowed_extensions: Vec<String>,
    /// Title length (in words) that makes an unkeyworded page a work.
    pub fallback_title_tokens: usize,
}

impl Default for CrawlRules {
    fn default() -> Self {
        Self {
            max_depth: 3,
            link_keywords: LINK_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            fallback_title_tokens: 3,
        }
    }
}

impl CrawlRules {
    fn has_keyword(&self, path: &str) -> bool {
        self.link_keywords.iter().any(|k| path.contains(k.as_str()))
    }

    fn has_allowed_extension(&self, path: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }

    /// Whether a link inside the crawl scope points at a work.
    pub fn is_candidate_work(&self, url: &Url, title: &str) -> bool {
        let path = url.path().to_ascii_lowercase();
        if !self.has_allowed_extension(&path) {
            return false;
        }
        if path.contains("bio") {
            return false;
        }
        let title_lower = title.to_lowercase();
        if title_lower.contains("biography") || title_lower.contains("obituary") {
            return false;
        }

        if self.has_keyword(&path) {
            return true;
        }
        if path
            .split('/')
            .any(|seg| seg.len() == 4 && seg.chars().all(|c| c.is_ascii_digit()))
        {
            return true;
        }
        if path.contains("index") || path.contains("contents") {
            return false;
        }
        title.split_whitespace().count() >= self.fallback_title_tokens
    }

    /// Whether a page found at `depth` should be fetched for more links.
    pub fn should_descend(&self, url: &Url, depth: usize) -> bool {
        if depth >= self.max_depth {
            return false;
        }
        let path = url.path().to_ascii_lowercase();
        self.has_keyword(&path)
            && (path.ends_with('/') || path.ends_with("index.htm") || path.ends_with("index.html"))
    }
}

/// Outcome of a harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestStatus {
    Success,
    NoWorksFound,
    NoSourceMatch,
}

/// Per-thinker harvest output, one JSON file each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestResult {
    pub collection: String,
    pub thinker: String,
    pub slug: String,
    pub source_url: Option<String>,
    pub status: HarvestStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub works: Vec<WorkRecord>,
    #[serde(default)]
    pub visited_urls: Vec<String>,
}

impl HarvestResult {
    fn no_source(m: &SourceMatch, message: &str, warnings: Vec<String>) -> Self {
        Self {
            collection: m.collection.clone(),
            thinker: m.thinker.clone(),
            slug: m.slug.clone(),
            source_url: None,
            status: HarvestStatus::NoSourceMatch,
            message: message.to_string(),
            warnings,
            works: Vec::new(),
            visited_urls: Vec::new(),
        }
    }

    /// `<dir>/<collection>/<slug>.json`
    pub fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.collection).join(format!("{}.json", self.slug))
    }
}

fn sort_key(title: &str) -> String {
    title
        .nfkd()
        .filter(char::is_ascii)
        .collect::<String>()
        .to_lowercase()
}

/// Crawls author pages for candidate works.
pub struct Harvester<S: ?Sized> {
    source: Arc<S>,
    classifier: Arc<WorkClassifier>,
    rules: CrawlRules,
}

impl<S: ?Sized> Clone for Harvester<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            classifier: Arc::clone(&self.classifier),
            rules: self.rules.clone(),
        }
    }
}

impl<S: PageSource + ?Sized> Harvester<S> {
    pub fn new(source: Arc<S>, classifier: Arc<WorkClassifier>, rules: CrawlRules) -> Self {
        Self {
            source,
            classifier,
            rules,
        }
    }

    /// Crawl from the first candidate page of `m`.
    ///
    /// Scope is the candidate's directory; the frontier is a FIFO of
    /// `(url, depth)` and pages are visited at most once by dedup key.
    /// Fetch failures become warnings.
    pub async fn harvest(&self, m: &SourceMatch) -> HarvestResult {
        let Some(primary) = m.matches.first() else {
            return HarvestResult::no_source(
                m,
                "No archive author page was identified.",
                m.notes.clone(),
            );
        };
        let source_url = primary.url.clone();
        let Some(root) = author_root(&source_url) else {
            return HarvestResult::no_source(
                m,
                "Author page URL could not be parsed.",
                vec![format!("Invalid source URL: {source_url}")],
            );
        };

        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut visited_urls = Vec::new();
        let mut seen = WorkSet::default();
        let mut works = Vec::new();
        let mut warnings = Vec::new();

        queue.push_back((source_url.clone(), 0));

        while let Some((url, depth)) = queue.pop_front() {
            if !visited.insert(dedup_key(&url)) {
                continue;
            }
            visited_urls.push(url.clone());

            if depth > self.rules.max_depth {
                continue;
            }

            let body = match self.source.fetch_text(&url).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(thinker = %m.thinker, url = %url, error = %e, "fetch failed");
                    warnings.push(format!("Request failed for {url}: {e}"));
                    continue;
                }
            };
            let Ok(base) = Url::parse(&url) else {
                continue;
            };

            for link in extract_page_links(&body).all {
                self.visit_link(&link, &base, &root, depth, &mut seen, &mut works, |next| {
                    if !visited.contains(&dedup_key(&next)) {
                        queue.push_back((next, depth + 1));
                    }
                });
            }
        }

        works.sort_by_cached_key(|w: &WorkRecord| sort_key(&w.title));
        visited_urls.sort();

        let (status, message) = if works.is_empty() {
            (
                HarvestStatus::NoWorksFound,
                "No candidate works discovered within crawl depth.".to_string(),
            )
        } else {
            (
                HarvestStatus::Success,
                format!("Collected {} candidate works.", works.len()),
            )
        };

        tracing::info!(
            thinker = %m.thinker,
            works = works.len(),
            pages = visited_urls.len(),
            "harvest finished"
        );

        HarvestResult {
            collection: m.collection.clone(),
            thinker: m.thinker.clone(),
            slug: m.slug.clone(),
            source_url: Some(source_url),
            status,
            message,
            warnings,
            works,
            visited_urls,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_link(
        &self,
        link: &RawLink,
        base: &Url,
        root: &str,
        depth: usize,
        seen: &mut WorkSet,
        works: &mut Vec<WorkRecord>,
        mut enqueue: impl FnMut(String),
    ) {
        if link.title.chars().count() <= 2 {
            return;
        }
        let Ok(mut next) = base.join(&link.href) else {
            return;
        };
        next.set_fragment(None);
        if !next.as_str().starts_with(root) {
            return;
        }

        if self.rules.is_candidate_work(&next, &link.title) {
            if let Some(work) = self.classifier.classify_link(link, base)
                && seen.insert(&work)
            {
                works.push(work);
            }
            return;
        }

        if self.rules.should_descend(&next, depth) {
            enqueue(next.to_string());
        }
    }
}

impl<S: PageSource + ?Sized + 'static> Harvester<S> {
    /// Harvest every match on the worker pool.
    ///
    /// Each result is written to [`HarvestResult::output_path`] under
    /// `out_dir` as soon as its job finishes, so an interrupted run keeps
    /// everything completed so far. A result that cannot be written fails
    /// its job and is left out of the returned list.
    pub async fn harvest_to_dir(
        &self,
        matches: Vec<SourceMatch>,
        out_dir: &Path,
        options: PoolOptions,
        progress: ProgressFn,
    ) -> Vec<HarvestResult> {
        let jobs = make_jobs(matches.into_iter().map(|m| (m.thinker.clone(), m)));
        let harvester = self.clone();
        let out_dir = out_dir.to_path_buf();
        let outcomes = run_pool(
            jobs,
            options,
            move |m: SourceMatch| {
                let harvester = harvester.clone();
                let out_dir = out_dir.clone();
                async move {
                    let result = harvester.harvest(&m).await;
                    write_json(&result.output_path(&out_dir), &result)?;
                    Ok::<_, CoreError>(result)
                }
            },
            progress,
        )
        .await;
        outcomes.into_iter().filter_map(|o| o.result.ok()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn candidate_by_keyword_and_year() {
        let rules = CrawlRules::default();
        assert!(rules.is_candidate_work(
            &url("https://www.marxists.org/archive/kautsky/works/abc.htm"),
            "Short"
        ));
        assert!(rules.is_candidate_work(
            &url("https://www.marxists.org/archive/kautsky/1892/erfurt/ch01.htm"),
            "Ch. 1"
        ));
    }

    #[test]
    fn candidate_rejections() {
        let rules = CrawlRules::default();
        assert!(!rules.is_candidate_work(
            &url("https://www.marxists.org/archive/kautsky/works/"),
            "The Works Directory"
        ));
        assert!(!rules.is_candidate_work(
            &url("https://www.marxists.org/archive/kautsky/bio/life.htm"),
            "A Long Life Story"
        ));
        assert!(!rules.is_candidate_work(
            &url("https://www.marxists.org/archive/kautsky/works/1938/kautsky-biog.htm"),
            "Karl Kautsky, His Life"
        ));
        assert!(!rules.is_candidate_work(
            &url("https://www.marxists.org/reference/autobiography/1890/ch01.htm"),
            "Chapter One of My Life"
        ));
        assert!(!rules.is_candidate_work(
            &url("https://www.marxists.org/archive/kautsky/works/obit.htm"),
            "Obituary of Kautsky"
        ));
        assert!(!rules.is_candidate_work(
            &url("https://www.marxists.org/archive/kautsky/contents.htm"),
            "Table of the Contents"
        ));
    }

    #[test]
    fn candidate_by_long_title() {
        let rules = CrawlRules::default();
        let page = url("https://www.marxists.org/archive/kautsky/class-struggle.htm");
        assert!(rules.is_candidate_work(&page, "The Class Struggle"));
        assert!(!rules.is_candidate_work(&page, "Class Struggle"));
    }

    #[test]
    fn descend_only_into_keyword_directories() {
        let rules = CrawlRules::default();
        let dir = url("https://www.marxists.org/archive/kautsky/works/1909/");
        assert!(rules.should_descend(&dir, 0));
        assert!(rules.should_descend(&dir, 2));
        assert!(!rules.should_descend(&dir, 3));
        assert!(rules.should_descend(
            &url("https://www.marxists.org/archive/kautsky/works/index.htm"),
            1
        ));
        assert!(!rules.should_descend(
            &url("https://www.marxists.org/archive/kautsky/other/"),
            0
        ));
    }

    #[test]
    fn output_path_uses_collection_and_slug() {
        let result = HarvestResult {
            collection: "second-international".into(),
            thinker: "Karl Kautsky".into(),
            slug: "karl-kautsky".into(),
            source_url: None,
            status: HarvestStatus::NoSourceMatch,
            message: String::new(),
            warnings: vec![],
            works: vec![],
            visited_urls: vec![],
        };
        assert_eq!(
            result.output_path(Path::new("out")),
            Path::new("out/second-international/karl-kautsky.json")
        );
    }

    #[test]
    fn sort_key_folds_accents() {
        assert!(sort_key("Éléments") < sort_key("Fragments"));
    }
}
