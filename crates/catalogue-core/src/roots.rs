//! Canonical "works root" directories for re-crawling a thinker's archive.

use reqwest::Url;

/// Segment-pruning rules for [`works_root_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRules {
    /// Hosts (matched by suffix) that get the fixed-depth clamp.
    pub primary_hosts: Vec<String>,
    /// Collection directories popped from the end of the path.
    pub prune_segments: Vec<String>,
    /// Top-level category directories, in priority order. The root is the
    /// category segment plus the one after it.
    pub category_segments: Vec<String>,
    /// Depth clamp on primary hosts without a category segment.
    pub primary_depth: usize,
}

const PRUNE_SEGMENTS: &[&str] = &[
    "works",
    "writings",
    "articles",
    "letters",
    "speeches",
    "pamphlets",
    "essays",
    "books",
    "chron",
    "texts",
    "docs",
    "poems",
    "verses",
    "interviews",
    "selected-works",
    "selectedworks",
    "selected",
    "poetry",
    "novels",
    "fiction",
];

const CATEGORY_SEGMENTS: &[&str] = &["archive", "writers", "leaders", "newspape", "subjects"];

const DOCUMENT_EXTENSIONS: &[&str] = &[".htm", ".html", ".pdf", ".txt"];

const NUMBERED_MARKERS: &[&str] = &["vol-", "volume-", "book-", "chapter-"];

impl Default for RootRules {
    fn default() -> Self {
        Self {
            primary_hosts: vec!["marxists.org".to_string()],
            prune_segments: PRUNE_SEGMENTS.iter().map(|s| s.to_string()).collect(),
            category_segments: CATEGORY_SEGMENTS.iter().map(|s| s.to_string()).collect(),
            primary_depth: 4,
        }
    }
}

impl RootRules {
    pub fn is_primary_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.primary_hosts
            .iter()
            .any(|p| host == *p || host.ends_with(&format!(".{p}")))
    }

    fn should_prune(&self, segment: &str) -> bool {
        let lowered = segment.to_ascii_lowercase();
        self.prune_segments.iter().any(|p| *p == lowered)
            || lowered.chars().all(|c| c.is_ascii_digit())
            || NUMBERED_MARKERS.iter().any(|m| lowered.starts_with(m))
    }
}

fn is_document(segment: &str) -> bool {
    let lowered = segment.to_ascii_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext))
}

fn scheme_and_host(url: &Url) -> Option<String> {
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}

fn path_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segs| segs.filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn join_root(prefix: &str, segments: &[String]) -> String {
    if segments.is_empty() {
        format!("{prefix}/")
    } else {
        format!("{prefix}/{}/", segments.join("/"))
    }
}

/// Works root with the default rules.
///
/// `https://example.org/archive/marx/works/1867/capital/ch01.htm` →
/// `https://example.org/archive/marx/`.
pub fn works_root(url: &str) -> Option<String> {
    works_root_with(url, &RootRules::default())
}

/// Collapse a work or index URL to the directory worth re-crawling.
///
/// Returns `None` for input without a scheme and host. The result always
/// ends in `/`.
pub fn works_root_with(url: &str, rules: &RootRules) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let prefix = scheme_and_host(&parsed)?;
    let mut segments = path_segments(&parsed);

    if segments.last().is_some_and(|s| is_document(s)) {
        segments.pop();
    }

    while segments.len() > 1 && segments.last().is_some_and(|s| rules.should_prune(s)) {
        segments.pop();
    }

    let lowered: Vec<String> = segments.iter().map(|s| s.to_ascii_lowercase()).collect();
    let category_idx = rules
        .category_segments
        .iter()
        .find_map(|cat| lowered.iter().position(|s| s == cat));

    match category_idx {
        Some(idx) => segments.truncate(idx + 2),
        None if rules.is_primary_host(parsed.host_str().unwrap_or_default()) => {
            segments.truncate(rules.primary_depth)
        }
        None => {}
    }

    Some(join_root(&prefix, &segments))
}

/// Crawl scope for an author page: the URL's directory.
///
/// `https://www.marxists.org/archive/lenin/index.htm` →
/// `https://www.marxists.org/archive/lenin/`.
pub fn author_root(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let prefix = scheme_and_host(&parsed)?;
    let mut segments = path_segments(&parsed);
    if segments
        .last()
        .is_some_and(|s| s.to_ascii_lowercase().ends_with(".htm") || s.to_ascii_lowercase().ends_with(".html"))
    {
        segments.pop();
    }
    Some(join_root(&prefix, &segments))
}

/// Where a register source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    MiaAuthorIndex,
    MiaWorksRoot,
    ExternalWorksRoot,
}

/// Human label and kind for a works root found in existing work URLs.
pub fn source_label(root: &str, rules: &RootRules) -> (String, SourceKind) {
    let host = Url::parse(root)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default();
    if rules.is_primary_host(&host) {
        ("Marxists.org Works Root".to_string(), SourceKind::MiaWorksRoot)
    } else {
        (format!("{host} Works Root"), SourceKind::ExternalWorksRoot)
    }
}
