//! Attaching works scraped from archive author pages to dataset thinkers.

use std::sync::Arc;

use reqwest::Url;
use serde::Serialize;

use crate::CoreError;
use crate::fetch::PageSource;
use crate::html::extract_page_links;
use crate::model::{AuthorLink, CategoryIndex, WorkRecord};
use crate::names::MatchRules;
use crate::pool::{PoolOptions, ProgressFn, make_jobs, run_pool};
use crate::rate_limit::FetchError;
use crate::works::{WorkClassifier, merge_works};

pub const ARCHIVE_BASE_URL: &str = "https://www.marxists.org";

pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Absolute author page URL for an index href, adding the `/archive/`
/// prefix to bare relative paths.
pub fn author_page_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let path = if href.starts_with("/archive/") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix('/') {
        format!("/archive/{rest}")
    } else {
        format!("/archive/{href}")
    };
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// What happened to one author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulateStatus {
    /// Works found and merged into a dataset thinker.
    Attached,
    /// The page had no acceptable works.
    NoWorks,
    /// Works found but no dataset thinker matched the author.
    NotInDataset,
    FetchFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorOutcome {
    pub author: String,
    pub url: String,
    pub status: PopulateStatus,
    pub found: usize,
    pub added: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulateReport {
    pub outcomes: Vec<AuthorOutcome>,
}

impl PopulateReport {
    pub fn count(&self, status: PopulateStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn works_added(&self) -> usize {
        self.outcomes.iter().map(|o| o.added).sum()
    }
}

/// Fetches author pages through the pool and merges their works into the
/// dataset, one batch at a time.
pub struct Populator<S: ?Sized> {
    source: Arc<S>,
    classifier: Arc<WorkClassifier>,
    pub base_url: String,
    pub pool: PoolOptions,
    pub batch_size: usize,
    pub match_rules: MatchRules,
}

impl<S: PageSource + ?Sized + 'static> Populator<S> {
    pub fn new(source: Arc<S>, classifier: Arc<WorkClassifier>) -> Self {
        Self {
            source,
            classifier,
            base_url: ARCHIVE_BASE_URL.to_string(),
            pool: PoolOptions::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            match_rules: MatchRules::default(),
        }
    }

    /// Populate `index` from `authors`.
    ///
    /// After each batch is merged, `checkpoint` is called with the dataset
    /// so far; an error from it aborts the run.
    pub async fn run<C>(
        &self,
        authors: &[AuthorLink],
        index: &mut CategoryIndex,
        progress: ProgressFn,
        mut checkpoint: C,
    ) -> Result<PopulateReport, CoreError>
    where
        C: FnMut(&CategoryIndex) -> Result<(), CoreError>,
    {
        let mut report = PopulateReport::default();

        for (batch_no, batch) in authors.chunks(self.batch_size.max(1)).enumerate() {
            let jobs = make_jobs(batch.iter().map(|a| {
                let url = author_page_url(&self.base_url, &a.href);
                (a.name.clone(), (a.clone(), url))
            }));

            let source = Arc::clone(&self.source);
            let classifier = Arc::clone(&self.classifier);
            let outcomes = run_pool(
                jobs,
                self.pool,
                move |(author, url): (AuthorLink, String)| {
                    let source = Arc::clone(&source);
                    let classifier = Arc::clone(&classifier);
                    async move {
                        let works = fetch_author_works(&*source, &classifier, &url).await;
                        Ok::<_, FetchError>((author, url, works))
                    }
                },
                Arc::clone(&progress),
            )
            .await;

            for outcome in outcomes {
                let Ok((author, url, works)) = outcome.result else {
                    continue;
                };
                report
                    .outcomes
                    .push(self.merge_author(index, &author, url, works));
            }

            tracing::info!(
                batch = batch_no + 1,
                processed = report.outcomes.len(),
                total = authors.len(),
                "batch merged"
            );
            checkpoint(index)?;
        }

        Ok(report)
    }

    fn merge_author(
        &self,
        index: &mut CategoryIndex,
        author: &AuthorLink,
        url: String,
        works: Result<Vec<WorkRecord>, FetchError>,
    ) -> AuthorOutcome {
        let mut outcome = AuthorOutcome {
            author: author.name.clone(),
            url,
            status: PopulateStatus::NoWorks,
            found: 0,
            added: 0,
        };

        let works = match works {
            Ok(works) => works,
            Err(e) => {
                tracing::debug!(author = %author.name, error = %e, "author page failed");
                outcome.status = PopulateStatus::FetchFailed;
                return outcome;
            }
        };
        outcome.found = works.len();
        if works.is_empty() {
            return outcome;
        }

        let Some(loc) = index.locate(&author.name, Some(&author.category), &self.match_rules)
        else {
            tracing::warn!(author = %author.name, category = %author.category, "no dataset thinker matches author");
            outcome.status = PopulateStatus::NotInDataset;
            return outcome;
        };
        if let Some(thinker) = index.get_mut(loc) {
            outcome.added = merge_works(&mut thinker.works, works);
            outcome.status = PopulateStatus::Attached;
            tracing::debug!(author = %author.name, thinker = %thinker.name, added = outcome.added, "works merged");
        }
        outcome
    }
}

/// Fetch one author page and classify its works.
pub async fn fetch_author_works<S: PageSource + ?Sized>(
    source: &S,
    classifier: &WorkClassifier,
    url: &str,
) -> Result<Vec<WorkRecord>, FetchError> {
    let base = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    let body = source.fetch_text(url).await?;
    let page = extract_page_links(&body);
    Ok(classifier.classify_page(&page, &base))
}
