//! Portrait lookup on Wikimedia Commons.

use std::sync::Arc;

use reqwest::Url;
use serde::Serialize;

use crate::fetch::{PageSource, fetch_json};
use crate::model::{CategoryIndex, ThinkerLoc};
use crate::pool::{PoolOptions, ProgressFn, make_jobs, run_pool};
use crate::rate_limit::FetchError;

pub const COMMONS_API_URL: &str = "https://commons.wikimedia.org/w/api.php";

/// Width requested for thumbnails, in pixels.
pub const THUMBNAIL_WIDTH: u32 = 200;

/// A resolved image and its thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portrait {
    pub image_url: String,
    pub thumbnail_url: String,
}

/// Wikimedia Commons API client over a [`PageSource`].
pub struct CommonsClient<S: ?Sized> {
    source: Arc<S>,
    api_url: String,
}

impl<S: ?Sized> Clone for CommonsClient<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            api_url: self.api_url.clone(),
        }
    }
}

impl<S: PageSource + ?Sized> CommonsClient<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_api_url(source, COMMONS_API_URL)
    }

    pub fn with_api_url(source: Arc<S>, api_url: impl Into<String>) -> Self {
        Self {
            source,
            api_url: api_url.into(),
        }
    }

    pub fn search_url(&self, term: &str) -> String {
        format!(
            "{}?action=query&list=search&srsearch={}&srnamespace=6&srlimit=1&format=json",
            self.api_url,
            urlencoding::encode(term)
        )
    }

    pub fn image_info_url(&self, file_title: &str) -> String {
        format!(
            "{}?action=query&prop=imageinfo&iiprop=url&iiurlwidth={THUMBNAIL_WIDTH}&titles={}&format=json",
            self.api_url,
            urlencoding::encode(file_title)
        )
    }

    /// Title of the first file matching `term`, if any.
    pub async fn search_file(&self, term: &str) -> Result<Option<String>, FetchError> {
        let data = fetch_json(&*self.source, &self.search_url(term)).await?;
        Ok(data["query"]["search"]
            .as_array()
            .and_then(|hits| hits.first())
            .and_then(|hit| hit["title"].as_str())
            .map(str::to_string))
    }

    /// Image and thumbnail URLs for a `File:` title. A missing thumbnail
    /// falls back to the full image.
    pub async fn image_info(&self, file_title: &str) -> Result<Option<Portrait>, FetchError> {
        let data = fetch_json(&*self.source, &self.image_info_url(file_title)).await?;
        let Some(pages) = data["query"]["pages"].as_object() else {
            return Ok(None);
        };
        for page in pages.values() {
            let Some(info) = page["imageinfo"].as_array().and_then(|i| i.first()) else {
                continue;
            };
            let Some(url) = info["url"].as_str().filter(|u| !u.is_empty()) else {
                continue;
            };
            let thumb = info["thumburl"]
                .as_str()
                .filter(|t| !t.is_empty())
                .unwrap_or(url);
            return Ok(Some(Portrait {
                image_url: url.to_string(),
                thumbnail_url: thumb.to_string(),
            }));
        }
        Ok(None)
    }

    /// Try `"<name> portrait"` then `"<name>"`. Errors on one term fall
    /// through to the next; the last error is returned if nothing is found.
    pub async fn find_portrait(&self, name: &str) -> Result<Option<Portrait>, FetchError> {
        let mut last_error = None;
        for term in [format!("{name} portrait"), name.to_string()] {
            let found = match self.search_file(&term).await {
                Ok(Some(title)) => self.image_info(&title).await,
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };
            match found {
                Ok(Some(portrait)) => return Ok(Some(portrait)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(term = %term, error = %e, "commons lookup failed");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Thumbnail for an image already on Commons, looked up by its file
    /// name; other hosts fall back to a name search.
    pub async fn find_thumbnail(
        &self,
        name: &str,
        image_url: &str,
    ) -> Result<Option<String>, FetchError> {
        if let Some(title) = commons_file_title(image_url)
            && let Some(portrait) = self.image_info(&title).await?
        {
            return Ok(Some(portrait.thumbnail_url));
        }
        Ok(self.find_portrait(name).await?.map(|p| p.thumbnail_url))
    }
}

/// `File:` title for an `upload.wikimedia.org` URL, from its last path segment.
pub fn commons_file_title(image_url: &str) -> Option<String> {
    let url = Url::parse(image_url).ok()?;
    if !url.host_str()?.ends_with("wikimedia.org") {
        return None;
    }
    let segments: Vec<&str> = url.path_segments()?.collect();
    // Thumbnail paths end in "<width>px-<file>", with the file one segment up
    let file = if segments.contains(&"thumb") && segments.len() >= 2 {
        segments[segments.len() - 2]
    } else {
        *segments.last()?
    };
    if file.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(file).ok()?;
    Some(format!("File:{}", decoded.replace('_', " ")))
}

/// What a portrait job needs to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortraitMode {
    Full,
    ThumbnailOnly,
}

#[derive(Debug, Clone)]
pub struct PortraitJob {
    pub loc: ThinkerLoc,
    pub name: String,
    pub image_url: String,
    pub mode: PortraitMode,
}

/// Jobs for every thinker missing an image or thumbnail, in file order.
pub fn plan_portraits(index: &CategoryIndex) -> Vec<PortraitJob> {
    index
        .locations()
        .filter_map(|(loc, _, t)| {
            let mode = match (t.has_image(), t.has_thumbnail()) {
                (true, true) => return None,
                (true, false) => PortraitMode::ThumbnailOnly,
                (false, _) => PortraitMode::Full,
            };
            Some(PortraitJob {
                loc,
                name: t.name.clone(),
                image_url: t.image_url.clone(),
                mode,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortraitStats {
    pub total: usize,
    pub skipped: usize,
    pub images_found: usize,
    pub thumbnails_found: usize,
    pub not_found: usize,
    pub failed: usize,
}

enum Found {
    Full(Portrait),
    Thumbnail(String),
    Nothing,
}

/// Look up portraits for every planned job and write them into `index`.
pub async fn attach_portraits<S: PageSource + ?Sized + 'static>(
    client: &CommonsClient<S>,
    index: &mut CategoryIndex,
    options: PoolOptions,
    progress: ProgressFn,
) -> PortraitStats {
    let plan = plan_portraits(index);
    let mut stats = PortraitStats {
        total: index.thinker_count(),
        skipped: index.thinker_count() - plan.len(),
        ..PortraitStats::default()
    };

    let jobs = make_jobs(plan.into_iter().map(|job| (job.name.clone(), job)));
    let client = client.clone();
    let outcomes = run_pool(
        jobs,
        options,
        move |job: PortraitJob| {
            let client = client.clone();
            async move {
                let found = match job.mode {
                    PortraitMode::Full => client
                        .find_portrait(&job.name)
                        .await?
                        .map_or(Found::Nothing, Found::Full),
                    PortraitMode::ThumbnailOnly => client
                        .find_thumbnail(&job.name, &job.image_url)
                        .await?
                        .map_or(Found::Nothing, Found::Thumbnail),
                };
                Ok::<_, FetchError>((job.loc, found))
            }
        },
        progress,
    )
    .await;

    for outcome in outcomes {
        let (loc, found) = match outcome.result {
            Ok(r) => r,
            Err(_) => {
                stats.failed += 1;
                continue;
            }
        };
        let Some(thinker) = index.get_mut(loc) else {
            continue;
        };
        match found {
            Found::Full(portrait) => {
                thinker.image_url = portrait.image_url;
                thinker.thumbnail_url = Some(portrait.thumbnail_url);
                stats.images_found += 1;
            }
            Found::Thumbnail(thumb) => {
                thinker.thumbnail_url = Some(thumb);
                stats.thumbnails_found += 1;
            }
            Found::Nothing => {
                tracing::info!(thinker = %thinker.name, "no portrait found");
                stats.not_found += 1;
            }
        }
    }

    stats
}
