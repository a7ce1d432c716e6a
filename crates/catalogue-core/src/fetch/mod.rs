//! Fetching pages from the archive and other hosts.

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use crate::rate_limit::{FetchError, HostLimiters, check_rate_limit_response, with_politeness};

/// Boxed future returned by [`PageSource::fetch_text`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>>;

/// Something that can return the body of a URL.
pub trait PageSource: Send + Sync {
    fn fetch_text<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    fn fetch_text<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        (**self).fetch_text(url)
    }
}

/// Fetch and parse a JSON body.
pub async fn fetch_json<S: PageSource + ?Sized>(
    source: &S,
    url: &str,
) -> Result<serde_json::Value, FetchError> {
    let body = source.fetch_text(url).await?;
    serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
}

/// HTTP page source with a shared client and per-host politeness limits.
pub struct HttpSource {
    client: reqwest::Client,
    limiters: Arc<HostLimiters>,
}

impl HttpSource {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        limiters: Arc<HostLimiters>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, limiters })
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        check_rate_limit_response(&resp)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        resp.text().await.map_err(|e| FetchError::Decode(e.to_string()))
    }
}

impl PageSource for HttpSource {
    fn fetch_text<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
            let host = parsed
                .host_str()
                .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
            let limiter = self.limiters.for_host(host);

            tracing::debug!(url, "fetching");
            with_politeness(&limiter, url, || self.get_once(url)).await
        })
    }
}
