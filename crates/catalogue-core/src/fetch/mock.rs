//! In-memory page source for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{FetchFuture, PageSource};
use crate::rate_limit::FetchError;

/// A hand-rolled [`PageSource`] serving canned bodies by exact URL.
///
/// Unknown URLs answer `FetchError::Status(404)`. Every request is recorded.
#[derive(Default)]
pub struct MockSource {
    pages: HashMap<String, Result<String, FetchError>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), Ok(body.into()));
        self
    }

    pub fn with_error(mut self, url: impl Into<String>, error: FetchError) -> Self {
        self.pages.insert(url.into(), Err(error));
        self
    }

    /// Simulated latency per request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl PageSource for MockSource {
    fn fetch_text<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        let response = self
            .pages
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)));
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            response
        })
    }
}
