//! Per-host politeness limiting with adaptive governor instances.
//!
//! Each request waits for its host's governor permit via `until_ready()`.
//! On 429 the host's governor is slowed and the request retried once after
//! honouring `Retry-After`.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// How long a host must stay free of 429s before its base rate returns.
const DECAY_AFTER: Duration = Duration::from_secs(60);

/// Upper bound on the slowdown factor.
const MAX_FACTOR: u32 = 16;

/// Per-request fetch failure. Recovered by the caller, never fatal to a batch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    #[error("HTTP {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() || e.is_body() {
            FetchError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

fn quota_for(period: Duration) -> Quota {
    Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

/// Host rate limiter whose rate halves on each 429, up to 16x slower.
///
/// After [`DECAY_AFTER`] without a 429, the original rate is restored.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    current_factor: AtomicU32,
    last_429: Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    /// A zero period falls back to one request per second.
    pub fn new(period: Duration) -> Self {
        let limiter = Arc::new(DirectLimiter::direct(quota_for(period)));
        Self {
            limiter: ArcSwap::from(limiter),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: Mutex::new(None),
        }
    }

    pub fn per_second(n: u32) -> Self {
        let ms = 1000 / n.max(1) as u64;
        Self::new(Duration::from_millis(ms))
    }

    pub fn base_period(&self) -> Duration {
        self.base_period
    }

    pub fn factor(&self) -> u32 {
        self.current_factor.load(Ordering::SeqCst)
    }

    /// Wait until the limiter allows a request.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load();
        limiter.until_ready().await;
    }

    /// Double the slowdown factor and swap in a slower governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(MAX_FACTOR))
            });

        let factor = self.factor();
        if let Some(scaled) = self.base_period.checked_mul(factor)
            && let Some(quota) = Quota::with_period(scaled)
        {
            self.limiter.store(Arc::new(DirectLimiter::direct(quota)));
        }
    }

    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed() >= DECAY_AFTER))
            .unwrap_or(false);

        if should_restore && self.factor() > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(self.base_period))));
        }
    }
}

/// Lazily created limiters, one per host, all sharing a base period.
pub struct HostLimiters {
    period: Duration,
    limiters: Mutex<HashMap<String, Arc<AdaptiveLimiter>>>,
}

impl HostLimiters {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// The limiter for `host`, created on first use.
    pub fn for_host(&self, host: &str) -> Arc<AdaptiveLimiter> {
        let key = host.to_ascii_lowercase();
        let mut map = match self.limiters.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(key)
            .or_insert_with(|| Arc::new(AdaptiveLimiter::new(self.period)))
            .clone()
    }
}

impl Default for HostLimiters {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Check if an HTTP response is a 429 and extract Retry-After if present.
pub fn check_rate_limit_response(resp: &reqwest::Response) -> Result<(), FetchError> {
    if resp.status().as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        Err(FetchError::RateLimited { retry_after })
    } else {
        Ok(())
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date: use a conservative fixed wait instead of parsing it
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

/// Run `request` behind `limiter`.
///
/// A 429 slows the limiter for later requests to the host and is handed
/// back to the caller. Nothing is retried here.
pub async fn with_politeness<T, F, Fut>(
    limiter: &AdaptiveLimiter,
    label: &str,
    request: F,
) -> Result<T, FetchError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    limiter.acquire().await;

    let result = request().await;
    if let Err(FetchError::RateLimited { retry_after }) = &result {
        limiter.on_rate_limited();
        tracing::warn!(
            target_url = label,
            retry_after_secs = retry_after.map(|d| d.as_secs_f64()),
            factor = limiter.factor(),
            "429 rate limited, slowing down"
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn parse_integer_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::from_secs(0)));
    }

    #[test]
    fn parse_http_date() {
        let val = "Wed, 21 Oct 2015 07:28:00 GMT";
        assert_eq!(parse_retry_after(val), Some(Duration::from_secs(5)));
    }

    #[test]
    fn parse_garbage_none() {
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn ok_on_200() {
        let http_resp = http::Response::builder().status(200).body("").unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert!(check_rate_limit_response(&resp).is_ok());
    }

    #[test]
    fn rate_limited_429_with_retry_after() {
        let http_resp = http::Response::builder()
            .status(429)
            .header("retry-after", "10")
            .body("")
            .unwrap();
        let resp = reqwest::Response::from(http_resp);
        match check_rate_limit_response(&resp) {
            Err(FetchError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(10)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn on_rate_limited_doubles_and_caps() {
        let limiter = AdaptiveLimiter::per_second(10);
        assert_eq!(limiter.factor(), 1);
        limiter.on_rate_limited();
        assert_eq!(limiter.factor(), 2);
        for _ in 0..10 {
            limiter.on_rate_limited();
        }
        assert_eq!(limiter.factor(), 16);
    }

    #[test]
    fn zero_period_does_not_panic() {
        let limiter = AdaptiveLimiter::new(Duration::ZERO);
        assert_eq!(limiter.factor(), 1);
    }

    #[tokio::test]
    async fn decay_restores_after_quiet_period() {
        let limiter = AdaptiveLimiter::per_second(10);
        limiter.on_rate_limited();
        limiter.on_rate_limited();
        assert_eq!(limiter.factor(), 4);

        {
            let mut last = limiter.last_429.lock().unwrap();
            *last = Some(Instant::now() - Duration::from_secs(61));
        }

        limiter.acquire().await;
        assert_eq!(limiter.factor(), 1);
    }

    #[test]
    fn host_limiters_are_shared_per_host() {
        let limiters = HostLimiters::new(Duration::from_millis(100));
        let a = limiters.for_host("www.marxists.org");
        let b = limiters.for_host("WWW.MARXISTS.ORG");
        let c = limiters.for_host("commons.wikimedia.org");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_is_returned_without_retry() {
        let limiter = AdaptiveLimiter::per_second(10);
        let calls = AtomicUsize::new(0);

        let result: Result<String, FetchError> =
            with_politeness(&limiter, "https://example.org/", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(FetchError::RateLimited {
                        retry_after: Some(Duration::from_secs(5)),
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(FetchError::RateLimited {
                retry_after: Some(d)
            }) if d == Duration::from_secs(5)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(limiter.factor(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let limiter = AdaptiveLimiter::per_second(10);
        let calls = AtomicUsize::new(0);

        let result: Result<String, FetchError> =
            with_politeness(&limiter, "https://example.org/", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Status(404)) }
            })
            .await;

        assert!(matches!(result, Err(FetchError::Status(404))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
