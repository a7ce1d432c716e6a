use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub mod audit;
pub mod config;
pub mod crawl;
pub mod dataset;
pub mod fetch;
pub mod html;
pub mod model;
pub mod names;
pub mod patch;
pub mod populate;
pub mod pool;
pub mod portraits;
pub mod rate_limit;
pub mod register;
pub mod roots;
pub mod sources;
pub mod works;

// Re-export for convenience
pub use crawl::{CrawlRules, HarvestResult, HarvestStatus, Harvester};
pub use dataset::Dataset;
pub use fetch::{HttpSource, PageSource};
pub use model::{CategoryIndex, SourceMatch, ThinkerRecord, WorkRecord};
pub use names::{MatchConfidence, MatchRules, names_match};
pub use pool::{PoolOptions, run_pool};
pub use rate_limit::{FetchError, HostLimiters};
pub use roots::{RootRules, works_root};
pub use works::{ClassifierRules, WorkClassifier};

pub use reqwest::Url;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("input not found: {}", .0.display())]
    MissingInput(PathBuf),
}

pub const DEFAULT_USER_AGENT: &str =
    "thinker-catalogue/0.1 (+https://github.com/thinker-catalogue/thinker-catalogue)";

/// Resolved settings shared by every command.
#[derive(Debug, Clone)]
pub struct Config {
    pub user_agent: String,
    pub timeout: Duration,
    /// Minimum spacing between requests to one host.
    pub request_period: Duration,
    pub pool: PoolOptions,
    /// Authors per checkpointed batch when populating.
    pub batch_size: usize,
    pub classifier: ClassifierRules,
    pub matching: MatchRules,
    pub crawl: CrawlRules,
    pub roots: RootRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(15),
            request_period: Duration::from_secs(1),
            pool: PoolOptions::default(),
            batch_size: populate::DEFAULT_BATCH_SIZE,
            classifier: ClassifierRules::default(),
            matching: MatchRules::default(),
            crawl: CrawlRules::default(),
            roots: RootRules::default(),
        }
    }
}

impl Config {
    /// Defaults overridden by whatever the file sets.
    pub fn from_file(file: &config::ConfigFile) -> Self {
        let mut cfg = Self::default();

        if let Some(http) = &file.http {
            if let Some(ua) = http.user_agent.as_deref().filter(|u| !u.trim().is_empty()) {
                cfg.user_agent = ua.to_string();
            }
            if let Some(secs) = http.timeout_secs {
                cfg.timeout = Duration::from_secs(secs);
            }
            if let Some(ms) = http.request_period_ms {
                cfg.request_period = Duration::from_millis(ms);
            }
        }

        if let Some(pool) = &file.pool {
            if let Some(workers) = pool.workers {
                cfg.pool.workers = workers.max(1);
            }
            if let Some(ms) = pool.delay_ms {
                cfg.pool.delay = Duration::from_millis(ms);
            }
            if let Some(ms) = pool.jitter_ms {
                cfg.pool.jitter = Duration::from_millis(ms);
            }
            if let Some(size) = pool.batch_size {
                cfg.batch_size = size.max(1);
            }
        }

        if let Some(c) = &file.classifier {
            let rules = &mut cfg.classifier;
            if let Some(n) = c.min_title_chars {
                rules.min_title_chars = n;
            }
            if let Some(n) = c.max_title_chars {
                rules.max_title_chars = n;
            }
            if let Some(n) = c.min_title_tokens {
                rules.min_title_tokens = n;
            }
            if let Some(list) = &c.title_denylist {
                rules.title_denylist = list.clone();
            }
            if let Some(list) = &c.url_denylist {
                rules.url_denylist = list.clone();
            }
            if let Some(extra) = &c.extra_title_denylist {
                rules.title_denylist.extend(extra.iter().cloned());
            }
        }

        if let Some(slack) = file.matching.as_ref().and_then(|m| m.token_overlap_slack) {
            cfg.matching.token_overlap_slack = slack;
        }

        if let Some(crawl) = &file.crawl {
            if let Some(depth) = crawl.max_depth {
                cfg.crawl.max_depth = depth;
            }
            if let Some(n) = crawl.fallback_title_tokens {
                cfg.crawl.fallback_title_tokens = n;
            }
        }

        if let Some(roots) = &file.roots {
            if let Some(hosts) = &roots.primary_hosts {
                cfg.roots.primary_hosts = hosts.clone();
            }
            if let Some(depth) = roots.primary_depth {
                cfg.roots.primary_depth = depth;
            }
        }

        cfg
    }

    /// Compile the classifier rules. A bad denylist pattern is a config error.
    pub fn work_classifier(&self) -> Result<WorkClassifier, CoreError> {
        WorkClassifier::new(self.classifier.clone())
            .map_err(|e| CoreError::Config(format!("invalid classifier pattern: {e}")))
    }

    pub fn http_source(&self) -> Result<HttpSource, CoreError> {
        let limiters = Arc::new(HostLimiters::new(self.request_period));
        Ok(HttpSource::new(&self.user_agent, self.timeout, limiters)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierConfig, ConfigFile, HttpConfig, PoolConfig};

    #[test]
    fn test_file_values_override_defaults() {
        let file = ConfigFile {
            http: Some(HttpConfig {
                user_agent: Some("test-agent/1.0".into()),
                request_period_ms: Some(250),
                ..Default::default()
            }),
            pool: Some(PoolConfig {
                workers: Some(0),
                delay_ms: Some(0),
                ..Default::default()
            }),
            classifier: Some(ClassifierConfig {
                extra_title_denylist: Some(vec!["errata".into()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let cfg = Config::from_file(&file);
        assert_eq!(cfg.user_agent, "test-agent/1.0");
        assert_eq!(cfg.request_period, Duration::from_millis(250));
        assert_eq!(cfg.pool.workers, 1);
        assert!(cfg.pool.delay.is_zero());
        assert_eq!(cfg.timeout, Duration::from_secs(15));
        assert!(cfg.classifier.title_denylist.iter().any(|t| t == "home"));
        assert!(!cfg.work_classifier().unwrap().accepts_title("Errata to Volume Two"));
    }

    #[test]
    fn test_bad_url_pattern_is_config_error() {
        let file = ConfigFile {
            classifier: Some(ClassifierConfig {
                url_denylist: Some(vec!["(unclosed".into()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let cfg = Config::from_file(&file);
        assert!(matches!(cfg.work_classifier(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_error_messages_name_the_path() {
        let err = CoreError::MissingInput(PathBuf::from("data/bundle.json"));
        assert_eq!(err.to_string(), "input not found: data/bundle.json");
    }
}
