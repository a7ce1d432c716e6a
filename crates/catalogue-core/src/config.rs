use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub http: Option<HttpConfig>,
    pub pool: Option<PoolConfig>,
    pub classifier: Option<ClassifierConfig>,
    pub matching: Option<MatchingConfig>,
    pub crawl: Option<CrawlConfig>,
    pub roots: Option<RootsConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub user_agent: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Minimum spacing between requests to one host.
    pub request_period_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub workers: Option<usize>,
    pub delay_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub min_title_chars: Option<usize>,
    pub max_title_chars: Option<usize>,
    pub min_title_tokens: Option<usize>,
    /// Replaces the built-in title denylist.
    pub title_denylist: Option<Vec<String>>,
    /// Replaces the built-in URL denylist.
    pub url_denylist: Option<Vec<String>>,
    /// Appended to whichever title denylist is in effect.
    pub extra_title_denylist: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub token_overlap_slack: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub max_depth: Option<usize>,
    pub fallback_title_tokens: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootsConfig {
    pub primary_hosts: Option<Vec<String>>,
    pub primary_depth: Option<usize>,
}

/// Platform config directory path: `<config_dir>/thinker-catalogue/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("thinker-catalogue").join("config.toml"))
}

pub const LOCAL_CONFIG_FILE: &str = ".catalogue.toml";

/// Load config by cascading CWD `.catalogue.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(LOCAL_CONFIG_FILE));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config");
            None
        }
    }
}

/// Read a config file that must exist and parse.
pub fn read_config(path: &Path) -> Result<ConfigFile, CoreError> {
    if !path.exists() {
        return Err(CoreError::MissingInput(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))
}

/// The overlay section's field if set, else the base section's.
fn pick<S, T>(
    overlay: Option<&S>,
    base: Option<&S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay.and_then(&field).or_else(|| base.and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bh, oh) = (base.http.as_ref(), overlay.http.as_ref());
    let (bp, op) = (base.pool.as_ref(), overlay.pool.as_ref());
    let (bc, oc) = (base.classifier.as_ref(), overlay.classifier.as_ref());
    let (bm, om) = (base.matching.as_ref(), overlay.matching.as_ref());
    let (bw, ow) = (base.crawl.as_ref(), overlay.crawl.as_ref());
    let (br, or) = (base.roots.as_ref(), overlay.roots.as_ref());

    ConfigFile {
        http: Some(HttpConfig {
            user_agent: pick(oh, bh, |h| h.user_agent.clone()),
            timeout_secs: pick(oh, bh, |h| h.timeout_secs),
            request_period_ms: pick(oh, bh, |h| h.request_period_ms),
        }),
        pool: Some(PoolConfig {
            workers: pick(op, bp, |p| p.workers),
            delay_ms: pick(op, bp, |p| p.delay_ms),
            jitter_ms: pick(op, bp, |p| p.jitter_ms),
            batch_size: pick(op, bp, |p| p.batch_size),
        }),
        classifier: Some(ClassifierConfig {
            min_title_chars: pick(oc, bc, |c| c.min_title_chars),
            max_title_chars: pick(oc, bc, |c| c.max_title_chars),
            min_title_tokens: pick(oc, bc, |c| c.min_title_tokens),
            title_denylist: pick(oc, bc, |c| c.title_denylist.clone()),
            url_denylist: pick(oc, bc, |c| c.url_denylist.clone()),
            extra_title_denylist: pick(oc, bc, |c| c.extra_title_denylist.clone()),
        }),
        matching: Some(MatchingConfig {
            token_overlap_slack: pick(om, bm, |m| m.token_overlap_slack),
        }),
        crawl: Some(CrawlConfig {
            max_depth: pick(ow, bw, |c| c.max_depth),
            fallback_title_tokens: pick(ow, bw, |c| c.fallback_title_tokens),
        }),
        roots: Some(RootsConfig {
            primary_hosts: pick(or, br, |r| r.primary_hosts.clone()),
            primary_depth: pick(or, br, |r| r.primary_depth),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylist_round_trip_toml() {
        let config = ConfigFile {
            classifier: Some(ClassifierConfig {
                extra_title_denylist: Some(vec!["table of contents".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn absent_fields_deserialize_as_none() {
        let toml_str = "[pool]\nworkers = 4\n\n[crawl]\nmax_depth = 2\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        let pool = parsed.pool.unwrap();
        assert_eq!(pool.workers, Some(4));
        assert!(pool.delay_ms.is_none());
        assert!(parsed.http.is_none());
        assert_eq!(parsed.crawl.unwrap().max_depth, Some(2));
    }

    #[test]
    fn merge_overlay_wins_field_by_field() {
        let base = ConfigFile {
            pool: Some(PoolConfig {
                workers: Some(2),
                delay_ms: Some(500),
                ..Default::default()
            }),
            http: Some(HttpConfig {
                user_agent: Some("base-agent".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            pool: Some(PoolConfig {
                workers: Some(16),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        let pool = merged.pool.unwrap();
        assert_eq!(pool.workers, Some(16));
        assert_eq!(pool.delay_ms, Some(500));
        assert_eq!(merged.http.unwrap().user_agent.as_deref(), Some("base-agent"));
    }

    #[test]
    fn read_config_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[pool\nworkers = ").unwrap();
        assert!(matches!(read_config(&path), Err(CoreError::Config(_))));
        assert!(load_from_path(&path).is_none());
        assert!(matches!(
            read_config(&dir.path().join("absent.toml")),
            Err(CoreError::MissingInput(_))
        ));
    }

    #[test]
    fn written_toml_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = ConfigFile {
            roots: Some(RootsConfig {
                primary_hosts: Some(vec!["marxists.org".into(), "marxists.info".into()]),
                primary_depth: Some(3),
            }),
            ..Default::default()
        };
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(read_config(&path).unwrap(), config);
    }
}
