//! Register of canonical works roots per thinker, for future re-crawls.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::crawl::{HarvestResult, HarvestStatus};
use crate::dataset::{list_json_files, load_folder_collections, read_json, sanitize_name};
use crate::model::WorkRecord;
use crate::names::slugify;
use crate::roots::{RootRules, SourceKind, source_label, works_root_with};

pub const AUTHOR_INDEX_LABEL: &str = "Marxists.org Author Index";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSource {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub url: String,
    pub works_root: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub collection: String,
    pub thinker: String,
    pub slug: String,
    #[serde(default)]
    pub sources: Vec<RegisterSource>,
}

impl RegisterEntry {
    /// Add a source unless one with the same works root or URL exists.
    pub fn add_source(&mut self, source: RegisterSource) -> bool {
        if self
            .sources
            .iter()
            .any(|s| s.works_root == source.works_root || s.url == source.url)
        {
            return false;
        }
        self.sources.push(source);
        true
    }
}

/// Entries keyed by `(collection, slug)`.
#[derive(Debug, Clone, Default)]
pub struct SourceRegister {
    entries: BTreeMap<(String, String), RegisterEntry>,
    rules: RootRules,
}

impl SourceRegister {
    pub fn new(rules: RootRules) -> Self {
        Self {
            entries: BTreeMap::new(),
            rules,
        }
    }

    fn entry(&mut self, collection: &str, thinker: &str, slug: &str) -> &mut RegisterEntry {
        self.entries
            .entry((collection.to_string(), slug.to_string()))
            .or_insert_with(|| RegisterEntry {
                collection: collection.to_string(),
                thinker: thinker.to_string(),
                slug: slug.to_string(),
                sources: Vec::new(),
            })
    }

    /// Seed from harvests: one author-index source per successful thinker.
    pub fn add_harvests<'a>(&mut self, harvests: impl IntoIterator<Item = &'a HarvestResult>) {
        for h in harvests {
            if h.status != HarvestStatus::Success
                || h.collection.is_empty()
                || h.thinker.is_empty()
                || h.slug.is_empty()
            {
                continue;
            }
            let Some(url) = h.source_url.as_deref().filter(|u| !u.is_empty()) else {
                continue;
            };
            let Some(root) = works_root_with(url, &self.rules) else {
                continue;
            };
            self.entry(&h.collection, &h.thinker, &h.slug)
                .add_source(RegisterSource {
                    label: AUTHOR_INDEX_LABEL.to_string(),
                    kind: SourceKind::MiaAuthorIndex,
                    url: url.to_string(),
                    works_root: root,
                    notes: Vec::new(),
                });
        }
    }

    /// Add one works-root source per distinct root of a thinker's existing work URLs.
    pub fn add_work_urls<'a>(
        &mut self,
        collection: &str,
        thinker: &str,
        urls: impl IntoIterator<Item = &'a str>,
    ) {
        let slug = slugify(thinker);
        let roots: Vec<String> = urls
            .into_iter()
            .filter(|u| u.starts_with("http"))
            .filter_map(|u| works_root_with(u, &self.rules))
            .collect();
        let labels: Vec<(String, SourceKind)> =
            roots.iter().map(|r| source_label(r, &self.rules)).collect();

        let entry = self.entry(collection, thinker, &slug);
        entry.thinker = thinker.to_string();
        for (root, (label, kind)) in roots.into_iter().zip(labels) {
            entry.add_source(RegisterSource {
                label,
                kind,
                url: root.clone(),
                works_root: root,
                notes: Vec::new(),
            });
        }
    }

    /// Augment from a folder dataset (`<dir>/<collection>/metadata.json` plus
    /// `<dir>/<collection>/<thinker>/*.json` work lists).
    pub fn augment_with_folders(&mut self, data_dir: &Path) -> Result<(), CoreError> {
        for collection in load_folder_collections(data_dir)? {
            for meta in &collection.entries {
                if meta.n.is_empty() {
                    continue;
                }
                let thinker_dir = data_dir.join(&collection.folder).join(sanitize_name(&meta.n));
                let urls = if thinker_dir.is_dir() {
                    collect_work_urls(&thinker_dir)?
                } else {
                    Vec::new()
                };
                self.add_work_urls(&collection.folder, &meta.n, urls.iter().map(String::as_str));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by `(collection, slug)`.
    pub fn into_entries(self) -> Vec<RegisterEntry> {
        self.entries.into_values().collect()
    }
}

/// Work URLs from every subject file in a thinker folder. Unparseable files are skipped.
fn collect_work_urls(thinker_dir: &Path) -> Result<Vec<String>, CoreError> {
    let mut urls = Vec::new();
    for file in list_json_files(thinker_dir)? {
        if file
            .file_name()
            .is_some_and(|n| n.eq_ignore_ascii_case("metadata.json"))
        {
            continue;
        }
        match read_json::<Vec<WorkRecord>>(&file) {
            Ok(works) => urls.extend(works.into_iter().map(|w| w.url)),
            Err(e) => tracing::debug!(file = %file.display(), error = %e, "skipping work file"),
        }
    }
    Ok(urls)
}

/// Every `*.json` under `dir`, recursively, sorted by path.
pub fn harvest_files(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    if !dir.is_dir() {
        return Err(CoreError::MissingInput(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let read = std::fs::read_dir(&current).map_err(|source| CoreError::Io {
            path: current.clone(),
            source,
        })?;
        for entry in read {
            let path = entry
                .map_err(|source| CoreError::Io {
                    path: current.clone(),
                    source,
                })?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == "json") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Load every harvest result under `dir`.
pub fn load_harvest_dir(dir: &Path) -> Result<Vec<HarvestResult>, CoreError> {
    harvest_files(dir)?
        .iter()
        .map(|path| read_json(path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::write_json;
    use crate::model::CompactMetadata;

    fn harvest(slug: &str, status: HarvestStatus, source_url: Option<&str>) -> HarvestResult {
        HarvestResult {
            collection: "second-international".into(),
            thinker: slug.replace('-', " "),
            slug: slug.into(),
            source_url: source_url.map(str::to_string),
            status,
            message: String::new(),
            warnings: vec![],
            works: vec![],
            visited_urls: vec![],
        }
    }

    #[test]
    fn test_only_successful_harvests_are_registered() {
        let mut register = SourceRegister::default();
        register.add_harvests(&[
            harvest(
                "karl-kautsky",
                HarvestStatus::Success,
                Some("https://www.marxists.org/archive/kautsky/index.htm"),
            ),
            harvest("nobody", HarvestStatus::NoWorksFound, Some("https://x.org/a/")),
            harvest("ghost", HarvestStatus::Success, None),
        ]);
        let entries = register.into_entries();
        assert_eq!(entries.len(), 1);
        let source = &entries[0].sources[0];
        assert_eq!(source.label, AUTHOR_INDEX_LABEL);
        assert_eq!(source.kind, SourceKind::MiaAuthorIndex);
        assert_eq!(source.works_root, "https://www.marxists.org/archive/kautsky/");

        let json = serde_json::to_value(source).unwrap();
        assert_eq!(json["type"], "mia_author_index");
    }

    #[test]
    fn test_sources_dedup_by_root() {
        let mut register = SourceRegister::default();
        register.add_work_urls(
            "first-international",
            "Karl Marx",
            [
                "https://www.marxists.org/archive/marx/works/1867-c1/ch01.htm",
                "https://www.marxists.org/archive/marx/works/1848/communist-manifesto/",
                "https://www.gutenberg.org/files/61/61-h/61-h.htm",
                "/relative/only.htm",
            ],
        );
        let entries = register.into_entries();
        let sources = &entries[0].sources;
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].kind, SourceKind::MiaWorksRoot);
        assert_eq!(sources[1].kind, SourceKind::ExternalWorksRoot);
        assert_eq!(sources[1].label, "www.gutenberg.org Works Root");
        assert_eq!(entries[0].slug, "karl-marx");
    }

    #[test]
    fn test_entries_sorted_by_collection_and_slug() {
        let mut register = SourceRegister::default();
        register.add_work_urls("b", "Zed", Vec::<&str>::new());
        register.add_work_urls("a", "Yan", Vec::<&str>::new());
        register.add_work_urls("b", "Abe", Vec::<&str>::new());
        let keys: Vec<(String, String)> = register
            .into_entries()
            .into_iter()
            .map(|e| (e.collection, e.slug))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a".to_string(), "yan".to_string()),
                ("b".to_string(), "abe".to_string()),
                ("b".to_string(), "zed".to_string()),
            ]
        );
    }

    #[test]
    fn test_load_harvest_dir_and_augment() {
        let dir = tempfile::tempdir().unwrap();
        let h = harvest(
            "karl-kautsky",
            HarvestStatus::Success,
            Some("https://www.marxists.org/archive/kautsky/index.htm"),
        );
        write_json(&h.output_path(&dir.path().join("harvest")), &h).unwrap();
        let loaded = load_harvest_dir(&dir.path().join("harvest")).unwrap();
        assert_eq!(loaded, vec![h]);

        let data = dir.path().join("data");
        write_json(
            &data.join("second-international/metadata.json"),
            &vec![CompactMetadata {
                n: "karl kautsky".into(),
                ..CompactMetadata::default()
            }],
        )
        .unwrap();
        write_json(
            &data.join("second-international/karl kautsky/General.json"),
            &vec![WorkRecord::new(
                "The Class Struggle",
                "https://www.marxists.org/archive/kautsky/1892/erfurt/ch04.htm",
            )],
        )
        .unwrap();

        let mut register = SourceRegister::default();
        register.add_harvests(&loaded);
        register.augment_with_folders(&data).unwrap();
        let entries = register.into_entries();
        assert_eq!(entries.len(), 1);
        // Same root as the author index source
        assert_eq!(entries[0].sources.len(), 1);
    }
}
