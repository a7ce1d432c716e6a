//! Curated edits and harvested works applied to the bundle.
//!
//! A patch names a thinker and carries any of a new bio link, new images
//! and extra works. Works are merged with the usual URL/title dedup, so
//! applying the same patch twice changes nothing the second time. Work
//! counts in the compact metadata follow from the bundle the next time it
//! is split.

use serde::{Deserialize, Serialize};

use crate::crawl::{HarvestResult, HarvestStatus};
use crate::model::{CategoryIndex, ThinkerRecord, WorkRecord};
use crate::names::{MatchRules, slugify};
use crate::works::merge_works;

/// Edits for one thinker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkerPatch {
    pub name: String,
    /// Category searched first, and where a thinker missing from the
    /// dataset is added. A slug such as `second-international` names the
    /// bundle category with that slug. Without it an unknown name is only
    /// reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "wikipedia_url", skip_serializing_if = "Option::is_none")]
    pub bio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub works: Vec<WorkRecord>,
}

impl ThinkerPatch {
    /// The works of a successful harvest. Other statuses carry nothing to apply.
    pub fn from_harvest(result: &HarvestResult) -> Option<Self> {
        if result.status != HarvestStatus::Success || result.works.is_empty() {
            return None;
        }
        Some(Self {
            name: result.thinker.clone(),
            category: Some(result.collection.clone()),
            works: result.works.clone(),
            ..Self::default()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    Updated,
    /// Already matched the patch.
    Unchanged,
    /// Not in the dataset; added under the patch's category.
    Added,
    /// Not in the dataset and no category to add it under.
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchOutcome {
    pub name: String,
    pub status: PatchStatus,
    pub works_added: usize,
    /// Works the thinker has after the patch.
    pub work_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchReport {
    pub outcomes: Vec<PatchOutcome>,
}

impl PatchReport {
    pub fn count(&self, status: PatchStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn works_added(&self) -> usize {
        self.outcomes.iter().map(|o| o.works_added).sum()
    }
}

/// Apply `patches` in order. Thinkers are found with the name matcher.
pub fn apply_patches(
    index: &mut CategoryIndex,
    patches: &[ThinkerPatch],
    rules: &MatchRules,
) -> PatchReport {
    let mut report = PatchReport::default();
    for patch in patches {
        let outcome = apply_patch(index, patch, rules);
        match outcome.status {
            PatchStatus::NotFound => {
                tracing::warn!(thinker = %patch.name, "thinker not found in dataset")
            }
            status => tracing::debug!(
                thinker = %patch.name,
                ?status,
                works_added = outcome.works_added,
                "patched"
            ),
        }
        report.outcomes.push(outcome);
    }
    report
}

/// The bundle category named by `hint`, compared by slug, or `hint` itself.
fn resolve_category(index: &CategoryIndex, hint: &str) -> String {
    let wanted = slugify(hint);
    index
        .categories()
        .map(|(name, _)| name)
        .find(|name| *name == hint || slugify(name) == wanted)
        .unwrap_or(hint)
        .to_string()
}

fn apply_patch(index: &mut CategoryIndex, patch: &ThinkerPatch, rules: &MatchRules) -> PatchOutcome {
    let category = patch.category.as_deref().map(|c| resolve_category(index, c));
    let located = index.locate(&patch.name, category.as_deref(), rules);
    let (loc, added) = match (located, category) {
        (Some(loc), _) => (loc, false),
        (None, Some(category)) => {
            let thinker = ThinkerRecord {
                name: patch.name.clone(),
                category: category.clone(),
                ..ThinkerRecord::default()
            };
            (index.push(&category, thinker), true)
        }
        (None, None) => {
            return PatchOutcome {
                name: patch.name.clone(),
                status: PatchStatus::NotFound,
                works_added: 0,
                work_count: 0,
            };
        }
    };

    let Some(thinker) = index.get_mut(loc) else {
        return PatchOutcome {
            name: patch.name.clone(),
            status: PatchStatus::NotFound,
            works_added: 0,
            work_count: 0,
        };
    };

    let mut changed = false;
    if let Some(bio) = &patch.bio_url
        && thinker.bio_url != *bio
    {
        thinker.bio_url = bio.clone();
        changed = true;
    }
    if let Some(image) = &patch.image_url
        && thinker.image_url != *image
    {
        thinker.image_url = image.clone();
        changed = true;
    }
    if let Some(thumb) = &patch.thumbnail_url
        && thinker.thumbnail_url.as_ref() != Some(thumb)
    {
        thinker.thumbnail_url = Some(thumb.clone());
        changed = true;
    }
    let works_added = merge_works(&mut thinker.works, patch.works.iter().cloned());

    let status = if added {
        PatchStatus::Added
    } else if changed || works_added > 0 {
        PatchStatus::Updated
    } else {
        PatchStatus::Unchanged
    };
    PatchOutcome {
        name: thinker.name.clone(),
        status,
        works_added,
        work_count: thinker.works.len(),
    }
}

/// Patches from harvest results, skipping the ones with nothing to apply.
pub fn harvest_patches<'a>(
    results: impl IntoIterator<Item = &'a HarvestResult>,
) -> Vec<ThinkerPatch> {
    results
        .into_iter()
        .filter_map(ThinkerPatch::from_harvest)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> CategoryIndex {
        let mut index = CategoryIndex::new();
        index.insert(
            "First International",
            vec![ThinkerRecord {
                name: "Karl Marx".into(),
                category: "First International".into(),
                bio_url: "/archive/marx/bio/index.htm".into(),
                works: vec![WorkRecord::new(
                    "Capital, Volume I",
                    "https://www.marxists.org/archive/marx/works/1867-c1/",
                )],
                ..ThinkerRecord::default()
            }],
        );
        index.insert(
            "Second International",
            vec![ThinkerRecord {
                name: "Karl Kautsky".into(),
                category: "Second International".into(),
                ..ThinkerRecord::default()
            }],
        );
        index
    }

    fn harvest(thinker: &str, status: HarvestStatus, works: Vec<WorkRecord>) -> HarvestResult {
        HarvestResult {
            collection: "second-international".into(),
            thinker: thinker.into(),
            slug: thinker.to_lowercase().replace(' ', "-"),
            source_url: None,
            status,
            message: String::new(),
            warnings: vec![],
            works,
            visited_urls: vec![],
        }
    }

    #[test]
    fn bio_url_replaced() {
        let mut index = bundle();
        let patches = vec![ThinkerPatch {
            name: "Karl Marx".into(),
            bio_url: Some("https://en.wikipedia.org/wiki/Karl_Marx".into()),
            ..ThinkerPatch::default()
        }];
        let report = apply_patches(&mut index, &patches, &MatchRules::default());

        assert_eq!(report.count(PatchStatus::Updated), 1);
        let marx = &index.category("First International").unwrap()[0];
        assert_eq!(marx.bio_url, "https://en.wikipedia.org/wiki/Karl_Marx");
        assert_eq!(marx.works.len(), 1);
    }

    #[test]
    fn works_merge_and_reapply_is_a_no_op() {
        let mut index = bundle();
        let patches = vec![ThinkerPatch {
            name: "Karl Marx".into(),
            works: vec![
                WorkRecord::new(
                    "Capital Volume One",
                    "https://www.marxists.org/archive/marx/works/1867-c1",
                ),
                WorkRecord::new(
                    "The Poverty of Philosophy",
                    "https://www.marxists.org/archive/marx/works/1847/poverty-philosophy/",
                ),
            ],
            ..ThinkerPatch::default()
        }];

        let first = apply_patches(&mut index, &patches, &MatchRules::default());
        assert_eq!(first.works_added(), 1);
        assert_eq!(first.outcomes[0].work_count, 2);

        let after_first = index.clone();
        let second = apply_patches(&mut index, &patches, &MatchRules::default());
        assert_eq!(second.count(PatchStatus::Unchanged), 1);
        assert_eq!(second.works_added(), 0);
        assert_eq!(index, after_first);
    }

    #[test]
    fn unknown_thinker_added_only_with_category() {
        let mut index = bundle();
        let patches = vec![
            ThinkerPatch {
                name: "Clara Zetkin".into(),
                category: Some("Second International".into()),
                image_url: Some("https://upload.wikimedia.org/zetkin.jpg".into()),
                ..ThinkerPatch::default()
            },
            ThinkerPatch {
                name: "Nobody Inparticular".into(),
                bio_url: Some("https://example.org/".into()),
                ..ThinkerPatch::default()
            },
        ];
        let report = apply_patches(&mut index, &patches, &MatchRules::default());

        let statuses: Vec<PatchStatus> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![PatchStatus::Added, PatchStatus::NotFound]);
        let second = index.category("Second International").unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].name, "Clara Zetkin");
        assert_eq!(second[1].image_url, "https://upload.wikimedia.org/zetkin.jpg");
        assert_eq!(index.thinker_count(), 3);
    }

    #[test]
    fn new_category_is_appended() {
        let mut index = bundle();
        let patches = vec![ThinkerPatch {
            name: "Antonio Gramsci".into(),
            category: Some("Western Marxism".into()),
            ..ThinkerPatch::default()
        }];
        apply_patches(&mut index, &patches, &MatchRules::default());
        let names: Vec<&str> = index.categories().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["First International", "Second International", "Western Marxism"]
        );
    }

    #[test]
    fn harvests_become_work_patches() {
        let works = vec![WorkRecord::new(
            "The Road to Power",
            "https://www.marxists.org/archive/kautsky/works/1909/power.htm",
        )];
        let results = vec![
            harvest("Karl Kautsky", HarvestStatus::Success, works),
            harvest("Eduard Bernstein", HarvestStatus::NoWorksFound, vec![]),
            harvest("Rosa Luxemburg", HarvestStatus::NoSourceMatch, vec![]),
        ];
        let patches = harvest_patches(&results);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].category.as_deref(), Some("second-international"));

        let mut index = bundle();
        let report = apply_patches(&mut index, &patches, &MatchRules::default());
        assert_eq!(report.count(PatchStatus::Updated), 1);
        let kautsky = &index.category("Second International").unwrap()[0];
        assert_eq!(kautsky.works.len(), 1);
        assert_eq!(index.categories().count(), 2);
    }

    #[test]
    fn split_after_patch_reports_new_counts() {
        let mut dataset = crate::Dataset {
            path: "bundle.json".into(),
            index: bundle(),
        };
        let patches = vec![ThinkerPatch {
            name: "Karl Kautsky".into(),
            works: vec![
                WorkRecord::new(
                    "The Road to Power",
                    "https://www.marxists.org/archive/kautsky/works/1909/power.htm",
                ),
                WorkRecord::new(
                    "The Class Struggle",
                    "https://www.marxists.org/archive/kautsky/works/1892/erfurt/",
                ),
            ],
            ..ThinkerPatch::default()
        }];
        apply_patches(&mut dataset.index, &patches, &MatchRules::default());

        let split = crate::dataset::split_bundle(&dataset);
        let second = split.metadata.get("Second International").unwrap();
        assert_eq!(second[0].w, 2);
        assert_eq!(split.works.get("Karl Kautsky").map(Vec::len), Some(2));
    }

    #[test]
    fn wikipedia_url_alias_reads_as_bio_url() {
        let json = r#"[{"name": "Friedrich Engels", "wikipedia_url": "https://en.wikipedia.org/wiki/Friedrich_Engels"}]"#;
        let patches: Vec<ThinkerPatch> = serde_json::from_str(json).unwrap();
        assert_eq!(
            patches[0].bio_url.as_deref(),
            Some("https://en.wikipedia.org/wiki/Friedrich_Engels")
        );
        assert!(patches[0].works.is_empty());
    }
}
