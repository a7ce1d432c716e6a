//! Work coverage audit: who has no works, who has only a few.

use std::fmt::Write as _;

use crate::dataset::{FolderCollection, category_folder};
use crate::model::{CategoryIndex, OrderedMap, ZeroWorksRecord};
use crate::names::slugify;

pub const AUDIT_HEADER: &str = "# Work Coverage Audit\n\nGenerated automatically.\n\n";

/// Upper bound (inclusive) of the "few works" section.
pub const LOW_WORKS_MAX: usize = 5;

/// Work counts grouped by collection folder.
#[derive(Debug, Clone, Default)]
pub struct CoverageAudit {
    pub zero: OrderedMap<Vec<String>>,
    pub low: OrderedMap<Vec<(String, usize)>>,
}

impl CoverageAudit {
    fn record(&mut self, collection: &str, name: &str, works: usize) {
        if name.is_empty() {
            return;
        }
        match works {
            0 => self.zero.entry_or_default(collection).push(name.to_string()),
            1..=LOW_WORKS_MAX => self
                .low
                .entry_or_default(collection)
                .push((name.to_string(), works)),
            _ => {}
        }
    }

    pub fn from_index(index: &CategoryIndex) -> Self {
        let mut audit = Self::default();
        for (category, thinkers) in index.categories() {
            let collection = category_folder(category);
            for t in thinkers {
                audit.record(&collection, &t.name, t.works.len());
            }
        }
        audit
    }

    pub fn from_folders(collections: &[FolderCollection]) -> Self {
        let mut audit = Self::default();
        for c in collections {
            for entry in &c.entries {
                audit.record(&c.folder, &entry.n, entry.w);
            }
        }
        audit
    }

    pub fn zero_total(&self) -> usize {
        self.zero.iter().map(|(_, v)| v.len()).sum()
    }

    pub fn low_total(&self) -> usize {
        self.low.iter().map(|(_, v)| v.len()).sum()
    }

    /// Thinkers with no works, by collection then name.
    pub fn zero_works_records(&self) -> Vec<ZeroWorksRecord> {
        let mut records = Vec::with_capacity(self.zero_total());
        for collection in sorted_collections(self.zero.keys()) {
            let Some(names) = self.zero.get(collection) else {
                continue;
            };
            for name in sorted_names(names.iter().map(String::as_str)) {
                records.push(ZeroWorksRecord {
                    collection: collection.to_string(),
                    thinker: name.to_string(),
                    slug: slugify(name),
                });
            }
        }
        records
    }

    pub fn render_markdown(&self) -> String {
        let mut zero = String::new();
        let _ = writeln!(zero, "## Thinkers with 0 works\n");
        let _ = writeln!(zero, "Total: {}\n", self.zero_total());
        for collection in sorted_collections(self.zero.keys()) {
            let names = sorted_names(
                self.zero
                    .get(collection)
                    .into_iter()
                    .flatten()
                    .map(String::as_str),
            );
            let _ = writeln!(
                zero,
                "### {} ({})\n",
                format_collection_name(collection),
                names.len()
            );
            for name in names {
                let _ = writeln!(zero, "- {name}");
            }
            zero.push('\n');
        }

        let mut low = String::new();
        let _ = writeln!(low, "## Thinkers with 1-{LOW_WORKS_MAX} works\n");
        let _ = writeln!(low, "Total: {}\n", self.low_total());
        for collection in sorted_collections(self.low.keys()) {
            let mut entries: Vec<&(String, usize)> =
                self.low.get(collection).into_iter().flatten().collect();
            entries.sort_by_key(|(name, _)| name.to_lowercase());
            let _ = writeln!(
                low,
                "### {} ({})\n",
                format_collection_name(collection),
                entries.len()
            );
            for (name, count) in entries {
                let noun = if *count == 1 { "work" } else { "works" };
                let _ = writeln!(low, "- {name} ({count} {noun})");
            }
            low.push('\n');
        }

        format!(
            "{AUDIT_HEADER}{}\n\n\n{}\n",
            zero.trim_end(),
            low.trim_end()
        )
    }
}

fn sorted_collections<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut keys: Vec<&str> = keys.collect();
    keys.sort_by_cached_key(|k| format_collection_name(k).to_lowercase());
    keys
}

fn sorted_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut names: Vec<&str> = names.collect();
    names.sort_by_cached_key(|n| n.to_lowercase());
    names
}

/// `"african-liberation"` → `"African Liberation"`; single letters upper-cased.
pub fn format_collection_name(folder: &str) -> String {
    let words: Vec<String> = folder
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) if w.chars().count() == 1 => first.to_uppercase().collect(),
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        folder.to_string()
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompactMetadata, ThinkerRecord, WorkRecord};

    fn thinker(name: &str, works: usize) -> ThinkerRecord {
        ThinkerRecord {
            name: name.to_string(),
            works: (0..works)
                .map(|i| WorkRecord::new(format!("Work number {i}"), format!("https://x/{i}")))
                .collect(),
            ..ThinkerRecord::default()
        }
    }

    fn index() -> CategoryIndex {
        let mut index = CategoryIndex::new();
        index.insert(
            "Maoists",
            vec![thinker("lin Biao", 0), thinker("Chen Boda", 0), thinker("Mao Zedong", 12)],
        );
        index.insert(
            "African Liberation",
            vec![thinker("Amílcar Cabral", 1), thinker("Thomas Sankara", 3)],
        );
        index
    }

    #[test]
    fn test_format_collection_name() {
        assert_eq!(format_collection_name("african-liberation"), "African Liberation");
        assert_eq!(format_collection_name("w_e_b"), "W E B");
        assert_eq!(format_collection_name("MAOISTS"), "Maoists");
        assert_eq!(format_collection_name(""), "");
    }

    #[test]
    fn test_sections() {
        let audit = CoverageAudit::from_index(&index());
        assert_eq!(audit.zero_total(), 2);
        assert_eq!(audit.low_total(), 2);

        let md = audit.render_markdown();
        assert!(md.starts_with(AUDIT_HEADER));
        assert!(md.contains("## Thinkers with 0 works\n\nTotal: 2\n\n### Maoists (2)\n\n- Chen Boda\n- lin Biao\n"));
        assert!(md.contains("### African Liberation (2)\n\n- Amílcar Cabral (1 work)\n- Thomas Sankara (3 works)\n"));
        assert!(!md.contains("Mao Zedong"));
        assert!(md.ends_with("works)\n"));
    }

    #[test]
    fn test_zero_works_records() {
        let records = CoverageAudit::from_index(&index()).zero_works_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].collection, "maoists");
        assert_eq!(records[0].thinker, "Chen Boda");
        assert_eq!(records[0].slug, "chen-boda");
    }

    #[test]
    fn test_from_folders() {
        let collections = vec![FolderCollection {
            folder: "anarchists".into(),
            entries: vec![
                CompactMetadata {
                    n: "Emma Goldman".into(),
                    w: 0,
                    ..CompactMetadata::default()
                },
                CompactMetadata {
                    n: String::new(),
                    w: 0,
                    ..CompactMetadata::default()
                },
            ],
        }];
        let audit = CoverageAudit::from_folders(&collections);
        assert_eq!(audit.zero_total(), 1);
        assert!(audit.render_markdown().contains("### Anarchists (1)"));
    }
}
