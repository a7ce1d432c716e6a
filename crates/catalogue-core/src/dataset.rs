//! Dataset files: loading, saving and reshaping the bundle.
//!
//! Every job is load → transform → save. [`Dataset`] carries the loaded
//! bundle together with the path it came from; the reshaping functions
//! take it by reference and return new owned values.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::model::{CategoryIndex, CompactMetadata, OrderedMap, SubjectCount, ThinkerRecord, WorkRecord};

/// Thinker name → works.
pub type WorksLookup = OrderedMap<Vec<WorkRecord>>;

/// Read and parse a JSON file. A missing file is [`CoreError::MissingInput`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    if !path.exists() {
        return Err(CoreError::MissingInput(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-print as JSON (2-space indent, UTF-8 kept literal, trailing
/// newline), creating parent directories as needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CoreError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|source| CoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    text.push('\n');
    write_text(path, &text)
}

/// Write through a temporary file in the same directory and rename it into
/// place, so an interrupted run leaves the previous file intact.
pub fn write_text(path: &Path, text: &str) -> Result<(), CoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err(dir))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    tmp.write_all(text.as_bytes()).map_err(io_err(path))?;
    tmp.persist(path).map_err(|e| CoreError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CoreError {
    let path = path.to_path_buf();
    move |source| CoreError::Io { path, source }
}

/// The category bundle plus the file it was read from.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: PathBuf,
    pub index: CategoryIndex,
}

impl Dataset {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let index = read_json(&path)?;
        Ok(Self { path, index })
    }

    /// Write back to the file it was loaded from.
    pub fn save(&self) -> Result<(), CoreError> {
        write_json(&self.path, &self.index)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        write_json(path, &self.index)
    }

    /// Thinker name → works, for thinkers that have any.
    pub fn works_lookup(&self) -> WorksLookup {
        self.index
            .locations()
            .filter(|(_, _, t)| !t.works.is_empty())
            .map(|(_, _, t)| (t.name.clone(), t.works.clone()))
            .collect()
    }
}

/// `"First International"` → `"first-international.json"`.
pub fn category_filename(category: &str) -> String {
    format!("{}.json", category.to_lowercase().replace(' ', "-"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub count: usize,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub total_thinkers: usize,
    pub total_categories: usize,
    pub categories: Vec<CategorySummary>,
}

/// The bundle reshaped into client-facing files.
#[derive(Debug, Clone)]
pub struct SplitBundle {
    /// Category → compact records.
    pub metadata: OrderedMap<Vec<CompactMetadata>>,
    pub works: WorksLookup,
    /// Category → per-category file name.
    pub index: OrderedMap<String>,
    pub summary: SplitSummary,
}

pub fn split_bundle(dataset: &Dataset) -> SplitBundle {
    let mut metadata: OrderedMap<Vec<CompactMetadata>> = OrderedMap::new();
    let mut index = OrderedMap::new();
    let mut categories = Vec::new();
    let mut total = 0;

    for (category, thinkers) in dataset.index.categories() {
        let records: Vec<CompactMetadata> =
            thinkers.iter().map(CompactMetadata::from_thinker).collect();
        let filename = category_filename(category);
        total += records.len();
        categories.push(CategorySummary {
            category: category.to_string(),
            count: records.len(),
            filename: filename.clone(),
        });
        index.insert(category, filename);
        metadata.insert(category, records);
    }
    categories.sort_by(|a, b| a.category.cmp(&b.category));

    SplitBundle {
        works: dataset.works_lookup(),
        summary: SplitSummary {
            total_thinkers: total,
            total_categories: metadata.len(),
            categories,
        },
        metadata,
        index,
    }
}

impl SplitBundle {
    /// Write `thinkers-metadata.json`, `thinkers-works.json` and the
    /// `thinkers-by-category/` directory under `out_dir`.
    pub fn write(&self, out_dir: &Path) -> Result<(), CoreError> {
        write_json(&out_dir.join("thinkers-metadata.json"), &self.metadata)?;
        write_json(&out_dir.join("thinkers-works.json"), &self.works)?;

        let by_category = out_dir.join("thinkers-by-category");
        for (category, records) in self.metadata.iter() {
            let Some(filename) = self.index.get(category) else {
                continue;
            };
            write_json(&by_category.join(filename), records)?;
        }
        write_json(&by_category.join("index.json"), &self.index)?;
        write_json(&by_category.join("summary.json"), &self.summary)?;
        Ok(())
    }
}

/// Subject guessed from title keywords, checked in table order.
const SUBJECT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Political Theory",
        &[
            "political", "theory", "state", "government", "revolution", "party", "communism",
            "socialism", "democracy", "authority", "power", "rebellion", "uprising",
        ],
    ),
    (
        "Economics",
        &[
            "capital", "economics", "economic", "market", "value", "price", "wage", "labor",
            "labour", "commodity", "exchange", "money", "profit", "production",
        ],
    ),
    (
        "Philosophy",
        &[
            "philosophy", "philosophical", "ethics", "epistemology", "metaphysics", "ideology",
            "consciousness", "materialism", "dialectical", "logic", "truth", "morality",
        ],
    ),
    (
        "History",
        &[
            "history", "historical", "war", "class", "struggle", "revolutionary", "movement",
            "proletariat", "bourgeoisie", "imperialism", "colonial", "national liberation",
        ],
    ),
    (
        "Literature",
        &[
            "literature", "literary", "novel", "story", "poem", "poetry", "fiction", "narrative",
            "autobiography", "memoir",
        ],
    ),
    (
        "Letters",
        &["letter", "correspondence", "to ", "from ", "dear comrade"],
    ),
    (
        "Criticism",
        &["criticism", "critique", "review", "analysis of", "on ", "response to", "reply"],
    ),
    (
        "Biography",
        &["biography", "life of", "memoir", "autobiography", "diary"],
    ),
];

pub const DEFAULT_SUBJECT: &str = "General";

/// The work's own subject, or one guessed from its title and description.
pub fn subject_for(work: &WorkRecord) -> String {
    if let Some(subject) = work.subject.as_deref().map(str::trim)
        && !subject.is_empty()
    {
        return subject.to_string();
    }
    let text = format!(
        "{} {}",
        work.title,
        work.description.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    SUBJECT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(subject, _)| subject.to_string())
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string())
}

/// Drop characters that are invalid in file names and collapse spaces.
pub fn sanitize_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"First International"` → `"first-international"`.
pub fn category_folder(category: &str) -> String {
    category
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// One thinker's works grouped by subject.
#[derive(Debug, Clone)]
pub struct ThinkerFolder {
    pub folder: String,
    pub subjects: OrderedMap<Vec<WorkRecord>>,
}

#[derive(Debug, Clone)]
pub struct FolderCategory {
    pub name: String,
    pub folder: String,
    pub metadata: Vec<CompactMetadata>,
    pub thinkers: Vec<ThinkerFolder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderIndexEntry {
    pub id: String,
    pub name: String,
    pub path: String,
    pub count: usize,
}

/// The bundle reshaped into per-category folders with per-subject files.
#[derive(Debug, Clone)]
pub struct FolderSchema {
    pub categories: Vec<FolderCategory>,
}

pub fn build_folder_schema(dataset: &Dataset) -> FolderSchema {
    let categories = dataset
        .index
        .categories()
        .map(|(name, thinkers)| {
            let mut metadata = Vec::with_capacity(thinkers.len());
            let mut folders = Vec::new();
            for thinker in thinkers {
                let mut subjects: OrderedMap<Vec<WorkRecord>> = OrderedMap::new();
                for work in &thinker.works {
                    subjects.entry_or_default(&subject_for(work)).push(work.clone());
                }

                let mut meta = CompactMetadata::from_thinker(thinker);
                if !subjects.is_empty() {
                    meta.subjects = Some(
                        subjects
                            .iter()
                            .map(|(name, works)| SubjectCount {
                                name: name.to_string(),
                                count: works.len(),
                            })
                            .collect(),
                    );
                }
                metadata.push(meta);

                let folder = sanitize_name(&thinker.name);
                if !subjects.is_empty() && !folder.is_empty() {
                    folders.push(ThinkerFolder { folder, subjects });
                }
            }
            FolderCategory {
                name: name.to_string(),
                folder: category_folder(name),
                metadata,
                thinkers: folders,
            }
        })
        .collect();

    FolderSchema { categories }
}

impl FolderSchema {
    pub fn index(&self) -> Vec<FolderIndexEntry> {
        self.categories
            .iter()
            .map(|c| FolderIndexEntry {
                id: c.name.clone(),
                name: c.name.clone(),
                path: c.folder.clone(),
                count: c.metadata.len(),
            })
            .collect()
    }

    /// Write `<out>/<category>/metadata.json`,
    /// `<out>/<category>/<thinker>/<subject>.json` and `<out>/index.json`.
    pub fn write(&self, out_dir: &Path) -> Result<(), CoreError> {
        for category in &self.categories {
            let dir = out_dir.join(&category.folder);
            write_json(&dir.join("metadata.json"), &category.metadata)?;
            for thinker in &category.thinkers {
                for (subject, works) in thinker.subjects.iter() {
                    let file = format!("{}.json", sanitize_name(subject));
                    write_json(&dir.join(&thinker.folder).join(file), works)?;
                }
            }
        }

        #[derive(Serialize)]
        struct Index {
            categories: Vec<FolderIndexEntry>,
        }
        write_json(
            &out_dir.join("index.json"),
            &Index {
                categories: self.index(),
            },
        )
    }
}

/// A category folder read back from disk.
#[derive(Debug, Clone)]
pub struct FolderCollection {
    pub folder: String,
    pub entries: Vec<CompactMetadata>,
}

/// Read every `<dir>/<collection>/metadata.json`, in folder name order.
pub fn load_folder_collections(dir: &Path) -> Result<Vec<FolderCollection>, CoreError> {
    if !dir.is_dir() {
        return Err(CoreError::MissingInput(dir.to_path_buf()));
    }
    let mut folders = list_dirs(dir)?;
    folders.sort();

    let mut collections = Vec::new();
    for folder in folders {
        let metadata = dir.join(&folder).join("metadata.json");
        if !metadata.exists() {
            continue;
        }
        collections.push(FolderCollection {
            entries: read_json(&metadata)?,
            folder,
        });
    }
    Ok(collections)
}

/// Names of the subdirectories of `dir`.
pub fn list_dirs(dir: &Path) -> Result<Vec<String>, CoreError> {
    let io_err = |source| CoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// `*.json` files directly inside `dir`, sorted by name.
pub fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let io_err = |source| CoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Display names for the category slugs used by the name lists.
const CATEGORY_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("first-international", "First International"),
    ("social-democracy", "Social Democracy"),
    ("reformists", "Reformists"),
    ("fabians", "Fabians"),
    ("the-bolsheviks", "The Bolsheviks"),
    ("early-comintern", "Early Comintern"),
    ("comintern", "Comintern"),
    ("soviet-science", "Soviet Science"),
    ("soviet-marxism", "Soviet Marxism"),
    ("western-marxism", "Western Marxism"),
    ("french-left", "French Left"),
    ("frankfurt-school", "Frankfurt School"),
    ("trotskyists", "Trotskyists"),
    ("left-communism", "Left Communism"),
    ("marxist-humanism", "Marxist Humanism"),
    ("market-socialists", "Market Socialists"),
    ("guerilla-marxism", "Guerilla Marxism"),
    ("maoists", "Maoists"),
    ("national-liberation", "National Liberation"),
    ("african-liberation", "African Liberation"),
    ("black-liberation", "Black Liberation"),
    ("french-revolution", "French Revolution"),
    ("paris-commune", "Paris Commune"),
    ("utopianism", "Utopianism"),
    ("anarchists", "Anarchists"),
    ("feminists", "Feminists"),
    ("populists", "Populists"),
    ("political-science", "Political Science"),
    ("philosophy", "Philosophy"),
    ("ethics", "Ethics"),
    ("political-economy", "Political Economy"),
    ("natural-science", "Natural Science"),
];

/// Display name for a category slug; unknown slugs are returned as-is.
pub fn category_display_name(slug: &str) -> String {
    CATEGORY_DISPLAY_NAMES
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| slug.to_string())
}

pub const PLACEHOLDER_BIO_URL: &str = "/reference/archive/";

/// Read `<dir>/<category-slug>.json` name lists, in file name order.
pub fn load_category_lists(dir: &Path) -> Result<OrderedMap<Vec<String>>, CoreError> {
    if !dir.is_dir() {
        return Err(CoreError::MissingInput(dir.to_path_buf()));
    }
    let mut lists = OrderedMap::new();
    for path in list_json_files(dir)? {
        let Some(slug) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let names: Vec<String> = read_json(&path)?;
        lists.insert(slug, names);
    }
    Ok(lists)
}

/// A minimal record for a name that only appears in a category list.
pub fn default_thinker(name: &str, category_slug: &str) -> ThinkerRecord {
    let display = category_display_name(category_slug);
    ThinkerRecord {
        name: name.to_string(),
        description: format!(
            "Marxist thinker and theorist in the tradition of {}.",
            display.to_lowercase()
        ),
        category: display,
        bio_url: PLACEHOLDER_BIO_URL.to_string(),
        ..ThinkerRecord::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandSummary {
    pub total_thinkers: usize,
    pub existing_with_full_data: usize,
    pub new_entries: usize,
    pub by_category: OrderedMap<usize>,
}

/// Add a default record for every listed name absent from `existing`.
///
/// A name listed under several categories takes the first one. The result
/// is sorted by name.
pub fn expand_thinkers(
    existing: Vec<ThinkerRecord>,
    lists: &OrderedMap<Vec<String>>,
) -> (Vec<ThinkerRecord>, ExpandSummary) {
    let mut known: std::collections::HashSet<String> =
        existing.iter().map(|t| t.name.clone()).collect();
    let existing_count = existing.len();

    let mut all = existing;
    for (slug, names) in lists.iter() {
        for name in names {
            if known.insert(name.clone()) {
                all.push(default_thinker(name, slug));
            }
        }
    }
    all.sort_by(|a, b| a.name.cmp(&b.name));

    let mut by_category: OrderedMap<usize> = OrderedMap::new();
    for t in &all {
        *by_category.entry_or_default(&t.category) += 1;
    }

    let summary = ExpandSummary {
        total_thinkers: all.len(),
        existing_with_full_data: existing_count,
        new_entries: all.len() - existing_count,
        by_category,
    };
    (all, summary)
}
