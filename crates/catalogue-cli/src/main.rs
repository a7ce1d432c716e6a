use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use catalogue_core::audit::CoverageAudit;
use catalogue_core::dataset::{
    build_folder_schema, expand_thinkers, load_category_lists, load_folder_collections, read_json,
    split_bundle, write_json, write_text,
};
use catalogue_core::html::{extract_page_links, extract_subject_sections, parse_author_spans};
use catalogue_core::model::ZeroWorksRecord;
use catalogue_core::names::classify_names_with;
use catalogue_core::pool::{PoolEvent, ProgressFn};
use catalogue_core::patch::{ThinkerPatch, apply_patches, harvest_patches};
use catalogue_core::populate::{ARCHIVE_BASE_URL, Populator};
use catalogue_core::portraits::{CommonsClient, attach_portraits, plan_portraits};
use catalogue_core::register::{SourceRegister, load_harvest_dir};
use catalogue_core::sources::{ARCHIVE_INDEX_URL, AuthorLookup, fetch_author_index, map_sources};
use catalogue_core::{Config, Dataset, Harvester, SourceMatch, ThinkerRecord, Url, config};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// Thinker Catalogue - Build and maintain the thinker dataset and its works
#[derive(Parser, Debug)]
#[command(name = "catalogue", version, about, long_about = None)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Read settings from this TOML file instead of the platform/local cascade
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Number of concurrent workers for network jobs
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Pause after each job, per worker, in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    /// User-Agent for outgoing requests (or CATALOGUE_USER_AGENT)
    #[arg(long, global = true)]
    user_agent: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split the bundle into compact metadata, works lookup and per-category files
    Split {
        /// Path to the category bundle JSON
        bundle: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        out: PathBuf,
    },

    /// Write the bundle as per-category folders with per-subject work files
    Folders {
        /// Path to the category bundle JSON
        bundle: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "data/collections")]
        out: PathBuf,
    },

    /// Add default records for names in category lists missing from a thinker list
    Expand {
        /// JSON array of existing thinker records
        thinkers: PathBuf,

        /// Directory of `<category-slug>.json` name lists
        lists: PathBuf,

        /// Where to write the expanded thinker list
        #[arg(short, long)]
        out: PathBuf,

        /// Where to write the expansion summary
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Look up portraits on Wikimedia Commons for thinkers missing them
    Portraits {
        /// Path to the category bundle JSON (updated in place)
        bundle: PathBuf,

        /// Write the updated bundle here instead
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch archive author pages and attach their works to dataset thinkers
    Populate {
        /// Saved HTML of the archive's by-name author index
        index_html: PathBuf,

        /// Path to the category bundle JSON (checkpointed after every batch)
        bundle: PathBuf,

        /// Authors per checkpointed batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Site the author hrefs are relative to
        #[arg(long, default_value = ARCHIVE_BASE_URL)]
        base_url: String,
    },

    /// Classify the works linked from one saved HTML page and print them as JSON
    Classify {
        /// Saved HTML page
        html: PathBuf,

        /// URL the page was fetched from, for resolving links
        base_url: String,

        /// Group works by named h4 subject heading
        #[arg(long)]
        subjects: bool,

        /// Maximum recommended works to collect when grouping by subject
        #[arg(long, default_value_t = 25)]
        major_limit: usize,
    },

    /// Report thinkers with no or few works
    Audit {
        /// Path to the category bundle JSON
        #[arg(long, required_unless_present = "data_dir", conflicts_with = "data_dir")]
        bundle: Option<PathBuf>,

        /// Folder dataset directory (as written by `folders`)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Markdown report path
        #[arg(short, long, default_value = "work-coverage-audit.md")]
        output: PathBuf,

        /// Zero-works records path
        #[arg(long, default_value = "zero-works.json")]
        zero_works: PathBuf,
    },

    /// Match zero-works thinkers to author pages on the archive index
    MapSources {
        /// Zero-works records (as written by `audit`)
        zero_works: PathBuf,

        /// Archive author index URL
        #[arg(long, default_value = ARCHIVE_INDEX_URL)]
        index_url: String,

        /// Where to write the source matches
        #[arg(short, long, default_value = "source-matches.json")]
        output: PathBuf,

        /// Only map the first N records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Crawl matched author pages for candidate works
    Harvest {
        /// Source matches (as written by `map-sources`)
        matches: PathBuf,

        /// Output directory for per-thinker harvest files
        #[arg(short, long, default_value = "harvest")]
        out: PathBuf,

        /// Only harvest the first N thinkers
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Build the works-root register from harvest results
    Register {
        /// Directory of harvest result files
        harvest_dir: PathBuf,

        /// Folder dataset whose existing work URLs add more roots
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Where to write the register
        #[arg(short, long, default_value = "source-register.json")]
        output: PathBuf,
    },

    /// Apply curated edits and harvested works to the bundle
    Patch {
        /// Path to the category bundle JSON (updated in place)
        bundle: PathBuf,

        /// JSON array of thinker edits: name, category, bioUrl, imageUrl, thumbnailUrl, works
        #[arg(long, required_unless_present = "harvest_dir")]
        edits: Option<PathBuf>,

        /// Directory of harvest result files whose works are merged in
        #[arg(long)]
        harvest_dir: Option<PathBuf>,

        /// Write the updated bundle here instead
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Split the patched bundle into this directory, refreshing work counts
        #[arg(long)]
        split: Option<PathBuf>,
    },

    /// Show how two names compare under the name matcher
    Match {
        /// First name
        a: String,

        /// Second name
        b: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = resolve_config(&cli)?;
    let color = ColorMode(!cli.no_color && std::io::stdout().is_terminal());

    match cli.command {
        Command::Split { bundle, out } => split(&bundle, &out, color),
        Command::Folders { bundle, out } => folders(&bundle, &out, color),
        Command::Expand {
            thinkers,
            lists,
            out,
            summary,
        } => expand(&thinkers, &lists, &out, summary.as_deref(), color),
        Command::Portraits { bundle, output } => {
            portraits(&cfg, &bundle, output.as_deref(), color).await
        }
        Command::Populate {
            index_html,
            bundle,
            batch_size,
            base_url,
        } => populate(&cfg, &index_html, &bundle, batch_size, base_url, color).await,
        Command::Classify {
            html,
            base_url,
            subjects,
            major_limit,
        } => classify(&cfg, &html, &base_url, subjects, major_limit),
        Command::Audit {
            bundle,
            data_dir,
            output,
            zero_works,
        } => audit(bundle, data_dir, &output, &zero_works, color),
        Command::MapSources {
            zero_works,
            index_url,
            output,
            limit,
        } => map(&cfg, &zero_works, &index_url, &output, limit, color).await,
        Command::Harvest {
            matches,
            out,
            limit,
        } => harvest(&cfg, &matches, &out, limit, color).await,
        Command::Register {
            harvest_dir,
            data_dir,
            output,
        } => register(&cfg, &harvest_dir, data_dir.as_deref(), &output, color),
        Command::Patch {
            bundle,
            edits,
            harvest_dir,
            output,
            split,
        } => patch(
            &cfg,
            &bundle,
            edits.as_deref(),
            harvest_dir.as_deref(),
            output.as_deref(),
            split.as_deref(),
            color,
        ),
        Command::Match { a, b } => {
            let confidence = classify_names_with(&a, &b, &cfg.matching);
            output::print_name_match(&mut std::io::stdout(), &a, &b, confidence, color)?;
            Ok(())
        }
    }
}

/// Flags beat the environment, the environment beats config files, config
/// files beat defaults.
fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let file = match &cli.config {
        Some(path) => config::read_config(path)?,
        None => config::load_config(),
    };
    let mut cfg = Config::from_file(&file);

    if let Some(ua) = cli
        .user_agent
        .clone()
        .or_else(|| std::env::var("CATALOGUE_USER_AGENT").ok())
        .filter(|ua| !ua.trim().is_empty())
    {
        cfg.user_agent = ua;
    }
    if let Some(workers) = cli.workers {
        cfg.pool.workers = workers.max(1);
    }
    if let Some(ms) = cli.delay_ms {
        cfg.pool.delay = Duration::from_millis(ms);
    }

    tracing::debug!(
        workers = cfg.pool.workers,
        delay_ms = cfg.pool.delay.as_millis() as u64,
        user_agent = %cfg.user_agent,
        "resolved configuration"
    );
    Ok(cfg)
}

/// A bar that advances once per finished pool job.
fn progress_bar(total: usize, message: &'static str) -> anyhow::Result<(ProgressBar, ProgressFn)> {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} {msg} [{bar:40.green/dim}] {pos}/{len} (eta {eta})",
        )?
        .progress_chars("=> "),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));

    let handle = bar.clone();
    let progress: ProgressFn = Arc::new(move |event: PoolEvent| {
        if let PoolEvent::Finished { label, ok, .. } = event {
            if !ok {
                handle.println(format!("  failed: {label}"));
            }
            handle.inc(1);
        }
    });
    Ok((bar, progress))
}

fn split(bundle: &Path, out: &Path, color: ColorMode) -> anyhow::Result<()> {
    let dataset = Dataset::load(bundle)?;
    let split = split_bundle(&dataset);
    split.write(out)?;
    output::print_split_summary(&mut std::io::stdout(), &split.summary, out, color)?;
    Ok(())
}

fn folders(bundle: &Path, out: &Path, color: ColorMode) -> anyhow::Result<()> {
    let dataset = Dataset::load(bundle)?;
    let schema = build_folder_schema(&dataset);
    schema.write(out)?;
    output::print_folder_summary(&mut std::io::stdout(), &schema.index(), out, color)?;
    Ok(())
}

fn expand(
    thinkers: &Path,
    lists: &Path,
    out: &Path,
    summary_path: Option<&Path>,
    color: ColorMode,
) -> anyhow::Result<()> {
    let existing: Vec<ThinkerRecord> = read_json(thinkers)?;
    let lists = load_category_lists(lists)?;
    if lists.is_empty() {
        anyhow::bail!("No category lists found");
    }

    let (all, summary) = expand_thinkers(existing, &lists);
    write_json(out, &all)?;
    if let Some(path) = summary_path {
        write_json(path, &summary)?;
    }
    output::print_expand_summary(&mut std::io::stdout(), &summary, color)?;
    Ok(())
}

async fn portraits(
    cfg: &Config,
    bundle: &Path,
    out_path: Option<&Path>,
    color: ColorMode,
) -> anyhow::Result<()> {
    let mut dataset = Dataset::load(bundle)?;
    let client = CommonsClient::new(Arc::new(cfg.http_source()?));

    let (bar, progress) = progress_bar(plan_portraits(&dataset.index).len(), "Portraits")?;
    let stats = attach_portraits(&client, &mut dataset.index, cfg.pool, progress).await;
    bar.finish_and_clear();

    let target = out_path.unwrap_or(bundle);
    dataset
        .save_to(target)
        .with_context(|| format!("failed to save {}", target.display()))?;
    output::print_portrait_stats(&mut std::io::stdout(), &stats, color)?;
    Ok(())
}

async fn populate(
    cfg: &Config,
    index_html: &Path,
    bundle: &Path,
    batch_size: Option<usize>,
    base_url: String,
    color: ColorMode,
) -> anyhow::Result<()> {
    if !index_html.exists() {
        anyhow::bail!("File not found: {}", index_html.display());
    }
    let html = std::fs::read_to_string(index_html)
        .with_context(|| format!("failed to read {}", index_html.display()))?;
    let authors = parse_author_spans(&html);
    if authors.is_empty() {
        anyhow::bail!("No authors found in {}", index_html.display());
    }
    tracing::info!(authors = authors.len(), "parsed author listing");

    let mut dataset = Dataset::load(bundle)?;
    let mut populator = Populator::new(
        Arc::new(cfg.http_source()?),
        Arc::new(cfg.work_classifier()?),
    );
    populator.base_url = base_url;
    populator.pool = cfg.pool;
    populator.batch_size = batch_size.unwrap_or(cfg.batch_size).max(1);
    populator.match_rules = cfg.matching;

    let (bar, progress) = progress_bar(authors.len(), "Authors")?;
    let path = dataset.path.clone();
    let report = populator
        .run(&authors, &mut dataset.index, progress, |index| {
            write_json(&path, index)
        })
        .await?;
    bar.finish_and_clear();

    output::print_populate_report(&mut std::io::stdout(), &report, color)?;
    Ok(())
}

fn classify(
    cfg: &Config,
    html_path: &Path,
    base_url: &str,
    subjects: bool,
    major_limit: usize,
) -> anyhow::Result<()> {
    let html = std::fs::read_to_string(html_path)
        .with_context(|| format!("failed to read {}", html_path.display()))?;
    let base = Url::parse(base_url).with_context(|| format!("invalid base URL: {base_url}"))?;
    let classifier = cfg.work_classifier()?;

    let value = if subjects {
        let grouped = classifier.classify_subjects(
            &extract_subject_sections(&html),
            &base,
            major_limit,
        );
        serde_json::json!({ "works": grouped.works, "major": grouped.major })
    } else {
        serde_json::to_value(classifier.classify_page(&extract_page_links(&html), &base))?
    };

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", serde_json::to_string_pretty(&value)?)?;
    Ok(())
}

fn audit(
    bundle: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    output_path: &Path,
    zero_works: &Path,
    color: ColorMode,
) -> anyhow::Result<()> {
    let audit = match (bundle, data_dir) {
        (Some(bundle), _) => CoverageAudit::from_index(&Dataset::load(bundle)?.index),
        (None, Some(dir)) => CoverageAudit::from_folders(&load_folder_collections(&dir)?),
        (None, None) => anyhow::bail!("Either --bundle or --data-dir is required"),
    };

    write_text(output_path, &audit.render_markdown())?;
    write_json(zero_works, &audit.zero_works_records())?;
    output::print_audit_summary(&mut std::io::stdout(), &audit, color)?;
    Ok(())
}

async fn map(
    cfg: &Config,
    zero_works: &Path,
    index_url: &str,
    output_path: &Path,
    limit: Option<usize>,
    color: ColorMode,
) -> anyhow::Result<()> {
    let mut records: Vec<ZeroWorksRecord> = read_json(zero_works)?;
    if let Some(n) = limit {
        records.truncate(n);
    }

    let source = cfg.http_source()?;
    let entries = fetch_author_index(&source, index_url)
        .await
        .with_context(|| format!("failed to fetch author index {index_url}"))?;
    let lookup = AuthorLookup::build(entries);
    if lookup.is_empty() {
        anyhow::bail!("No author entries found at {index_url}");
    }

    let matches = map_sources(&records, &lookup, &cfg.matching);
    write_json(output_path, &matches)?;
    output::print_source_matches(&mut std::io::stdout(), &matches, color)?;
    Ok(())
}

async fn harvest(
    cfg: &Config,
    matches_path: &Path,
    out: &Path,
    limit: Option<usize>,
    color: ColorMode,
) -> anyhow::Result<()> {
    let mut matches: Vec<SourceMatch> = read_json(matches_path)?;
    if let Some(n) = limit {
        matches.truncate(n);
    }

    let harvester = Harvester::new(
        Arc::new(cfg.http_source()?),
        Arc::new(cfg.work_classifier()?),
        cfg.crawl.clone(),
    );
    let (bar, progress) = progress_bar(matches.len(), "Harvest")?;
    let results = harvester
        .harvest_to_dir(matches, out, cfg.pool, progress)
        .await;
    bar.finish_and_clear();

    output::print_harvest_summary(&mut std::io::stdout(), &results, out, color)?;
    Ok(())
}

fn patch(
    cfg: &Config,
    bundle: &Path,
    edits: Option<&Path>,
    harvest_dir: Option<&Path>,
    out_path: Option<&Path>,
    split_dir: Option<&Path>,
    color: ColorMode,
) -> anyhow::Result<()> {
    let mut patches: Vec<ThinkerPatch> = match edits {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    if let Some(dir) = harvest_dir {
        patches.extend(harvest_patches(&load_harvest_dir(dir)?));
    }
    if patches.is_empty() {
        anyhow::bail!("No patches to apply");
    }

    let mut dataset = Dataset::load(bundle)?;
    let report = apply_patches(&mut dataset.index, &patches, &cfg.matching);

    let target = out_path.unwrap_or(bundle);
    dataset
        .save_to(target)
        .with_context(|| format!("failed to save {}", target.display()))?;
    output::print_patch_report(&mut std::io::stdout(), &report, target, color)?;

    if let Some(dir) = split_dir {
        let split = split_bundle(&dataset);
        split.write(dir)?;
        output::print_split_summary(&mut std::io::stdout(), &split.summary, dir, color)?;
    }
    Ok(())
}

fn register(
    cfg: &Config,
    harvest_dir: &Path,
    data_dir: Option<&Path>,
    output_path: &Path,
    color: ColorMode,
) -> anyhow::Result<()> {
    let harvests = load_harvest_dir(harvest_dir)?;
    let mut register = SourceRegister::new(cfg.roots.clone());
    register.add_harvests(&harvests);
    if let Some(dir) = data_dir {
        register.augment_with_folders(dir)?;
    }

    let entries = register.into_entries();
    write_json(output_path, &entries)?;
    output::print_register_summary(&mut std::io::stdout(), &entries, output_path, color)?;
    Ok(())
}
