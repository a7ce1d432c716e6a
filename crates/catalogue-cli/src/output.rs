use std::io::Write;
use std::path::Path;

use catalogue_core::MatchConfidence;
use catalogue_core::audit::CoverageAudit;
use catalogue_core::dataset::{ExpandSummary, FolderIndexEntry, SplitSummary};
use catalogue_core::model::{MatchTier, SourceMatch};
use catalogue_core::patch::{PatchReport, PatchStatus};
use catalogue_core::populate::{PopulateReport, PopulateStatus};
use catalogue_core::portraits::PortraitStats;
use catalogue_core::register::RegisterEntry;
use catalogue_core::{HarvestResult, HarvestStatus};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn print_header(w: &mut dyn Write, title: &str, color: ColorMode) -> std::io::Result<()> {
    let sep = "=".repeat(60);
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", title.bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "{}", title)?;
        writeln!(w, "{}", sep)?;
    }
    Ok(())
}

fn print_dimmed(w: &mut dyn Write, msg: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "  {}", msg.dimmed())
    } else {
        writeln!(w, "  {}", msg)
    }
}

fn print_written(w: &mut dyn Write, path: &Path, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "Wrote".green(), path.display())
    } else {
        writeln!(w, "Wrote {}", path.display())
    }
}

pub fn print_split_summary(
    w: &mut dyn Write,
    summary: &SplitSummary,
    out_dir: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    print_header(w, "SPLIT", color)?;
    writeln!(w, "  Thinkers: {}", summary.total_thinkers)?;
    writeln!(w, "  Categories: {}", summary.total_categories)?;
    writeln!(w)?;
    for cat in &summary.categories {
        writeln!(w, "  {:<40} {:>5}  {}", cat.category, cat.count, cat.filename)?;
    }
    writeln!(w)?;
    print_written(w, out_dir, color)
}

pub fn print_folder_summary(
    w: &mut dyn Write,
    index: &[FolderIndexEntry],
    out_dir: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    print_header(w, "FOLDERS", color)?;
    for entry in index {
        writeln!(w, "  {:<40} {:>5}  {}", entry.name, entry.count, entry.path)?;
    }
    let total: usize = index.iter().map(|e| e.count).sum();
    writeln!(w)?;
    writeln!(w, "  {} thinkers in {} collections", total, index.len())?;
    print_written(w, out_dir, color)
}

pub fn print_expand_summary(
    w: &mut dyn Write,
    summary: &ExpandSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    print_header(w, "EXPAND", color)?;
    writeln!(w, "  Total thinkers: {}", summary.total_thinkers)?;
    writeln!(w, "  With full data: {}", summary.existing_with_full_data)?;
    if color.enabled() {
        writeln!(w, "  {} {}", "New entries:".green(), summary.new_entries)?;
    } else {
        writeln!(w, "  New entries: {}", summary.new_entries)?;
    }
    writeln!(w)?;
    for (category, count) in summary.by_category.iter() {
        writeln!(w, "  {:<40} {:>5}", category, count)?;
    }
    Ok(())
}

pub fn print_portrait_stats(
    w: &mut dyn Write,
    stats: &PortraitStats,
    color: ColorMode,
) -> std::io::Result<()> {
    print_header(w, "PORTRAITS", color)?;
    writeln!(w, "  Thinkers: {}", stats.total)?;
    print_dimmed(w, &format!("Already complete: {}", stats.skipped), color)?;
    if color.enabled() {
        writeln!(w, "  {} {}", "Images found:".green(), stats.images_found)?;
        writeln!(w, "  {} {}", "Thumbnails found:".green(), stats.thumbnails_found)?;
        writeln!(w, "  {} {}", "Not found:".yellow(), stats.not_found)?;
    } else {
        writeln!(w, "  Images found: {}", stats.images_found)?;
        writeln!(w, "  Thumbnails found: {}", stats.thumbnails_found)?;
        writeln!(w, "  Not found: {}", stats.not_found)?;
    }
    if stats.failed > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Failed:".red(), stats.failed)?;
        } else {
            writeln!(w, "  Failed: {}", stats.failed)?;
        }
    }
    Ok(())
}

pub fn print_populate_report(
    w: &mut dyn Write,
    report: &PopulateReport,
    color: ColorMode,
) -> std::io::Result<()> {
    let missing: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.status == PopulateStatus::NotInDataset)
        .collect();
    if !missing.is_empty() {
        writeln!(w)?;
        if color.enabled() {
            writeln!(w, "{}", "Authors with works but no dataset entry:".yellow())?;
        } else {
            writeln!(w, "Authors with works but no dataset entry:")?;
        }
        for o in &missing {
            writeln!(w, "  {} ({} works) {}", o.author, o.found, o.url)?;
        }
    }

    print_header(w, "POPULATE", color)?;
    writeln!(w, "  Authors processed: {}", report.outcomes.len())?;
    if color.enabled() {
        writeln!(
            w,
            "  {} {}",
            "Attached:".green(),
            report.count(PopulateStatus::Attached)
        )?;
        writeln!(w, "  {} {}", "Works added:".green(), report.works_added())?;
        writeln!(
            w,
            "  {} {}",
            "Not in dataset:".yellow(),
            missing.len()
        )?;
    } else {
        writeln!(w, "  Attached: {}", report.count(PopulateStatus::Attached))?;
        writeln!(w, "  Works added: {}", report.works_added())?;
        writeln!(w, "  Not in dataset: {}", missing.len())?;
    }
    print_dimmed(
        w,
        &format!("No works on page: {}", report.count(PopulateStatus::NoWorks)),
        color,
    )?;
    let failed = report.count(PopulateStatus::FetchFailed);
    if failed > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Fetch failed:".red(), failed)?;
        } else {
            writeln!(w, "  Fetch failed: {}", failed)?;
        }
    }
    Ok(())
}

pub fn print_audit_summary(
    w: &mut dyn Write,
    audit: &CoverageAudit,
    color: ColorMode,
) -> std::io::Result<()> {
    print_header(w, "COVERAGE", color)?;
    if color.enabled() {
        writeln!(w, "  {} {}", "Zero works:".red(), audit.zero_total())?;
        writeln!(w, "  {} {}", "1-5 works:".yellow(), audit.low_total())?;
    } else {
        writeln!(w, "  Zero works: {}", audit.zero_total())?;
        writeln!(w, "  1-5 works: {}", audit.low_total())?;
    }
    for (collection, names) in audit.zero.iter() {
        print_dimmed(w, &format!("{}: {} without works", collection, names.len()), color)?;
    }
    Ok(())
}

pub fn print_source_matches(
    w: &mut dyn Write,
    matches: &[SourceMatch],
    color: ColorMode,
) -> std::io::Result<()> {
    for m in matches {
        let tier = match m.status {
            MatchTier::Matched => "MATCHED",
            MatchTier::LastNameMatch => "LAST NAME",
            MatchTier::Unmatched => "UNMATCHED",
        };
        let target = m
            .matches
            .first()
            .map(|e| e.url.as_str())
            .unwrap_or("-");
        if color.enabled() {
            let tier = match m.status {
                MatchTier::Matched => tier.green().to_string(),
                MatchTier::LastNameMatch => tier.yellow().to_string(),
                MatchTier::Unmatched => tier.red().to_string(),
            };
            writeln!(w, "  {:<32} {} {}", m.thinker, tier, target.dimmed())?;
        } else {
            writeln!(w, "  {:<32} {} {}", m.thinker, tier, target)?;
        }
    }

    let count = |tier: MatchTier| matches.iter().filter(|m| m.status == tier).count();
    print_header(w, "SOURCES", color)?;
    writeln!(w, "  Matched: {}", count(MatchTier::Matched))?;
    writeln!(w, "  Last name only: {}", count(MatchTier::LastNameMatch))?;
    writeln!(w, "  Unmatched: {}", count(MatchTier::Unmatched))?;
    Ok(())
}

pub fn print_harvest_summary(
    w: &mut dyn Write,
    results: &[HarvestResult],
    out_dir: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    let count = |status: HarvestStatus| results.iter().filter(|r| r.status == status).count();
    let works: usize = results.iter().map(|r| r.works.len()).sum();
    let warnings: usize = results.iter().map(|r| r.warnings.len()).sum();

    print_header(w, "HARVEST", color)?;
    if color.enabled() {
        writeln!(
            w,
            "  {} {}",
            "Success:".green(),
            count(HarvestStatus::Success)
        )?;
        writeln!(
            w,
            "  {} {}",
            "No works found:".yellow(),
            count(HarvestStatus::NoWorksFound)
        )?;
        writeln!(
            w,
            "  {} {}",
            "No source:".red(),
            count(HarvestStatus::NoSourceMatch)
        )?;
    } else {
        writeln!(w, "  Success: {}", count(HarvestStatus::Success))?;
        writeln!(w, "  No works found: {}", count(HarvestStatus::NoWorksFound))?;
        writeln!(w, "  No source: {}", count(HarvestStatus::NoSourceMatch))?;
    }
    writeln!(w, "  Works collected: {}", works)?;
    if warnings > 0 {
        print_dimmed(w, &format!("Fetch warnings: {}", warnings), color)?;
    }
    print_written(w, out_dir, color)
}

pub fn print_register_summary(
    w: &mut dyn Write,
    entries: &[RegisterEntry],
    output: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    let sources: usize = entries.iter().map(|e| e.sources.len()).sum();
    print_header(w, "REGISTER", color)?;
    writeln!(w, "  Thinkers: {}", entries.len())?;
    writeln!(w, "  Sources: {}", sources)?;
    print_written(w, output, color)
}

pub fn print_patch_report(
    w: &mut dyn Write,
    report: &PatchReport,
    bundle: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    let missing: Vec<&str> = report
        .outcomes
        .iter()
        .filter(|o| o.status == PatchStatus::NotFound)
        .map(|o| o.name.as_str())
        .collect();
    if !missing.is_empty() {
        writeln!(w)?;
        if color.enabled() {
            writeln!(w, "{}", "Not found in dataset:".yellow())?;
        } else {
            writeln!(w, "Not found in dataset:")?;
        }
        for name in &missing {
            writeln!(w, "  {}", name)?;
        }
    }

    print_header(w, "PATCH", color)?;
    if color.enabled() {
        writeln!(w, "  {} {}", "Updated:".green(), report.count(PatchStatus::Updated))?;
        writeln!(w, "  {} {}", "Added:".green(), report.count(PatchStatus::Added))?;
        writeln!(w, "  {} {}", "Works added:".green(), report.works_added())?;
        writeln!(w, "  {} {}", "Not found:".yellow(), missing.len())?;
    } else {
        writeln!(w, "  Updated: {}", report.count(PatchStatus::Updated))?;
        writeln!(w, "  Added: {}", report.count(PatchStatus::Added))?;
        writeln!(w, "  Works added: {}", report.works_added())?;
        writeln!(w, "  Not found: {}", missing.len())?;
    }
    print_dimmed(
        w,
        &format!("Unchanged: {}", report.count(PatchStatus::Unchanged)),
        color,
    )?;
    print_written(w, bundle, color)
}

/// Debug output for `match`.
pub fn print_name_match(
    w: &mut dyn Write,
    a: &str,
    b: &str,
    confidence: Option<MatchConfidence>,
    color: ColorMode,
) -> std::io::Result<()> {
    let verdict = match confidence {
        Some(MatchConfidence::Exact) => "exact",
        Some(MatchConfidence::Substring) => "substring",
        Some(MatchConfidence::TokenOverlap) => "token overlap",
        Some(MatchConfidence::LastName) => "last name only",
        None => "no match",
    };
    let strong = confidence.is_some_and(MatchConfidence::is_strong);
    if color.enabled() {
        let verdict = if strong {
            verdict.green().to_string()
        } else {
            verdict.red().to_string()
        };
        writeln!(w, "\"{}\" vs \"{}\": {}", a, b, verdict)
    } else {
        writeln!(w, "\"{}\" vs \"{}\": {}", a, b, verdict)
    }
}
