use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use fbref_pipeline::config::{self, Paths};
use fbref_pipeline::fetch;
use fbref_pipeline::loader;
use fbref_pipeline::missing;
use fbref_pipeline::scrape;
use fbref_pipeline::table::Table;
use fbref_pipeline::update::{self, PartitionMeta, UpdateSummary};

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let paths = parse_data_dir_arg(&args)
        .map(|base| Paths::from_base(&base))
        .unwrap_or_else(Paths::from_env);

    if has_flag(&args, "--merge") {
        return merge_staged(&paths);
    }
    if has_flag(&args, "--promote") {
        return promote_staged(&paths);
    }

    let report = missing::missing_matches(&paths, config::GENDER)?;
    print_report(&report);

    if has_flag(&args, "--download") {
        let pause = parse_pause_arg(&args).unwrap_or(fetch::DEFAULT_PAUSE_SECS);
        download_missing(&paths, &report.missing, Duration::from_secs(pause))?;
    }
    Ok(())
}

fn print_report(report: &missing::MissingReport) {
    println!("Fixtures considered: {}", report.fixtures_considered);
    println!("Fixtures missing: {}", report.missing.height());
    for (key, part) in report.missing.partition_by(&["Country", "Tier"]) {
        let label = key
            .iter()
            .map(|cell| {
                cell.as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "n/a".to_string())
            })
            .collect::<Vec<_>>()
            .join("/");
        println!("  {label}: {}", part.height());
    }
    if !report.warnings.is_empty() {
        println!("warnings: {}", report.warnings.len());
        for warning in report.warnings.iter().take(6) {
            println!(" - {warning}");
        }
    }
}

fn download_missing(paths: &Paths, missing: &Table, pause: Duration) -> Result<()> {
    let mut downloaded = 0usize;
    let mut failures = Vec::new();
    for row in 0..missing.height() {
        let (Some(url), Some(rel)) = (
            missing.get(row, "MatchURL").and_then(|v| v.as_str()),
            missing.get(row, "filename").and_then(|v| v.as_str()),
        ) else {
            continue;
        };
        let dest = paths.stage_dir.join(rel);
        match fetch::maybe_download_file(url, &dest, pause) {
            Ok(true) => downloaded += 1,
            Ok(false) => {}
            Err(err) => failures.push(format!("{url}: {err:#}")),
        }
    }
    println!("Pages downloaded: {downloaded}");
    if !failures.is_empty() {
        println!("download failures: {}", failures.len());
        for failure in failures.iter().take(6) {
            println!(" - {failure}");
        }
    }
    Ok(())
}

/// Merges every staged CSV into its accumulated file. A failed partition is
/// reported and leaves its accumulated file untouched; the rest proceed.
fn merge_staged(paths: &Paths) -> Result<()> {
    let mut staged = Vec::new();
    collect_csvs(&paths.stage_dir, &mut staged)?;
    staged.sort();
    if staged.is_empty() {
        println!("Nothing staged under {}", paths.stage_dir.display());
        return Ok(());
    }

    let mut merged = 0usize;
    let mut failures = Vec::new();
    for src in staged {
        match merge_one(paths, &src) {
            Ok(summary) => {
                merged += 1;
                println!(
                    "{}: +{} rows ({} -> {}){}",
                    summary.path.display(),
                    summary.rows_added,
                    summary.rows_before,
                    summary.rows_after,
                    if summary.created { " [created]" } else { "" }
                );
                for warning in &summary.warnings {
                    println!("  warning: {warning}");
                }
            }
            Err(err) => failures.push(format!("{}: {err:#}", src.display())),
        }
    }
    println!("Partitions merged: {merged}");
    for failure in &failures {
        println!("failed: {failure}");
    }
    if merged == 0 {
        return Err(anyhow!("every staged partition failed to merge"));
    }
    Ok(())
}

fn merge_one(paths: &Paths, src: &std::path::Path) -> Result<UpdateSummary> {
    let rel = src
        .strip_prefix(&paths.stage_dir)
        .context("staged file outside the stage dir")?;
    let target = paths.ingest_dir.join(rel);

    let meta = loader::filename_metadata(src)
        .ok()
        .map(|(country, gender, tier)| {
            config::validate_partition(&country, &tier).map(|()| PartitionMeta {
                country,
                gender,
                tier,
            })
        })
        .transpose()?;

    let new_rows = Table::read_csv(src)?;
    let summary = update::update_partition(&target, new_rows, None, meta.as_ref())?;
    std::fs::remove_file(src).with_context(|| format!("remove staged {}", src.display()))?;
    Ok(summary)
}

fn promote_staged(paths: &Paths) -> Result<()> {
    let summary = scrape::stage_new_results(paths)?;
    println!("Batches promoted: {}", summary.promoted.len());
    for (src, dest) in &summary.promoted {
        println!("  {} -> {}", src.display(), dest.display());
    }
    for err in &summary.errors {
        println!("failed: {err}");
    }
    Ok(())
}

fn collect_csvs(dir: &std::path::Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read dir {}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_csvs(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            out.push(path);
        }
    }
    Ok(())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn parse_data_dir_arg(args: &[String]) -> Option<PathBuf> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--data-dir=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--data-dir" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

fn parse_pause_arg(args: &[String]) -> Option<u64> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix("--pause=") {
            if let Ok(secs) = raw.trim().parse::<u64>() {
                return Some(secs);
            }
        }
        if arg == "--pause"
            && let Some(next) = args.get(idx + 1)
            && let Ok(secs) = next.trim().parse::<u64>()
        {
            return Some(secs);
        }
    }
    None
}
