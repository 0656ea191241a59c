//! Missing-fixture detection: compares the full fixture list against what
//! the ingest tree already holds and reports what still needs scraping.
//! Re-running ingestion after a partial run is idempotent because this
//! report naturally shrinks as partitions land.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::config::{self, Paths};
use crate::table::{Cell, Table, Value};

/// Datasets whose presence a fixture is checked against.
#[derive(Debug, Clone, Default)]
pub struct Presence {
    pub match_summary: HashSet<String>,
    pub team_summary: HashSet<String>,
    pub team_advanced: HashSet<String>,
}

#[derive(Debug)]
pub struct MissingReport {
    /// One row per fixture still to scrape, with `Min_Advanced_Season` and
    /// the staging `filename` attached.
    pub missing: Table,
    pub fixtures_considered: usize,
    pub warnings: Vec<String>,
}

fn cell_contains(cell: &Cell, needle: &str) -> bool {
    matches!(cell, Some(Value::Str(s)) if s.contains(needle))
}

/// Bracket/history pages and cancelled fixtures are not real single-fixture
/// pages and are dropped from consideration entirely.
fn is_real_fixture(row: &[Cell], url_idx: usize, notes_idx: Option<usize>) -> bool {
    if cell_contains(&row[url_idx], "History")
        || cell_contains(&row[url_idx], "RelegationPromotion-Play-offs")
    {
        return false;
    }
    match notes_idx {
        Some(idx) => !cell_contains(&row[idx], "Cancelled"),
        None => true,
    }
}

/// Staging filename for one fixture page, relative to the stage dir.
pub fn staging_filename(country: &str, match_url: &str) -> PathBuf {
    let tail = match_url.rsplit('/').find(|s| !s.is_empty()).unwrap_or(match_url);
    PathBuf::from("html").join(country).join(format!("{tail}.html"))
}

/// The pure core of the detector: which fixtures from `match_results` are
/// absent from match-summary, absent from team-summary, or absent from
/// team-advanced-stats while their season is at or after the league's
/// advanced-stat availability. Leagues without configured advanced stats
/// never demand them, so their old seasons are not re-scraped forever.
pub fn find_missing_matches(
    match_results: &Table,
    presence: &Presence,
    gender: &str,
) -> Result<MissingReport> {
    let url_idx = match_results
        .column_index("MatchURL")
        .ok_or_else(|| anyhow!("match results have no MatchURL column"))?;
    let country_idx = match_results
        .column_index("Country")
        .ok_or_else(|| anyhow!("match results have no Country column"))?;
    let tier_idx = match_results
        .column_index("Tier")
        .ok_or_else(|| anyhow!("match results have no Tier column"))?;
    let season_idx = match_results
        .column_index("Season_End_Year")
        .ok_or_else(|| anyhow!("match results have no Season_End_Year column"))?;
    let gender_idx = match_results.column_index("Gender");
    let notes_idx = match_results.column_index("Notes");

    let mut considered = 0usize;
    let mut keep: Vec<usize> = Vec::new();
    let mut min_advanced: Vec<Cell> = Vec::new();
    let mut filenames: Vec<Cell> = Vec::new();

    for (ri, row) in match_results.rows().iter().enumerate() {
        let (Some(Value::Str(country)), Some(Value::Str(tier))) =
            (&row[country_idx], &row[tier_idx])
        else {
            continue;
        };
        // Unconfigured leagues are out of scope, not an error here.
        let Some(league) = config::league_config(country, tier) else {
            continue;
        };
        let season = row[season_idx].as_ref().and_then(Value::as_i64);
        if season.is_none_or(|s| s < config::MIN_SEASON_END_YEAR) {
            continue;
        }
        if let Some(gi) = gender_idx
            && row[gi].as_ref().and_then(Value::as_str) != Some(gender)
        {
            continue;
        }
        if !is_real_fixture(row, url_idx, notes_idx) {
            continue;
        }
        considered += 1;

        let Some(Value::Str(url)) = &row[url_idx] else {
            continue;
        };
        let in_summary = presence.match_summary.contains(url);
        let in_team_summary = presence.team_summary.contains(url);
        let advanced_due = league
            .min_advanced_season
            .is_some_and(|min| season.is_some_and(|s| s >= min));
        let advanced_missing = advanced_due && !presence.team_advanced.contains(url);

        if !in_summary || !in_team_summary || advanced_missing {
            keep.push(ri);
            min_advanced.push(league.min_advanced_season.map(Value::Int));
            filenames.push(Some(Value::Str(
                staging_filename(country, url).to_string_lossy().into_owned(),
            )));
        }
    }

    let mut missing = Table::new(match_results.columns().to_vec());
    for &ri in &keep {
        missing.push_row(match_results.rows()[ri].clone());
    }
    missing.set_column("Min_Advanced_Season", min_advanced)?;
    missing.set_column("filename", filenames)?;

    Ok(MissingReport {
        missing,
        fixtures_considered: considered,
        warnings: Vec::new(),
    })
}

fn csv_files(dir: &Path, warnings: &mut Vec<String>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return out,
    };
    for entry in entries {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                    out.push(path);
                }
            }
            Err(err) => warnings.push(format!("{}: {err}", dir.display())),
        }
    }
    out.sort();
    out
}

/// Concatenates every readable CSV in `dir`; unreadable files are skipped
/// with a warning so one corrupt batch never blocks the report.
fn read_concat_dir(dir: &Path, warnings: &mut Vec<String>) -> Table {
    let mut tables = Vec::new();
    for path in csv_files(dir, warnings) {
        match Table::read_csv(&path) {
            Ok(table) => tables.push(table),
            Err(err) => warnings.push(format!("{}: {err:#}", path.display())),
        }
    }
    Table::concat_diagonal(tables)
}

fn url_set(dir: &Path, warnings: &mut Vec<String>) -> HashSet<String> {
    let mut urls = HashSet::new();
    for path in csv_files(dir, warnings) {
        match Table::read_csv(&path) {
            Ok(table) => urls.extend(table.string_set("MatchURL")),
            Err(err) => warnings.push(format!("{}: {err:#}", path.display())),
        }
    }
    urls
}

/// Runs the detector against the on-disk ingest tree.
pub fn missing_matches(paths: &Paths, gender: &str) -> Result<MissingReport> {
    let mut warnings = Vec::new();
    let match_results = read_concat_dir(&paths.ingest_dir.join("match_results"), &mut warnings);
    if match_results.is_empty() {
        return Err(anyhow!(
            "no match results under {}",
            paths.ingest_dir.join("match_results").display()
        ));
    }
    let presence = Presence {
        match_summary: url_set(&paths.ingest_dir.join("match_summary"), &mut warnings),
        team_summary: url_set(
            &paths.ingest_dir.join("advanced_match_stats/team/summary"),
            &mut warnings,
        ),
        team_advanced: url_set(
            &paths.ingest_dir.join("advanced_match_stats/team/possession"),
            &mut warnings,
        ),
    };
    let mut report = find_missing_matches(&match_results, &presence, gender)?;
    report.warnings = warnings;
    Ok(report)
}
