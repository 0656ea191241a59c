//! Incremental merge of a freshly scraped batch into the accumulated file
//! for one partition. The target file is always rewritten in full (tmp file
//! + rename), so readers only ever see a complete merged table, and any
//! failure before the rename leaves the previous version untouched.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};

use crate::loader;
use crate::scrape::MatchMapping;
use crate::table::{Cell, Table, Value};

/// Sort order of an accumulated file, restricted to whichever of these
/// columns the dataset has.
const INDEX_COLUMNS: &[&str] = &[
    "Season_End_Year",
    "Rk",
    "Match_Date",
    "Squad",
    "Team",
    "Player",
];

/// Identity of the partition being updated, used to re-stamp metadata
/// columns after merging rows from different scrape runs.
#[derive(Debug, Clone)]
pub struct PartitionMeta {
    pub country: String,
    pub gender: String,
    pub tier: String,
}

#[derive(Debug)]
pub struct UpdateSummary {
    pub path: PathBuf,
    pub created: bool,
    pub rows_before: usize,
    pub rows_added: usize,
    pub rows_after: usize,
    pub warnings: Vec<String>,
}

fn epoch_days_to_date(days: i64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    if days >= 0 {
        epoch.checked_add_days(Days::new(days as u64))
    } else {
        epoch.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

/// Some scrape exports encode `Date` as days since the Unix epoch; turn
/// those back into calendar dates before merging with date-typed rows.
fn decode_numeric_date(table: &mut Table) {
    let Some(idx) = table.column_index("Date") else {
        return;
    };
    let numeric = table.rows().iter().any(|row| row[idx].is_some())
        && table.rows().iter().all(|row| {
            matches!(row[idx], None | Some(Value::Int(_)) | Some(Value::Float(_)))
        });
    if !numeric {
        return;
    }
    table.map_column("Date", |cell| {
        let days = cell.as_ref().and_then(|v| v.as_i64())?;
        epoch_days_to_date(days).map(|d| Value::Str(d.format("%Y-%m-%d").to_string()))
    });
}

fn forward_fill(table: &mut Table, name: &str) {
    let Some(idx) = table.column_index(name) else {
        return;
    };
    let mut filled: Vec<Cell> = Vec::with_capacity(table.height());
    let mut last: Cell = None;
    for row in table.rows() {
        if row[idx].is_some() {
            last = row[idx].clone();
        }
        filled.push(last.clone());
    }
    // Length always matches.
    let _ = table.set_column(name, filled);
}

/// R exports leak literal NA placeholders into string columns.
fn normalize_na_placeholders(table: &mut Table) {
    let names: Vec<String> = table.columns().to_vec();
    for name in names {
        table.map_column(&name, |cell| match cell {
            Some(Value::Str(s)) if s == "NA" || s == "NA_character_" => None,
            other => other,
        });
    }
}

/// Merges `new_rows` into the accumulated file at `path`.
///
/// A missing or unreadable existing file counts as "no prior data" so a
/// retried ingestion run never fails on its own partial state. The merge is
/// column-tolerant: old and new rows are concatenated over the union of
/// their columns, metadata is re-derived when a match date is available,
/// exact duplicates are dropped and the result is re-sorted.
pub fn update_partition(
    path: &Path,
    mut new_rows: Table,
    mapping: Option<&MatchMapping>,
    meta: Option<&PartitionMeta>,
) -> Result<UpdateSummary> {
    let mut warnings = Vec::new();

    if let Some(mapping) = mapping {
        mapping.apply(&mut new_rows);
    }
    decode_numeric_date(&mut new_rows);

    let rows_added = new_rows.height();
    let existing = if path.exists() {
        match Table::read_csv(path) {
            Ok(table) => Some(table),
            Err(err) => {
                warnings.push(format!(
                    "{}: unreadable existing file treated as empty ({err})",
                    path.display()
                ));
                None
            }
        }
    } else {
        None
    };
    let rows_before = existing.as_ref().map(Table::height).unwrap_or(0);
    let created = existing.is_none();

    let mut merged = match existing {
        Some(existing) => Table::concat_diagonal(vec![existing, new_rows]),
        None => new_rows,
    };

    if merged.has_column("Match_Date") {
        if let Some(meta) = meta {
            merged.set_const_column("Country", Some(Value::Str(meta.country.clone())));
            merged.set_const_column("Gender", Some(Value::Str(meta.gender.clone())));
            merged.set_const_column("Tier", Some(Value::Str(meta.tier.clone())));
        }
        loader::derive_season_column(&mut merged, "Match_Date")?;
    }
    forward_fill(&mut merged, "Competition_Name");
    if let Some(game_idx) = merged.column_index("Game_URL") {
        let games: Vec<Cell> = merged
            .rows()
            .iter()
            .map(|row| row[game_idx].clone())
            .collect();
        merged
            .set_column("MatchURL", games)
            .context("canonicalize MatchURL from Game_URL")?;
    }
    normalize_na_placeholders(&mut merged);

    let mut merged = merged.unique();
    merged.sort_by(INDEX_COLUMNS);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    merged
        .write_csv_atomic(path)
        .with_context(|| format!("rewrite {}", path.display()))?;

    Ok(UpdateSummary {
        path: path.to_path_buf(),
        created,
        rows_before,
        rows_added,
        rows_after: merged.height(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Cell {
        Some(Value::Str(v.to_string()))
    }

    fn batch(rows: &[(&str, &str, &str)]) -> Table {
        let mut t = Table::new(vec!["MatchURL", "Match_Date", "Team"]);
        for (url, date, team) in rows {
            t.push_row(vec![s(url), s(date), s(team)]);
        }
        t
    }

    #[test]
    fn creating_and_rerunning_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ENG_M_1st_match_summary.csv");
        let rows = batch(&[("/m/1", "2022-10-01", "Arsenal"), ("/m/2", "2022-10-02", "Leeds")]);

        let first = update_partition(&path, rows.clone(), None, None).unwrap();
        assert!(first.created);
        assert_eq!(first.rows_after, 2);

        let second = update_partition(&path, rows, None, None).unwrap();
        assert!(!second.created);
        assert_eq!(second.rows_before, 2);
        assert_eq!(second.rows_after, 2);
    }

    #[test]
    fn overlapping_season_batches_merge_to_the_union() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acc.csv");
        let run_one = batch(&[("/m/1", "2022-05-01", "Arsenal"), ("/m/2", "2023-05-01", "Arsenal")]);
        let run_two = batch(&[("/m/2", "2023-05-01", "Arsenal"), ("/m/3", "2023-05-08", "Leeds")]);

        update_partition(&path, run_one, None, None).unwrap();
        let summary = update_partition(&path, run_two, None, None).unwrap();
        assert_eq!(summary.rows_after, 3);

        let merged = Table::read_csv(&path).unwrap();
        // Sorted by season ascending.
        assert_eq!(merged.get(0, "Season_End_Year"), Some(&Value::Int(2022)));
        assert_eq!(merged.get(2, "Season_End_Year"), Some(&Value::Int(2023)));
    }

    #[test]
    fn match_mapping_rewrites_urls_before_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acc.csv");
        let rows = batch(&[("m1", "2023-01-14", "Arsenal")]);
        let mapping = MatchMapping::from_pairs(vec![("m1".to_string(), "g1".to_string())]);
        update_partition(&path, rows, Some(&mapping), None).unwrap();
        let merged = Table::read_csv(&path).unwrap();
        assert_eq!(merged.get(0, "MatchURL"), Some(&Value::Str("g1".into())));
    }

    #[test]
    fn metadata_is_restamped_from_match_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acc.csv");
        let rows = batch(&[("/m/1", "2023-09-20", "Arsenal")]);
        let meta = PartitionMeta {
            country: "ENG".to_string(),
            gender: "M".to_string(),
            tier: "1st".to_string(),
        };
        update_partition(&path, rows, None, Some(&meta)).unwrap();
        let merged = Table::read_csv(&path).unwrap();
        assert_eq!(merged.get(0, "Country"), Some(&Value::Str("ENG".into())));
        assert_eq!(merged.get(0, "Season_End_Year"), Some(&Value::Int(2024)));
    }

    #[test]
    fn numeric_dates_and_na_placeholders_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acc.csv");
        let mut rows = Table::new(vec!["MatchURL", "Date", "Notes"]);
        rows.push_row(vec![s("/m/1"), Some(Value::Int(19358)), s("NA")]);
        update_partition(&path, rows, None, None).unwrap();
        let merged = Table::read_csv(&path).unwrap();
        // 19358 days from 1970-01-01 is 2023-01-01.
        assert_eq!(merged.get(0, "Date"), Some(&Value::Str("2023-01-01".into())));
        assert_eq!(merged.get(0, "Notes"), None);
    }

    #[test]
    fn competition_name_forward_fills() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acc.csv");
        let mut rows = Table::new(vec!["MatchURL", "Competition_Name"]);
        rows.push_row(vec![s("/m/1"), s("Premier League")]);
        rows.push_row(vec![s("/m/2"), None]);
        update_partition(&path, rows, None, None).unwrap();
        let merged = Table::read_csv(&path).unwrap();
        assert_eq!(
            merged.get(1, "Competition_Name"),
            Some(&Value::Str("Premier League".into()))
        );
    }
}
