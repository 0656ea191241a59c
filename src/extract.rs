//! Builds the analysis-ready columnar extracts from the accumulated ingest
//! tree: one wide advanced-stats table per entity level, a deduplicated
//! match-summary projection, and the flat datasets.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::config::Paths;
use crate::join::join_stat_tables;
use crate::loader;
use crate::parquet_out;
use crate::schema::{self, EntityLevel, StatType};
use crate::table::{Table, Value};

/// Match-identifying columns of the wide table. The first six are the
/// fixture identity proper; the rest describe the fixture and are dropped
/// from the per-entity extracts once the match-summary projection is taken.
pub const MATCH_KEYS: &[&str] = &[
    "Country",
    "Gender",
    "Tier",
    "Season_End_Year",
    "MatchURL",
    "Match_Date",
    "League",
    "Matchweek",
    "Home_Team",
    "Home_Formation",
    "Home_Score",
    "Home_xG",
    "Home_Goals",
    "Home_Red_Cards",
    "Home_Yellow_Cards",
    "Away_Team",
    "Away_Formation",
    "Away_Score",
    "Away_xG",
    "Away_Goals",
    "Away_Red_Cards",
    "Away_Yellow_Cards",
    "Game_URL",
];

const FIXTURE_IDENTITY_LEN: usize = 6;

pub const PLAYER_JOIN_KEYS: &[&str] = &[
    "MatchURL",
    "Team",
    "Home_Away",
    "Player",
    "Player_Href",
    "Player_Num",
    "Pos",
    "Nation",
    "Age",
    "Min",
    "Gender",
    "Country",
    "Tier",
    "Season_End_Year",
];

const PLAYER_ONLY_KEYS: &[&str] = &[
    "Player",
    "Player_Num",
    "Pos",
    "Nation",
    "Age",
    "Player_Href",
    "Min",
];

/// Per-player columns relaxed out of the grouping so a player whose shirt
/// number or listed position differs between stat pages still collapses to
/// one row.
const PLAYER_GROUP_RELAXED: &[&str] = &["Player_Num", "Pos", "Player_Href"];

const ADVANCED_SORT: &[&str] = &["Country", "Gender", "Tier", "Season_End_Year", "Match_Date"];

pub fn team_join_keys() -> Vec<&'static str> {
    PLAYER_JOIN_KEYS
        .iter()
        .copied()
        .filter(|k| !PLAYER_ONLY_KEYS.contains(k))
        .collect()
}

fn join_keys(level: EntityLevel) -> Vec<&'static str> {
    match level {
        EntityLevel::Team => team_join_keys(),
        EntityLevel::Player => PLAYER_JOIN_KEYS.to_vec(),
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ExtractSummary {
    pub dataset: String,
    pub files_read: usize,
    pub rows_written: usize,
    pub output: PathBuf,
    pub warnings: Vec<String>,
}

fn cast_float(table: &mut Table, name: &str) {
    table.map_column(name, |cell| cell.and_then(|v| v.as_f64()).map(Value::Float));
}

fn cast_int(table: &mut Table, name: &str) {
    // Through f64 first, so "2023.0" style exports still land as ints.
    table.map_column(name, |cell| {
        cell.and_then(|v| v.as_f64()).map(|f| Value::Int(f as i64))
    });
}

/// Normalizes one concatenated stat table for the wide join: numeric
/// re-casts, exact dedup, the team-level column policy, and projection down
/// to keys plus the stat's own schema columns.
fn process_stat_table(mut table: Table, level: EntityLevel, stat: StatType) -> Table {
    for col in ["Home_xG", "Away_xG", "Min"] {
        if table.has_column(col) {
            cast_float(&mut table, col);
        }
    }
    for col in ["Season_End_Year", "Home_Score", "Away_Score"] {
        if table.has_column(col) {
            cast_int(&mut table, col);
        }
    }
    let mut table = table.unique();

    if level == EntityLevel::Team {
        table.drop_columns(&["Player_Href", "Min"]);
        if stat == StatType::Keeper {
            table.drop_columns(&["Player", "Nation", "Age"]);
        }
    }

    let keys = join_keys(level);
    let mut select: Vec<&str> = keys.clone();
    select.extend(MATCH_KEYS.iter().copied().filter(|k| !keys.contains(k)));
    select.extend(
        schema::stat_schema(stat)
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| table.has_column(name)),
    );
    table.select_existing(&select)
}

fn csv_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

/// Loads and joins every stat category for one entity level, collapses to
/// one row per entity per match, and writes the wide parquet extract. For
/// the team level the deduplicated match-summary projection is written
/// alongside it.
pub fn extract_advanced_match_stats(
    paths: &Paths,
    level: EntityLevel,
) -> Result<ExtractSummary> {
    let dataset = format!("advanced_match_stats_{}", level.as_str());
    let output = paths.extract_dir.join(format!("{dataset}.parquet"));
    let mut warnings = Vec::new();
    let mut files_read = 0usize;
    let mut stat_tables = Vec::new();

    for stat in StatType::ALL {
        let dir = paths
            .ingest_dir
            .join("advanced_match_stats")
            .join(level.as_str())
            .join(stat.as_str());
        let mut loaded = Vec::new();
        for path in csv_files(&dir) {
            match loader::load_stat_csv(&path, Some(schema::stat_schema(stat))) {
                Ok(result) => {
                    files_read += 1;
                    warnings.extend(result.warnings);
                    loaded.push(result.table);
                }
                // One corrupt file skips, the rest of the stat proceeds.
                Err(err) => warnings.push(format!("{}: {err:#}", path.display())),
            }
        }
        if loaded.is_empty() {
            warnings.push(format!("{}: no readable files", dir.display()));
            continue;
        }
        let mut table = process_stat_table(Table::concat_diagonal(loaded), level, stat);
        if stat == StatType::Defense {
            schema::coalesce_defense_aliases(&mut table);
        }
        stat_tables.push(table);
    }

    if stat_tables.is_empty() {
        return Err(anyhow!("{dataset}: no stat tables to extract"));
    }
    let keys = join_keys(level);
    let joined = join_stat_tables(stat_tables, &keys, MATCH_KEYS)?;

    if level == EntityLevel::Team {
        let mut match_summary = joined.select_existing(MATCH_KEYS).unique();
        match_summary.sort_by(ADVANCED_SORT);
        parquet_out::write_parquet(
            &match_summary,
            &paths.extract_dir.join("advanced_match_summary.parquet"),
        )
        .context("write advanced match summary extract")?;
    }

    let mut wide = joined;
    wide.drop_columns(&MATCH_KEYS[FIXTURE_IDENTITY_LEN..]);
    let group_keys: Vec<&str> = match level {
        EntityLevel::Team => keys,
        EntityLevel::Player => keys
            .into_iter()
            .filter(|k| !PLAYER_GROUP_RELAXED.contains(k))
            .collect(),
    };
    let mut wide = wide.group_max(&group_keys);
    wide.sort_by(ADVANCED_SORT);
    parquet_out::write_parquet(&wide, &output)
        .with_context(|| format!("write {dataset} extract"))?;

    Ok(ExtractSummary {
        dataset,
        files_read,
        rows_written: wide.height(),
        output,
        warnings,
    })
}

/// Concatenates every accumulated file of one flat dataset and writes it as
/// a single sorted parquet file.
pub fn extract_flat(
    paths: &Paths,
    dataset: &str,
    sort_columns: &[&str],
    output_name: &str,
) -> Result<ExtractSummary> {
    let dir = paths.ingest_dir.join(dataset);
    let output = paths.extract_dir.join(output_name);
    let mut warnings = Vec::new();
    let mut files_read = 0usize;
    let mut tables = Vec::new();

    for path in csv_files(&dir) {
        match loader::load_flat_csv(&path) {
            Ok(result) => {
                files_read += 1;
                warnings.extend(result.warnings);
                tables.push(result.table);
            }
            Err(err) => warnings.push(format!("{}: {err:#}", path.display())),
        }
    }
    if tables.is_empty() {
        return Err(anyhow!("{dataset}: no readable files under {}", dir.display()));
    }
    let mut table = Table::concat_diagonal(tables);
    table.sort_by(sort_columns);
    parquet_out::write_parquet(&table, &output)
        .with_context(|| format!("write {dataset} extract"))?;

    Ok(ExtractSummary {
        dataset: dataset.to_string(),
        files_read,
        rows_written: table.height(),
        output,
        warnings,
    })
}

/// Every extract the pipeline produces, with per-dataset fault isolation:
/// a failed dataset is reported and the rest still run.
pub fn run_all_extracts(paths: &Paths) -> (Vec<ExtractSummary>, Vec<String>) {
    let mut summaries = Vec::new();
    let mut errors = Vec::new();
    let mut record = |result: Result<ExtractSummary>, dataset: &str| match result {
        Ok(summary) => summaries.push(summary),
        Err(err) => errors.push(format!("{dataset}: {err:#}")),
    };

    for level in EntityLevel::ALL {
        record(
            extract_advanced_match_stats(paths, level),
            &format!("advanced_match_stats_{}", level.as_str()),
        );
    }
    record(
        extract_flat(
            paths,
            "match_results",
            &["Country", "Gender", "Tier", "Season_End_Year", "Date"],
            "match_results.parquet",
        ),
        "match_results",
    );
    record(
        extract_flat(
            paths,
            "match_shooting",
            &["Country", "Gender", "Tier", "Season_End_Year", "Date"],
            "match_shooting.parquet",
        ),
        "match_shooting",
    );
    record(
        extract_flat(
            paths,
            "match_summary",
            &["Country", "Gender", "Tier", "Season_End_Year", "Match_Date"],
            "match_summary.parquet",
        ),
        "match_summary",
    );
    record(
        extract_flat(
            paths,
            "wages",
            &["Comp", "Season", "Team", "WeeklyWageGBP"],
            "wages.parquet",
        ),
        "wages",
    );
    (summaries, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    fn s(v: &str) -> Cell {
        Some(Value::Str(v.to_string()))
    }

    #[test]
    fn team_join_keys_drop_the_player_columns() {
        let keys = team_join_keys();
        assert!(keys.contains(&"Team"));
        assert!(keys.contains(&"MatchURL"));
        assert!(!keys.contains(&"Player"));
        assert!(!keys.contains(&"Min"));
    }

    #[test]
    fn team_level_drops_player_href_and_keeper_identities() {
        let mut t = Table::new(vec![
            "MatchURL",
            "Team",
            "Player",
            "Player_Href",
            "Min",
            "Nation",
            "Age",
            "GA_Shot_Stopping",
        ]);
        t.push_row(vec![
            s("/m/1"),
            s("Arsenal"),
            s("Raya"),
            s("/p/raya"),
            Some(Value::Int(90)),
            s("ESP"),
            s("28"),
            Some(Value::Int(1)),
        ]);
        let out = process_stat_table(t, EntityLevel::Team, StatType::Keeper);
        assert!(!out.has_column("Player"));
        assert!(!out.has_column("Player_Href"));
        assert!(!out.has_column("Min"));
        assert!(out.has_column("GA_Shot_Stopping"));
    }

    #[test]
    fn player_level_keeps_identity_and_recasts_scores() {
        let mut t = Table::new(vec![
            "MatchURL",
            "Player",
            "Min",
            "Home_Score",
            "Season_End_Year",
            "Gls",
        ]);
        t.push_row(vec![
            s("/m/1"),
            s("Saka"),
            s("90"),
            Some(Value::Float(2.0)),
            Some(Value::Float(2023.0)),
            Some(Value::Int(1)),
        ]);
        let out = process_stat_table(t, EntityLevel::Player, StatType::Summary);
        assert_eq!(out.get(0, "Min"), Some(&Value::Float(90.0)));
        assert_eq!(out.get(0, "Home_Score"), Some(&Value::Int(2)));
        assert_eq!(out.get(0, "Season_End_Year"), Some(&Value::Int(2023)));
        assert_eq!(out.get(0, "Gls"), Some(&Value::Int(1)));
    }

    #[test]
    fn flat_extract_concatenates_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::from_base(dir.path());
        let results_dir = paths.ingest_dir.join("match_results");
        std::fs::create_dir_all(&results_dir).unwrap();
        std::fs::write(
            results_dir.join("ENG_M_1st_match_results.csv"),
            "Date,Home,Away\n2023-01-02,Leeds,Arsenal\n",
        )
        .unwrap();
        std::fs::write(
            results_dir.join("GER_M_1st_match_results.csv"),
            "Date,Home,Away\n2022-11-05,Bayern,Koln\n",
        )
        .unwrap();

        let summary = extract_flat(
            &paths,
            "match_results",
            &["Country", "Gender", "Tier", "Season_End_Year", "Date"],
            "match_results.parquet",
        )
        .unwrap();
        assert_eq!(summary.files_read, 2);
        assert_eq!(summary.rows_written, 2);

        let back = parquet_out::read_parquet(&summary.output).unwrap();
        assert_eq!(back.get(0, "Country"), Some(&Value::Str("ENG".into())));
        // Season derived from the date column on the way in.
        assert_eq!(back.get(0, "Season_End_Year"), Some(&Value::Int(2023)));
    }
}
