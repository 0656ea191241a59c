//! The scraping boundary. The HTML parser is a black box that hands over
//! fully-formed tables per match page; this module types those hand-offs
//! (tagged per stat type rather than string-keyed), canonicalizes match URLs
//! against the per-batch mapping, and writes each batch into the staging
//! tree partitioned by (Country, Gender, Tier). `stage_new_results` then
//! promotes staged files into the accumulated tree under numbered names so
//! no earlier batch is ever overwritten.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::config::Paths;
use crate::schema::{EntityLevel, StatType};
use crate::table::{Cell, Table, Value};

const SOURCE_SUFFIX: &str = "fbref";

/// Per-batch MatchURL -> canonical Game_URL mapping, derived from the
/// scraped match summary and applied to every stat table in the batch.
#[derive(Debug, Clone, Default)]
pub struct MatchMapping {
    by_match_url: HashMap<String, String>,
}

impl MatchMapping {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> MatchMapping {
        MatchMapping {
            by_match_url: pairs.into_iter().collect(),
        }
    }

    /// Distinct (MatchURL, Game_URL) pairs of the scraped match summary.
    pub fn from_match_summary(summary: &Table) -> Result<MatchMapping> {
        let match_idx = summary
            .column_index("MatchURL")
            .ok_or_else(|| anyhow!("match summary has no MatchURL column"))?;
        let game_idx = summary
            .column_index("Game_URL")
            .ok_or_else(|| anyhow!("match summary has no Game_URL column"))?;
        let mut by_match_url = HashMap::new();
        for row in summary.rows() {
            if let (Some(Value::Str(m)), Some(Value::Str(g))) = (&row[match_idx], &row[game_idx]) {
                by_match_url.insert(m.clone(), g.clone());
            }
        }
        Ok(MatchMapping { by_match_url })
    }

    pub fn len(&self) -> usize {
        self.by_match_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_match_url.is_empty()
    }

    /// Rewrites the MatchURL column to the canonical game URL. A table that
    /// carries its own Game_URL column is trusted over the mapping; values
    /// the mapping does not know stay unchanged.
    pub fn apply(&self, table: &mut Table) {
        if !table.has_column("MatchURL") {
            return;
        }
        if let Some(game_idx) = table.column_index("Game_URL") {
            let games: Vec<Cell> = table
                .rows()
                .iter()
                .map(|row| row[game_idx].clone())
                .collect();
            // Length always matches.
            let _ = table.set_column("MatchURL", games);
            return;
        }
        table.map_column("MatchURL", |cell| match cell {
            Some(Value::Str(url)) => match self.by_match_url.get(&url) {
                Some(game) => Some(Value::Str(game.clone())),
                None => Some(Value::Str(url)),
            },
            other => other,
        });
    }
}

/// One table per advanced stat category, for one entity level. Slots for
/// categories the source page lacked stay empty; that is data, not an error.
#[derive(Debug, Clone, Default)]
pub struct StatBundle {
    slots: [Option<Table>; StatType::ALL.len()],
}

impl StatBundle {
    pub fn new() -> StatBundle {
        StatBundle::default()
    }

    pub fn insert(&mut self, stat: StatType, table: Table) {
        let slot = &mut self.slots[stat.index()];
        *slot = Some(match slot.take() {
            Some(existing) => Table::concat_diagonal(vec![existing, table]),
            None => table,
        });
    }

    pub fn get(&self, stat: StatType) -> Option<&Table> {
        self.slots[stat.index()].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatType, &Table)> {
        StatType::ALL
            .into_iter()
            .filter_map(|stat| self.slots[stat.index()].as_ref().map(|t| (stat, t)))
    }

    /// Slot-wise diagonal concatenation of two bundles.
    pub fn merge(&mut self, other: StatBundle) {
        for (stat, slot) in StatType::ALL.into_iter().zip(other.slots) {
            if let Some(table) = slot {
                self.insert(stat, table);
            }
        }
    }
}

/// Everything one scraped batch of match pages yields.
#[derive(Debug, Clone)]
pub struct MatchStats {
    pub match_summary: Table,
    pub lineups: Option<Table>,
    pub shooting: Option<Table>,
    pub team_stats: StatBundle,
    pub player_stats: StatBundle,
}

impl MatchStats {
    pub fn merge(mut self, other: MatchStats) -> MatchStats {
        self.match_summary = Table::concat_diagonal(vec![self.match_summary, other.match_summary]);
        self.lineups = concat_optional(self.lineups, other.lineups);
        self.shooting = concat_optional(self.shooting, other.shooting);
        self.team_stats.merge(other.team_stats);
        self.player_stats.merge(other.player_stats);
        self
    }
}

fn concat_optional(a: Option<Table>, b: Option<Table>) -> Option<Table> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Table::concat_diagonal(vec![a, b])),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Second-to-last path segment of a match URL, the stable per-fixture id
/// that survives URL rewrites.
pub fn match_id(url: &str) -> Option<&str> {
    let mut segments = url.split('/').filter(|s| !s.is_empty());
    let mut prev = None;
    let mut last = segments.next()?;
    for seg in segments {
        prev = Some(last);
        last = seg;
    }
    prev
}

#[derive(Debug)]
pub struct IngestSummary {
    pub dataset: String,
    pub partitions_written: usize,
    pub rows_written: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl IngestSummary {
    fn new(dataset: impl Into<String>) -> IngestSummary {
        IngestSummary {
            dataset: dataset.into(),
            partitions_written: 0,
            rows_written: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// The identity columns of the missing-fixture list, used to stamp every
/// scraped table with its partition before staging.
fn fixture_identity(missing: &Table) -> Result<Table> {
    missing
        .select(&["MatchURL", "Country", "Tier", "Season_End_Year", "Gender"])
        .context("missing-fixture list lacks identity columns")
}

fn partition_label(cells: &[Cell]) -> Result<(String, String, String)> {
    let as_string = |i: usize| -> Option<String> {
        cells.get(i).and_then(|c| c.as_ref()).map(|v| v.to_string())
    };
    match (as_string(0), as_string(1), as_string(2)) {
        (Some(c), Some(g), Some(t)) => Ok((c, g, t)),
        _ => Err(anyhow!("rows with no partition identity (fixture not in missing list?)")),
    }
}

fn write_partitions(
    table: &Table,
    dir: &Path,
    file_name: impl Fn(&str, &str, &str) -> String,
    summary: &mut IngestSummary,
) {
    for (key, part) in table.partition_by(&["Country", "Gender", "Tier"]) {
        let (country, gender, tier) = match partition_label(&key) {
            Ok(label) => label,
            Err(err) => {
                summary
                    .errors
                    .push(format!("{}: skipped {} rows: {err}", summary.dataset, part.height()));
                continue;
            }
        };
        let path = dir.join(file_name(&country, &gender, &tier));
        match part.write_csv(&path) {
            Ok(()) => {
                summary.partitions_written += 1;
                summary.rows_written += part.height();
            }
            Err(err) => summary
                .errors
                .push(format!("{}/{country}_{gender}_{tier}: {err:#}", summary.dataset)),
        }
    }
}

/// Stages the scraped match summary, partitioned by (Country, Gender, Tier).
pub fn ingest_match_summary(
    paths: &Paths,
    missing: &Table,
    match_summary: &Table,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::new("match_summary");
    let identity = fixture_identity(missing)?;
    let joined = match_summary
        .left_join(&identity, &["MatchURL"])
        .context("join match summary against fixture identity")?;
    write_partitions(
        &joined,
        &paths.stage_dir.join("match_summary"),
        |c, g, t| format!("{c}_{g}_{t}_match_summary_{SOURCE_SUFFIX}.csv"),
        &mut summary,
    );
    Ok(summary)
}

/// Stages one entity level's advanced stat tables. The join back to the
/// fixture identity goes through the per-fixture id, so a stat table whose
/// URLs were already rewritten still lands in the right partition. A stat
/// category that fails to stage is reported and skipped; the rest proceed.
pub fn ingest_advanced_stats(
    paths: &Paths,
    missing: &Table,
    level: EntityLevel,
    stats: &StatBundle,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::new(format!("advanced_match_stats/{}", level.as_str()));
    let mut identity = fixture_identity(missing)?;
    add_match_id_column(&mut identity)?;

    for (stat, table) in stats.iter() {
        let staged = match stage_one_stat(table, &identity) {
            Ok(staged) => staged,
            Err(err) => {
                summary
                    .errors
                    .push(format!("{}: {err:#}", stat.as_str()));
                continue;
            }
        };
        write_partitions(
            &staged,
            &paths
                .stage_dir
                .join("advanced_match_stats")
                .join(level.as_str())
                .join(stat.as_str()),
            |c, g, t| format!("{c}_{g}_{t}_{SOURCE_SUFFIX}.csv"),
            &mut summary,
        );
    }
    Ok(summary)
}

fn stage_one_stat(table: &Table, identity: &Table) -> Result<Table> {
    let mut staged = table.clone();
    add_match_id_column(&mut staged)?;
    staged.drop_columns(&["MatchURL"]);
    let mut joined = staged.left_join(identity, &["match_id"])?;
    joined.drop_columns(&["match_id"]);
    Ok(joined)
}

fn add_match_id_column(table: &mut Table) -> Result<()> {
    let idx = table
        .column_index("MatchURL")
        .ok_or_else(|| anyhow!("no MatchURL column to derive match ids from"))?;
    let ids: Vec<Cell> = table
        .rows()
        .iter()
        .map(|row| match &row[idx] {
            Some(Value::Str(url)) => match_id(url).map(|id| Value::Str(id.to_string())),
            _ => None,
        })
        .collect();
    table.set_column("match_id", ids)
}

/// Stages the scraped shot-level table. An empty table is a warning-level
/// no-op, not an error.
pub fn ingest_match_shooting(
    paths: &Paths,
    missing: &Table,
    shooting: &Table,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::new("match_shooting");
    if shooting.is_empty() {
        summary.warnings.push("no shooting data to ingest".to_string());
        return Ok(summary);
    }
    let identity = fixture_identity(missing)?;
    let joined = shooting
        .left_join(&identity, &["MatchURL"])
        .context("join shooting data against fixture identity")?;
    write_partitions(
        &joined,
        &paths.stage_dir.join("match_shooting"),
        |c, g, t| format!("{c}_{g}_{t}_match_shooting_{SOURCE_SUFFIX}.csv"),
        &mut summary,
    );
    Ok(summary)
}

#[derive(Debug, Default)]
pub struct StageSummary {
    pub promoted: Vec<(PathBuf, PathBuf)>,
    pub errors: Vec<String>,
}

/// Moves every staged CSV into the accumulated tree under a numbered
/// `_fbref_NNNN` name, one past the highest batch already present, so
/// repeated ingestion runs accumulate instead of overwriting.
pub fn stage_new_results(paths: &Paths) -> Result<StageSummary> {
    let mut summary = StageSummary::default();
    let mut staged = Vec::new();
    collect_csvs(&paths.stage_dir, &mut staged)?;
    staged.sort();

    for src in staged {
        match promote_one(&src, &paths.stage_dir, &paths.ingest_dir) {
            Ok(dest) => summary.promoted.push((src, dest)),
            Err(err) => summary.errors.push(format!("{}: {err:#}", src.display())),
        }
    }
    Ok(summary)
}

fn collect_csvs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry.with_context(|| format!("read dir {}", dir.display()))?.path();
        if path.is_dir() {
            collect_csvs(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            out.push(path);
        }
    }
    Ok(())
}

fn promote_one(src: &Path, stage_dir: &Path, ingest_dir: &Path) -> Result<PathBuf> {
    let rel = src
        .strip_prefix(stage_dir)
        .context("staged file outside the stage dir")?;
    let target = ingest_dir.join(rel);
    let dir = target
        .parent()
        .ok_or_else(|| anyhow!("staged file has no parent directory"))?;
    fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;

    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("unreadable staged filename"))?;
    let dest = dir.join(numbered_name(name, dir)?);
    fs::rename(src, &dest)
        .with_context(|| format!("promote into {}", dest.display()))?;
    Ok(dest)
}

/// `X_fbref.csv` becomes `X_fbref_NNNN.csv` with NNNN one past the number
/// of matching batches already in `dir`. Names without the source marker
/// pass through unchanged.
fn numbered_name(name: &str, dir: &Path) -> Result<String> {
    let marker = format!("_{SOURCE_SUFFIX}");
    let Some(pos) = name.find(&marker) else {
        return Ok(name.to_string());
    };
    let (prefix, rest) = name.split_at(pos);
    let suffix = &rest[marker.len()..];
    let numbered_prefix = format!("{prefix}{marker}_");

    let mut existing = 0;
    if dir.exists() {
        for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
            let entry = entry.with_context(|| format!("read dir {}", dir.display()))?;
            let file_name = entry.file_name();
            if let Some(n) = file_name.to_str()
                && n.starts_with(&numbered_prefix)
                && n.ends_with(suffix)
            {
                existing += 1;
            }
        }
    }
    Ok(format!("{numbered_prefix}{:04}{suffix}", existing + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Paths;

    fn s(v: &str) -> Cell {
        Some(Value::Str(v.to_string()))
    }

    fn missing_fixture_list() -> Table {
        let mut t = Table::new(vec!["MatchURL", "Country", "Tier", "Season_End_Year", "Gender"]);
        t.push_row(vec![s("/en/matches/abc123/Arsenal-Leeds"), s("ENG"), s("1st"), Some(Value::Int(2023)), s("M")]);
        t.push_row(vec![s("/en/matches/def456/Bayern-Koln"), s("GER"), s("1st"), Some(Value::Int(2023)), s("M")]);
        t
    }

    #[test]
    fn mapping_rewrites_unmapped_values_pass_through() {
        let mapping =
            MatchMapping::from_pairs(vec![("m1".to_string(), "g1".to_string())]);
        let mut t = Table::new(vec!["MatchURL"]);
        t.push_row(vec![s("m1")]);
        t.push_row(vec![s("m9")]);
        mapping.apply(&mut t);
        assert_eq!(t.get(0, "MatchURL"), Some(&Value::Str("g1".into())));
        assert_eq!(t.get(1, "MatchURL"), Some(&Value::Str("m9".into())));
    }

    #[test]
    fn table_with_game_url_overrides_mapping() {
        let mapping =
            MatchMapping::from_pairs(vec![("m1".to_string(), "wrong".to_string())]);
        let mut t = Table::new(vec!["MatchURL", "Game_URL"]);
        t.push_row(vec![s("m1"), s("g1")]);
        mapping.apply(&mut t);
        assert_eq!(t.get(0, "MatchURL"), Some(&Value::Str("g1".into())));
    }

    #[test]
    fn mapping_built_from_match_summary_pairs() {
        let mut summary = Table::new(vec!["MatchURL", "Game_URL", "Home_Team"]);
        summary.push_row(vec![s("m1"), s("g1"), s("Arsenal")]);
        summary.push_row(vec![s("m1"), s("g1"), s("Arsenal")]);
        let mapping = MatchMapping::from_match_summary(&summary).unwrap();
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn match_id_is_second_to_last_segment() {
        assert_eq!(match_id("/en/matches/abc123/Arsenal-Leeds"), Some("abc123"));
        assert_eq!(match_id("abc123/Arsenal-Leeds"), Some("abc123"));
        assert_eq!(match_id("Arsenal-Leeds"), None);
    }

    #[test]
    fn bundle_merge_concatenates_per_slot() {
        let mut a = StatBundle::new();
        let mut t1 = Table::new(vec!["MatchURL", "Gls"]);
        t1.push_row(vec![s("m1"), Some(Value::Int(2))]);
        a.insert(StatType::Summary, t1);

        let mut b = StatBundle::new();
        let mut t2 = Table::new(vec!["MatchURL", "Gls"]);
        t2.push_row(vec![s("m2"), Some(Value::Int(1))]);
        b.insert(StatType::Summary, t2);
        let mut t3 = Table::new(vec!["MatchURL", "Tkl_Tackles"]);
        t3.push_row(vec![s("m2"), Some(Value::Int(9))]);
        b.insert(StatType::Defense, t3);

        a.merge(b);
        assert_eq!(a.get(StatType::Summary).unwrap().height(), 2);
        assert_eq!(a.get(StatType::Defense).unwrap().height(), 1);
        assert!(a.get(StatType::Misc).is_none());
    }

    #[test]
    fn match_summary_stages_per_partition() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::from_base(dir.path());
        let mut summary_table = Table::new(vec!["MatchURL", "Home_Team"]);
        summary_table.push_row(vec![s("/en/matches/abc123/Arsenal-Leeds"), s("Arsenal")]);
        summary_table.push_row(vec![s("/en/matches/def456/Bayern-Koln"), s("Bayern")]);

        let out =
            ingest_match_summary(&paths, &missing_fixture_list(), &summary_table).unwrap();
        assert_eq!(out.partitions_written, 2);
        assert!(out.errors.is_empty());
        let eng = paths
            .stage_dir
            .join("match_summary")
            .join("ENG_M_1st_match_summary_fbref.csv");
        let staged = Table::read_csv(&eng).unwrap();
        assert_eq!(staged.height(), 1);
        assert_eq!(staged.get(0, "Country"), Some(&Value::Str("ENG".into())));
    }

    #[test]
    fn advanced_stats_stage_through_the_match_id() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::from_base(dir.path());
        let mut bundle = StatBundle::new();
        let mut defense = Table::new(vec!["MatchURL", "Team", "Tkl_Tackles"]);
        // Rewritten URL form: same id, different tail.
        defense.push_row(vec![s("/en/matches/abc123/Arsenal-Leeds-Premier-League"), s("Arsenal"), Some(Value::Int(14))]);
        bundle.insert(StatType::Defense, defense);

        let out = ingest_advanced_stats(
            &paths,
            &missing_fixture_list(),
            EntityLevel::Team,
            &bundle,
        )
        .unwrap();
        assert_eq!(out.partitions_written, 1);
        let staged = Table::read_csv(
            &paths
                .stage_dir
                .join("advanced_match_stats/team/defense")
                .join("ENG_M_1st_fbref.csv"),
        )
        .unwrap();
        assert_eq!(staged.height(), 1);
        assert_eq!(
            staged.get(0, "MatchURL"),
            Some(&Value::Str("/en/matches/abc123/Arsenal-Leeds".into()))
        );
        assert!(!staged.has_column("match_id"));
    }

    #[test]
    fn empty_shooting_table_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::from_base(dir.path());
        let shooting = Table::new(vec!["MatchURL", "xG"]);
        let out = ingest_match_shooting(&paths, &missing_fixture_list(), &shooting).unwrap();
        assert_eq!(out.partitions_written, 0);
        // Nothing to stage is a warning, not a failure.
        assert!(out.errors.is_empty());
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn promotion_numbers_batches_in_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::from_base(dir.path());
        let staged = paths.stage_dir.join("match_summary");
        std::fs::create_dir_all(&staged).unwrap();
        let name = "ENG_M_1st_match_summary_fbref.csv";
        std::fs::write(staged.join(name), "MatchURL\nm1\n").unwrap();

        let first = stage_new_results(&paths).unwrap();
        assert_eq!(first.promoted.len(), 1);
        let promoted = paths
            .ingest_dir
            .join("match_summary")
            .join("ENG_M_1st_match_summary_fbref_0001.csv");
        assert!(promoted.exists());

        std::fs::write(staged.join(name), "MatchURL\nm2\n").unwrap();
        let second = stage_new_results(&paths).unwrap();
        assert_eq!(second.promoted.len(), 1);
        assert!(
            paths
                .ingest_dir
                .join("match_summary")
                .join("ENG_M_1st_match_summary_fbref_0002.csv")
                .exists()
        );
    }
}
