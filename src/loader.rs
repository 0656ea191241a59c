//! Loads one raw CSV into a reconciled table carrying full partition
//! metadata (Country, Gender, Tier, Season_End_Year), inferring what the
//! columns lack from the `{Country}_{Gender}_{Tier}_...` filename convention.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate};

use crate::schema::{self, StatSchema};
use crate::table::{Cell, Table, Value};

/// Canonical season rule: a match in July or later belongs to the season
/// ending the following calendar year.
pub fn season_end_year(date: NaiveDate) -> i64 {
    if date.month() > 6 {
        i64::from(date.year()) + 1
    } else {
        i64::from(date.year())
    }
}

pub fn parse_date_cell(cell: &Cell) -> Option<NaiveDate> {
    match cell.as_ref()? {
        Value::Str(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
        _ => None,
    }
}

/// The date column a dataset carries, if any. Match-level exports use
/// `Match_Date`; season-level ones use `Date`.
pub fn date_column(table: &Table) -> Option<&'static str> {
    if table.has_column("Date") {
        Some("Date")
    } else if table.has_column("Match_Date") {
        Some("Match_Date")
    } else {
        None
    }
}

/// Overwrites `Season_End_Year` with the value derived from `date_col`.
/// Unparseable dates yield a null season rather than an error.
pub fn derive_season_column(table: &mut Table, date_col: &str) -> Result<()> {
    let idx = table
        .column_index(date_col)
        .ok_or_else(|| anyhow!("date column {date_col} not found"))?;
    let seasons: Vec<Cell> = table
        .rows()
        .iter()
        .map(|row| parse_date_cell(&row[idx]).map(|d| Value::Int(season_end_year(d))))
        .collect();
    table.set_column("Season_End_Year", seasons)
}

pub struct LoadedTable {
    pub table: Table,
    pub warnings: Vec<String>,
}

/// `{Country}_{Gender}_{Tier}_...` parsed off the file stem.
pub fn filename_metadata(path: &Path) -> Result<(String, String, String)> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("unreadable filename {}", path.display()))?;
    let mut parts = stem.split('_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(country), Some(gender), Some(tier))
            if !country.is_empty() && !gender.is_empty() && !tier.is_empty() =>
        {
            Ok((country.to_string(), gender.to_string(), tier.to_string()))
        }
        _ => Err(anyhow!(
            "filename {} does not follow the Country_Gender_Tier convention",
            path.display()
        )),
    }
}

/// Reads `path`, applies the stat schema when given, and guarantees the
/// result carries partition metadata. A file with no date column, no season
/// column and no match URL has nothing to identify its rows by and is
/// rejected. Zero rows after filtering is fine.
pub fn load_stat_csv(path: &Path, stat_schema: Option<&'static StatSchema>) -> Result<LoadedTable> {
    let mut table =
        Table::read_csv(path).with_context(|| format!("load {}", path.display()))?;
    let mut warnings = Vec::new();

    if let Some(stat_schema) = stat_schema {
        let tag = |msg: String| format!("{}: {msg}", path.display());
        if let Some(w) = schema::cast_to_schema(&mut table, stat_schema) {
            warnings.push(tag(w));
        }
        if let Some(w) = schema::drop_all_null_schema_rows(&mut table, stat_schema) {
            warnings.push(tag(w));
        }
        if let Some(w) = schema::drop_all_null_columns(&mut table) {
            warnings.push(tag(w));
        }
    }

    let date_col = date_column(&table);
    if date_col.is_none() && !table.has_column("Season_End_Year") && !table.has_column("MatchURL") {
        return Err(anyhow!(
            "{}: no date, season or match URL column; cannot identify rows",
            path.display()
        ));
    }
    apply_metadata(&mut table, path)?;

    Ok(LoadedTable { table, warnings })
}

/// Like `load_stat_csv` without a schema or the identity requirement, for
/// flat datasets (wages and the like) that carry no per-match keys.
pub fn load_flat_csv(path: &Path) -> Result<LoadedTable> {
    let mut table =
        Table::read_csv(path).with_context(|| format!("load {}", path.display()))?;
    apply_metadata(&mut table, path)?;
    Ok(LoadedTable {
        table,
        warnings: Vec::new(),
    })
}

fn apply_metadata(table: &mut Table, path: &Path) -> Result<()> {
    let date_col = date_column(table);
    let country_idx = table.column_index("Country");
    let country_incomplete = match country_idx {
        None => true,
        Some(idx) => table.rows().iter().any(|row| row[idx].is_none()),
    };

    if country_incomplete && let Some(date_col) = date_col {
        let (country, gender, tier) = filename_metadata(path)?;
        table.set_const_column("Country", Some(Value::Str(country)));
        table.set_const_column("Gender", Some(Value::Str(gender)));
        table.set_const_column("Tier", Some(Value::Str(tier)));
        derive_season_column(table, date_col)?;
    } else if table.has_column("Season_End_Year") && let Some(date_col) = date_col {
        derive_season_column(table, date_col)?;
    }
    Ok(())
}
