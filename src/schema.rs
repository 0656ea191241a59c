//! Per-stat-type column schemas and the reconciliation passes applied when a
//! raw CSV is loaded: declared-type casting, all-null placeholder-row
//! filtering, all-null column dropping, and the defense-table alias fix-up.

use anyhow::{Result, anyhow};

use crate::table::{Cell, Table, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Str,
}

/// The advanced per-match stat categories, team- and player-level alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatType {
    Summary,
    Keeper,
    Passing,
    PassingTypes,
    Possession,
    Defense,
    Misc,
}

impl StatType {
    pub const ALL: [StatType; 7] = [
        StatType::Summary,
        StatType::Keeper,
        StatType::Passing,
        StatType::PassingTypes,
        StatType::Possession,
        StatType::Defense,
        StatType::Misc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatType::Summary => "summary",
            StatType::Keeper => "keeper",
            StatType::Passing => "passing",
            StatType::PassingTypes => "passing_types",
            StatType::Possession => "possession",
            StatType::Defense => "defense",
            StatType::Misc => "misc",
        }
    }

    /// Unknown stat names are a configuration error and fail before any I/O.
    pub fn parse(name: &str) -> Result<StatType> {
        StatType::ALL
            .into_iter()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| anyhow!("unknown stat type {name:?}"))
    }

    pub fn index(self) -> usize {
        match self {
            StatType::Summary => 0,
            StatType::Keeper => 1,
            StatType::Passing => 2,
            StatType::PassingTypes => 3,
            StatType::Possession => 4,
            StatType::Defense => 5,
            StatType::Misc => 6,
        }
    }
}

/// Whether a stat table carries one row per team or one row per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityLevel {
    Team,
    Player,
}

impl EntityLevel {
    pub const ALL: [EntityLevel; 2] = [EntityLevel::Team, EntityLevel::Player];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityLevel::Team => "team",
            EntityLevel::Player => "player",
        }
    }
}

pub type StatSchema = [(&'static str, ColumnType)];

const SUMMARY: &StatSchema = &[
    ("Gls", ColumnType::Int),
    ("Ast", ColumnType::Int),
    ("PK", ColumnType::Int),
    ("PKatt", ColumnType::Int),
    ("Sh", ColumnType::Int),
    ("SoT", ColumnType::Int),
    ("CrdY", ColumnType::Int),
    ("CrdR", ColumnType::Int),
    ("Touches", ColumnType::Int),
    ("Tkl", ColumnType::Int),
    ("Int", ColumnType::Int),
    ("Blocks", ColumnType::Int),
    ("xG_Expected", ColumnType::Float),
    ("npxG_Expected", ColumnType::Float),
    ("xAG_Expected", ColumnType::Float),
    ("SCA_SCA", ColumnType::Int),
    ("GCA_SCA", ColumnType::Int),
    ("Cmp_Passes", ColumnType::Int),
    ("Att_Passes", ColumnType::Int),
    ("Cmp_percent_Passes", ColumnType::Float),
    ("PrgP_Passes", ColumnType::Int),
    ("Carries_Carries", ColumnType::Int),
    ("PrgC_Carries", ColumnType::Int),
    ("Att_Take_Ons", ColumnType::Int),
    ("Succ_Take_Ons", ColumnType::Int),
];

const KEEPER: &StatSchema = &[
    ("SoTA_Shot_Stopping", ColumnType::Int),
    ("GA_Shot_Stopping", ColumnType::Int),
    ("Saves_Shot_Stopping", ColumnType::Int),
    ("Save_percent_Shot_Stopping", ColumnType::Float),
    ("PSxG_Shot_Stopping", ColumnType::Float),
    ("Cmp_Launched", ColumnType::Int),
    ("Att_Launched", ColumnType::Int),
    ("Cmp_percent_Launched", ColumnType::Float),
    ("Att (GK)_Passes", ColumnType::Int),
    ("Thr_Passes", ColumnType::Int),
    ("Launch_percent_Passes", ColumnType::Float),
    ("AvgLen_Passes", ColumnType::Float),
    ("Att_Goal_Kicks", ColumnType::Int),
    ("Launch_percent_Goal_Kicks", ColumnType::Float),
    ("AvgLen_Goal_Kicks", ColumnType::Float),
    ("Opp_Crosses", ColumnType::Int),
    ("Stp_Crosses", ColumnType::Int),
    ("Stp_percent_Crosses", ColumnType::Float),
    ("Player_NumOPA_Sweeper", ColumnType::Int),
    ("AvgDist_Sweeper", ColumnType::Float),
];

const PASSING: &StatSchema = &[
    ("Att", ColumnType::Int),
    ("Live_Pass_Types", ColumnType::Int),
    ("Dead_Pass_Types", ColumnType::Int),
    ("FK_Pass_Types", ColumnType::Int),
    ("TB_Pass_Types", ColumnType::Int),
    ("Sw_Pass_Types", ColumnType::Int),
    ("Crs_Pass_Types", ColumnType::Int),
    ("TI_Pass_Types", ColumnType::Int),
    ("CK_Pass_Types", ColumnType::Int),
    ("In_Corner_Kicks", ColumnType::Int),
    ("Out_Corner_Kicks", ColumnType::Int),
    ("Str_Corner_Kicks", ColumnType::Int),
    ("Cmp_Outcomes", ColumnType::Int),
    ("Off_Outcomes", ColumnType::Int),
    ("Blocks_Outcomes", ColumnType::Int),
    ("Cmp_Total", ColumnType::Int),
    ("Att_Total", ColumnType::Int),
    ("Cmp_percent_Total", ColumnType::Float),
    ("TotDist_Total", ColumnType::Int),
    ("PrgDist_Total", ColumnType::Int),
    ("Cmp_Short", ColumnType::Int),
    ("Att_Short", ColumnType::Int),
    ("Cmp_percent_Short", ColumnType::Float),
    ("Cmp_Medium", ColumnType::Int),
    ("Att_Medium", ColumnType::Int),
    ("Cmp_percent_Medium", ColumnType::Float),
    ("Cmp_Long", ColumnType::Int),
    ("Att_Long", ColumnType::Int),
    ("Cmp_percent_Long", ColumnType::Float),
    ("Ast", ColumnType::Int),
    ("xAG", ColumnType::Float),
    ("xA", ColumnType::Float),
    ("KP", ColumnType::Int),
    ("Final_Third", ColumnType::Int),
    ("PPA", ColumnType::Int),
    ("CrsPA", ColumnType::Int),
    ("PrgP", ColumnType::Int),
];

const PASSING_TYPES: &StatSchema = &[
    ("Att", ColumnType::Int),
    ("Live_Pass_Types", ColumnType::Int),
    ("Dead_Pass_Types", ColumnType::Int),
    ("FK_Pass_Types", ColumnType::Int),
    ("TB_Pass_Types", ColumnType::Int),
    ("Sw_Pass_Types", ColumnType::Int),
    ("Crs_Pass_Types", ColumnType::Int),
    ("TI_Pass_Types", ColumnType::Int),
    ("CK_Pass_Types", ColumnType::Int),
    ("In_Corner_Kicks", ColumnType::Int),
    ("Out_Corner_Kicks", ColumnType::Int),
    ("Str_Corner_Kicks", ColumnType::Int),
    ("Cmp_Outcomes", ColumnType::Int),
    ("Off_Outcomes", ColumnType::Int),
    ("Blocks_Outcomes", ColumnType::Int),
];

const POSSESSION: &StatSchema = &[
    ("Touches_Touches", ColumnType::Int),
    ("Def Pen_Touches", ColumnType::Int),
    ("Def 3rd_Touches", ColumnType::Int),
    ("Mid 3rd_Touches", ColumnType::Int),
    ("Att 3rd_Touches", ColumnType::Int),
    ("Att Pen_Touches", ColumnType::Int),
    ("Live_Touches", ColumnType::Int),
    ("Att_Take_Ons", ColumnType::Int),
    ("Succ_Take_Ons", ColumnType::Int),
    ("Succ_percent_Take_Ons", ColumnType::Float),
    ("Tkld_Take_Ons", ColumnType::Int),
    ("Tkld_percent_Take_Ons", ColumnType::Float),
    ("Carries_Carries", ColumnType::Int),
    ("TotDist_Carries", ColumnType::Int),
    ("PrgDist_Carries", ColumnType::Int),
    ("PrgC_Carries", ColumnType::Int),
    ("Final_Third_Carries", ColumnType::Int),
    ("CPA_Carries", ColumnType::Int),
    ("Mis_Carries", ColumnType::Int),
    ("Dis_Carries", ColumnType::Int),
    ("Rec_Receiving", ColumnType::Int),
    ("PrgR_Receiving", ColumnType::Int),
];

const DEFENSE: &StatSchema = &[
    ("Tkl_Tackles", ColumnType::Int),
    ("TklW_Tackles", ColumnType::Int),
    ("Def 3rd_Tackles", ColumnType::Int),
    ("Mid 3rd_Tackles", ColumnType::Int),
    ("Att 3rd_Tackles", ColumnType::Int),
    ("Tkl_Challenges", ColumnType::Int),
    ("Att_Challenges", ColumnType::Int),
    ("Tkl_percent_Challenges", ColumnType::Float),
    ("Lost_Challenges", ColumnType::Int),
    ("Block_Blocks", ColumnType::Int),
    ("Sh_Blocks", ColumnType::Int),
    ("Pass_Blocks", ColumnType::Int),
    ("Int", ColumnType::Int),
    ("Tkl+Int", ColumnType::Int),
    ("Clr", ColumnType::Int),
    ("Err", ColumnType::Int),
];

const MISC: &StatSchema = &[
    ("CrdY", ColumnType::Int),
    ("CrdR", ColumnType::Int),
    ("2CrdY", ColumnType::Int),
    ("Fls", ColumnType::Int),
    ("Fld", ColumnType::Int),
    ("Off", ColumnType::Int),
    ("Crs", ColumnType::Int),
    ("Int", ColumnType::Int),
    ("TklW", ColumnType::Int),
    ("PKwon", ColumnType::Int),
    ("PKcon", ColumnType::Int),
    ("OG", ColumnType::Int),
    ("Recov", ColumnType::Int),
    ("Won_Aerial_Duels", ColumnType::Int),
    ("Lost_Aerial_Duels", ColumnType::Int),
    ("Won_percent_Aerial_Duels", ColumnType::Float),
];

pub fn stat_schema(stat: StatType) -> &'static StatSchema {
    match stat {
        StatType::Summary => SUMMARY,
        StatType::Keeper => KEEPER,
        StatType::Passing => PASSING,
        StatType::PassingTypes => PASSING_TYPES,
        StatType::Possession => POSSESSION,
        StatType::Defense => DEFENSE,
        StatType::Misc => MISC,
    }
}

/// Some defense exports carry dot-separated column names for the same
/// concept; the space/plus form is canonical.
const DEFENSE_ALIASES: &[(&str, &str)] = &[
    ("Def.3rd_Tackles", "Def 3rd_Tackles"),
    ("Mid.3rd_Tackles", "Mid 3rd_Tackles"),
    ("Att.3rd_Tackles", "Att 3rd_Tackles"),
    ("Tkl.Int", "Tkl+Int"),
];

fn cast_cell(cell: Cell, ty: ColumnType) -> Cell {
    let value = cell?;
    match ty {
        ColumnType::Int => value.as_i64().map(Value::Int),
        ColumnType::Float => value.as_f64().map(Value::Float),
        ColumnType::Str => Some(Value::Str(value.to_string())),
    }
}

/// Casts every schema column present in `table` to its declared type.
/// Cells that fail to cast become null. Returns a warning naming the schema
/// columns the table is missing, if any.
pub fn cast_to_schema(table: &mut Table, schema: &'static StatSchema) -> Option<String> {
    let mut missing = Vec::new();
    for (name, ty) in schema {
        if table.has_column(name) {
            table.map_column(name, |cell| cast_cell(cell, *ty));
        } else {
            missing.push(*name);
        }
    }
    if missing.is_empty() {
        None
    } else {
        Some(format!("missing schema columns: {}", missing.join(", ")))
    }
}

/// Rows where every schema column is null are placeholder/corrupt rows from
/// a partially-populated export; drop them. Returns a warning with the count.
pub fn drop_all_null_schema_rows(table: &mut Table, schema: &'static StatSchema) -> Option<String> {
    let indices: Vec<usize> = schema
        .iter()
        .filter_map(|(name, _)| table.column_index(name))
        .collect();
    if indices.is_empty() {
        return None;
    }
    let before = table.height();
    table.retain_rows(|row| indices.iter().any(|&i| row[i].is_some()));
    let dropped = before - table.height();
    if dropped == 0 {
        None
    } else {
        Some(format!("filtered {dropped} rows with all schema columns null"))
    }
}

/// Drops columns that are null in every row, naming them in the warning.
pub fn drop_all_null_columns(table: &mut Table) -> Option<String> {
    if table.is_empty() {
        return None;
    }
    let dead: Vec<String> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, _)| table.rows().iter().all(|row| row[*i].is_none()))
        .map(|(_, name)| name.clone())
        .collect();
    if dead.is_empty() {
        return None;
    }
    let refs: Vec<&str> = dead.iter().map(String::as_str).collect();
    table.drop_columns(&refs);
    Some(format!("dropped all-null columns: {}", dead.join(", ")))
}

/// Coalesces the dotted defense aliases into their canonical columns and
/// drops the dotted ones. The canonical value wins where both are present.
pub fn coalesce_defense_aliases(table: &mut Table) {
    for (alias, canonical) in DEFENSE_ALIASES {
        let Some(alias_idx) = table.column_index(alias) else {
            continue;
        };
        if let Some(canonical_idx) = table.column_index(canonical) {
            let merged: Vec<Cell> = table
                .rows()
                .iter()
                .map(|row| {
                    row[canonical_idx]
                        .clone()
                        .or_else(|| row[alias_idx].clone())
                })
                .collect();
            // set_column length always matches here.
            let _ = table.set_column(canonical, merged);
            table.drop_columns(&[alias]);
        } else {
            table.rename_column(alias, canonical);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defense_table() -> Table {
        let mut t = Table::new(vec!["Team", "Tkl_Tackles", "Def.3rd_Tackles", "Def 3rd_Tackles"]);
        t.push_row(vec![
            Some(Value::Str("Arsenal".into())),
            Some(Value::Str("4".into())),
            Some(Value::Int(7)),
            None,
        ]);
        t
    }

    #[test]
    fn parse_rejects_unknown_stat_type() {
        assert!(StatType::parse("summary").is_ok());
        assert!(StatType::parse("goalkeeping").is_err());
    }

    #[test]
    fn cast_coerces_strings_and_nulls_failures() {
        let mut t = Table::new(vec!["Tkl_Tackles", "Tkl_percent_Challenges"]);
        t.push_row(vec![
            Some(Value::Str("4".into())),
            Some(Value::Str("66.7".into())),
        ]);
        t.push_row(vec![Some(Value::Str("n/a".into())), None]);
        let warning = cast_to_schema(&mut t, DEFENSE);
        assert!(warning.is_some(), "table is missing most defense columns");
        assert_eq!(t.get(0, "Tkl_Tackles"), Some(&Value::Int(4)));
        assert_eq!(t.get(0, "Tkl_percent_Challenges"), Some(&Value::Float(66.7)));
        // Unparseable cell becomes null rather than failing the file.
        assert_eq!(t.get(1, "Tkl_Tackles"), None);
    }

    #[test]
    fn all_null_schema_rows_are_dropped() {
        let mut t = Table::new(vec!["Team", "Tkl_Tackles", "Int"]);
        t.push_row(vec![Some(Value::Str("Arsenal".into())), Some(Value::Int(3)), None]);
        t.push_row(vec![Some(Value::Str("Ghost".into())), None, None]);
        let warning = drop_all_null_schema_rows(&mut t, DEFENSE);
        assert_eq!(t.height(), 1);
        assert!(warning.unwrap().contains("1 rows"));
    }

    #[test]
    fn all_null_columns_are_dropped_and_named() {
        let mut t = Table::new(vec!["Team", "Empty"]);
        t.push_row(vec![Some(Value::Str("Arsenal".into())), None]);
        let warning = drop_all_null_columns(&mut t).unwrap();
        assert!(warning.contains("Empty"));
        assert!(!t.has_column("Empty"));
    }

    #[test]
    fn defense_alias_coalesce_prefers_canonical_name() {
        let mut t = defense_table();
        coalesce_defense_aliases(&mut t);
        assert!(!t.has_column("Def.3rd_Tackles"));
        // Canonical was null, so the alias value fills in.
        assert_eq!(t.get(0, "Def 3rd_Tackles"), Some(&Value::Int(7)));
    }

    #[test]
    fn defense_alias_renames_when_canonical_absent() {
        let mut t = Table::new(vec!["Tkl.Int"]);
        t.push_row(vec![Some(Value::Int(5))]);
        coalesce_defense_aliases(&mut t);
        assert_eq!(t.get(0, "Tkl+Int"), Some(&Value::Int(5)));
    }
}
