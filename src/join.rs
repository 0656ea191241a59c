//! Combines per-stat-type tables for one entity level (team or player) into
//! a single wide table. Stat types are scraped independently and overlap in
//! arbitrary columns, so the fold drops the right-hand copy of any shared
//! stat column (earliest stat type wins) and the join itself is a full outer
//! join: a row present in any one stat type survives.

use anyhow::{Result, anyhow};

use crate::table::Table;

/// The join key set: the identity keys plus any match keys not already in
/// them, restricted to columns both sides actually have.
fn key_union<'a>(join_keys: &[&'a str], match_keys: &[&'a str]) -> Vec<&'a str> {
    let mut keys: Vec<&str> = join_keys.to_vec();
    for key in match_keys {
        if !keys.contains(key) {
            keys.push(key);
        }
    }
    keys
}

pub fn join_stat_tables(
    tables: Vec<Table>,
    join_keys: &[&str],
    match_keys: &[&str],
) -> Result<Table> {
    let keys = key_union(join_keys, match_keys);
    let mut iter = tables.into_iter();
    let mut acc = iter
        .next()
        .ok_or_else(|| anyhow!("no stat tables to join"))?;

    for right in iter {
        let overlap: Vec<String> = right
            .columns()
            .iter()
            .filter(|c| acc.has_column(c) && !keys.contains(&c.as_str()))
            .cloned()
            .collect();
        let overlap_refs: Vec<&str> = overlap.iter().map(String::as_str).collect();
        let mut right = right;
        right.drop_columns(&overlap_refs);
        let right = right.unique();

        let effective: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| acc.has_column(k) && right.has_column(k))
            .collect();
        if effective.is_empty() {
            return Err(anyhow!("stat tables share no join key columns"));
        }
        acc = acc.outer_join(&right, &effective)?;
    }
    Ok(acc)
}
