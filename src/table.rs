//! A small row-oriented table used by the ingest/extract pipeline.
//!
//! Raw CSV exports arrive with wildly varying column sets per stat type and
//! per season, so everything here is tolerant of missing columns: cells are
//! `Option<Value>`, concatenation is "diagonal" (absent columns become null),
//! and joins are full outer joins that never drop rows.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.is_finite() => Some(*v as i64),
            Value::Float(_) => None,
            Value::Str(s) => s.trim().parse::<i64>().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

pub type Cell = Option<Value>;

/// Total order over cells: null first, then numbers, then strings.
pub fn cmp_cells(a: &Cell, b: &Cell) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => {
            if x.is_numeric() && y.is_numeric() {
                let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            } else {
                match (x, y) {
                    (Value::Str(x), Value::Str(y)) => x.cmp(y),
                    // Numbers sort before strings.
                    (Value::Str(_), _) => Ordering::Greater,
                    (_, Value::Str(_)) => Ordering::Less,
                    _ => Ordering::Equal,
                }
            }
        }
    }
}

/// Appends a canonical encoding of `cell` to `out`, for use as a hash or
/// join key. Integral floats encode identically to ints so that a column
/// inferred as Float in one file still matches the Int form from another.
fn push_cell_key(cell: &Cell, out: &mut String) {
    match cell {
        None => out.push('\u{0}'),
        Some(Value::Int(v)) => {
            out.push('i');
            out.push_str(&v.to_string());
        }
        Some(Value::Float(v)) => {
            if v.fract() == 0.0 && v.is_finite() && v.abs() < 9.0e15 {
                out.push('i');
                out.push_str(&(*v as i64).to_string());
            } else {
                out.push('f');
                out.push_str(&v.to_bits().to_string());
            }
        }
        Some(Value::Str(s)) => {
            out.push('s');
            out.push_str(s);
        }
    }
    out.push('\u{1}');
}

fn row_key(row: &[Cell], indices: &[usize]) -> String {
    let mut key = String::new();
    for &i in indices {
        push_cell_key(&row[i], &mut key);
    }
    key
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: Vec<S>) -> Table {
        Table {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    /// Reads a CSV file, inferring one of Int/Float/Str per column from the
    /// non-empty cells. Empty cells become null.
    pub fn read_csv(path: &Path) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("open csv {}", path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("read csv header {}", path.display()))?
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();
        let width = headers.len();

        let mut raw: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("read csv row {}", path.display()))?;
            let mut row = record.iter().map(|v| v.to_string()).collect::<Vec<_>>();
            row.resize(width, String::new());
            row.truncate(width);
            raw.push(row);
        }

        let mut all_int = vec![true; width];
        let mut all_float = vec![true; width];
        for row in &raw {
            for (i, cell) in row.iter().enumerate() {
                let cell = cell.trim();
                if cell.is_empty() {
                    continue;
                }
                if all_int[i] && cell.parse::<i64>().is_err() {
                    all_int[i] = false;
                }
                if all_float[i] && cell.parse::<f64>().is_err() {
                    all_float[i] = false;
                }
            }
        }

        let mut table = Table::new(headers);
        for row in raw {
            let cells = row
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let cell = cell.trim();
                    if cell.is_empty() {
                        None
                    } else if all_int[i] {
                        cell.parse::<i64>().ok().map(Value::Int)
                    } else if all_float[i] {
                        cell.parse::<f64>().ok().map(Value::Float)
                    } else {
                        Some(Value::Str(cell.to_string()))
                    }
                })
                .collect();
            table.push_row(cells);
        }
        Ok(table)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("create csv {}", path.display()))?;
        writer
            .write_record(&self.columns)
            .context("write csv header")?;
        for row in &self.rows {
            let record = row
                .iter()
                .map(|cell| cell.as_ref().map(|v| v.to_string()).unwrap_or_default())
                .collect::<Vec<_>>();
            writer.write_record(&record).context("write csv row")?;
        }
        writer.flush().context("flush csv")?;
        Ok(())
    }

    /// Full rewrite with atomic visibility: write a sibling tmp file, then
    /// rename over the target.
    pub fn write_csv_atomic(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("csv.tmp");
        self.write_csv(&tmp)?;
        fs::rename(&tmp, path)
            .with_context(|| format!("swap csv into {}", path.display()))?;
        Ok(())
    }

    pub fn select(&self, names: &[&str]) -> Result<Table> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| anyhow!("column {name} not found"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.select_indices(names, &indices))
    }

    /// Like `select`, silently skipping columns the table does not have.
    pub fn select_existing(&self, names: &[&str]) -> Table {
        let mut keep_names = Vec::new();
        let mut indices = Vec::new();
        for name in names {
            if let Some(idx) = self.column_index(name) {
                keep_names.push(*name);
                indices.push(idx);
            }
        }
        self.select_indices(&keep_names, &indices)
    }

    fn select_indices(&self, names: &[&str], indices: &[usize]) -> Table {
        let mut out = Table::new(names.to_vec());
        for row in &self.rows {
            out.push_row(indices.iter().map(|&i| row[i].clone()).collect());
        }
        out
    }

    pub fn drop_columns(&mut self, names: &[&str]) {
        let drop: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        if drop.is_empty() {
            return;
        }
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|i| !drop.contains(i))
            .collect();
        self.columns = keep.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = keep.iter().map(|&i| row[i].clone()).collect();
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
    }

    /// Sets every cell of `name` to `value`, appending the column if absent.
    pub fn set_const_column(&mut self, name: &str, value: Cell) {
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.clone();
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
    }

    /// Replaces the cells of `name` with `values`, appending if absent.
    /// `values` must match the table height.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(anyhow!(
                "column {name}: {} values for {} rows",
                values.len(),
                self.rows.len()
            ));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    pub fn map_column(&mut self, name: &str, f: impl Fn(Cell) -> Cell) {
        if let Some(idx) = self.column_index(name) {
            for row in &mut self.rows {
                row[idx] = f(row[idx].take());
            }
        }
    }

    pub fn retain_rows(&mut self, mut pred: impl FnMut(&[Cell]) -> bool) {
        self.rows.retain(|row| pred(row));
    }

    /// Drops exact-duplicate rows, keeping the first occurrence.
    pub fn unique(&self) -> Table {
        let all: Vec<usize> = (0..self.columns.len()).collect();
        let mut seen = HashSet::new();
        let mut out = Table::new(self.columns.clone());
        for row in &self.rows {
            if seen.insert(row_key(row, &all)) {
                out.rows.push(row.clone());
            }
        }
        out
    }

    /// Stable multi-column sort. Columns the table lacks are ignored.
    pub fn sort_by(&mut self, names: &[&str]) {
        let indices: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        if indices.is_empty() {
            return;
        }
        self.rows.sort_by(|a, b| {
            for &i in &indices {
                let ord = cmp_cells(&a[i], &b[i]);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    /// Concatenates tables over the union of their columns; cells for columns
    /// a table lacks become null.
    pub fn concat_diagonal(tables: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for col in &table.columns {
                if !columns.contains(col) {
                    columns.push(col.clone());
                }
            }
        }
        let mut out = Table::new(columns);
        for table in tables {
            let mapping: Vec<Option<usize>> = out
                .columns
                .iter()
                .map(|c| table.column_index(c))
                .collect();
            for row in table.rows {
                out.rows.push(
                    mapping
                        .iter()
                        .map(|idx| idx.and_then(|i| row[i].clone()))
                        .collect(),
                );
            }
        }
        out
    }

    /// Full outer join on `keys`, which must exist in both tables. Key
    /// columns are coalesced into one; other right-hand columns already
    /// present on the left are dropped (left wins). Rows whose key contains a
    /// null never match, mirroring the usual dataframe join semantics, but
    /// they are still carried through to the output.
    pub fn outer_join(&self, right: &Table, keys: &[&str]) -> Result<Table> {
        self.join(right, keys, true)
    }

    /// Left join on `keys`: every left row appears, matched right columns are
    /// appended, unmatched right rows are discarded.
    pub fn left_join(&self, right: &Table, keys: &[&str]) -> Result<Table> {
        self.join(right, keys, false)
    }

    fn join(&self, right: &Table, keys: &[&str], keep_unmatched_right: bool) -> Result<Table> {
        let left_key_idx = keys
            .iter()
            .map(|k| {
                self.column_index(k)
                    .ok_or_else(|| anyhow!("join key {k} missing from left table"))
            })
            .collect::<Result<Vec<_>>>()?;
        let right_key_idx = keys
            .iter()
            .map(|k| {
                right
                    .column_index(k)
                    .ok_or_else(|| anyhow!("join key {k} missing from right table"))
            })
            .collect::<Result<Vec<_>>>()?;

        let extra: Vec<usize> = (0..right.columns.len())
            .filter(|&i| {
                !right_key_idx.contains(&i) && !self.has_column(&right.columns[i])
            })
            .collect();

        let mut out_columns = self.columns.clone();
        out_columns.extend(extra.iter().map(|&i| right.columns[i].clone()));
        let mut out = Table::new(out_columns);

        let mut lookup: HashMap<String, Vec<usize>> = HashMap::new();
        for (ri, row) in right.rows.iter().enumerate() {
            if right_key_idx.iter().any(|&i| row[i].is_none()) {
                continue;
            }
            lookup
                .entry(row_key(row, &right_key_idx))
                .or_default()
                .push(ri);
        }

        let mut matched_right = vec![false; right.rows.len()];
        for row in &self.rows {
            let matches = if left_key_idx.iter().any(|&i| row[i].is_none()) {
                None
            } else {
                lookup.get(&row_key(row, &left_key_idx))
            };
            match matches {
                Some(indices) => {
                    for &ri in indices {
                        matched_right[ri] = true;
                        let mut cells = row.clone();
                        cells.extend(extra.iter().map(|&i| right.rows[ri][i].clone()));
                        out.rows.push(cells);
                    }
                }
                None => {
                    let mut cells = row.clone();
                    cells.extend(extra.iter().map(|_| None));
                    out.rows.push(cells);
                }
            }
        }

        if keep_unmatched_right {
            for (ri, row) in right.rows.iter().enumerate() {
                if matched_right[ri] {
                    continue;
                }
                let mut cells: Vec<Cell> = vec![None; self.columns.len()];
                for (pos, &left_idx) in left_key_idx.iter().enumerate() {
                    cells[left_idx] = row[right_key_idx[pos]].clone();
                }
                cells.extend(extra.iter().map(|&i| row[i].clone()));
                out.rows.push(cells);
            }
        }

        Ok(out)
    }

    /// Collapses rows sharing `group_keys` to one row, taking the per-column
    /// maximum over non-null cells. Group order follows first appearance.
    pub fn group_max(&self, group_keys: &[&str]) -> Table {
        let key_idx: Vec<usize> = group_keys
            .iter()
            .filter_map(|k| self.column_index(k))
            .collect();
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Cell>> = HashMap::new();
        for row in &self.rows {
            let key = row_key(row, &key_idx);
            match groups.get_mut(&key) {
                Some(acc) => {
                    for (i, cell) in row.iter().enumerate() {
                        if key_idx.contains(&i) {
                            continue;
                        }
                        if cmp_cells(cell, &acc[i]) == Ordering::Greater {
                            acc[i] = cell.clone();
                        }
                    }
                }
                None => {
                    order.push(key.clone());
                    groups.insert(key, row.clone());
                }
            }
        }
        let mut out = Table::new(self.columns.clone());
        for key in order {
            if let Some(row) = groups.remove(&key) {
                out.rows.push(row);
            }
        }
        out
    }

    /// Splits into sub-tables by distinct values of `names`, preserving
    /// first-appearance order of the partitions.
    pub fn partition_by(&self, names: &[&str]) -> Vec<(Vec<Cell>, Table)> {
        let indices: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        let mut order: Vec<String> = Vec::new();
        let mut parts: HashMap<String, (Vec<Cell>, Table)> = HashMap::new();
        for row in &self.rows {
            let key = row_key(row, &indices);
            let entry = parts.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                let cells = indices.iter().map(|&i| row[i].clone()).collect();
                (cells, Table::new(self.columns.clone()))
            });
            entry.1.rows.push(row.clone());
        }
        order
            .into_iter()
            .filter_map(|key| parts.remove(&key))
            .collect()
    }

    /// Distinct non-null string values of one column.
    pub fn string_set(&self, name: &str) -> HashSet<String> {
        let mut out = HashSet::new();
        if let Some(idx) = self.column_index(name) {
            for row in &self.rows {
                if let Some(Value::Str(s)) = &row[idx] {
                    out.insert(s.clone());
                }
            }
        }
        out
    }
}
