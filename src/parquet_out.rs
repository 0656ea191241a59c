//! Columnar extract I/O. Tables go out as parquet with one optional
//! INT64/DOUBLE/UTF8 column per table column, written to a tmp file and
//! renamed into place.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parquet::basic::{ConvertedType, Repetition, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::Field;
use parquet::schema::types::{Type, TypePtr};

use crate::table::{Table, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColKind {
    Int,
    Float,
    Str,
}

/// Narrowest physical type that holds every non-null cell of the column.
fn column_kind(table: &Table, idx: usize) -> ColKind {
    let mut kind = ColKind::Int;
    for row in table.rows() {
        match &row[idx] {
            None | Some(Value::Int(_)) => {}
            Some(Value::Float(_)) => {
                if kind == ColKind::Int {
                    kind = ColKind::Float;
                }
            }
            Some(Value::Str(_)) => return ColKind::Str,
        }
    }
    kind
}

fn build_schema(table: &Table, kinds: &[ColKind]) -> Result<TypePtr> {
    let mut fields: Vec<TypePtr> = Vec::with_capacity(table.columns().len());
    for (name, kind) in table.columns().iter().zip(kinds) {
        let builder = match kind {
            ColKind::Int => Type::primitive_type_builder(name, PhysicalType::INT64),
            ColKind::Float => Type::primitive_type_builder(name, PhysicalType::DOUBLE),
            ColKind::Str => Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
                .with_converted_type(ConvertedType::UTF8),
        };
        let field = builder
            .with_repetition(Repetition::OPTIONAL)
            .build()
            .with_context(|| format!("parquet field {name}"))?;
        fields.push(Arc::new(field));
    }
    let schema = Type::group_type_builder("schema")
        .with_fields(fields)
        .build()
        .context("parquet schema")?;
    Ok(Arc::new(schema))
}

pub fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let kinds: Vec<ColKind> = (0..table.columns().len())
        .map(|i| column_kind(table, i))
        .collect();
    let schema = build_schema(table, &kinds)?;

    let tmp = path.with_extension("parquet.tmp");
    let file =
        fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    let props = Arc::new(WriterProperties::builder().build());
    let mut writer = SerializedFileWriter::new(file, schema, props)
        .with_context(|| format!("open parquet writer {}", tmp.display()))?;

    let mut row_group = writer.next_row_group().context("start row group")?;
    let mut idx = 0usize;
    while let Some(mut col) = row_group.next_column().context("next column")? {
        let def_levels: Vec<i16> = table
            .rows()
            .iter()
            .map(|row| i16::from(row[idx].is_some()))
            .collect();
        match kinds[idx] {
            ColKind::Int => {
                let values: Vec<i64> = table
                    .rows()
                    .iter()
                    .filter_map(|row| row[idx].as_ref().and_then(Value::as_i64))
                    .collect();
                col.typed::<Int64Type>()
                    .write_batch(&values, Some(&def_levels), None)
                    .context("write int column")?;
            }
            ColKind::Float => {
                let values: Vec<f64> = table
                    .rows()
                    .iter()
                    .filter_map(|row| row[idx].as_ref().and_then(Value::as_f64))
                    .collect();
                col.typed::<DoubleType>()
                    .write_batch(&values, Some(&def_levels), None)
                    .context("write float column")?;
            }
            ColKind::Str => {
                let values: Vec<ByteArray> = table
                    .rows()
                    .iter()
                    .filter_map(|row| row[idx].as_ref())
                    .map(|v| ByteArray::from(v.to_string().into_bytes()))
                    .collect();
                col.typed::<ByteArrayType>()
                    .write_batch(&values, Some(&def_levels), None)
                    .context("write string column")?;
            }
        }
        col.close().context("close column")?;
        idx += 1;
    }
    row_group.close().context("close row group")?;
    writer.close().context("close parquet writer")?;

    fs::rename(&tmp, path)
        .with_context(|| format!("swap parquet into {}", path.display()))?;
    Ok(())
}

fn field_to_cell(field: &Field) -> Option<Value> {
    match field {
        Field::Null => None,
        Field::Bool(b) => Some(Value::Int(i64::from(*b))),
        Field::Byte(v) => Some(Value::Int(i64::from(*v))),
        Field::Short(v) => Some(Value::Int(i64::from(*v))),
        Field::Int(v) => Some(Value::Int(i64::from(*v))),
        Field::Long(v) => Some(Value::Int(*v)),
        Field::UByte(v) => Some(Value::Int(i64::from(*v))),
        Field::UShort(v) => Some(Value::Int(i64::from(*v))),
        Field::UInt(v) => Some(Value::Int(i64::from(*v))),
        Field::ULong(v) => Some(Value::Int(*v as i64)),
        Field::Float(v) => Some(Value::Float(f64::from(*v))),
        Field::Double(v) => Some(Value::Float(*v)),
        Field::Str(s) => Some(Value::Str(s.clone())),
        Field::Bytes(b) => Some(Value::Str(String::from_utf8_lossy(b.data()).into_owned())),
        _ => None,
    }
}

pub fn read_parquet(path: &Path) -> Result<Table> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file)
        .with_context(|| format!("open parquet {}", path.display()))?;

    let columns: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema()
        .get_fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    let mut table = Table::new(columns);

    let rows = reader
        .get_row_iter(None)
        .with_context(|| format!("iterate parquet {}", path.display()))?;
    for row in rows {
        let row = row.with_context(|| format!("read parquet row {}", path.display()))?;
        table.push_row(row.get_column_iter().map(|(_, f)| field_to_cell(f)).collect());
    }
    Ok(table)
}
