use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::types::{ColumnSchema, ColumnType, DataTable};

/// Identifier column always reported as `int`.
pub const RESERVED_ID_COLUMN: &str = "tmo_id";
/// Hierarchy-name column always reported as `str`.
pub const RESERVED_HIERARCHY_COLUMN: &str = "parent_name";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d", "%Y%m%d"];

/// Lenient datetime parse used by type inference and the incremental window.
/// Accepts RFC 3339, common date-time layouts and bare dates (midnight).
pub fn parse_datetime_lenient(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.and_hms_opt(0, 0, 0).expect("midnight is always valid"));
        }
    }
    None
}

/// Classify one column of sampled string cells.
///
/// Empty cells are ignored; a column with no populated cells is `str`. There
/// is no partial promotion: a single cell that breaks the current rung drops
/// the whole column to the next one, down to `str`.
pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let cells: Vec<&str> = values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    if cells.is_empty() {
        return ColumnType::Str;
    }

    if cells.iter().all(|v| v.parse::<i64>().is_ok()) {
        return ColumnType::Int;
    }
    if cells.iter().all(|v| v.parse::<f64>().is_ok()) {
        return ColumnType::Float;
    }
    if cells
        .iter()
        .all(|v| v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false"))
    {
        return ColumnType::Bool;
    }
    if cells.iter().all(|v| parse_datetime_lenient(v).is_some()) {
        return ColumnType::Datetime;
    }

    ColumnType::Str
}

/// Infer a typed schema from a sampled table.
///
/// Columns outside the allow-list (when supplied) are dropped from the
/// result; reserved columns are forced to their fixed types afterwards, when
/// present.
pub fn infer_schema(table: &DataTable, allow: Option<&[String]>) -> ColumnSchema {
    let mut schema = ColumnSchema::new();

    for (index, name) in table.columns.iter().enumerate() {
        let cells = table
            .rows
            .iter()
            .filter_map(|row| row.get(index).and_then(|c| c.as_deref()));
        schema.insert(name.clone(), infer_column_type(cells));
    }

    if let Some(allow) = allow {
        if !allow.is_empty() {
            schema.retain(|name, _| allow.iter().any(|a| a == name));
        }
    }

    force_reserved_columns(&mut schema);
    schema
}

/// Force the reserved columns to their fixed types, when present.
pub fn force_reserved_columns(schema: &mut ColumnSchema) {
    if let Some(tag) = schema.get_mut(RESERVED_ID_COLUMN) {
        *tag = ColumnType::Int;
    }
    if let Some(tag) = schema.get_mut(RESERVED_HIERARCHY_COLUMN) {
        *tag = ColumnType::Str;
    }
}
