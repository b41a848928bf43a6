//! Three-way structural merge of table files
//!
//! Rows are joined on the `uuid` column, never on position. The merge is
//! total: every combination of presence and change has one resolution and
//! the left side wins any tie.

use crate::baseline::Baseline;
use crate::record::{Record, UUID_FIELD};
use crate::table::Table;
use crate::table_file::{Row, TableData};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

fn index(table: &TableData) -> BTreeMap<&str, &Row> {
    table
        .rows()
        .iter()
        .map(|row| (TableData::row_id(row), row))
        .collect()
}

fn value<'a>(row: &'a Row, field: &str) -> &'a str {
    row.get(field).map(String::as_str).unwrap_or("")
}

/// Field-level merge of a row present in the ancestor and on both sides
fn merge_fields(header: &[String], ancestor: &Row, left: &Row, right: &Row) -> Row {
    header
        .iter()
        .filter_map(|field| {
            let (a, l, r) = (value(ancestor, field), value(left, field), value(right, field));
            let merged = if l != a { l } else { r };
            (!merged.is_empty()).then(|| (field.clone(), merged.to_string()))
        })
        .collect()
}

/// One row from two rows that are new on both sides and differ
fn collapse(
    table: Option<&dyn Table>,
    timestamp: DateTime<Utc>,
    left: &Row,
    right: &Row,
) -> Row {
    if let Some(table) = table {
        let record_type = table.record_type();
        match (
            Record::from_fields(record_type, left),
            Record::from_fields(record_type, right),
        ) {
            (Ok(l), Ok(r)) => {
                return table
                    .merge(&Baseline::new(), timestamp, &l, &r)
                    .get_all_fields();
            }
            (Err(e), _) | (_, Err(e)) => {
                log::debug!("falling back to field union for {}: {}", TableData::row_id(left), e);
            }
        }
    }
    let mut merged = left.clone();
    for (field, value) in right {
        merged.entry(field.clone()).or_insert_with(|| value.clone());
    }
    merged
}

/// Merge `left` and `right`, both edited from `ancestor`
///
/// `table` supplies the collapse function for rows that are new on both
/// sides under one identifier and differ.
pub fn merge_tables(
    ancestor: &TableData,
    left: &TableData,
    right: &TableData,
    table: Option<&dyn Table>,
    timestamp: DateTime<Utc>,
) -> TableData {
    let header: Vec<String> = TableData::new(
        ancestor
            .header()
            .iter()
            .chain(left.header())
            .chain(right.header())
            .cloned(),
        Vec::new(),
    )
    .header()
    .to_vec();

    let (left_rows, right_rows) = (index(left), index(right));
    let mut rows: Vec<Row> = Vec::new();
    let mut done: HashSet<&str> = HashSet::new();

    for base in ancestor.rows() {
        let id = TableData::row_id(base);
        done.insert(id);
        match (left_rows.get(id), right_rows.get(id)) {
            (Some(l), Some(r)) => rows.push(merge_fields(&header, base, l, r)),
            _ => log::debug!("{} deleted on at least one side", id),
        }
    }

    for row in left.rows() {
        let id = TableData::row_id(row);
        if !done.insert(id) {
            continue;
        }
        match right_rows.get(id) {
            Some(other) if *other == row => rows.push(row.clone()),
            Some(other) => {
                log::debug!("{} added on both sides with different values", id);
                rows.push(collapse(table, timestamp, row, other));
            }
            None => rows.push(row.clone()),
        }
    }

    for row in right.rows() {
        if done.insert(TableData::row_id(row)) {
            rows.push(row.clone());
        }
    }

    debug_assert!(rows.iter().all(|row| row.contains_key(UUID_FIELD)));
    TableData::new(header, rows)
}
