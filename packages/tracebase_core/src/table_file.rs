//! CSV serialization of one table
//!
//! Every value is quoted. The header row lists the field names sorted
//! alphabetically and always includes `uuid`; each following row is one
//! record. Empty and missing values are equivalent.

use crate::baseline::Baseline;
use crate::error::TableFileError;
use crate::record::{Record, RecordType, UUID_FIELD};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub type Row = BTreeMap<String, String>;

/// Rows of one table file keyed by the `uuid` column
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableData {
    header: Vec<String>,
    /// Rows hold no empty values
    rows: Vec<Row>,
}

impl Default for TableData {
    fn default() -> Self {
        Self::new(Vec::<String>::new(), Vec::new())
    }
}

impl TableData {
    /// Build a table. The header becomes the sorted union of `header`,
    /// every row's fields and `uuid`.
    pub fn new<S: Into<String>>(header: impl IntoIterator<Item = S>, rows: Vec<Row>) -> Self {
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|row| row.into_iter().filter(|(_, v)| !v.is_empty()).collect())
            .collect();
        let mut fields: BTreeSet<String> = header.into_iter().map(Into::into).collect();
        fields.insert(UUID_FIELD.to_string());
        for row in &rows {
            fields.extend(row.keys().cloned());
        }
        Self {
            header: fields.into_iter().collect(),
            rows,
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Identifier of a row
    pub fn row_id(row: &Row) -> &str {
        row.get(UUID_FIELD).map(String::as_str).unwrap_or("")
    }

    pub fn row(&self, id: &str) -> Option<&Row> {
        self.rows.iter().find(|row| Self::row_id(row) == id)
    }

    pub fn parse(text: &str) -> Result<Self, TableFileError> {
        Self::read_from(text.as_bytes())
    }

    pub fn read_from(reader: impl Read) -> Result<Self, TableFileError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut header: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        let mut seen = HashSet::new();

        for record in reader.records() {
            let record = record?;
            if record.len() == 1 && record[0].trim().is_empty() {
                continue;
            }
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let columns = match &header {
                Some(columns) => columns,
                None => {
                    let columns: Vec<String> = record.iter().map(str::to_string).collect();
                    if !columns.iter().any(|c| c == UUID_FIELD) {
                        return Err(TableFileError::MissingIdentifierColumn);
                    }
                    header = Some(columns);
                    continue;
                }
            };
            if record.len() > columns.len() {
                return Err(TableFileError::RowTooWide { line });
            }

            let row: Row = columns
                .iter()
                .zip(record.iter())
                .filter(|(_, value)| !value.is_empty())
                .map(|(field, value)| (field.clone(), value.to_string()))
                .collect();
            let id = Self::row_id(&row);
            if id.is_empty() {
                return Err(TableFileError::MissingIdentifier { line });
            }
            if !seen.insert(id.to_string()) {
                log::warn!("duplicate identifier {} on line {}; keeping the first row", id, line);
                continue;
            }
            rows.push(row);
        }

        let header = header.ok_or(TableFileError::EmptyFile)?;
        Ok(Self::new(header, rows))
    }

    pub fn write_to(&self, writer: impl Write) -> Result<(), TableFileError> {
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(writer);
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(
                self.header
                    .iter()
                    .map(|field| row.get(field).map(String::as_str).unwrap_or("")),
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, TableFileError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        // Every value written came from a String
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Serialize records, sorted by identifier
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut rows: Vec<Row> = records.into_iter().map(Record::get_all_fields).collect();
        rows.sort_by(|a, b| Self::row_id(a).cmp(Self::row_id(b)));
        Self::new(Vec::<String>::new(), rows)
    }

    pub fn into_records(&self, record_type: RecordType) -> Result<Vec<Record>, TableFileError> {
        self.rows
            .iter()
            .map(|row| Record::from_fields(record_type, row).map_err(TableFileError::from))
            .collect()
    }
}

pub fn load_table(path: impl AsRef<Path>) -> Result<TableData, TableFileError> {
    let file = File::open(path.as_ref())?;
    TableData::read_from(BufReader::new(file))
}

pub fn save_table(path: impl AsRef<Path>, table: &TableData) -> Result<(), TableFileError> {
    let file = File::create(path.as_ref())?;
    table.write_to(BufWriter::new(file))
}

/// Write one file per record type into `dir`, named after the type
pub fn save_baseline(dir: impl AsRef<Path>, baseline: &Baseline) -> Result<(), TableFileError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    for record_type in RecordType::ALL {
        let table = TableData::from_records(baseline.find_by_type(record_type));
        save_table(dir.join(record_type.file_name()), &table)?;
    }
    Ok(())
}

/// Read every table file present in `dir`; absent files are empty tables
pub fn load_baseline(dir: impl AsRef<Path>) -> Result<Baseline, TableFileError> {
    let dir = dir.as_ref();
    let mut baseline = Baseline::new();
    for record_type in RecordType::ALL {
        let path = dir.join(record_type.file_name());
        if !path.exists() {
            log::debug!("no {} in {}", record_type.file_name(), dir.display());
            continue;
        }
        baseline = baseline.try_add_all(load_table(&path)?.into_records(record_type)?)?;
    }
    Ok(baseline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sorts_header_and_skips_blank_lines() {
        let table = TableData::parse("\"z\",\"uuid\",\"a\"\n\n\"1\",\"u1\",\"\"\n\n").unwrap();
        assert_eq!(table.header(), ["a", "uuid", "z"]);
        assert_eq!(table.len(), 1);
        let row = table.row("u1").unwrap();
        assert_eq!(row.get("z").map(String::as_str), Some("1"));
        assert!(!row.contains_key("a"));
    }

    #[test]
    fn test_every_value_is_quoted() {
        let table = TableData::parse("a,uuid\n,u1\n").unwrap();
        assert_eq!(table.to_csv_string().unwrap(), "\"a\",\"uuid\"\n\"\",\"u1\"\n");
    }

    #[test]
    fn test_malformed_files_are_rejected() {
        assert!(matches!(TableData::parse(""), Err(TableFileError::EmptyFile)));
        assert!(matches!(
            TableData::parse("a,b\n1,2\n"),
            Err(TableFileError::MissingIdentifierColumn)
        ));
        assert!(matches!(
            TableData::parse("a,uuid\n1,u1,extra\n"),
            Err(TableFileError::RowTooWide { line: 2 })
        ));
        assert!(matches!(
            TableData::parse("a,uuid\n1,u1\n2,\n"),
            Err(TableFileError::MissingIdentifier { line: 3 })
        ));
        assert!(matches!(
            TableData::parse("\"a\",\"uuid\"\n\"\",\"\"\n"),
            Err(TableFileError::MissingIdentifier { line: 2 })
        ));
    }

    #[test]
    fn test_duplicate_identifiers_keep_first_row() {
        let table = TableData::parse("a,uuid\nfirst,u1\nsecond,u1\n").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].get("a").map(String::as_str), Some("first"));
    }

    #[test]
    fn test_records_round_trip_sorted_by_id() {
        let a = Record::create(RecordType::Item, [("name", "Pump")]);
        let b = Record::create(RecordType::Item, [("name", "Valve"), ("color", "red")]);
        let table = TableData::from_records([&a, &b]);
        let ids: Vec<&str> = table.rows().iter().map(TableData::row_id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        let text = table.to_csv_string().unwrap();
        let records = TableData::parse(&text).unwrap().into_records(RecordType::Item).unwrap();
        let restored = Baseline::from_records(records);
        assert_eq!(restored, Baseline::from_records([a, b]));
    }
}
