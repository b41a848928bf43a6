use chrono::Utc;
use std::fs;
use tracebase::table_file::{load_baseline, load_table, save_baseline, save_table};
use tracebase::{Baseline, Record, RecordError, RecordType, TableData, TableFileError};

fn sample_baseline() -> Baseline {
    let pump = Record::create(RecordType::Item, [("name", "Pump, main"), ("color", "red")]);
    let quoted = Record::create(RecordType::Item, [("name", "The \"spare\" pump")]);
    let mass = Record::create(RecordType::Budget, [("name", "Mass"), ("unit", "kg")]);
    let allocation = Record::builder(RecordType::BudgetAllocation)
        .set("amount", "12.5")
        .container(Some(mass.id()))
        .view_of(Some(pump.id()))
        .build(Utc::now());
    Baseline::from_records([pump, quoted, mass, allocation])
}

#[test]
fn test_baseline_directory_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = sample_baseline();

    save_baseline(dir.path(), &baseline).unwrap();
    for record_type in RecordType::ALL {
        assert!(dir.path().join(record_type.file_name()).exists());
    }
    assert_eq!(load_baseline(dir.path()).unwrap(), baseline);
}

#[test]
fn test_saved_file_is_sorted_and_quoted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.csv");
    let baseline = sample_baseline();
    let table = TableData::from_records(baseline.find_by_type(RecordType::Item));

    save_table(&path, &table).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("\"color\",\"name\",\"uuid\""));
    assert_eq!(lines.count(), 2);
    assert!(text.contains("\"Pump, main\""));
    assert!(text.contains("\"The \"\"spare\"\" pump\""));
    assert_eq!(load_table(&path).unwrap(), table);
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_table(dir.path().join("nope.csv"));
    assert!(matches!(result, Err(TableFileError::Io(_))));
}

#[test]
fn test_bad_reference_is_a_record_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("itemViews.csv");
    fs::write(
        &path,
        format!("\"uuid\",\"viewOf\",\"x\"\n\"{}\",\"not-an-id\",\"3\"\n", uuid::Uuid::new_v4()),
    )
    .unwrap();

    let table = load_table(&path).unwrap();
    assert!(matches!(
        table.into_records(RecordType::ItemView),
        Err(TableFileError::Record(_))
    ));
    assert!(load_baseline(dir.path()).is_err());
}

#[test]
fn test_identifier_shared_across_tables_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let id = "00000000-0000-0000-0000-000000000001";
    fs::write(
        dir.path().join(RecordType::Item.file_name()),
        format!("\"name\",\"uuid\"\n\"Pump\",\"{}\"\n", id),
    )
    .unwrap();
    fs::write(
        dir.path().join(RecordType::Budget.file_name()),
        format!("\"name\",\"uuid\"\n\"Mass\",\"{}\"\n", id),
    )
    .unwrap();

    match load_baseline(dir.path()) {
        Err(TableFileError::Record(RecordError::ConflictingType { id: clash, .. })) => {
            assert_eq!(clash.to_string(), id)
        }
        other => panic!("expected a type conflict, got {:?}", other),
    }
}
