//! Immutable versioned records
//!
//! A [`Record`] is a typed value with a stable identifier, a sorted map of
//! opaque text fields and three reserved references (`trace`, `container`,
//! `viewOf`). Records are never edited in place: [`Record::as_builder`]
//! produces a replacement that shares the identifier.

use crate::error::RecordError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Stable identifier for every record
pub type RecordId = Uuid;

pub const UUID_FIELD: &str = "uuid";
pub const TRACE_FIELD: &str = "trace";
pub const CONTAINER_FIELD: &str = "container";
pub const VIEW_OF_FIELD: &str = "viewOf";
pub const LAST_CHANGE_FIELD: &str = "lastChange";

/// One variant per logical table
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// The system of interest described by a baseline
    Identity,
    Item,
    /// Placement of an item on a drawing
    ItemView,
    Function,
    FlowType,
    Budget,
    /// Share of a budget given to one item
    BudgetAllocation,
}

impl RecordType {
    /// All record types, in the order auto-fixes run
    pub const ALL: [RecordType; 7] = [
        RecordType::Identity,
        RecordType::Item,
        RecordType::ItemView,
        RecordType::Function,
        RecordType::FlowType,
        RecordType::Budget,
        RecordType::BudgetAllocation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RecordType::Identity => "Identity",
            RecordType::Item => "Item",
            RecordType::ItemView => "ItemView",
            RecordType::Function => "Function",
            RecordType::FlowType => "FlowType",
            RecordType::Budget => "Budget",
            RecordType::BudgetAllocation => "BudgetAllocation",
        }
    }

    /// File name of the serialized table for this type
    pub fn file_name(self) -> &'static str {
        match self {
            RecordType::Identity => "identity.csv",
            RecordType::Item => "items.csv",
            RecordType::ItemView => "itemViews.csv",
            RecordType::Function => "functions.csv",
            RecordType::FlowType => "flowTypes.csv",
            RecordType::Budget => "budgets.csv",
            RecordType::BudgetAllocation => "budgetAllocations.csv",
        }
    }

    /// Parse either a type name (`Budget`) or a table file name (`budgets.csv`)
    pub fn from_name(name: &str) -> Result<Self, RecordError> {
        RecordType::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name) || t.file_name() == name)
            .ok_or_else(|| RecordError::UnknownType(name.to_string()))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which reserved reference a link travels through
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefField {
    Trace,
    Container,
    ViewOf,
}

impl RefField {
    pub const ALL: [RefField; 3] = [RefField::Trace, RefField::Container, RefField::ViewOf];

    pub fn field_name(self) -> &'static str {
        match self {
            RefField::Trace => TRACE_FIELD,
            RefField::Container => CONTAINER_FIELD,
            RefField::ViewOf => VIEW_OF_FIELD,
        }
    }

    fn from_field_name(name: &str) -> Option<Self> {
        RefField::ALL.iter().copied().find(|r| r.field_name() == name)
    }
}

fn is_reserved(field: &str) -> bool {
    field == UUID_FIELD || field == LAST_CHANGE_FIELD || RefField::from_field_name(field).is_some()
}

/// An immutable typed record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    id: RecordId,
    record_type: RecordType,
    trace: Option<RecordId>,
    container: Option<RecordId>,
    view_of: Option<RecordId>,
    /// Never holds empty values; an empty value means absent
    fields: BTreeMap<String, String>,
}

impl Record {
    /// Create a record with a fresh identifier and the given plain fields
    pub fn create<K, V>(record_type: RecordType, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::with_id(Uuid::new_v4(), record_type, fields)
    }

    /// Create a record with a caller-provided identifier
    ///
    /// Used by import and restore paths where identity already exists.
    pub fn with_id<K, V>(
        id: RecordId,
        record_type: RecordType,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut record = Record {
            id,
            record_type,
            trace: None,
            container: None,
            view_of: None,
            fields: BTreeMap::new(),
        };
        for (key, value) in fields {
            let key = key.into();
            assert_plain_field(&key);
            let value = value.into();
            if !value.is_empty() {
                record.fields.insert(key, value);
            }
        }
        record
    }

    /// Start a brand-new record of the given type
    pub fn builder(record_type: RecordType) -> RecordBuilder {
        Self::builder_with_id(Uuid::new_v4(), record_type)
    }

    /// Start a brand-new record whose identifier was chosen in advance
    pub fn builder_with_id(id: RecordId, record_type: RecordType) -> RecordBuilder {
        RecordBuilder {
            original: None,
            next: Self::with_id(id, record_type, Vec::<(String, String)>::new()),
        }
    }

    /// Rebuild a record from a serialized field map (the inverse of [`Record::get_all_fields`])
    pub fn from_fields(
        record_type: RecordType,
        fields: &BTreeMap<String, String>,
    ) -> Result<Self, RecordError> {
        let id_text = fields.get(UUID_FIELD).map(String::as_str).unwrap_or("");
        let id = Uuid::parse_str(id_text)
            .map_err(|_| RecordError::InvalidIdentifier(id_text.to_string()))?;

        let mut record = Self::with_id(id, record_type, Vec::<(String, String)>::new());
        for (key, value) in fields {
            if value.is_empty() || key == UUID_FIELD {
                continue;
            }
            match RefField::from_field_name(key) {
                Some(ref_field) => {
                    let target =
                        Uuid::parse_str(value).map_err(|_| RecordError::InvalidReference {
                            field: key.clone(),
                            value: value.clone(),
                        })?;
                    record.set_reference(ref_field, Some(target));
                }
                None => {
                    record.fields.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(record)
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn trace(&self) -> Option<RecordId> {
        self.trace
    }

    pub fn container(&self) -> Option<RecordId> {
        self.container
    }

    pub fn view_of(&self) -> Option<RecordId> {
        self.view_of
    }

    pub fn reference(&self, field: RefField) -> Option<RecordId> {
        match field {
            RefField::Trace => self.trace,
            RefField::Container => self.container,
            RefField::ViewOf => self.view_of,
        }
    }

    /// All present references with the field they travel through
    pub fn references(&self) -> impl Iterator<Item = (RefField, RecordId)> + '_ {
        RefField::ALL
            .iter()
            .filter_map(move |f| self.reference(*f).map(|id| (*f, id)))
    }

    /// A plain field value, `None` when absent
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Plain fields the caller may set, excluding `lastChange`
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.fields
            .iter()
            .filter(|(k, _)| k.as_str() != LAST_CHANGE_FIELD)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// A plain field value, empty when absent
    pub fn get_or_empty(&self, field: &str) -> &str {
        self.get(field).unwrap_or("")
    }

    /// Text of any field, including the identifier and references
    ///
    /// Used for uniqueness keys that mix plain fields and references.
    pub fn key_value(&self, field: &str) -> String {
        if field == UUID_FIELD {
            return self.id.to_string();
        }
        match RefField::from_field_name(field) {
            Some(ref_field) => self
                .reference(ref_field)
                .map(|id| id.to_string())
                .unwrap_or_default(),
            None => self.get_or_empty(field).to_string(),
        }
    }

    /// Time of the last [`RecordBuilder::build`] that changed this record
    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        self.get(LAST_CHANGE_FIELD)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Every field, sorted by name, ready for serialization
    pub fn get_all_fields(&self) -> BTreeMap<String, String> {
        let mut all = self.fields.clone();
        all.insert(UUID_FIELD.to_string(), self.id.to_string());
        for (ref_field, target) in self.references() {
            all.insert(ref_field.field_name().to_string(), target.to_string());
        }
        all
    }

    /// Start a copy-on-write update of this record
    pub fn as_builder(&self) -> RecordBuilder {
        RecordBuilder {
            original: Some(self.clone()),
            next: self.clone(),
        }
    }

    fn set_reference(&mut self, field: RefField, target: Option<RecordId>) {
        match field {
            RefField::Trace => self.trace = target,
            RefField::Container => self.container = target,
            RefField::ViewOf => self.view_of = target,
        }
    }
}

fn assert_plain_field(field: &str) {
    assert!(
        !is_reserved(field),
        "field `{field}` is reserved and cannot be set as a plain field"
    );
}

/// Copy-on-write builder returned by [`Record::as_builder`] and [`Record::builder`]
#[derive(Clone, Debug)]
pub struct RecordBuilder {
    original: Option<Record>,
    next: Record,
}

impl RecordBuilder {
    /// Set a plain field. An empty value removes the field.
    ///
    /// # Panics
    /// When `field` is one of the reserved names.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        let field = field.into();
        assert_plain_field(&field);
        let value = value.into();
        if value.is_empty() {
            self.next.fields.remove(&field);
        } else {
            self.next.fields.insert(field, value);
        }
        self
    }

    pub fn remove(self, field: impl Into<String>) -> Self {
        self.set(field, "")
    }

    pub fn trace(mut self, target: Option<RecordId>) -> Self {
        self.next.set_reference(RefField::Trace, target);
        self
    }

    pub fn container(mut self, target: Option<RecordId>) -> Self {
        self.next.set_reference(RefField::Container, target);
        self
    }

    pub fn view_of(mut self, target: Option<RecordId>) -> Self {
        self.next.set_reference(RefField::ViewOf, target);
        self
    }

    pub fn reference(mut self, field: RefField, target: Option<RecordId>) -> Self {
        self.next.set_reference(field, target);
        self
    }

    /// Identifier the built record will carry
    pub fn id(&self) -> RecordId {
        self.next.id
    }

    /// Produce the record, stamping `lastChange` when anything changed
    ///
    /// A builder with no effective change returns the original untouched,
    /// which keeps repeated repairs from producing new versions.
    pub fn build(self, timestamp: DateTime<Utc>) -> Record {
        if let Some(original) = self.original {
            if original == self.next {
                return original;
            }
        }
        let mut record = self.next;
        record.fields.insert(
            LAST_CHANGE_FIELD.to_string(),
            timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        record
    }
}
