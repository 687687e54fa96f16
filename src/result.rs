//! Query results and normalization.
//!
//! The database collaborator reports its result as one of a small closed
//! set of variants instead of handing back driver-specific wrapper
//! objects. `normalize` is the single seam turning a result into the
//! plain serializable value that both cache-hit and cache-miss consumers
//! observe.

use serde_json::{Map, Value};

/// Result of a database operation, as reported by the collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// No matching row.
    Absent,
    /// An aggregate scalar (`min`, `max`, `sum`, `count`).
    Scalar(Value),
    /// A plain row set.
    Sequence(Vec<Value>),
    /// A single live record, possibly with eagerly loaded associations.
    Record(Record),
    /// A combined count-plus-rows result.
    Counted { count: u64, rows: Vec<Value> },
}

/// A single live row: attributes plus eagerly loaded associations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    attributes: Map<String, Value>,
    associations: Vec<(String, Association)>,
}

/// An eagerly loaded related record set.
#[derive(Debug, Clone, PartialEq)]
pub enum Association {
    One(Box<Record>),
    Many(Vec<Record>),
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute value.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Attach a single eagerly loaded related record.
    pub fn with_one(mut self, name: impl Into<String>, record: Record) -> Self {
        self.associations
            .push((name.into(), Association::One(Box::new(record))));
        self
    }

    /// Attach an eagerly loaded related record list.
    pub fn with_many(mut self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.associations
            .push((name.into(), Association::Many(records)));
        self
    }

    /// Flatten into a plain JSON object, associations included.
    pub fn into_plain(self) -> Value {
        let mut plain = self.attributes;
        for (name, association) in self.associations {
            let value = match association {
                Association::One(record) => record.into_plain(),
                Association::Many(records) => Value::Array(
                    records.into_iter().map(Record::into_plain).collect(),
                ),
            };
            plain.insert(name, value);
        }
        Value::Object(plain)
    }
}

/// Convert a query result into its plain, cacheable form.
pub fn normalize(result: QueryResult) -> Value {
    match result {
        QueryResult::Absent => Value::Null,
        QueryResult::Scalar(value) => value,
        QueryResult::Sequence(rows) => Value::Array(rows),
        QueryResult::Record(record) => record.into_plain(),
        QueryResult::Counted { count, rows } => {
            let mut pair = Map::new();
            pair.insert("count".to_string(), Value::from(count));
            pair.insert("rows".to_string(), Value::Array(rows));
            Value::Object(pair)
        }
    }
}
