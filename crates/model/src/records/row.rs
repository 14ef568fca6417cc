use crate::core::value::{FieldValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One result row, keyed by column name in result-set order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub field_values: Vec<FieldValue>,
}

impl Record {
    pub fn new(field_values: Vec<FieldValue>) -> Self {
        Record { field_values }
    }

    /// Zips column names with row values, as a driver reports them.
    pub fn from_columns<I>(columns: &[String], values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let field_values = columns
            .iter()
            .zip(values)
            .map(|(name, value)| FieldValue::new(name.clone(), value))
            .collect();
        Record { field_values }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
    }

    pub fn get_value(&self, field: &str) -> Value {
        self.get(field)
            .map(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.field_values.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.field_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_values.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.field_values
            .into_iter()
            .map(|f| (f.name, f.value))
            .collect()
    }
}
