use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::Value;

/// A single row in some named collection (`tenants`, `tenant_inventory`, ...).
/// Fields are addressed by name, matching the record store's generic
/// find/save surface rather than a fixed struct per collection.
#[derive(Clone, Debug, Default)]
pub struct Record {
    pub id: String,
    pub fields: BTreeMap<String, Value>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_string(&self, name: &str) -> String {
        self.get(name).and_then(Value::as_str).unwrap_or("").to_string()
    }

    pub fn get_int(&self, name: &str) -> i64 {
        self.get(name).and_then(Value::as_int).unwrap_or(0)
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get(name).and_then(Value::as_time)
    }
}
