use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{Error, Record, Value};

/// Thin typed wrapper over an external record store: find-one, find-many,
/// save, create, with hash-expression (logical AND of equality predicates)
/// filters. Collections are addressed by name; this trait makes no
/// assumption about their schema.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Returns the unique record in `collection` where `field == value`.
    /// Fails with `NotFound` / `MultipleItems` if the match isn't unique.
    async fn find_first(&self, collection: &str, field: &str, value: &Value) -> Result<Record, Error>;

    /// Returns every record in `collection` matching all of `filter`
    /// (logical AND of equality predicates), a.k.a. a hash-expression.
    async fn find_many(
        &self,
        collection: &str,
        filter: &BTreeMap<String, Value>,
    ) -> Result<Vec<Record>, Error>;

    /// Inserts a new record, assigning an id if `record.id` is empty.
    async fn create(&self, collection: &str, record: Record) -> Result<Record, Error>;

    /// Updates an existing record by id.
    async fn update_by_id(&self, collection: &str, record: &Record) -> Result<(), Error>;

    /// Upserts `record` into `collection`, keyed by id. If `record.id` is
    /// empty a new id is generated and the record is inserted.
    async fn save(&self, collection: &str, record: Record) -> Result<Record, Error>;
}
