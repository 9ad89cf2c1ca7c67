use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::{Error, Gateway, Record, Value};

/// `Gateway` backed by a generic `records` table, one row per record,
/// addressable by `(collection, id)`. Field values are kept as a JSON blob
/// and reconstituted into typed `Value`s on read.
///
/// Filtering happens application-side after a collection-scoped fetch: the
/// `Any` driver doesn't expose a portable JSON-extraction dialect, and the
/// data volumes here (per-tenant SKU catalogs) don't warrant tying the
/// gateway to one backend's JSON functions.
#[derive(Clone)]
pub struct SqlGateway {
    pool: Arc<AnyPool>,
}

impl SqlGateway {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        sqlx::any::install_default_drivers();

        // A single connection avoids both "database is locked" contention on
        // SQLite writes and the per-connection isolation of `:memory:` DBs.
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        let gateway = Self { pool: Arc::new(pool) };
        gateway.migrate().await?;
        Ok(gateway)
    }

    pub fn from_pool(pool: AnyPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS records (
  collection TEXT NOT NULL,
  id TEXT NOT NULL,
  fields_json TEXT NOT NULL,
  created_ms BIGINT NOT NULL,
  updated_ms BIGINT NOT NULL,
  PRIMARY KEY (collection, id)
);
"#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection);")
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    async fn scan_collection(&self, collection: &str) -> Result<Vec<Record>, Error> {
        let rows = sqlx::query("SELECT id, fields_json, created_ms, updated_ms FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_all(&*self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }
}

fn row_to_record(row: &sqlx::any::AnyRow) -> Result<Record, Error> {
    let id: String = row.get("id");
    let fields_json: String = row.get("fields_json");
    let created_ms: i64 = row.get("created_ms");
    let updated_ms: i64 = row.get("updated_ms");

    let fields: BTreeMap<String, Value> = serde_json::from_str(&fields_json)?;
    Ok(Record {
        id,
        fields,
        created: chrono::DateTime::from_timestamp_millis(created_ms),
        updated: chrono::DateTime::from_timestamp_millis(updated_ms),
    })
}

fn matches(record: &Record, field: &str, value: &Value) -> bool {
    record.get(field) == Some(value)
}

#[async_trait]
impl Gateway for SqlGateway {
    async fn find_first(&self, collection: &str, field: &str, value: &Value) -> Result<Record, Error> {
        let matched: Vec<Record> = self
            .scan_collection(collection)
            .await?
            .into_iter()
            .filter(|r| matches(r, field, value))
            .collect();

        match matched.len() {
            0 => Err(Error::NotFound),
            1 => Ok(matched.into_iter().next().unwrap()),
            _ => Err(Error::MultipleItems),
        }
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &BTreeMap<String, Value>,
    ) -> Result<Vec<Record>, Error> {
        Ok(self
            .scan_collection(collection)
            .await?
            .into_iter()
            .filter(|r| filter.iter().all(|(field, value)| matches(r, field, value)))
            .collect())
    }

    async fn create(&self, collection: &str, mut record: Record) -> Result<Record, Error> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        self.save(collection, record).await
    }

    async fn update_by_id(&self, collection: &str, record: &Record) -> Result<(), Error> {
        self.save(collection, record.clone()).await.map(|_| ())
    }

    async fn save(&self, collection: &str, mut record: Record) -> Result<Record, Error> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let now = common::time::now();
        if record.created.is_none() {
            record.created = Some(now);
        }
        record.updated = Some(now);

        let fields_json = serde_json::to_string(&record.fields)?;

        sqlx::query(
            r#"
INSERT INTO records (collection, id, fields_json, created_ms, updated_ms)
VALUES (?, ?, ?, ?, ?)
ON CONFLICT(collection, id) DO UPDATE SET
  fields_json = excluded.fields_json,
  updated_ms = excluded.updated_ms;
"#,
        )
        .bind(collection)
        .bind(&record.id)
        .bind(fields_json)
        .bind(record.created.unwrap().timestamp_millis())
        .bind(record.updated.unwrap().timestamp_millis())
        .execute(&*self.pool)
        .await?;

        Ok(record)
    }
}
