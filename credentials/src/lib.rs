//! OAuth2 credential tuples, persisted per tenant (§4.C).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// One tenant's OAuth2 credential tuple.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub tenant_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires: DateTime<Utc>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no oauth2 credentials found")]
    NoCredentials,
    #[error("unexpected multiple oauth2 credentials found")]
    MultipleCredentials,
    #[error("store error: {0}")]
    Store(#[from] store::Error),
}

fn record_to_credentials(record: &store::Record) -> Credentials {
    Credentials {
        tenant_id: record.get_string("tenant"),
        access_token: record.get_string("access_token"),
        refresh_token: record.get_string("refresh_token"),
        expires: record.get_time("expires").unwrap_or_else(common::time::now),
        created: record.created,
        updated: record.updated,
    }
}

/// Persist/load OAuth2 credential tuples per tenant ID.
pub struct Store {
    gateway: Arc<dyn store::Gateway>,
}

const COLLECTION: &str = "tenant_oauth2";

impl Store {
    pub fn new(gateway: Arc<dyn store::Gateway>) -> Self {
        Self { gateway }
    }

    /// Returns the unique credentials row for `tenant_id`. Absence fails
    /// with `NoCredentials`; more than one row fails with
    /// `MultipleCredentials`.
    pub async fn load(&self, tenant_id: &str) -> Result<Credentials, Error> {
        let record = self
            .gateway
            .find_first(COLLECTION, "tenant", &store::Value::from(tenant_id))
            .await
            .map_err(|err| match err {
                store::Error::NotFound => Error::NoCredentials,
                store::Error::MultipleItems => Error::MultipleCredentials,
                other => Error::Store(other),
            })?;
        Ok(record_to_credentials(&record))
    }

    /// Upsert keyed by `tenant_id`. Reading back after `save` returns the
    /// written tokens.
    pub async fn save(&self, credentials: &Credentials) -> Result<(), Error> {
        let mut filter = std::collections::BTreeMap::new();
        filter.insert("tenant".to_string(), store::Value::from(credentials.tenant_id.as_str()));
        let existing = self.gateway.find_many(COLLECTION, &filter).await?;
        if existing.len() > 1 {
            return Err(Error::MultipleCredentials);
        }

        let record = existing
            .into_iter()
            .next()
            .unwrap_or_else(|| store::Record::new(""));

        let record = record
            .set("tenant", credentials.tenant_id.as_str())
            .set("access_token", credentials.access_token.as_str())
            .set("refresh_token", credentials.refresh_token.as_str())
            .set("expires", credentials.expires);

        self.gateway.save(COLLECTION, record).await?;
        Ok(())
    }
}
