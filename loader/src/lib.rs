//! Builds a concrete vendor adapter from a tenant row: parses the config
//! blob per vendor tag and, for OAuth2 vendors, loads persisted
//! credentials (absence is logged, not fatal — see §4.H).

use std::sync::Arc;

use tenant::{Adapter, Tenant, Vendor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config for vendor {vendor}: {source}")]
    Config {
        vendor: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("credentials error: {0}")]
    Credentials(#[from] credentials::Error),
}

async fn load_credentials_or_default(
    credentials_store: &credentials::Store,
    tenant_id: &str,
) -> Result<credentials::Credentials, Error> {
    match credentials_store.load(tenant_id).await {
        Ok(creds) => Ok(creds),
        Err(credentials::Error::NoCredentials) => {
            tracing::warn!(tenant = tenant_id, "no oauth2 credentials found, proceeding without them");
            Ok(credentials::Credentials {
                tenant_id: tenant_id.to_string(),
                access_token: String::new(),
                refresh_token: String::new(),
                expires: common::time::now(),
                created: None,
                updated: None,
            })
        }
        Err(err) => Err(Error::Credentials(err)),
    }
}

fn parse_config<T: serde::de::DeserializeOwned>(tenant: &Tenant, vendor: &'static str) -> Result<T, Error> {
    serde_json::from_value(tenant.config.clone()).map_err(|source| Error::Config { vendor, source })
}

/// Builds the adapter bound to `tenant`'s vendor, backed by `gateway` (and,
/// for OAuth2 vendors, `credentials_store`).
pub async fn load_client(
    tenant: Tenant,
    gateway: Arc<dyn store::Gateway>,
    credentials_store: Arc<credentials::Store>,
) -> Result<Arc<dyn Adapter>, Error> {
    match tenant.vendor {
        Vendor::Intent => Ok(Arc::new(adapters::intent::Client::new(tenant, gateway))),
        Vendor::OpenCart => {
            let config: adapters::opencart::Config = parse_config(&tenant, "OPENCART")?;
            Ok(Arc::new(adapters::opencart::Client::new(tenant, config)))
        }
        Vendor::TikTok => {
            let config: adapters::tiktok::Config = parse_config(&tenant, "TIKTOK")?;
            let credentials = load_credentials_or_default(&credentials_store, &tenant.id).await?;
            Ok(Arc::new(adapters::tiktok::Client::new(tenant, config, credentials)))
        }
        Vendor::Lazada => {
            let config: adapters::lazada::Config = parse_config(&tenant, "LAZADA")?;
            let credentials = load_credentials_or_default(&credentials_store, &tenant.id).await?;
            Ok(Arc::new(adapters::lazada::Client::new(tenant, config, credentials)))
        }
        Vendor::Shopee => {
            let config: adapters::shopee::Config = parse_config(&tenant, "SHOPEE")?;
            let credentials = load_credentials_or_default(&credentials_store, &tenant.id).await?;
            Ok(Arc::new(adapters::shopee::Client::new(tenant, config, credentials, gateway)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenant::Tenant as TenantModel;

    fn test_tenant(vendor: Vendor, config: serde_json::Value) -> TenantModel {
        TenantModel {
            id: "t-1".to_string(),
            name: "test".to_string(),
            vendor,
            config,
            tenant_group: "group-1".to_string(),
            enable: true,
        }
    }

    #[tokio::test]
    async fn loads_intent_adapter_with_no_credentials_required() -> anyhow::Result<()> {
        let gateway = Arc::new(store::SqlGateway::connect("sqlite::memory:").await?);
        let credentials_store = Arc::new(credentials::Store::new(gateway.clone()));
        let tenant = test_tenant(Vendor::Intent, serde_json::Value::Null);

        let adapter = load_client(tenant, gateway, credentials_store).await?;
        assert!(adapter.credentials_manager().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn rejects_malformed_vendor_config() -> anyhow::Result<()> {
        let gateway = Arc::new(store::SqlGateway::connect("sqlite::memory:").await?);
        let credentials_store = Arc::new(credentials::Store::new(gateway.clone()));
        let tenant = test_tenant(Vendor::TikTok, json!({ "unexpected": true }));

        let err = load_client(tenant, gateway, credentials_store).await.unwrap_err();
        assert!(matches!(err, Error::Config { vendor: "TIKTOK", .. }));
        Ok(())
    }
}
