//! Storage-backed "intent" adapter: the source of truth tenant. No
//! credentials, no network — `CollectAllItems`/`LoadItem` read the snapshot
//! store filtered by tenant id; `SaveItem` upserts into the same store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tenant::{Adapter, Error, Item, Tenant};

const COLLECTION: &str = "tenant_inventory";

pub struct Client {
    tenant: Tenant,
    gateway: Arc<dyn store::Gateway>,
}

impl Client {
    pub fn new(tenant: Tenant, gateway: Arc<dyn store::Gateway>) -> Self {
        Self { tenant, gateway }
    }
}

#[async_trait]
impl Adapter for Client {
    fn identity(&self) -> &Tenant {
        &self.tenant
    }

    async fn collect_all_items(&self) -> Result<Vec<Item>, Error> {
        let mut filter = BTreeMap::new();
        filter.insert("tenant".to_string(), store::Value::from(self.tenant.id.as_str()));
        let records = self.gateway.find_many(COLLECTION, &filter).await.map_err(Error::from_store)?;
        Ok(records.iter().map(Item::from_record).collect())
    }

    async fn load_item(&self, seller_sku: &str) -> Result<Item, Error> {
        let mut filter = BTreeMap::new();
        filter.insert("tenant".to_string(), store::Value::from(self.tenant.id.as_str()));
        filter.insert("seller_sku".to_string(), store::Value::from(seller_sku));
        let records = self.gateway.find_many(COLLECTION, &filter).await.map_err(Error::from_store)?;
        match records.len() {
            0 => Err(Error::NotFound),
            1 => Ok(Item::from_record(&records[0])),
            _ => Err(Error::MultipleItems),
        }
    }

    async fn save_item(&self, item: &Item) -> Result<(), Error> {
        let mut item = item.clone();
        item.tenant_id = self.tenant.id.clone();
        self.gateway
            .save(COLLECTION, item.to_record())
            .await
            .map_err(Error::from_store)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::SqlGateway;
    use tenant::Vendor;

    fn test_tenant(id: &str) -> Tenant {
        Tenant {
            id: id.to_string(),
            name: "intent".to_string(),
            vendor: Vendor::Intent,
            config: serde_json::Value::Null,
            tenant_group: "group-1".to_string(),
            enable: true,
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() -> anyhow::Result<()> {
        let gateway = Arc::new(SqlGateway::connect("sqlite::memory:").await?);
        let client = Client::new(test_tenant("intent-1"), gateway);

        let item = Item::new("intent-1", "SKU-1", 10);
        client.save_item(&item).await?;

        let loaded = client.load_item("SKU-1").await?;
        assert_eq!(loaded.stocks, 10);
        assert_eq!(loaded.tenant_id, "intent-1");
        Ok(())
    }

    #[tokio::test]
    async fn load_item_missing_is_not_found() -> anyhow::Result<()> {
        let gateway = Arc::new(SqlGateway::connect("sqlite::memory:").await?);
        let client = Client::new(test_tenant("intent-1"), gateway);

        let err = client.load_item("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
        Ok(())
    }

    #[tokio::test]
    async fn collect_all_items_scopes_by_tenant() -> anyhow::Result<()> {
        let gateway = Arc::new(SqlGateway::connect("sqlite::memory:").await?);
        let a = Client::new(test_tenant("intent-a"), gateway.clone());
        let b = Client::new(test_tenant("intent-b"), gateway);

        a.save_item(&Item::new("intent-a", "SKU-1", 1)).await?;
        b.save_item(&Item::new("intent-b", "SKU-2", 2)).await?;

        let a_items = a.collect_all_items().await?;
        assert_eq!(a_items.len(), 1);
        assert_eq!(a_items[0].seller_sku, "SKU-1");
        Ok(())
    }
}
