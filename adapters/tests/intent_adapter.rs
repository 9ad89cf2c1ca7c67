use std::sync::Arc;

use adapters::intent::Client;
use serde_json::Value as Json;
use store::SqlGateway;
use tenant::{Adapter, Item, Tenant, Vendor};

fn test_tenant(id: &str) -> Tenant {
    Tenant {
        id: id.to_string(),
        name: "intent".to_string(),
        vendor: Vendor::Intent,
        config: Json::Null,
        tenant_group: "group-1".to_string(),
        enable: true,
    }
}

#[tokio::test]
async fn adapter_trait_object_round_trips_through_save_and_load() -> anyhow::Result<()> {
    let gateway = Arc::new(SqlGateway::connect("sqlite::memory:").await?);
    let client: Arc<dyn Adapter> = Arc::new(Client::new(test_tenant("intent-1"), gateway));

    client.save_item(&Item::new("intent-1", "SKU-1", 5)).await?;
    let loaded = client.load_item("SKU-1").await?;
    assert_eq!(loaded.stocks, 5);

    // No OAuth2 flow, no background poller for the storage-backed adapter.
    assert!(client.credentials_manager().is_none());
    assert!(client.background_service().is_none());
    Ok(())
}
