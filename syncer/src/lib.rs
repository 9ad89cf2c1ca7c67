//! Reconciliation engine: registers a tenant group's adapters, refreshes
//! snapshots, syncs individual SKUs, and refreshes near-expiry credentials.

mod error;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub use error::Error;

use tenant::{Adapter, Item, Tenant, TenantGroup, Vendor};

const COLLECTION_TENANT_GROUPS: &str = "tenant_groups";
const COLLECTION_TENANTS: &str = "tenants";
const COLLECTION_INVENTORY: &str = "tenant_inventory";
const COLLECTION_INVENTORY_DELTA: &str = "tenant_inventory_delta";

/// 6 hours, per §4.F `RefreshCredentials` — the source used 1 hour; this
/// widens the window so a slow 30-min refresh loop tick never races a
/// token's actual expiry.
const CREDENTIALS_EXPIRY_THRESHOLD: chrono::Duration = chrono::Duration::hours(6);

struct TenantBinding {
    tenant: Tenant,
    adapter: Arc<dyn Adapter>,
}

/// Orchestrates reconciliation for one tenant group.
pub struct Syncer {
    tenants: HashMap<String, TenantBinding>,
    intent_tenant_name: Option<String>,
    gateway: Arc<dyn store::Gateway>,
    credentials_store: Arc<credentials::Store>,
    log_sink: Arc<dyn common::LogSink>,
    continue_on_sync_item_error: bool,
}

impl Syncer {
    /// Loads the named tenant group, registers every enabled tenant in it
    /// via the loader, and records which one is the intent tenant.
    pub async fn register(
        gateway: Arc<dyn store::Gateway>,
        credentials_store: Arc<credentials::Store>,
        log_sink: Arc<dyn common::LogSink>,
        tenant_group_name: &str,
    ) -> Result<Self, Error> {
        let group_record = gateway
            .find_first(COLLECTION_TENANT_GROUPS, "name", &store::Value::from(tenant_group_name))
            .await
            .map_err(|err| match err {
                store::Error::NotFound => Error::GroupNotFound(tenant_group_name.to_string()),
                other => Error::from_store(other),
            })?;
        let group = TenantGroup::from_record(&group_record);

        let mut filter = BTreeMap::new();
        filter.insert("tenant_group".to_string(), store::Value::from(group.id.as_str()));
        let tenant_records = gateway.find_many(COLLECTION_TENANTS, &filter).await.map_err(Error::from_store)?;

        let mut tenants = HashMap::new();
        let mut intent_tenant_name = None;
        for record in &tenant_records {
            let tenant = Tenant::from_record(record)?;
            if !tenant.enable {
                continue;
            }
            let name = tenant.name.clone();
            let adapter = loader::load_client(tenant.clone(), gateway.clone(), credentials_store.clone()).await?;
            if tenant.vendor == Vendor::Intent {
                intent_tenant_name = Some(name.clone());
            }
            tenants.insert(name, TenantBinding { tenant, adapter });
        }

        Ok(Self {
            tenants,
            intent_tenant_name,
            gateway,
            credentials_store,
            log_sink,
            continue_on_sync_item_error: group.continue_on_sync_item_error,
        })
    }

    fn intent_binding(&self) -> Result<&TenantBinding, Error> {
        let name = self.intent_tenant_name.as_ref().ok_or(Error::NoIntentTenant)?;
        self.tenants.get(name).ok_or(Error::NoIntentTenant)
    }

    /// Every tenant's name paired with its `BackgroundService`, if any —
    /// used by the daemon to spawn per-tenant jobs (§4.G step 1).
    pub fn background_services(&self) -> Vec<(String, Arc<dyn tenant::BackgroundService>)> {
        self.tenants
            .iter()
            .filter_map(|(name, binding)| binding.adapter.background_service().map(|job| (name.clone(), job)))
            .collect()
    }

    /// The intent tenant's own catalog of seller SKUs, used to drive the
    /// foreground sync loop (§4.G step 2, "sync loop").
    pub async fn intent_skus(&self) -> Result<Vec<String>, Error> {
        let intent = self.intent_binding()?;
        let items = intent.adapter.collect_all_items().await?;
        Ok(items.into_iter().map(|item| item.seller_sku).collect())
    }

    fn non_intent_tenants(&self) -> impl Iterator<Item = (&String, &TenantBinding)> {
        self.tenants.iter().filter(move |(name, _)| Some(name.as_str()) != self.intent_tenant_name.as_deref())
    }

    async fn tenant_inventory(&self, tenant: &Tenant, seller_sku: &str) -> Result<Item, Error> {
        let mut filter = BTreeMap::new();
        filter.insert("tenant".to_string(), store::Value::from(tenant.id.as_str()));
        filter.insert("seller_sku".to_string(), store::Value::from(seller_sku));
        let records = self.gateway.find_many(COLLECTION_INVENTORY, &filter).await.map_err(Error::from_store)?;
        match records.len() {
            0 => Err(Error::NotFound),
            1 => Ok(Item::from_record(&records[0])),
            _ => Err(Error::MultipleItems),
        }
    }

    /// Upserts `item` as `tenant_name`'s snapshot. Routed through the
    /// adapter's own `save_item` for the intent tenant (same collection,
    /// but the adapter owns tenant-id stamping); direct gateway upsert for
    /// everyone else, since non-intent snapshots are cache, not live state.
    async fn save_tenant_inventory(&self, tenant_name: &str, mut item: Item) -> Result<(), Error> {
        let binding = self.tenants.get(tenant_name).ok_or_else(|| Error::UnknownTenant(tenant_name.to_string()))?;
        item.tenant_id = binding.tenant.id.clone();

        if Some(tenant_name) == self.intent_tenant_name.as_deref() {
            binding.adapter.save_item(&item).await?;
        } else {
            self.gateway.save(COLLECTION_INVENTORY, item.to_record()).await.map_err(Error::from_store)?;
        }
        Ok(())
    }

    async fn record_delta(&self, inventory_id: &str, delta: i64) -> Result<(), Error> {
        let delta = tenant::InventoryDelta {
            inventory_id: inventory_id.to_string(),
            field: "stocks".to_string(),
            nvalue: delta as f64,
            svalue: String::new(),
            created: None,
        };
        self.gateway.create(COLLECTION_INVENTORY_DELTA, delta.to_record()).await.map_err(Error::from_store)?;
        Ok(())
    }

    /// Records a `continue_on_sync_item_error`-tolerated skip. `level`
    /// distinguishes a benign read miss (`Warn`: this tenant just sits out
    /// this round) from a push failure (`Error`: a computed target wasn't
    /// enacted, leaving that tenant's inventory out of sync) so the two
    /// don't collapse into the same severity in `custom_logs`.
    async fn log_skip(&self, level: common::LogLevel, tenant_id: &str, seller_sku: &str, message: String) {
        self.log_sink
            .record(common::LogEntry {
                level,
                message,
                tenant_id: Some(tenant_id.to_string()),
                seller_sku: Some(seller_sku.to_string()),
                trace_id: common::logger::TraceId::default().to_string(),
            })
            .await;
    }

    /// Snapshot refresh (§4.F `CollectAllItems`): records first sightings
    /// and seeds previously-unknown SKUs into the intent tenant.
    pub async fn collect_all_items(&self) -> Result<(), Error> {
        let intent = self.intent_binding()?;
        let intent_items = intent.adapter.collect_all_items().await?;
        let intent_lookup: std::collections::HashSet<String> =
            intent_items.into_iter().map(|i| i.seller_sku).collect();

        let mut outside_intent: HashMap<String, Item> = HashMap::new();
        for (name, binding) in self.non_intent_tenants() {
            let items = binding.adapter.collect_all_items().await?;
            for item in items {
                match self.tenant_inventory(&binding.tenant, &item.seller_sku).await {
                    Ok(_) => {}
                    Err(Error::NotFound) => {
                        tracing::info!(tenant = name, seller_sku = item.seller_sku, "recording first-sighted item");
                        let fresh = binding.adapter.load_item(&item.seller_sku).await?;
                        self.save_tenant_inventory(name, fresh).await?;
                    }
                    Err(other) => return Err(other),
                }
                if !intent_lookup.contains(&item.seller_sku) {
                    outside_intent.insert(item.seller_sku.clone(), item);
                }
            }
        }

        let intent_name = self.intent_tenant_name.clone().ok_or(Error::NoIntentTenant)?;
        for (seller_sku, item) in outside_intent {
            tracing::info!(seller_sku, "seeding previously-unknown item into intent");
            self.save_tenant_inventory(&intent_name, item).await?;
        }
        Ok(())
    }

    /// The per-SKU reconciliation kernel (§4.F `SyncItem`).
    pub async fn sync_item(&self, seller_sku: &str) -> Result<(), Error> {
        let mut total_delta: i64 = 0;
        let mut live_map: HashMap<String, Item> = HashMap::new();

        for (name, binding) in &self.tenants {
            let cached = match self.tenant_inventory(&binding.tenant, seller_sku).await {
                Ok(item) => item,
                Err(Error::NotFound) => continue,
                Err(other) => return Err(other),
            };

            let live = match binding.adapter.load_item(seller_sku).await {
                Ok(item) => item,
                Err(err) if self.continue_on_sync_item_error => {
                    self.log_skip(common::LogLevel::Warn, &binding.tenant.id, seller_sku, format!("load_item failed: {err}"))
                        .await;
                    continue;
                }
                Err(err) => return Err(Error::Tenant(err)),
            };

            let delta = live.stocks - cached.stocks;
            total_delta += delta;
            if delta != 0 {
                self.record_delta(&cached.id, delta).await?;
            }

            let mut live = live;
            live.id = cached.id;
            live.created = cached.created;
            self.save_tenant_inventory(name, live.clone()).await?;
            live_map.insert(name.clone(), live);
        }

        let intent_name = self.intent_tenant_name.clone().ok_or(Error::NoIntentTenant)?;
        let intent_live = match live_map.get(&intent_name) {
            Some(item) => item,
            None => return Ok(()), // intent tenant has no snapshot for this SKU yet; nothing to reconcile.
        };

        let mut target_stocks = intent_live.stocks + total_delta;
        if target_stocks < 0 {
            tracing::warn!(seller_sku, "negative target stocks, clamping to 0");
            target_stocks = 0;
        }

        for (name, live) in &live_map {
            if live.stocks == target_stocks {
                continue;
            }
            let binding = self.tenants.get(name).ok_or_else(|| Error::UnknownTenant(name.clone()))?;
            let mut pushed = live.clone();
            pushed.stocks = target_stocks;

            if let Err(err) = binding.adapter.save_item(&pushed).await {
                if self.continue_on_sync_item_error {
                    self.log_skip(common::LogLevel::Error, &binding.tenant.id, seller_sku, format!("save_item failed: {err}"))
                        .await;
                    continue;
                }
                return Err(Error::Tenant(err));
            }
            self.save_tenant_inventory(name, pushed).await?;
        }

        Ok(())
    }

    /// Refreshes credentials nearing expiry (§4.F `RefreshCredentials`).
    pub async fn refresh_credentials(&self) -> Result<(), Error> {
        let now = common::time::now();
        for (name, binding) in self.non_intent_tenants() {
            let Some(cm) = binding.adapter.credentials_manager() else {
                tracing::debug!(tenant = name, "no credentials manager, skipping refresh");
                continue;
            };

            let expiry = cm.credentials_expiry();
            if expiry - now >= CREDENTIALS_EXPIRY_THRESHOLD {
                continue;
            }

            tracing::info!(tenant = name, "refreshing near-expiry credentials");
            let credentials = cm.refresh_credentials().await?;
            self.credentials_store.save(&credentials).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapters::intent::Client as IntentClient;
    use std::sync::Mutex;
    use tenant::Vendor;

    fn test_tenant(id: &str, name: &str, vendor: Vendor) -> Tenant {
        Tenant {
            id: id.to_string(),
            name: name.to_string(),
            vendor,
            config: serde_json::Value::Null,
            tenant_group: "group-1".to_string(),
            enable: true,
        }
    }

    /// A marketplace double with its own in-memory state, distinct from the
    /// syncer's snapshot store — lets tests observe a live value diverge
    /// from the cached `tenant_inventory` row the way a real vendor would.
    struct FakeVendorAdapter {
        tenant: Tenant,
        state: Mutex<HashMap<String, Item>>,
    }

    impl FakeVendorAdapter {
        fn new(tenant: Tenant) -> Self {
            Self { tenant, state: Mutex::new(HashMap::new()) }
        }

        fn set_stock(&self, seller_sku: &str, stocks: i64) {
            let mut state = self.state.lock().unwrap();
            let item = state
                .entry(seller_sku.to_string())
                .or_insert_with(|| Item::new(self.tenant.id.clone(), seller_sku, stocks));
            item.stocks = stocks;
        }
    }

    #[async_trait::async_trait]
    impl Adapter for FakeVendorAdapter {
        fn identity(&self) -> &Tenant {
            &self.tenant
        }

        async fn collect_all_items(&self) -> Result<Vec<Item>, tenant::Error> {
            Ok(self.state.lock().unwrap().values().cloned().collect())
        }

        async fn load_item(&self, seller_sku: &str) -> Result<Item, tenant::Error> {
            self.state.lock().unwrap().get(seller_sku).cloned().ok_or(tenant::Error::NotFound)
        }

        async fn save_item(&self, item: &Item) -> Result<(), tenant::Error> {
            self.state.lock().unwrap().insert(item.seller_sku.clone(), item.clone());
            Ok(())
        }
    }

    struct Fixture {
        syncer: Syncer,
        vendor: Arc<FakeVendorAdapter>,
    }

    /// Builds a syncer with the intent tenant (storage-backed) and one
    /// "vendor" tenant (the in-memory fake), so reconciliation can be
    /// exercised without live network calls.
    async fn fixture(gateway: Arc<dyn store::Gateway>) -> Fixture {
        let credentials_store = Arc::new(credentials::Store::new(gateway.clone()));
        let log_sink: Arc<dyn common::LogSink> = Arc::new(common::TracingLogSink);

        let intent_tenant = test_tenant("intent-1", "intent", Vendor::Intent);
        let vendor_tenant = test_tenant("vendor-1", "vendor", Vendor::TikTok);
        let vendor = Arc::new(FakeVendorAdapter::new(vendor_tenant.clone()));

        let mut tenants = HashMap::new();
        tenants.insert(
            "intent".to_string(),
            TenantBinding {
                tenant: intent_tenant.clone(),
                adapter: Arc::new(IntentClient::new(intent_tenant, gateway.clone())),
            },
        );
        tenants.insert("vendor".to_string(), TenantBinding { tenant: vendor_tenant, adapter: vendor.clone() });

        let syncer = Syncer {
            tenants,
            intent_tenant_name: Some("intent".to_string()),
            gateway,
            credentials_store,
            log_sink,
            continue_on_sync_item_error: false,
        };
        Fixture { syncer, vendor }
    }

    #[tokio::test]
    async fn collect_all_items_seeds_intent_from_first_sighted_vendor_items() -> anyhow::Result<()> {
        let gateway = Arc::new(store::SqlGateway::connect("sqlite::memory:").await?);
        let Fixture { syncer, vendor } = fixture(gateway).await;

        vendor.set_stock("SKU-1", 7);
        syncer.collect_all_items().await?;

        let intent = syncer.tenants.get("intent").unwrap();
        let seeded = intent.adapter.load_item("SKU-1").await?;
        assert_eq!(seeded.stocks, 7);
        Ok(())
    }

    #[tokio::test]
    async fn sync_item_propagates_vendor_delta_to_intent_and_records_delta_row() -> anyhow::Result<()> {
        let gateway = Arc::new(store::SqlGateway::connect("sqlite::memory:").await?);
        let Fixture { syncer, vendor } = fixture(gateway.clone()).await;

        let intent = syncer.tenants.get("intent").unwrap();
        intent.adapter.save_item(&Item::new("intent-1", "SKU-1", 10)).await?;
        syncer.save_tenant_inventory("vendor", Item::new("vendor-1", "SKU-1", 10)).await?;
        vendor.set_stock("SKU-1", 6); // vendor sold 4 units since the last snapshot.

        syncer.sync_item("SKU-1").await?;

        let intent_after = intent.adapter.load_item("SKU-1").await?;
        assert_eq!(intent_after.stocks, 6);

        let mut row_filter = BTreeMap::new();
        row_filter.insert("tenant".to_string(), store::Value::from("vendor-1"));
        row_filter.insert("seller_sku".to_string(), store::Value::from("SKU-1"));
        let vendor_rows = gateway.find_many(COLLECTION_INVENTORY, &row_filter).await?;
        assert_eq!(vendor_rows.len(), 1);

        let mut delta_filter = BTreeMap::new();
        delta_filter.insert("tenant_inventory".to_string(), store::Value::from(vendor_rows[0].id.as_str()));
        let deltas = gateway.find_many(COLLECTION_INVENTORY_DELTA, &delta_filter).await?;
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].get("nvalue").and_then(|v| v.as_json()).and_then(|j| j.as_f64()), Some(-4.0));
        Ok(())
    }

    #[tokio::test]
    async fn sync_item_clamps_negative_target_to_zero() -> anyhow::Result<()> {
        let gateway = Arc::new(store::SqlGateway::connect("sqlite::memory:").await?);
        let Fixture { syncer, vendor } = fixture(gateway).await;

        let intent = syncer.tenants.get("intent").unwrap();
        intent.adapter.save_item(&Item::new("intent-1", "SKU-1", 2)).await?;
        syncer.save_tenant_inventory("vendor", Item::new("vendor-1", "SKU-1", 2)).await?;
        vendor.set_stock("SKU-1", -3);

        syncer.sync_item("SKU-1").await?;

        let intent_after = intent.adapter.load_item("SKU-1").await?;
        assert_eq!(intent_after.stocks, 0);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_credentials_is_a_noop_for_adapters_without_a_credentials_manager() -> anyhow::Result<()> {
        let gateway = Arc::new(store::SqlGateway::connect("sqlite::memory:").await?);
        let Fixture { syncer, .. } = fixture(gateway).await;
        syncer.refresh_credentials().await?;
        Ok(())
    }
}
