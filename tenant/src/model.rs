use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use crate::Vendor;

/// A marketplace binding, immutable for the lifetime of a run (§3 Tenant).
#[derive(Clone, Debug)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub vendor: Vendor,
    /// Opaque vendor-specific config blob, parsed by the loader.
    pub config: Json,
    pub tenant_group: String,
    pub enable: bool,
}

impl Tenant {
    pub fn from_record(record: &store::Record) -> Result<Self, crate::Error> {
        let vendor = record
            .get_string("vendor")
            .parse::<Vendor>()
            .map_err(|e| crate::Error::VendorError {
                code: "unsupported_vendor".to_string(),
                message: e.0,
            })?;
        let config = record
            .get("config")
            .and_then(store::Value::as_json)
            .cloned()
            .unwrap_or(Json::Null);
        Ok(Tenant {
            id: record.id.clone(),
            name: record.get_string("name"),
            vendor,
            config,
            tenant_group: record.get_string("tenant_group"),
            enable: record.get_bool("enable"),
        })
    }
}

/// A set of tenants reconciled together (§3 Tenant Group). Exactly one
/// member has vendor `INTENT`.
#[derive(Clone, Debug)]
pub struct TenantGroup {
    pub id: String,
    pub name: String,
    pub continue_on_sync_item_error: bool,
}

impl TenantGroup {
    pub fn from_record(record: &store::Record) -> Self {
        let config = record
            .get("config")
            .and_then(store::Value::as_json)
            .cloned()
            .unwrap_or(Json::Null);
        let continue_on_sync_item_error = config
            .get("continue_on_sync_item_error")
            .and_then(Json::as_bool)
            .unwrap_or(false);
        TenantGroup {
            id: record.id.clone(),
            name: record.get_string("name"),
            continue_on_sync_item_error,
        }
    }
}

/// A stock record for one SKU within one tenant (§3 Item).
#[derive(Clone, Debug)]
pub struct Item {
    pub id: String,
    pub tenant_id: String,
    pub seller_sku: String,
    pub stocks: i64,
    /// Vendor-specific ids (product_id/sku_id/warehouse_id/item_id/model_id/...).
    pub tenant_props: Json,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(tenant_id: impl Into<String>, seller_sku: impl Into<String>, stocks: i64) -> Self {
        Item {
            id: String::new(),
            tenant_id: tenant_id.into(),
            seller_sku: seller_sku.into(),
            stocks,
            tenant_props: Json::Null,
            created: None,
            updated: None,
        }
    }

    pub fn from_record(record: &store::Record) -> Self {
        Item {
            id: record.id.clone(),
            tenant_id: record.get_string("tenant"),
            seller_sku: record.get_string("seller_sku"),
            stocks: record.get_int("stocks"),
            tenant_props: record
                .get("tenant_props")
                .and_then(store::Value::as_json)
                .cloned()
                .unwrap_or(Json::Null),
            created: record.created,
            updated: record.updated,
        }
    }

    pub fn to_record(&self) -> store::Record {
        store::Record {
            id: self.id.clone(),
            created: self.created,
            updated: self.updated,
            ..Default::default()
        }
        .set("tenant", self.tenant_id.as_str())
        .set("seller_sku", self.seller_sku.as_str())
        .set("stocks", self.stocks)
        .set("tenant_props", self.tenant_props.clone())
    }

    pub fn tenant_prop_str(&self, key: &str) -> String {
        self.tenant_props
            .get(key)
            .and_then(Json::as_str)
            .unwrap_or("")
            .to_string()
    }

    pub fn tenant_prop_i64(&self, key: &str) -> i64 {
        self.tenant_props.get(key).and_then(Json::as_i64).unwrap_or(0)
    }
}

/// Append-only audit row for one observed drift (§3 Inventory Delta).
#[derive(Clone, Debug)]
pub struct InventoryDelta {
    pub inventory_id: String,
    pub field: String,
    pub nvalue: f64,
    pub svalue: String,
    pub created: Option<DateTime<Utc>>,
}

impl InventoryDelta {
    pub fn to_record(&self) -> store::Record {
        store::Record::new("")
            .set("tenant_inventory", self.inventory_id.as_str())
            .set("field", self.field.as_str())
            .set("nvalue", serde_json::json!(self.nvalue))
            .set("svalue", self.svalue.as_str())
    }
}
