use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Error, Item, Tenant};

/// Uniform surface each marketplace implements (§4.D).
#[async_trait]
pub trait Adapter: Send + Sync {
    fn identity(&self) -> &Tenant;

    /// Enumerates every SKU with stock. Must paginate internally. The
    /// result is a snapshot at call time; no ordering guarantee; no
    /// duplicates within one call.
    async fn collect_all_items(&self) -> Result<Vec<Item>, Error>;

    /// Returns the single matching item, or `NotFound`. `MultipleItems` if
    /// the vendor returns more than one row for the same SKU.
    async fn load_item(&self, seller_sku: &str) -> Result<Item, Error>;

    /// Updates stock on the marketplace. Must confirm propagation before
    /// returning success (§4.E point 6).
    async fn save_item(&self, item: &Item) -> Result<(), Error>;

    /// Only returned by OAuth2-bound adapters.
    fn credentials_manager(&self) -> Option<Arc<dyn CredentialsManager>> {
        None
    }

    /// Optional per-tenant loop (e.g. periodic catalog scrape).
    fn background_service(&self) -> Option<Arc<dyn BackgroundService>> {
        None
    }
}

/// OAuth2 credential lifecycle for one tenant.
#[async_trait]
pub trait CredentialsManager: Send + Sync {
    fn generate_authorization_url(&self) -> String;
    async fn generate_credentials(&self, payload: &serde_json::Value) -> Result<credentials::Credentials, Error>;
    async fn refresh_credentials(&self) -> Result<credentials::Credentials, Error>;
    fn credentials_expiry(&self) -> DateTime<Utc>;
}

/// A per-tenant background job (e.g. OpenCart's sale-order poller).
#[async_trait]
pub trait BackgroundService: Send + Sync {
    async fn start(&self) -> Result<(), Error>;
}
