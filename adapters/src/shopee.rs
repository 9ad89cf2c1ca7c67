//! Shopee adapter. Unlike TikTok/Lazada, Shopee has no SKU search endpoint:
//! `load_item` depends on a prior `collect_all_items` snapshot to resolve
//! `item_id`/`model_id`, which is why it reads through the intent snapshot
//! store rather than calling the vendor directly by SKU.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value as Json, json};
use tokio::sync::RwLock;

use tenant::{Adapter, BackgroundService, CredentialsManager, Error, Item, Tenant};

use crate::signing::hmac_sha256_hex;

const PAGE_SIZE: i64 = 50;
const COLLECTION: &str = "tenant_inventory";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub domain: String,
    pub shop_id: i64,
    pub partner_id: i64,
    pub partner_key: String,
    #[serde(default)]
    pub redirect_uri: String,
}

#[derive(Clone)]
pub struct Client {
    tenant: Tenant,
    config: Config,
    credentials: Arc<RwLock<credentials::Credentials>>,
    gateway: Arc<dyn store::Gateway>,
    http: reqwest::Client,
}

impl Client {
    pub fn new(
        tenant: Tenant,
        config: Config,
        credentials: credentials::Credentials,
        gateway: Arc<dyn store::Gateway>,
    ) -> Self {
        Self {
            tenant,
            config,
            credentials: Arc::new(RwLock::new(credentials)),
            gateway,
            http: reqwest::Client::new(),
        }
    }

    fn signature(&self, endpoint: &str, timestamp: i64) -> String {
        let base = format!("{}{}{}", self.config.partner_id, endpoint, timestamp);
        hmac_sha256_hex(&self.config.partner_key, &base)
    }

    /// `strip_access_token`/`strip_shop_id` mirror the vendor's token-retrieval
    /// request mode, used only for the OAuth2 token endpoints.
    async fn request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        query_extra: Vec<(String, String)>,
        body: Option<Json>,
        strip_access_token: bool,
        strip_shop_id: bool,
    ) -> Result<Json, Error> {
        let timestamp = Utc::now().timestamp();
        let mut query = query_extra;
        query.push(("partner_id".to_string(), self.config.partner_id.to_string()));
        query.push(("timestamp".to_string(), timestamp.to_string()));
        query.push(("sign".to_string(), self.signature(endpoint, timestamp)));
        if !strip_access_token {
            let token = self.credentials.read().await.access_token.clone();
            query.push(("access_token".to_string(), token));
        }
        if !strip_shop_id {
            query.push(("shop_id".to_string(), self.config.shop_id.to_string()));
        }

        let url = format!("{}{}", self.config.domain, endpoint);
        let mut wait = Duration::from_secs(1);
        for _ in 0..3 {
            let mut builder = self.http.request(method.clone(), &url).query(&query);
            if let Some(body) = &body {
                builder = builder.json(body);
            }
            let res = builder.send().await.map_err(|e| Error::Transport(e.to_string()))?;
            let body: Json = res.json().await.map_err(|e| Error::Transport(e.to_string()))?;
            let error = body.get("error").and_then(Json::as_str).unwrap_or_default();
            if error.is_empty() {
                return Ok(body);
            }
            if error == "error_server" || error.eq_ignore_ascii_case("api call limit reached") {
                tokio::time::sleep(wait).await;
                wait *= 2;
                continue;
            }
            return Err(Error::VendorError {
                code: error.to_string(),
                message: body.get("message").and_then(Json::as_str).unwrap_or_default().to_string(),
            });
        }
        Err(Error::RateLimited)
    }

    async fn get_item_base_info(&self, item_id: i64) -> Result<Json, Error> {
        let query = vec![("item_id_list".to_string(), item_id.to_string())];
        let body = self.request(reqwest::Method::GET, "/api/v2/product/get_item_base_info", query, None, false, false).await?;
        body.pointer("/response/item_list/0").cloned().ok_or(Error::NotFound)
    }

    async fn get_model_list(&self, item_id: i64) -> Result<Vec<Json>, Error> {
        let query = vec![("item_id".to_string(), item_id.to_string())];
        let body = self.request(reqwest::Method::GET, "/api/v2/product/get_model_list", query, None, false, false).await?;
        Ok(body.pointer("/response/model").and_then(Json::as_array).cloned().unwrap_or_default())
    }

    async fn items_for_item_id(&self, item_id: i64) -> Result<Vec<Item>, Error> {
        let base = self.get_item_base_info(item_id).await?;
        let item_sku = base.get("item_sku").and_then(Json::as_str).unwrap_or_default();
        let has_model = base.get("has_model").and_then(Json::as_bool).unwrap_or(false);

        if !has_model {
            let stocks = base
                .pointer("/stock_info_v2/summary_info/total_available_stock")
                .and_then(Json::as_i64)
                .unwrap_or(0);
            let mut item = Item::new(self.tenant.id.clone(), item_sku, stocks);
            item.tenant_props = json!({ "item_id": item_id, "model_id": 0 });
            return Ok(vec![item]);
        }

        let models = self.get_model_list(item_id).await?;
        let mut items = Vec::with_capacity(models.len());
        for model in &models {
            let seller_sku = model.get("model_sku").and_then(Json::as_str).unwrap_or_default();
            if seller_sku.is_empty() {
                continue;
            }
            let stocks = model
                .pointer("/stock_info_v2/summary_info/total_available_stock")
                .and_then(Json::as_i64)
                .unwrap_or(0);
            let model_id = model.get("model_id").and_then(Json::as_i64).unwrap_or(0);
            let mut item = Item::new(self.tenant.id.clone(), seller_sku, stocks);
            item.tenant_props = json!({ "item_id": item_id, "model_id": model_id });
            items.push(item);
        }
        Ok(items)
    }
}

#[async_trait]
impl Adapter for Client {
    fn identity(&self) -> &Tenant {
        &self.tenant
    }

    async fn collect_all_items(&self) -> Result<Vec<Item>, Error> {
        let mut items = Vec::new();
        let mut offset = 0i64;
        loop {
            let query = vec![
                ("offset".to_string(), offset.to_string()),
                ("page_size".to_string(), PAGE_SIZE.to_string()),
                ("item_status".to_string(), "NORMAL".to_string()),
            ];
            let body = self.request(reqwest::Method::GET, "/api/v2/product/get_item_list", query, None, false, false).await?;
            let item_ids: Vec<i64> = body
                .pointer("/response/item")
                .and_then(Json::as_array)
                .into_iter()
                .flatten()
                .filter_map(|i| i.get("item_id").and_then(Json::as_i64))
                .collect();

            for item_id in &item_ids {
                items.extend(self.items_for_item_id(*item_id).await?);
            }

            let has_more = body.pointer("/response/has_next_page").and_then(Json::as_bool).unwrap_or(false);
            if !has_more || item_ids.is_empty() {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(items)
    }

    async fn load_item(&self, seller_sku: &str) -> Result<Item, Error> {
        let snapshot = self
            .gateway
            .find_first(COLLECTION, "seller_sku", &store::Value::from(seller_sku))
            .await
            .map_err(Error::from_store)?;
        let cached = Item::from_record(&snapshot);
        let item_id = cached.tenant_prop_i64("item_id");

        let live = self.items_for_item_id(item_id).await?;
        live.into_iter().find(|i| i.seller_sku == seller_sku).ok_or(Error::NotFound)
    }

    async fn save_item(&self, item: &Item) -> Result<(), Error> {
        let item_id = item.tenant_prop_i64("item_id");
        let model_id = item.tenant_prop_i64("model_id");
        let payload = json!({
            "item_id": item_id,
            "stock_list": [{ "model_id": model_id, "seller_stock": [{ "stock": item.stocks }] }],
        });
        self.request(reqwest::Method::POST, "/api/v2/product/update_stock", Vec::new(), Some(payload), false, false)
            .await?;

        let seller_sku = item.seller_sku.clone();
        let want = item.stocks;
        scheduler::retry(
            scheduler::RetryConfig {
                retry_wait: Duration::from_secs(1),
                retry_limit: 10,
                backoff_multiply: 2.0,
            },
            || async {
                match self.load_item(&seller_sku).await {
                    Ok(live) => live.stocks == want,
                    Err(_) => false,
                }
            },
        )
        .await
        .map_err(|_| Error::RateLimited)?;
        Ok(())
    }

    fn credentials_manager(&self) -> Option<Arc<dyn CredentialsManager>> {
        Some(Arc::new(self.clone()))
    }

    fn background_service(&self) -> Option<Arc<dyn BackgroundService>> {
        None
    }
}

#[async_trait]
impl CredentialsManager for Client {
    fn generate_authorization_url(&self) -> String {
        let endpoint = "/api/v2/shop/auth_partner";
        let timestamp = Utc::now().timestamp();
        format!(
            "{}{}?partner_id={}&timestamp={}&sign={}&redirect={}",
            self.config.domain,
            endpoint,
            self.config.partner_id,
            timestamp,
            self.signature(endpoint, timestamp),
            self.config.redirect_uri,
        )
    }

    async fn generate_credentials(&self, payload: &Json) -> Result<credentials::Credentials, Error> {
        let code = payload.get("code").and_then(Json::as_str).unwrap_or_default();
        let body = json!({ "code": code, "shop_id": self.config.shop_id, "partner_id": self.config.partner_id });
        let res = self
            .request(reqwest::Method::POST, "/api/v2/auth/token/get", Vec::new(), Some(body), true, true)
            .await?;
        let creds = credentials_from_body(&self.tenant.id, &res);
        *self.credentials.write().await = creds.clone();
        Ok(creds)
    }

    async fn refresh_credentials(&self) -> Result<credentials::Credentials, Error> {
        let refresh_token = self.credentials.read().await.refresh_token.clone();
        let body = json!({
            "shop_id": self.config.shop_id,
            "refresh_token": refresh_token,
            "partner_id": self.config.partner_id,
        });
        let res = self
            .request(reqwest::Method::POST, "/api/v2/auth/access_token/get", Vec::new(), Some(body), true, true)
            .await?;
        let creds = credentials_from_body(&self.tenant.id, &res);
        *self.credentials.write().await = creds.clone();
        Ok(creds)
    }

    fn credentials_expiry(&self) -> DateTime<Utc> {
        self.credentials.try_read().map(|c| c.expires).unwrap_or_else(|_| Utc::now())
    }
}

fn credentials_from_body(tenant_id: &str, body: &Json) -> credentials::Credentials {
    let expire_in = body.get("expire_in").and_then(Json::as_i64).unwrap_or(0);
    credentials::Credentials {
        tenant_id: tenant_id.to_string(),
        access_token: body.get("access_token").and_then(Json::as_str).unwrap_or_default().to_string(),
        refresh_token: body.get("refresh_token").and_then(Json::as_str).unwrap_or_default().to_string(),
        expires: Utc::now() + chrono::Duration::seconds(expire_in),
        created: None,
        updated: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenant::Vendor;

    async fn test_client() -> anyhow::Result<Client> {
        let tenant = Tenant {
            id: "sp-1".to_string(),
            name: "shopee".to_string(),
            vendor: Vendor::Shopee,
            config: Json::Null,
            tenant_group: "group-1".to_string(),
            enable: true,
        };
        let config = Config {
            domain: "https://partner.shopeemobile.com".to_string(),
            shop_id: 1,
            partner_id: 2,
            partner_key: "key".to_string(),
            redirect_uri: "https://example.com/cb".to_string(),
        };
        let credentials = credentials::Credentials {
            tenant_id: "sp-1".to_string(),
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            expires: Utc::now(),
            created: None,
            updated: None,
        };
        let gateway: Arc<dyn store::Gateway> = Arc::new(store::SqlGateway::connect("sqlite::memory:").await?);
        Ok(Client::new(tenant, config, credentials, gateway))
    }

    #[tokio::test]
    async fn signature_is_deterministic() -> anyhow::Result<()> {
        let client = test_client().await?;
        let a = client.signature("/api/v2/product/get_item_list", 1000);
        let b = client.signature("/api/v2/product/get_item_list", 1000);
        assert_eq!(a, b);
        Ok(())
    }

    #[tokio::test]
    async fn signature_differs_by_timestamp() -> anyhow::Result<()> {
        let client = test_client().await?;
        assert_ne!(client.signature("/e", 1), client.signature("/e", 2));
        Ok(())
    }
}
