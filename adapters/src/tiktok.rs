//! TikTok Shop adapter. Items live at `data.products[*].skus[*]`; stock is
//! summed across `stock_infos` entries matching the configured warehouse.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value as Json, json};
use tokio::sync::RwLock;

use tenant::{Adapter, BackgroundService, CredentialsManager, Error, Item, Tenant};

use crate::signing::{hmac_sha256_hex, sorted_key_value_concat};

const PAGE_SIZE: i64 = 50;
const MESSAGE_OK: &str = "success";
const AUTH_DOMAIN: &str = "https://auth.tiktok-shops.com";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub domain: String,
    pub app_key: String,
    pub app_secret: String,
    pub shop_id: String,
    #[serde(default)]
    pub warehouse_id: String,
    #[serde(default)]
    pub redirect_uri: String,
}

#[derive(Clone)]
pub struct Client {
    tenant: Tenant,
    config: Arc<RwLock<Config>>,
    credentials: Arc<RwLock<credentials::Credentials>>,
    http: reqwest::Client,
}

impl Client {
    pub fn new(tenant: Tenant, config: Config, credentials: credentials::Credentials) -> Self {
        Self {
            tenant,
            config: Arc::new(RwLock::new(config)),
            credentials: Arc::new(RwLock::new(credentials)),
            http: reqwest::Client::new(),
        }
    }

    async fn signed_query(&self, endpoint: &str, access_token: Option<&str>) -> Vec<(String, String)> {
        let config = self.config.read().await;
        let timestamp = Utc::now().timestamp().to_string();
        let mut params = vec![
            ("app_key".to_string(), config.app_key.clone()),
            ("timestamp".to_string(), timestamp),
            ("shop_id".to_string(), config.shop_id.clone()),
        ];

        let pairs: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let concat = sorted_key_value_concat(&pairs);
        let base = format!("{}{}{}{}", config.app_secret, endpoint, concat, config.app_secret);
        let sign = hmac_sha256_hex(&config.app_secret, &base);
        params.push(("sign".to_string(), sign));

        if let Some(token) = access_token {
            params.push(("access_token".to_string(), token.to_string()));
        }
        params
    }

    async fn get(&self, endpoint: &str) -> Result<Json, Error> {
        let token = self.credentials.read().await.access_token.clone();
        let query = self.signed_query(endpoint, Some(&token)).await;
        let url = format!("{}{}", self.config.read().await.domain, endpoint);
        self.send(|| self.http.get(&url).query(&query)).await
    }

    async fn post(&self, endpoint: &str, body: &Json) -> Result<Json, Error> {
        let token = self.credentials.read().await.access_token.clone();
        let query = self.signed_query(endpoint, Some(&token)).await;
        let url = format!("{}{}", self.config.read().await.domain, endpoint);
        self.send(|| self.http.post(&url).query(&query).json(body)).await
    }

    async fn put(&self, endpoint: &str, body: &Json) -> Result<Json, Error> {
        let token = self.credentials.read().await.access_token.clone();
        let query = self.signed_query(endpoint, Some(&token)).await;
        let url = format!("{}{}", self.config.read().await.domain, endpoint);
        self.send(|| self.http.put(&url).query(&query).json(body)).await
    }

    async fn send<F>(&self, build: F) -> Result<Json, Error>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut wait = Duration::from_secs(1);
        for _ in 0..3 {
            let res = build().send().await.map_err(|e| Error::Transport(e.to_string()))?;
            let body: Json = res.json().await.map_err(|e| Error::Transport(e.to_string()))?;
            let message = body.get("message").and_then(Json::as_str).unwrap_or_default();
            if message.eq_ignore_ascii_case(MESSAGE_OK) {
                return Ok(body.get("data").cloned().unwrap_or(Json::Null));
            }
            if message.eq_ignore_ascii_case("rate limit") {
                tokio::time::sleep(wait).await;
                wait *= 2;
                continue;
            }
            return Err(Error::VendorError {
                code: body.get("code").map(|v| v.to_string()).unwrap_or_default(),
                message: message.to_string(),
            });
        }
        Err(Error::RateLimited)
    }

    fn parse_items_from_search(&self, data: &Json, warehouse_id: &str) -> Vec<Item> {
        let mut items = Vec::new();
        for product in data.get("products").and_then(Json::as_array).into_iter().flatten() {
            let product_id = product.get("id").and_then(Json::as_str).unwrap_or_default();
            for sku in product.get("skus").and_then(Json::as_array).into_iter().flatten() {
                let seller_sku = sku.get("seller_sku").and_then(Json::as_str).unwrap_or_default();
                if seller_sku.is_empty() {
                    continue;
                }
                let mut stocks = 0i64;
                for info in sku.get("stock_infos").and_then(Json::as_array).into_iter().flatten() {
                    if info.get("warehouse_id").and_then(Json::as_str) == Some(warehouse_id) {
                        stocks += info.get("available_stock").and_then(Json::as_i64).unwrap_or(0);
                    }
                }
                let sku_id = sku.get("id").and_then(Json::as_str).unwrap_or_default();
                let mut item = Item::new(self.tenant.id.clone(), seller_sku, stocks);
                item.tenant_props = json!({ "product_id": product_id, "sku_id": sku_id });
                items.push(item);
            }
        }
        items
    }

    async fn ensure_warehouse_id(&self) -> Result<String, Error> {
        {
            let config = self.config.read().await;
            if !config.warehouse_id.is_empty() {
                return Ok(config.warehouse_id.clone());
            }
        }
        let data = self.get("/api/logistics/get_warehouse_list").await?;
        let warehouse_id = data
            .get("warehouse_list")
            .and_then(Json::as_array)
            .into_iter()
            .flatten()
            .find(|w| w.get("warehouse_type").and_then(Json::as_i64) == Some(1))
            .and_then(|w| w.get("warehouse_id"))
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();
        self.config.write().await.warehouse_id = warehouse_id.clone();
        Ok(warehouse_id)
    }

    async fn token_request(&self, endpoint: &str, extra: &[(&str, &str)]) -> Result<credentials::Credentials, Error> {
        let config = self.config.read().await;
        let mut query = vec![("app_key", config.app_key.as_str())];
        query.extend_from_slice(extra);
        let url = format!("{}{}", AUTH_DOMAIN, endpoint);
        let res = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let body: Json = res.json().await.map_err(|e| Error::Transport(e.to_string()))?;
        let data = body.get("data").cloned().unwrap_or(Json::Null);
        let expires_in = data.get("access_token_expire_in").and_then(Json::as_i64).unwrap_or(0);
        Ok(credentials::Credentials {
            tenant_id: self.tenant.id.clone(),
            access_token: data.get("access_token").and_then(Json::as_str).unwrap_or_default().to_string(),
            refresh_token: data.get("refresh_token").and_then(Json::as_str).unwrap_or_default().to_string(),
            expires: DateTime::<Utc>::from_timestamp(expires_in, 0).unwrap_or_else(Utc::now),
            created: None,
            updated: None,
        })
    }
}

#[async_trait]
impl Adapter for Client {
    fn identity(&self) -> &Tenant {
        &self.tenant
    }

    async fn collect_all_items(&self) -> Result<Vec<Item>, Error> {
        let warehouse_id = self.ensure_warehouse_id().await?;

        let mut items = Vec::new();
        let mut page = 1i64;
        loop {
            let payload = json!({ "page_number": page, "page_size": PAGE_SIZE });
            let data = self.post("/api/products/search", &payload).await?;
            items.extend(self.parse_items_from_search(&data, &warehouse_id));
            let total = data.get("total").and_then(Json::as_i64).unwrap_or(0);
            if page * PAGE_SIZE >= total {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn load_item(&self, seller_sku: &str) -> Result<Item, Error> {
        let warehouse_id = self.ensure_warehouse_id().await?;
        let mut page = 1i64;
        loop {
            let payload = json!({ "page_number": page, "page_size": PAGE_SIZE });
            let data = self.post("/api/products/search", &payload).await?;
            let items = self.parse_items_from_search(&data, &warehouse_id);
            let matches: Vec<Item> = items.into_iter().filter(|i| i.seller_sku == seller_sku).collect();
            if matches.len() > 1 {
                return Err(Error::MultipleItems);
            }
            if let Some(item) = matches.into_iter().next() {
                return Ok(item);
            }
            let total = data.get("total").and_then(Json::as_i64).unwrap_or(0);
            if page * PAGE_SIZE >= total {
                return Err(Error::NotFound);
            }
            page += 1;
        }
    }

    async fn save_item(&self, item: &Item) -> Result<(), Error> {
        let warehouse_id = self.ensure_warehouse_id().await?;
        let payload = json!({
            "product_id": item.tenant_prop_str("product_id"),
            "skus": [{
                "id": item.tenant_prop_str("sku_id"),
                "stock_infos": [{
                    "available_stock": item.stocks,
                    "warehouse_id": warehouse_id,
                }],
            }],
        });
        self.put("/api/products/stocks", &payload).await?;

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
        format!(
            "https://auth.tiktok-shops.com/oauth/authorize?app_key={}&state={}",
            self.tenant.id, self.tenant.id
        )
    }

    async fn generate_credentials(&self, payload: &Json) -> Result<credentials::Credentials, Error> {
        let code = payload.get("code").and_then(Json::as_str).unwrap_or_default();
        let config = self.config.read().await.clone();
        let creds = self
            .token_request(
                "/api/v2/token/get",
                &[("app_secret", config.app_secret.as_str()), ("auth_code", code), ("grant_type", "authorized_code")],
            )
            .await?;
        *self.credentials.write().await = creds.clone();
        Ok(creds)
    }

    async fn refresh_credentials(&self) -> Result<credentials::Credentials, Error> {
        let refresh_token = self.credentials.read().await.refresh_token.clone();
        let config = self.config.read().await.clone();
        let creds = self
            .token_request(
                "/api/v2/token/refresh",
                &[("app_secret", config.app_secret.as_str()), ("refresh_token", refresh_token.as_str()), ("grant_type", "refresh_token")],
            )
            .await?;
        *self.credentials.write().await = creds.clone();
        Ok(creds)
    }

    fn credentials_expiry(&self) -> DateTime<Utc> {
        // CredentialsManager::credentials_expiry is a sync accessor; a
        // best-effort non-blocking read keeps it off the async runtime.
        self.credentials.try_read().map(|c| c.expires).unwrap_or_else(|_| Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenant::Vendor;

    fn test_client() -> Client {
        let tenant = Tenant {
            id: "tt-1".to_string(),
            name: "tiktok".to_string(),
            vendor: Vendor::TikTok,
            config: Json::Null,
            tenant_group: "group-1".to_string(),
            enable: true,
        };
        let config = Config {
            domain: "https://open-api.tiktokglobalshop.com".to_string(),
            app_key: "key".to_string(),
            app_secret: "secret".to_string(),
            shop_id: "shop-1".to_string(),
            warehouse_id: "wh-1".to_string(),
            redirect_uri: String::new(),
        };
        let credentials = credentials::Credentials {
            tenant_id: "tt-1".to_string(),
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            expires: Utc::now(),
            created: None,
            updated: None,
        };
        Client::new(tenant, config, credentials)
    }

    #[test]
    fn sorted_key_value_concat_is_order_independent() {
        let a = sorted_key_value_concat(&[("b", "2"), ("a", "1")]);
        let b = sorted_key_value_concat(&[("a", "1"), ("b", "2")]);
        assert_eq!(a, b);
        assert_eq!(a, "a1b2");
    }

    #[test]
    fn parse_items_from_search_sums_matching_warehouse_stock() {
        let client = test_client();
        let data = json!({
            "products": [{
                "id": "prod-1",
                "skus": [{
                    "id": "sku-1",
                    "seller_sku": "SKU-A",
                    "stock_infos": [
                        { "warehouse_id": "wh-1", "available_stock": 7 },
                        { "warehouse_id": "wh-other", "available_stock": 99 },
                    ],
                }],
            }],
        });

        let items = client.parse_items_from_search(&data, "wh-1");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].seller_sku, "SKU-A");
        assert_eq!(items[0].stocks, 7);
        assert_eq!(items[0].tenant_prop_str("product_id"), "prod-1");
        assert_eq!(items[0].tenant_prop_str("sku_id"), "sku-1");
    }

    #[test]
    fn parse_items_from_search_skips_skus_without_seller_sku() {
        let client = test_client();
        let data = json!({
            "products": [{
                "id": "prod-1",
                "skus": [{ "id": "sku-1", "stock_infos": [] }],
            }],
        });

        assert!(client.parse_items_from_search(&data, "wh-1").is_empty());
    }
}
