//! Lazada adapter. Items live at `data.products[*].skus[*]`; each SKU's
//! `reserved` quantity (multi-warehouse total minus sellable) is cached in
//! `tenant_props` so a later `save_item` can add it back into the pushed
//! quantity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value as Json, json};
use tokio::sync::RwLock;

use tenant::{Adapter, BackgroundService, CredentialsManager, Error, Item, Tenant};

use crate::signing::{hmac_sha256_hex_upper, sorted_key_value_concat};

const LIMIT: i64 = 50;
const CODE_OK: &str = "0";
const CODE_CALL_LIMIT: &str = "ApiCallLimit";
const AUTH_DOMAIN: &str = "https://auth.lazada.com";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub domain: String,
    pub app_key: String,
    pub app_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
}

#[derive(Clone)]
pub struct Client {
    tenant: Tenant,
    config: Config,
    credentials: Arc<RwLock<credentials::Credentials>>,
    http: reqwest::Client,
}

impl Client {
    pub fn new(tenant: Tenant, config: Config, credentials: credentials::Credentials) -> Self {
        Self {
            tenant,
            config,
            credentials: Arc::new(RwLock::new(credentials)),
            http: reqwest::Client::new(),
        }
    }

    fn signature(&self, endpoint: &str, query: &[(String, String)]) -> String {
        let pairs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let concat = sorted_key_value_concat(&pairs);
        let base = format!("{endpoint}{concat}");
        hmac_sha256_hex_upper(&self.config.app_secret, &base)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        mut query: Vec<(String, String)>,
        form: Option<Vec<(String, String)>>,
    ) -> Result<Json, Error> {
        let access_token = self.credentials.read().await.access_token.clone();
        query.push(("app_key".to_string(), self.config.app_key.clone()));
        query.push(("timestamp".to_string(), Utc::now().timestamp_millis().to_string()));
        query.push(("access_token".to_string(), access_token));
        query.push(("sign_method".to_string(), "sha256".to_string()));
        let sign = self.signature(endpoint, &query);
        query.push(("sign".to_string(), sign));

        let url = format!("{}{}", self.config.domain, endpoint);

        let mut wait = Duration::from_secs(1);
        for _ in 0..3 {
            let mut builder = self.http.request(method.clone(), &url).query(&query);
            if let Some(form) = &form {
                builder = builder.form(form);
            }
            let res = builder.send().await.map_err(|e| Error::Transport(e.to_string()))?;
            let body: Json = res.json().await.map_err(|e| Error::Transport(e.to_string()))?;
            let code = body.get("code").and_then(Json::as_str).unwrap_or_default();
            if code == CODE_OK {
                return Ok(body);
            }
            if code == CODE_CALL_LIMIT {
                tokio::time::sleep(wait).await;
                wait *= 2;
                continue;
            }
            return Err(Error::VendorError {
                code: code.to_string(),
                message: body.get("message").and_then(Json::as_str).unwrap_or_default().to_string(),
            });
        }
        Err(Error::RateLimited)
    }

    fn parse_items_from_product(&self, product: &Json) -> Vec<Item> {
        let item_id = product.get("item_id").and_then(Json::as_i64).unwrap_or(0);
        let mut items = Vec::new();
        for sku in product.get("skus").and_then(Json::as_array).into_iter().flatten() {
            let seller_sku = sku.get("SellerSku").and_then(Json::as_str).unwrap_or_default();
            if seller_sku.is_empty() {
                continue;
            }
            let sellable = sku.get("quantity").and_then(Json::as_i64).unwrap_or(0);
            let total: i64 = sku
                .get("multiWarehouseInventories")
                .and_then(Json::as_array)
                .into_iter()
                .flatten()
                .map(|w| w.get("totalQuantity").and_then(Json::as_i64).unwrap_or(0))
                .sum();

            let mut item = Item::new(self.tenant.id.clone(), seller_sku, sellable);
            item.tenant_props = json!({
                "item_id": item_id,
                "sku_id": sku.get("SkuId").and_then(Json::as_i64).unwrap_or(0),
                "shop_sku": sku.get("ShopSku").and_then(Json::as_str).unwrap_or_default(),
                "price": sku.get("price").and_then(Json::as_f64).unwrap_or(0.0),
                "reserved": total - sellable,
            });
            items.push(item);
        }
        items
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
            let query = vec![("offset".to_string(), offset.to_string()), ("limit".to_string(), LIMIT.to_string())];
            let body = self.request(reqwest::Method::GET, "/products/get", query, None).await?;
            let products = body.pointer("/data/products").and_then(Json::as_array).cloned().unwrap_or_default();
            for product in &products {
                items.extend(self.parse_items_from_product(product));
            }
            let total = body.pointer("/data/total_products").and_then(Json::as_i64).unwrap_or(0);
            offset += LIMIT;
            if offset >= total {
                break;
            }
        }
        Ok(items)
    }

    async fn load_item(&self, seller_sku: &str) -> Result<Item, Error> {
        let query = vec![("seller_sku".to_string(), seller_sku.to_string())];
        let body = self.request(reqwest::Method::GET, "/product/item/get", query, None).await?;
        let data = body.get("data").cloned().unwrap_or(Json::Null);
        let items = self.parse_items_from_product(&data);
        items.into_iter().next().ok_or(Error::NotFound)
    }

    async fn save_item(&self, item: &Item) -> Result<(), Error> {
        let quantity = item.stocks + item.tenant_prop_i64("reserved");
        let payload = format!(
            "<Request><Product><Skus><Sku><ItemId>{}</ItemId><SkuId>{}</SkuId><SellerSku>{}</SellerSku><Quantity>{}</Quantity></Sku></Skus></Product></Request>",
            item.tenant_prop_i64("item_id"),
            item.tenant_prop_i64("sku_id"),
            item.seller_sku,
            quantity,
        );
        let form = vec![("payload".to_string(), payload)];
        self.request(reqwest::Method::POST, "/product/price_quantity/update", Vec::new(), Some(form))
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
        format!(
            "{AUTH_DOMAIN}/oauth/authorize?response_type=code&force_auth=true&redirect_uri={}&client_id={}",
            self.config.redirect_uri, self.config.app_key
        )
    }

    async fn generate_credentials(&self, payload: &Json) -> Result<credentials::Credentials, Error> {
        let code = payload.get("code").and_then(Json::as_str).unwrap_or_default();
        let url = format!("{AUTH_DOMAIN}/rest/auth/token/create");
        let res = self
            .http
            .get(&url)
            .query(&[("code", code)])
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let body: Json = res.json().await.map_err(|e| Error::Transport(e.to_string()))?;
        let creds = credentials_from_body(&self.tenant.id, &body);
        *self.credentials.write().await = creds.clone();
        Ok(creds)
    }

    async fn refresh_credentials(&self) -> Result<credentials::Credentials, Error> {
        let refresh_token = self.credentials.read().await.refresh_token.clone();
        let url = format!("{AUTH_DOMAIN}/rest/auth/token/refresh");
        let res = self
            .http
            .get(&url)
            .query(&[("refresh_token", refresh_token.as_str())])
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let body: Json = res.json().await.map_err(|e| Error::Transport(e.to_string()))?;
        let creds = credentials_from_body(&self.tenant.id, &body);
        *self.credentials.write().await = creds.clone();
        Ok(creds)
    }

    fn credentials_expiry(&self) -> DateTime<Utc> {
        self.credentials.try_read().map(|c| c.expires).unwrap_or_else(|_| Utc::now())
    }
}

fn credentials_from_body(tenant_id: &str, body: &Json) -> credentials::Credentials {
    let expires_in = body.get("expires_in").and_then(Json::as_i64).unwrap_or(0);
    credentials::Credentials {
        tenant_id: tenant_id.to_string(),
        access_token: body.get("access_token").and_then(Json::as_str).unwrap_or_default().to_string(),
        refresh_token: body.get("refresh_token").and_then(Json::as_str).unwrap_or_default().to_string(),
        expires: Utc::now() + chrono::Duration::seconds(expires_in),
        created: None,
        updated: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenant::Vendor;

    fn test_client() -> Client {
        let tenant = Tenant {
            id: "lz-1".to_string(),
            name: "lazada".to_string(),
            vendor: Vendor::Lazada,
            config: Json::Null,
            tenant_group: "group-1".to_string(),
            enable: true,
        };
        let config = Config {
            domain: "https://api.lazada.com/rest".to_string(),
            app_key: "key".to_string(),
            app_secret: "secret".to_string(),
            redirect_uri: "https://example.com/callback".to_string(),
        };
        let credentials = credentials::Credentials {
            tenant_id: "lz-1".to_string(),
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            expires: Utc::now(),
            created: None,
            updated: None,
        };
        Client::new(tenant, config, credentials)
    }

    #[test]
    fn signature_is_uppercase_hex() {
        let client = test_client();
        let sign = client.signature("/products/get", &[("app_key".to_string(), "key".to_string())]);
        assert_eq!(sign, sign.to_uppercase());
        assert!(sign.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parse_items_from_product_computes_reserved_quantity() {
        let client = test_client();
        let product = json!({
            "item_id": 111,
            "skus": [{
                "SellerSku": "SKU-A",
                "SkuId": 222,
                "ShopSku": "SHOP-A",
                "quantity": 5,
                "price": 9.99,
                "multiWarehouseInventories": [
                    { "totalQuantity": 3 },
                    { "totalQuantity": 4 },
                ],
            }],
        });

        let items = client.parse_items_from_product(&product);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].stocks, 5);
        assert_eq!(items[0].tenant_prop_i64("reserved"), 2);
        assert_eq!(items[0].tenant_prop_i64("item_id"), 111);
    }

    #[test]
    fn parse_items_from_product_skips_missing_seller_sku() {
        let client = test_client();
        let product = json!({ "item_id": 1, "skus": [{ "SkuId": 1 }] });
        assert!(client.parse_items_from_product(&product).is_empty());
    }
}
