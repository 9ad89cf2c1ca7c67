//! OpenCart adapter. No REST API: authenticates via a form login against
//! `common/login`, carries the resulting session cookie, and scrapes the
//! admin product list HTML table. Writes are not supported.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value as Json;
use tokio::sync::Mutex;

use tenant::{Adapter, BackgroundService, CredentialsManager, Error, Item, Tenant};

const MESSAGE_NO_RESULTS: &str = "No results!";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub domain: String,
    pub username: String,
    pub password: String,
}

struct ScrapedPage {
    rows: Vec<ScrapedRow>,
    offset: i64,
    limit: i64,
    total: i64,
}

struct ScrapedRow {
    model: String,
    quantity: i64,
    product_name: String,
}

#[derive(Clone)]
pub struct Client {
    tenant: Tenant,
    config: Config,
    http: reqwest::Client,
    logged_in: Arc<Mutex<bool>>,
}

impl Client {
    pub fn new(tenant: Tenant, config: Config) -> Self {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .expect("reqwest client with cookie jar");
        Self {
            tenant,
            config,
            http,
            logged_in: Arc::new(Mutex::new(false)),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        let endpoint = endpoint.trim_start_matches('/');
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}{}", self.config.domain, endpoint)
        }
    }

    async fn ensure_logged_in(&self) -> Result<(), Error> {
        let mut logged_in = self.logged_in.lock().await;
        if *logged_in {
            return Ok(());
        }

        let form = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];
        self.http
            .post(self.url("common/login"))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        *logged_in = true;
        Ok(())
    }

    async fn get_html(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<String, Error> {
        self.ensure_logged_in().await?;
        let res = self
            .http
            .get(self.url(endpoint))
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        res.text().await.map_err(|e| Error::Transport(e.to_string()))
    }

    fn scrape_catalog_product(&self, html: &str) -> Result<ScrapedPage, Error> {
        let document = Html::parse_document(html);
        let row_selector = Selector::parse("#form-product > div > table > tbody > tr").unwrap();
        let cell_selector = |n: usize| Selector::parse(&format!("td:nth-child({n})")).unwrap();

        let mut rows = Vec::new();
        for tr in document.select(&row_selector) {
            let first_cell = tr.select(&cell_selector(1)).next().map(|c| c.text().collect::<String>().trim().to_string()).unwrap_or_default();
            if first_cell == MESSAGE_NO_RESULTS {
                continue;
            }
            let model = tr.select(&cell_selector(4)).next().map(|c| c.text().collect::<String>().trim().to_string()).unwrap_or_default();
            let quantity_selector = Selector::parse("td:nth-child(6) > span").unwrap();
            let quantity_text = tr.select(&quantity_selector).next().map(|c| c.text().collect::<String>().trim().to_string()).unwrap_or_default();
            let product_name = tr.select(&cell_selector(3)).next().map(|c| c.text().collect::<String>().trim().to_string()).unwrap_or_default();

            if model.is_empty() {
                continue;
            }
            rows.push(ScrapedRow {
                model,
                quantity: quantity_text.parse().unwrap_or(0),
                product_name,
            });
        }

        let pagination_selector = Selector::parse("#form-product + div > div + div").unwrap();
        let pagination_text = document
            .select(&pagination_selector)
            .next()
            .map(|e| e.text().collect::<String>())
            .unwrap_or_default();

        let pages_re = Regex::new(r"(?P<offset>\d+) to (?P<offset_limit>\d+) of (?P<total>\d+) \((?P<pages>\d+) Pages\)").unwrap();
        let (offset, limit, total) = match pages_re.captures(&pagination_text) {
            Some(caps) => {
                let offset: i64 = caps.name("offset").map(|m| m.as_str()).unwrap_or("1").parse().unwrap_or(1);
                let offset_limit: i64 = caps.name("offset_limit").map(|m| m.as_str()).unwrap_or("0").parse().unwrap_or(0);
                let total: i64 = caps.name("total").map(|m| m.as_str()).unwrap_or("0").parse().unwrap_or(0);
                (offset - 1, offset_limit - offset + 1, total)
            }
            None => (0, rows.len() as i64, rows.len() as i64),
        };

        Ok(ScrapedPage { rows, offset, limit, total })
    }

    async fn collect_page(&self, page: i64) -> Result<ScrapedPage, Error> {
        let page_str = page.to_string();
        let html = self
            .get_html("index.php?route=catalog/product", &[("page", page_str.as_str())])
            .await?;
        self.scrape_catalog_product(&html)
    }
}

#[async_trait]
impl Adapter for Client {
    fn identity(&self) -> &Tenant {
        &self.tenant
    }

    async fn collect_all_items(&self) -> Result<Vec<Item>, Error> {
        let mut items = Vec::new();
        let mut page = 1i64;
        loop {
            let scraped = self.collect_page(page).await?;
            for row in &scraped.rows {
                let mut item = Item::new(self.tenant.id.clone(), row.model.clone(), row.quantity);
                item.tenant_props = serde_json::json!({ "product_name": row.product_name });
                items.push(item);
            }
            if scraped.offset + scraped.limit >= scraped.total || scraped.rows.is_empty() {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn load_item(&self, seller_sku: &str) -> Result<Item, Error> {
        let items = self.collect_all_items().await?;
        items.into_iter().find(|i| i.seller_sku == seller_sku).ok_or(Error::NotFound)
    }

    async fn save_item(&self, _item: &Item) -> Result<(), Error> {
        Err(Error::Unimplemented)
    }

    fn credentials_manager(&self) -> Option<Arc<dyn CredentialsManager>> {
        None
    }

    fn background_service(&self) -> Option<Arc<dyn BackgroundService>> {
        Some(Arc::new(SaleOrderPoller { client: self.clone() }))
    }
}

/// Periodic sale-order collection loop, grounded on the vendor's own daemon
/// hook. Currently just logs a tick; scraping sale orders is not wired to
/// any consumer yet.
struct SaleOrderPoller {
    client: Client,
}

#[async_trait]
impl BackgroundService for SaleOrderPoller {
    async fn start(&self) -> Result<(), Error> {
        let (_, quit) = scheduler::channel();
        let tenant_id = self.client.tenant.id.clone();
        scheduler::run_loop(
            quit,
            scheduler::LoopConfig {
                initial_wait: Duration::from_secs(0),
                retry_wait: Duration::from_secs(5),
            },
            || {
                let tenant_id = tenant_id.clone();
                async move {
                    tracing::info!(tenant = %tenant_id, "collecting recent sale orders");
                }
            },
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenant::Vendor;

    fn test_client() -> Client {
        let tenant = Tenant {
            id: "oc-1".to_string(),
            name: "opencart".to_string(),
            vendor: Vendor::OpenCart,
            config: Json::Null,
            tenant_group: "group-1".to_string(),
            enable: true,
        };
        let config = Config {
            domain: "https://shop.example.com/admin/".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
        };
        Client::new(tenant, config)
    }

    #[test]
    fn scrapes_product_rows_and_pagination() {
        let client = test_client();
        let html = r#"
            <div id="form-product">
              <div>
                <table><tbody>
                  <tr>
                    <td><input value="42"></td>
                    <td>img</td>
                    <td>Widget</td>
                    <td>WID-1</td>
                    <td>9.99</td>
                    <td><span>7</span></td>
                    <td>Enabled</td>
                  </tr>
                </tbody></table>
              </div>
            </div>
            <div>
              <div>prev</div>
              <div>1 to 1 of 1 (1 Pages)</div>
            </div>
        "#;
        let page = client.scrape_catalog_product(html).unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].model, "WID-1");
        assert_eq!(page.rows[0].quantity, 7);
        assert_eq!(page.total, 1);
    }

    #[test]
    fn skips_no_results_row() {
        let client = test_client();
        let html = r#"
            <div id="form-product">
              <div><table><tbody>
                <tr><td>No results!</td></tr>
              </tbody></table></div>
            </div>
            <div>
              <div>prev</div>
              <div>1 to 0 of 0 (0 Pages)</div>
            </div>
        "#;
        let page = client.scrape_catalog_product(html).unwrap();
        assert!(page.rows.is_empty());
    }
}
