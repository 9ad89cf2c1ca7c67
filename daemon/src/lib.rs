//! Drives a registered [`syncer::Syncer`]: per-tenant background jobs plus
//! the three periodic loops described in §4.G.

use std::sync::Arc;
use std::time::Duration;

use syncer::Syncer;

const INVENTORY_REFRESH_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);
const CREDENTIALS_REFRESH_PERIOD: Duration = Duration::from_secs(30 * 60);
const SYNC_LOOP_INITIAL_WAIT: Duration = Duration::from_secs(60 * 60);
const SYNC_LOOP_PERIOD: Duration = Duration::from_secs(3 * 60 * 60);

/// Runs a syncer's background jobs and periodic loops until `quit` is
/// signaled. Returns once every spawned task has observed quit and
/// finished its current tick.
pub async fn start(syncer: Arc<Syncer>, quit: scheduler::Quit) {
    let mut handles = Vec::new();

    for (name, job) in syncer.background_services() {
        let quit = quit.clone();
        handles.push(tokio::spawn(async move {
            tracing::info!(tenant = name, "background job has started");
            match run_background_job(job, quit).await {
                Ok(()) => tracing::info!(tenant = name, "background job has finished"),
                Err(err) => tracing::error!(tenant = name, error = %err, "background job has unexpectedly halted"),
            }
        }));
    }

    handles.push(tokio::spawn(inventory_refresh_loop(syncer.clone(), quit.clone())));
    handles.push(tokio::spawn(credentials_refresh_loop(syncer.clone(), quit.clone())));
    handles.push(tokio::spawn(sync_loop(syncer, quit)));

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "daemon task panicked");
        }
    }
}

async fn run_background_job(job: Arc<dyn tenant::BackgroundService>, mut quit: scheduler::Quit) -> Result<(), tenant::Error> {
    tokio::select! {
        result = job.start() => result,
        _ = quit.signaled() => Ok(()),
    }
}

/// §4.G step 2, "Inventory refresh": every 24h, starts immediately. A
/// missing intent tenant is a warning, not a fatal error — a group can
/// exist purely to collect/refresh without ever reconciling (§3 Tenant
/// Group invariant).
async fn inventory_refresh_loop(syncer: Arc<Syncer>, quit: scheduler::Quit) {
    let config = scheduler::LoopConfig { initial_wait: Duration::ZERO, retry_wait: INVENTORY_REFRESH_PERIOD };
    scheduler::run_loop(quit, config, || async {
        tracing::info!("collecting inventory...");
        match syncer.collect_all_items().await {
            Ok(()) => {}
            Err(syncer::Error::NoIntentTenant) => {
                tracing::warn!("no intent tenant registered, skipping inventory refresh");
            }
            Err(err) => {
                tracing::error!(error = %err, "collect all live tenant items failed");
                std::process::exit(1);
            }
        }
    })
    .await;
}

/// §4.G step 2, "Credentials refresh": every 30 min, starts immediately.
async fn credentials_refresh_loop(syncer: Arc<Syncer>, quit: scheduler::Quit) {
    let config = scheduler::LoopConfig { initial_wait: Duration::ZERO, retry_wait: CREDENTIALS_REFRESH_PERIOD };
    scheduler::run_loop(quit, config, || async {
        tracing::info!("refreshing oauth2 credentials...");
        if let Err(err) = syncer.refresh_credentials().await {
            tracing::error!(error = %err, "refreshing all tenants credentials failed");
            std::process::exit(1);
        }
    })
    .await;
}

/// §4.G step 2, "Sync loop": the foreground loop. Enumerates the intent
/// tenant's SKUs and syncs each sequentially — no parallel per-SKU sync
/// within one pass (§5 Concurrency model).
async fn sync_loop(syncer: Arc<Syncer>, quit: scheduler::Quit) {
    let config = scheduler::LoopConfig { initial_wait: SYNC_LOOP_INITIAL_WAIT, retry_wait: SYNC_LOOP_PERIOD };
    scheduler::run_loop(quit, config, || async {
        tracing::info!("sync inventory...");
        let seller_skus = match syncer.intent_skus().await {
            Ok(skus) => skus,
            Err(err) => {
                tracing::error!(error = %err, "collect all intent items failed");
                std::process::exit(1);
            }
        };
        for seller_sku in seller_skus {
            if let Err(err) = syncer.sync_item(&seller_sku).await {
                tracing::error!(seller_sku, error = %err, "syncing item failed");
                std::process::exit(1);
            }
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_returns_once_quit_is_signaled() -> anyhow::Result<()> {
        let gateway = Arc::new(store::SqlGateway::connect("sqlite::memory:").await?);
        let credentials_store = Arc::new(credentials::Store::new(gateway.clone()));
        let log_sink: Arc<dyn common::LogSink> = Arc::new(common::TracingLogSink);

        let group = store::Record::new("group-1").set("name", "test-group").set("config", serde_json::json!({}));
        gateway.create("tenant_groups", group).await?;

        let (quit_handle, quit) = scheduler::channel();
        let syncer =
            Arc::new(syncer::Syncer::register(gateway, credentials_store, log_sink, "test-group").await?);

        let handle = tokio::spawn(start(syncer, quit));
        quit_handle.signal();
        tokio::time::timeout(Duration::from_secs(5), handle).await??;
        Ok(())
    }
}
