//! Entry point (§6 CLI surface): `--nosync` gates the daemon, `--public`
//! gates the static admin-UI server. Exit code 0 on clean shutdown after a
//! signal, non-zero if anything fails during startup.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

#[derive(Debug, Parser)]
#[clap(name = "oclz-sync", version)]
struct Cli {
    /// Skip launching the syncer daemon and only serve the admin UI.
    #[clap(long, default_value_t = true)]
    nosync: bool,

    /// Static file root for the admin UI. Left unset, no HTTP server runs.
    #[clap(long)]
    public: Option<PathBuf>,

    #[clap(long, env = "DATABASE_URL", default_value = "sqlite://oclz.db")]
    database_url: String,

    #[clap(long, env = "TENANT_GROUP", default_value = "circuit.rocks")]
    tenant_group: String,

    #[clap(long, env = "BIND_ADDR", default_value = "127.0.0.1:8090")]
    bind_addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let cli = Cli::parse();
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    common::logger::init_logger("oclz-sync", is_production);

    let gateway: Arc<dyn store::Gateway> =
        Arc::new(store::SqlGateway::connect(&cli.database_url).await.context("connect to record store")?);
    let credentials_store = Arc::new(credentials::Store::new(gateway.clone()));
    let log_sink: Arc<dyn common::LogSink> = Arc::new(store::StoreLogSink::new(gateway.clone()));

    let (quit_handle, quit) = scheduler::channel();

    let daemon_handle = if cli.nosync {
        tracing::info!("--nosync is set, daemon not started");
        None
    } else {
        let syncer = Arc::new(
            syncer::Syncer::register(gateway, credentials_store, log_sink, &cli.tenant_group)
                .await
                .context("register syncer")?,
        );
        Some(tokio::spawn(daemon::start(syncer, quit)))
    };

    let server_handle = cli.public.map(start_admin_ui_server(&cli.bind_addr));

    tokio::signal::ctrl_c().await.context("wait for shutdown signal")?;
    tracing::info!("shutdown signal received");
    quit_handle.signal();

    if let Some(handle) = daemon_handle {
        handle.await.context("daemon task panicked")?;
    }
    if let Some(handle) = server_handle {
        handle.abort();
    }

    Ok(())
}

fn start_admin_ui_server(bind_addr: &str) -> impl FnOnce(PathBuf) -> tokio::task::JoinHandle<()> {
    let bind_addr = bind_addr.to_string();
    move |public_dir: PathBuf| {
        tokio::spawn(async move {
            let app = axum::Router::new().fallback_service(tower_http::services::ServeDir::new(public_dir));
            let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!(addr = %bind_addr, error = %err, "failed to bind admin ui listener");
                    return;
                }
            };
            tracing::info!(addr = %bind_addr, "serving admin ui");
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error = %err, "admin ui server exited");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_skip_daemon_and_admin_ui() {
        let cli = Cli::parse_from(["oclz-sync"]);
        assert!(cli.nosync);
        assert!(cli.public.is_none());
        assert_eq!(cli.tenant_group, "circuit.rocks");
    }

    #[test]
    fn nosync_and_public_are_overridable() {
        let cli = Cli::parse_from(["oclz-sync", "--nosync", "false", "--public", "./admin-ui"]);
        assert!(!cli.nosync);
        assert_eq!(cli.public, Some(PathBuf::from("./admin-ui")));
    }
}
