use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initializes the global tracing subscriber once per process.
///
/// `json` selects structured JSON output (production) vs. pretty output
/// (local dev), mirroring how the daemon and the CLI each pick a mode from
/// `APP_ENV`.
pub fn init_logger(service_name: &'static str, json: bool) {
    LOGGER_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let base = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        if json {
            base.json().init();
        } else {
            base.pretty().init();
        }

        tracing::info!(service = service_name, "logger initialized");
    });
}
