//! Tracing subscriber setup for the CLI and tests
//!
//! Human-readable output goes to stderr so that `storekit get` can stream
//! object bytes on stdout. With a log file configured, events are written
//! as JSON lines to that file instead.

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogConfig;
use crate::error::{StoreError, StoreResult};

/// Install the global subscriber described by `config`
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> StoreResult<()> {
    let filter = store_filter(config)?;

    let file_layer = config
        .log_file
        .as_deref()
        .map(open_log_file)
        .transpose()?
        .map(|file| {
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE)
                .json()
        });

    let stderr_layer = file_layer.is_none().then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| StoreError::InvalidConfig(format!("logging already initialized: {}", e)))
}

fn store_filter(config: &LogConfig) -> StoreResult<EnvFilter> {
    let level = if config.verbose {
        Level::DEBUG
    } else {
        config.level.to_tracing_level()
    };

    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("storekit={}", level)))
        .map_err(|e| StoreError::InvalidConfig(format!("invalid log filter: {}", e)))
}

fn open_log_file(path: &Path) -> StoreResult<File> {
    File::create(path).map_err(|e| {
        StoreError::InvalidConfig(format!("cannot create log file {}: {}", path.display(), e))
    })
}

/// Route storekit events to the test harness output
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storekit=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer().with_target(false).compact())
            .try_init();
    });
}
