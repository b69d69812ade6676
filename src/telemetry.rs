use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TelemetryConfig;

/// Initialize logging.
///
/// `RUST_LOG` wins over `config.filter`. With `config.json` set, events are
/// written as JSON lines instead of the compact human format. Fails if a
/// global subscriber is already installed.
pub fn init(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    // stdout belongs to the conversation
    let json_layer = config.json.then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });
    let compact_layer = (!config.json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .compact()
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init()
}
