//! Log sink setup for the binary.

use std::io;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

use crate::config::LogSettings;

/// Resolves the level to log at. `verbose` forces debug, unknown names fall
/// back to info.
pub fn level(settings: &LogSettings) -> LevelFilter {
    if settings.verbose {
        return LevelFilter::DEBUG;
    }
    LevelFilter::from_str(settings.level.trim()).unwrap_or(LevelFilter::INFO)
}

/// Builds the formatting layer writing to `writer`: JSON lines, or the
/// compact console format when `console` is set.
///
/// JSON records carry the innermost span under `span` and the whole stack
/// under `spans`.
pub fn layer<W>(settings: &LogSettings, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = level(settings);
    if settings.console {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(true)
            .compact()
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed()
    }
}

/// Installs the global subscriber writing to stdout.
pub fn init(settings: &LogSettings) {
    // a subscriber may already be set, e.g. by tests
    let _ = tracing_subscriber::registry()
        .with(layer(settings, io::stdout))
        .try_init();
}
