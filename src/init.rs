use crate::handler::ClickHouseHandler;
use crate::layer::{ClickHouseLayer, PendingInserts};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Options for the global subscriber installed by
/// [`init_tracing_with_config`].
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   stacked next to [`ClickHouseLayer`] so every event is also printed
///   to the console.
/// - `span_groups`: see [`ClickHouseLayer::with_span_groups`].
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub enable_stdout: bool,
    pub span_groups: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            enable_stdout: true,
            span_groups: false,
        }
    }
}

/// Install a global `tracing` subscriber that persists events through
/// `handler`.
///
/// **Parameters**
/// - `handler`: [`ClickHouseHandler`] built from
///   [`HandlerOptions`](crate::config::HandlerOptions).
/// - `config`: [`LayerConfig`] controlling the extra console output and
///   span grouping.
///
/// **Returns**
/// - `Ok(pending)`: await [`PendingInserts::wait`] before shutting the
///   runtime down so in-flight inserts are not dropped.
/// - `Err(..)` if a global subscriber was already installed.
pub fn init_tracing_with_config(
    handler: ClickHouseHandler,
    config: LayerConfig,
) -> Result<PendingInserts, SetGlobalDefaultError> {
    let layer = ClickHouseLayer::new(handler).with_span_groups(config.span_groups);
    let pending = layer.pending();

    // Registry + stacked layers is the fan-out: the same event reaches the
    // ClickHouse layer and, optionally, the console.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(pending)
}

/// Install the global subscriber with [`LayerConfig::default`].
pub fn init_tracing(handler: ClickHouseHandler) -> Result<PendingInserts, SetGlobalDefaultError> {
    init_tracing_with_config(handler, LayerConfig::default())
}
