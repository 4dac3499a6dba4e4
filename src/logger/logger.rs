use crate::settings::Log;
use anyhow::{Result, anyhow, bail};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

const BOOTSTRAP_FILTER: &str = "info";

/// `EnvFilter` directives, e.g. `info,tokensmith=debug`.
pub struct LogConfig {
    pub filter: String,
}

impl From<&Log> for LogConfig {
    fn from(log: &Log) -> Self {
        LogConfig {
            filter: log.filter.clone(),
        }
    }
}

impl LogConfig {
    fn to_filter(&self) -> Result<EnvFilter> {
        let directives = self.filter.trim();
        if directives.is_empty() {
            bail!("log filter is empty");
        }
        EnvFilter::try_new(directives)
            .map_err(|e| anyhow!("invalid log filter {:?}: {}", directives, e))
    }
}

pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    /// Installs the global subscriber. `RUST_LOG` wins over the bootstrap level
    /// until settings are loaded.
    pub fn new_bootstrap() -> Self {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(BOOTSTRAP_FILTER));
        let (subscriber, logger) = Self::build(filter);
        subscriber.init();
        logger
    }

    fn build(filter: EnvFilter) -> (impl Subscriber + Send + Sync + 'static, Self) {
        let (filter, reload_handle) = reload::Layer::new(filter);
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true));
        (subscriber, Self { reload_handle })
    }

    /// Swaps in the configured filter. A filter that does not parse leaves
    /// the current one in place.
    pub fn reload_from_config(&self, config: &LogConfig) -> Result<()> {
        let filter = config.to_filter()?;
        let rendered = filter.to_string();
        self.reload_handle.reload(filter).map_err(|e| anyhow!(e))?;
        tracing::info!(filter = %rendered, "log filter reloaded");
        Ok(())
    }

    pub fn current_filter(&self) -> Option<String> {
        self.reload_handle
            .with_current(|filter| filter.to_string())
            .ok()
    }
}
