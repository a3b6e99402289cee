use tracing_subscriber::{fmt, EnvFilter};

use crate::conf;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init() -> anyhow::Result<()> {
    let level = conf::global().log_level;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str().to_lowercase()))?;
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}
