//! Log output for the binaries: a `tracing-subscriber` fmt layer
//! behind an `EnvFilter`. `RUST_LOG`, when set, wins over the level
//! from the command line.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub with_timestamps: bool,
    /// Show the module path of each event.
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig { level: Level::INFO, with_timestamps: true, with_target: false }
    }
}

impl LogConfig {
    /// 0 `-v`: info, 1: debug, more: trace.
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        LogConfig { level, ..Default::default() }
    }

    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.with_timestamps = enable;
        self
    }

    pub fn with_target(mut self, enable: bool) -> Self {
        self.with_target = enable;
        self
    }
}

/// Our crates at the configured level, dependencies at warn.
fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_str().to_lowercase();
        EnvFilter::new(format!("warn,ammo={level},ammo_dom={level},\
                                users_list={level},contacts_server={level}"))
    })
}

/// Install the global subscriber; fails if one is installed already.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = build_env_filter(config.level);
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.with_target);
    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.with_timestamps {
        registry.with(layer).try_init()
    } else {
        registry.with(layer.without_time()).try_init()
    };
    result.map_err(|e| anyhow!("could not install log subscriber: {e}"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_from_verbosity() {
        assert_eq!(LogConfig::from_verbosity(0).level, Level::INFO);
        assert_eq!(LogConfig::from_verbosity(1).level, Level::DEBUG);
        assert_eq!(LogConfig::from_verbosity(7).level, Level::TRACE);
        assert!(!LogConfig::default().with_timestamps(false).with_timestamps);
    }
}
