//! Process configuration.
//!
//! One [`RelayConfig`] is built at startup (defaults, env, or both) and its
//! pieces are handed to the components constructed from it. No lazily
//! initialized globals.

use std::time::Duration;

use crate::bus::DEFAULT_SUBSCRIBER_CAPACITY;
use crate::pipeline::engine::DEFAULT_HEARTBEAT_INTERVAL;
use crate::stream::StreamOptions;

/// Tunables for the session/event subsystem.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// SQLite database URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Bounded capacity of each live subscriber queue.
    pub bus_capacity: usize,
    /// Replay page size and keepalive cadence for event streams.
    pub stream: StreamOptions,
    /// Research heartbeat cadence.
    pub heartbeat_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bus_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            stream: StreamOptions::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl RelayConfig {
    /// Load configuration from the environment (after `.env`, if present),
    /// falling back to defaults for anything unset or unparsable.
    ///
    /// Recognized variables:
    /// - `SESSION_RELAY_DATABASE_URL`
    /// - `SESSION_RELAY_BUS_CAPACITY`
    /// - `SESSION_RELAY_REPLAY_PAGE_SIZE`
    /// - `SESSION_RELAY_KEEPALIVE_SECS`
    /// - `SESSION_RELAY_HEARTBEAT_MS`
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(url) = std::env::var("SESSION_RELAY_DATABASE_URL") {
            if !url.is_empty() {
                config.database_url = Some(url);
            }
        }
        if let Some(capacity) = env_parse::<usize>("SESSION_RELAY_BUS_CAPACITY") {
            config.bus_capacity = capacity.max(1);
        }
        if let Some(page) = env_parse::<u32>("SESSION_RELAY_REPLAY_PAGE_SIZE") {
            config.stream.replay_page_size = page.max(1);
        }
        if let Some(secs) = env_parse::<u64>("SESSION_RELAY_KEEPALIVE_SECS") {
            config.stream.keepalive_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = env_parse::<u64>("SESSION_RELAY_HEARTBEAT_MS") {
            config.heartbeat_interval = Duration::from_millis(ms.max(1));
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_component_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.bus_capacity, 200);
        assert_eq!(config.stream.replay_page_size, 500);
        assert_eq!(config.stream.keepalive_interval, Duration::from_secs(15));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
    }
}
