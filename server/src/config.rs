//! Runtime configuration for a bitforest server instance.
//!
//! Mirrors `obscura_core::config`'s shape: a plain [`Config`] struct with a
//! [`Default`] impl, built up through the fluent [`ConfigBuilder`].
//!
//! ```
//! use bitforest_server::config::Config;
//!
//! let cfg = Config::default();
//! assert_eq!(cfg.anchor_interval_secs, 600);
//! ```

use serde::{Deserialize, Serialize};

/// Runtime configuration shared across a server instance's background
/// tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Seconds between anchor-loop ticks; ticks align to absolute
    /// `k * anchor_interval_secs` boundaries since the Unix epoch.
    pub anchor_interval_secs: u64,

    /// Dust-threshold output value, in satoshis, for the commitment output.
    pub dust_sats: u64,

    /// Reserved name under which each tick's synthetic heartbeat operation
    /// is staged.
    pub heartbeat_name: String,

    /// WIF-encoded private key used to sign anchor transactions.
    pub wif_key: String,

    /// Path to the diff-forest's SQLite database.
    pub forest_db_path: String,

    /// Path to the anchor pipeline's SQLite database.
    pub anchor_db_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            anchor_interval_secs: 600,
            dust_sats: 10_000,
            heartbeat_name: "__heartbeat__".into(),
            wif_key: String::new(),
            forest_db_path: ":memory:".into(),
            anchor_db_path: ":memory:".into(),
        }
    }
}

/// Fluent builder for [`Config`].
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    /// Starts a new builder pre-populated with [`Config::default`].
    pub fn new() -> Self {
        Self { inner: Config::default() }
    }

    pub fn anchor_interval_secs(mut self, secs: u64) -> Self {
        self.inner.anchor_interval_secs = secs;
        self
    }

    pub fn dust_sats(mut self, sats: u64) -> Self {
        self.inner.dust_sats = sats;
        self
    }

    pub fn heartbeat_name<S: Into<String>>(mut self, name: S) -> Self {
        self.inner.heartbeat_name = name.into();
        self
    }

    pub fn wif_key<S: Into<String>>(mut self, wif: S) -> Self {
        self.inner.wif_key = wif.into();
        self
    }

    pub fn forest_db_path<S: Into<String>>(mut self, path: S) -> Self {
        self.inner.forest_db_path = path.into();
        self
    }

    pub fn anchor_db_path<S: Into<String>>(mut self, path: S) -> Self {
        self.inner.anchor_db_path = path.into();
        self
    }

    /// Consumes the builder returning an immutable configuration value.
    pub fn finish(self) -> Config {
        self.inner
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .anchor_interval_secs(60)
            .dust_sats(5_000)
            .heartbeat_name("tick")
            .wif_key("cVt4o7BGAig1UXywgGSmARhxMdzP5qvQsxKkSsc1XEkw3tDTQFpy")
            .forest_db_path("/tmp/forest.db")
            .anchor_db_path("/tmp/anchor.db")
            .finish();
        assert_eq!(cfg.anchor_interval_secs, 60);
        assert_eq!(cfg.dust_sats, 5_000);
        assert_eq!(cfg.heartbeat_name, "tick");
        assert_eq!(cfg.forest_db_path, "/tmp/forest.db");
    }
}
