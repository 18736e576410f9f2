//! Settings of the default hyper transport.
//!
//! The pipeline itself has no network settings: everything here tunes the
//! [`HyperClient`](crate::HyperClient) built when no custom transport is set.

use std::time::Duration;

const HEADERS_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_PER_HOST: usize = 32;
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Network settings of [`HyperClient`](crate::HyperClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound between sending a request and receiving its response
    /// headers. A streamed body may keep flowing after it elapsed.
    pub timeout: Duration,
    /// Upper bound for the TCP connect of a new pooled connection.
    pub connect_timeout: Duration,
    /// Keep-alive connections retained for each origin.
    pub pool_idle_per_host: usize,
    /// How long a keep-alive connection may sit unused before it is closed.
    pub pool_idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: HEADERS_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            pool_idle_per_host: IDLE_PER_HOST,
            pool_idle_timeout: IDLE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Start from the default settings.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Incremental [`ClientConfig`]; unset values keep their defaults.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Wait at most `timeout` for response headers.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Give up opening a connection after `timeout`.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Keep at most `count` idle connections per origin; 0 disables reuse.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config.pool_idle_per_host = count;
        self
    }

    /// Close idle connections after `timeout`.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
