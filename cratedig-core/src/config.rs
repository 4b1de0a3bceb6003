//! Configuration types

use std::time::Duration;

/// Configuration for the request scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum read admissions inside one rolling window.
    pub ceiling: usize,
    /// Width of the rolling rate window.
    pub window: Duration,
    /// How often a throttled scheduler re-evaluates its state.
    pub recheck_interval: Duration,
    /// How long all admissions stay blocked after a remote failure.
    pub cool_down: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ceiling: 30,
            window: Duration::from_secs(60),
            recheck_interval: Duration::from_secs(1),
            cool_down: Duration::from_secs(10),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = interval;
        self
    }

    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }
}

/// Configuration for the response cache.
#[derive(Debug, Clone)]
pub struct RequestCacheConfig {
    /// Whether read responses are cached at all.
    pub enabled: bool,
    /// Total factory attempts per cache miss before the failure surfaces.
    pub retry_limit: u32,
}

impl Default for RequestCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_limit: 3,
        }
    }
}

impl RequestCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }
}

/// Configuration for the HTTP transport.
///
/// The base URL is required; there is no sensible default remote.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    /// Personal access token, sent as `Authorization: Token {token}`.
    pub token: Option<String>,
    pub user_agent: String,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            user_agent: format!("cratedig/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
