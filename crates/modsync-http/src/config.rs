//! Configuration for the catalog transport.

use std::time::Duration;

use modsync_core::{Environment, SessionOptions};

/// Catalog API root for [`Environment::Live`].
pub const LIVE_BASE_URL: &str = "https://api.mod.io/v1";

/// Catalog API root for [`Environment::Test`].
pub const TEST_BASE_URL: &str = "https://api.test.mod.io/v1";

/// Configuration for [`crate::ReqwestTransport`].
///
/// # Example
///
/// ```
/// use modsync_http::HttpTransportConfig;
/// use std::time::Duration;
///
/// let config = HttpTransportConfig::new()
///     .with_api_key("key")
///     .with_timeout(Duration::from_secs(10))
///     .with_cache_ttl(Duration::ZERO);
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// API root every endpoint path is appended to
    pub(crate) base_url: String,
    /// Game API key sent with every call
    pub(crate) api_key: String,
    pub(crate) user_agent: String,
    /// Timeout of catalog calls. Downloads and uploads only bound the
    /// connection phase with it.
    pub(crate) timeout: Duration,
    /// Retries after the first attempt for transient failures
    pub(crate) max_retries: u8,
    /// Delay before the first retry, doubled for each further one
    pub(crate) retry_base_delay: Duration,
    /// How long a cached `GET` response stays valid
    pub(crate) cache_ttl: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: LIVE_BASE_URL.to_string(),
            api_key: String::new(),
            user_agent: concat!("modsync/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

impl HttpTransportConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration matching a session's environment and API key.
    #[must_use]
    pub fn for_session(options: &SessionOptions) -> Self {
        let base_url = match options.environment {
            Environment::Live => LIVE_BASE_URL,
            Environment::Test => TEST_BASE_URL,
        };
        Self::new()
            .with_base_url(base_url)
            .with_api_key(options.api_key.clone())
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Defaults to 30 seconds.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Defaults to 3 retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Defaults to 500ms.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Defaults to 60 seconds. `Duration::ZERO` disables caching.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub(crate) fn backoff(&self, attempt: u8) -> Duration {
        self.retry_base_delay
            .saturating_mul(1 << u32::from(attempt.saturating_sub(1)).min(16))
    }
}
