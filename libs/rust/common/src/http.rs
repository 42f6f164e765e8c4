//! HTTP client settings shared by the broker client and the provider client.
//!
//! The provider client must observe the provider's raw responses, so it is
//! built with redirects disabled; see [`HttpConfig::for_provider`].

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, redirect};
use std::time::Duration;

/// User agent sent on every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("cdct/", env!("CARGO_PKG_VERSION"));

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request timeout (default: 30s)
    pub timeout: Duration,
    /// Connection timeout (default: 10s), never above `timeout`
    pub connect_timeout: Duration,
    /// Follow 3xx responses (default: true)
    pub follow_redirects: bool,
    /// Send `Accept: application/json` unless a request sets its own
    pub accept_json: bool,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            accept_json: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConfig {
    /// Settings for replaying recorded requests against a provider: no
    /// redirects and no default headers, with `timeout` per call.
    #[must_use]
    pub fn for_provider(timeout: Duration) -> Self {
        Self {
            follow_redirects: false,
            accept_json: false,
            ..Self::default()
        }
        .with_timeout(timeout)
    }

    /// Set the request timeout, clamping the connect timeout to it.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.connect_timeout = self.connect_timeout.min(timeout);
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns an error if the client cannot be built (e.g., TLS initialization fails).
///
/// # Examples
///
/// ```
/// use cdct_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::for_provider(Duration::from_secs(5));
/// assert!(build_http_client(&config).is_ok());
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    if config.accept_json {
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    }
    let policy = if config.follow_redirects {
        redirect::Policy::default()
    } else {
        redirect::Policy::none()
    };

    ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .redirect(policy)
        .default_headers(headers)
        .user_agent(&config.user_agent)
        .use_rustls_tls()
        .build()
}
