//! Client configuration.

use std::time::Duration;
use thiserror::Error;

/// Default document service base URL.
pub const DEFAULT_DOCUMENT_URL: &str = "https://services.humanbrainproject.eu/document/v0/api";
/// Default collab service base URL.
pub const DEFAULT_COLLAB_URL: &str = "https://services.humanbrainproject.eu/collab/v0";
/// Default identity service base URL.
pub const DEFAULT_IDENTITY_URL: &str = "https://services.humanbrainproject.eu/idm/v1/api";

/// Invalid configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A base URL is not an absolute http(s) URL.
    #[error("invalid {service} URL: {url}")]
    InvalidUrl {
        /// Service name.
        service: &'static str,
        /// Offending URL.
        url: String,
    },

    /// The request timeout is zero.
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
}

/// Configuration shared by the stores and the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Document service base URL.
    pub document_url: String,
    /// Collab service base URL.
    pub collab_url: String,
    /// Identity service base URL.
    pub identity_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl ClientConfig {
    /// Creates a configuration targeting the production services.
    pub fn new() -> Self {
        Self {
            document_url: DEFAULT_DOCUMENT_URL.into(),
            collab_url: DEFAULT_COLLAB_URL.into(),
            identity_url: DEFAULT_IDENTITY_URL.into(),
            token: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("hbp-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the document service URL.
    pub fn with_document_url(mut self, url: impl Into<String>) -> Self {
        self.document_url = trim_url(url.into());
        self
    }

    /// Sets the collab service URL.
    pub fn with_collab_url(mut self, url: impl Into<String>) -> Self {
        self.collab_url = trim_url(url.into());
        self
    }

    /// Sets the identity service URL.
    pub fn with_identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = trim_url(url.into());
        self
    }

    /// Sets the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (service, url) in [
            ("document", &self.document_url),
            ("collab", &self.collab_url),
            ("identity", &self.identity_url),
        ] {
            let host = url
                .strip_prefix("https://")
                .or_else(|| url.strip_prefix("http://"));
            if host.map_or(true, str::is_empty) {
                return Err(ConfigError::InvalidUrl {
                    service,
                    url: url.clone(),
                });
            }
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.document_url, DEFAULT_DOCUMENT_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.token.is_none());
        assert!(config.user_agent.starts_with("hbp-client/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_builder() {
        let config = ClientConfig::new()
            .with_document_url("http://localhost:8000/document/")
            .with_collab_url("http://localhost:8001")
            .with_token("secret")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.document_url, "http://localhost:8000/document");
        assert_eq!(config.collab_url, "http://localhost:8001");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_config() {
        let config = ClientConfig::new().with_identity_url("localhost/idm");
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidUrl {
                service: "identity",
                url: "localhost/idm".into()
            })
        );

        let config = ClientConfig::new().with_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }
}
