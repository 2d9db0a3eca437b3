//! Backend Connection Configuration
//!
//! Where the council backend lives. Environment variables override the
//! defaults; anything unset or unparsable falls back silently, so a
//! bare `council-tui` run connects to a local backend.

/// Connection settings for the council backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CouncilConfig {
    /// Backend host
    pub host: String,
    /// Backend port
    pub port: u16,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8001,
        }
    }
}

impl CouncilConfig {
    /// Create a configuration for an explicit host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Read configuration from `COUNCIL_HOST` / `COUNCIL_PORT`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = std::env::var("COUNCIL_HOST").unwrap_or(defaults.host);
        let port = std::env::var("COUNCIL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        Self { host, port }
    }

    /// The HTTP base URL for this backend.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_points_at_local_backend() {
        let config = CouncilConfig::default();
        assert_eq!(config.base_url(), "http://localhost:8001");
    }

    #[test]
    fn test_explicit_config() {
        let config = CouncilConfig::new("council.internal", 9000);
        assert_eq!(config.base_url(), "http://council.internal:9000");
    }
}
