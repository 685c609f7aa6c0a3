use std::env;

use url::Url;

/// Floodwatch client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the flood-monitoring backend (defaults to the local
    /// development server).
    pub api_base: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let base = env::var("FLOODWATCH_API_BASE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "http://127.0.0.1:8000".to_string());
        Self::new(base)
    }

    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into().trim().to_string();
        if !base.contains("://") {
            base = format!("http://{base}");
        }
        // Normalize localhost to IPv4 to avoid IPv6 (::1) preference on macOS
        if let Some(rest) = base.strip_prefix("http://localhost") {
            base = format!("http://127.0.0.1{rest}");
        }
        Self { api_base: base }
    }

    /// Parse the configured base into concrete HTTP/WebSocket endpoints.
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        Endpoints::new(&self.api_base)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8000")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid backend url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Resolved backend endpoints. The WebSocket base is derived from the HTTP
/// base by swapping the scheme (http -> ws, https -> wss).
#[derive(Debug, Clone)]
pub struct Endpoints {
    http_base: Url,
    ws_base: Url,
}

impl Endpoints {
    pub fn new(base: &str) -> Result<Self, ConfigError> {
        let http_base = Url::parse(base).map_err(|err| ConfigError::InvalidUrl {
            url: base.to_string(),
            reason: err.to_string(),
        })?;
        let ws_scheme = match http_base.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        let mut ws_base = http_base.clone();
        ws_base
            .set_scheme(ws_scheme)
            .map_err(|_| ConfigError::InvalidUrl {
                url: base.to_string(),
                reason: format!("cannot derive {ws_scheme} scheme"),
            })?;
        Ok(Self { http_base, ws_base })
    }

    pub fn http(&self, path: &str) -> Result<Url, ConfigError> {
        self.http_base
            .join(path)
            .map_err(|err| ConfigError::InvalidUrl {
                url: format!("{}{path}", self.http_base),
                reason: err.to_string(),
            })
    }

    pub fn ws(&self, path: &str) -> Result<Url, ConfigError> {
        self.ws_base
            .join(path)
            .map_err(|err| ConfigError::InvalidUrl {
                url: format!("{}{path}", self.ws_base),
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_points_at_local_backend() {
        let config = Config::default();
        assert_eq!(config.api_base, "http://127.0.0.1:8000");
    }

    #[test]
    fn bare_host_gains_http_scheme() {
        let config = Config::new("flood.example.com:9000");
        assert_eq!(config.api_base, "http://flood.example.com:9000");
    }

    #[test]
    fn localhost_is_normalized_to_ipv4() {
        let config = Config::new("http://localhost:8000");
        assert_eq!(config.api_base, "http://127.0.0.1:8000");
    }

    #[test]
    fn ws_base_swaps_scheme() {
        let endpoints = Endpoints::new("http://127.0.0.1:8000").unwrap();
        let url = endpoints.ws("ws/general").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/ws/general");

        let endpoints = Endpoints::new("https://flood.example.com").unwrap();
        let url = endpoints.ws("chat/ws").unwrap();
        assert_eq!(url.as_str(), "wss://flood.example.com/chat/ws");
    }
}
