//! Client configuration loaded from environment variables.
//!
//! Everything has a default pointing at a local backend so the console can
//! start with only an access token set.

use std::time::Duration;

use airops_net::{Endpoint, ReconnectPolicy};
use airops_shared::constants::{DEFAULT_PREVIEW_CHARS, DEFAULT_SOCKET_PATH, DEFAULT_TYPING_EXPIRY_SECS};
use airops_shared::UserId;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    /// Env: `AIROPS_API_URL`
    /// Default: `http://localhost:5000/api`
    pub api_url: String,

    /// Base URL of the Socket.IO server.
    /// Env: `AIROPS_SOCKET_URL`
    /// Default: `http://localhost:5000`
    pub socket_url: String,

    /// Env: `AIROPS_SOCKET_PATH`
    /// Default: `/socket.io/`
    pub socket_path: String,

    /// Budget for the socket handshake.
    /// Env: `AIROPS_CONNECT_TIMEOUT_SECS`
    /// Default: `20`
    pub connect_timeout: Duration,

    /// Bearer token for both REST and the socket.
    /// Env: `AIROPS_ACCESS_TOKEN`
    pub access_token: Option<String>,

    /// The signed-in user, used to name direct conversations and to skip
    /// read receipts for one's own reads.
    /// Env: `AIROPS_USER_ID`
    pub user_id: Option<UserId>,

    /// Env: `AIROPS_RECONNECT_ENABLED`, `AIROPS_RECONNECT_INITIAL_MS`,
    /// `AIROPS_RECONNECT_MAX_MS`, `AIROPS_RECONNECT_ATTEMPTS` (0 = unlimited)
    pub reconnect: ReconnectPolicy,

    /// Idle window for typing indicators.
    /// Env: `AIROPS_TYPING_EXPIRY_SECS` (0 disables expiry)
    /// Default: `8`
    pub typing_expiry: Option<Duration>,

    /// Env: `AIROPS_PREVIEW_CHARS`
    /// Default: `100`
    pub preview_chars: usize,

    /// Messages requested per page.
    /// Env: `AIROPS_PAGE_SIZE`
    /// Default: `50`
    pub page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000/api".to_string(),
            socket_url: "http://localhost:5000".to_string(),
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            connect_timeout: Duration::from_secs(20),
            access_token: None,
            user_id: None,
            reconnect: ReconnectPolicy::default(),
            typing_expiry: Some(Duration::from_secs(DEFAULT_TYPING_EXPIRY_SECS)),
            preview_chars: DEFAULT_PREVIEW_CHARS,
            page_size: 50,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key/value source. Invalid values are
    /// logged and replaced by the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("AIROPS_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(url) = lookup("AIROPS_SOCKET_URL") {
            config.socket_url = url;
        }

        if let Some(path) = lookup("AIROPS_SOCKET_PATH") {
            config.socket_path = path;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "AIROPS_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(token) = lookup("AIROPS_ACCESS_TOKEN") {
            if !token.is_empty() {
                config.access_token = Some(token);
            }
        }

        if let Some(id) = lookup("AIROPS_USER_ID") {
            if !id.is_empty() {
                config.user_id = Some(UserId::new(id));
            }
        }

        // -- Reconnection --

        if let Some(val) = lookup("AIROPS_RECONNECT_ENABLED") {
            config.reconnect.enabled = val != "false" && val != "0";
        }

        if let Some(ms) = parse_var::<u64, _>(&lookup, "AIROPS_RECONNECT_INITIAL_MS") {
            config.reconnect.initial_delay = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64, _>(&lookup, "AIROPS_RECONNECT_MAX_MS") {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }

        if let Some(n) = parse_var::<u32, _>(&lookup, "AIROPS_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = n;
        }

        if config.reconnect.max_delay < config.reconnect.initial_delay {
            tracing::warn!(
                initial_ms = config.reconnect.initial_delay.as_millis() as u64,
                max_ms = config.reconnect.max_delay.as_millis() as u64,
                "Reconnect max delay below initial delay, clamping"
            );
            config.reconnect.max_delay = config.reconnect.initial_delay;
        }

        // -- Cache and presence --

        if let Some(secs) = parse_var::<u64, _>(&lookup, "AIROPS_TYPING_EXPIRY_SECS") {
            config.typing_expiry = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(n) = parse_var::<usize, _>(&lookup, "AIROPS_PREVIEW_CHARS") {
            if n > 0 {
                config.preview_chars = n;
            }
        }

        if let Some(n) = parse_var::<u32, _>(&lookup, "AIROPS_PAGE_SIZE") {
            if n > 0 {
                config.page_size = n;
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: self.socket_url.clone(),
            path: self.socket_path.clone(),
            connect_timeout: self.connect_timeout,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.api_url, "http://localhost:5000/api");
        assert_eq!(config.typing_expiry, Some(Duration::from_secs(8)));
        assert_eq!(config.preview_chars, 100);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert!(config.access_token.is_none());
        assert_eq!(config.endpoint().path, "/socket.io/");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("AIROPS_API_URL", "https://ops.example/api/"),
            ("AIROPS_SOCKET_URL", "https://ops.example"),
            ("AIROPS_ACCESS_TOKEN", "tok"),
            ("AIROPS_USER_ID", "u-42"),
            ("AIROPS_RECONNECT_ATTEMPTS", "0"),
            ("AIROPS_RECONNECT_ENABLED", "false"),
            ("AIROPS_TYPING_EXPIRY_SECS", "0"),
            ("AIROPS_PREVIEW_CHARS", "40"),
        ]);
        assert_eq!(config.api_url, "https://ops.example/api");
        assert_eq!(config.endpoint().url, "https://ops.example");
        assert_eq!(config.access_token.as_deref(), Some("tok"));
        assert_eq!(config.user_id, Some(UserId::new("u-42")));
        assert_eq!(config.reconnect.max_attempts, 0);
        assert!(!config.reconnect.enabled);
        assert_eq!(config.typing_expiry, None);
        assert_eq!(config.preview_chars, 40);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("AIROPS_RECONNECT_INITIAL_MS", "soon"),
            ("AIROPS_PREVIEW_CHARS", "0"),
            ("AIROPS_PAGE_SIZE", "-3"),
        ]);
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(500));
        assert_eq!(config.preview_chars, 100);
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn test_max_delay_is_clamped_to_initial() {
        let config = config_from(&[
            ("AIROPS_RECONNECT_INITIAL_MS", "2000"),
            ("AIROPS_RECONNECT_MAX_MS", "100"),
        ]);
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(2000));
    }
}
