//! Stream Configuration Settings
//!
//! Configuration types for the price stream, loaded from environment variables.

use std::time::Duration;

use crate::application::ports::ConnectRequest;
use crate::domain::payload::{CHANNEL_CONTROLLED_LOAD, CHANNEL_FEED_IN, CHANNEL_GENERAL};

/// Default live-prices WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://api-ws.amber.com.au";

/// `Origin` header value the feed requires.
pub const DEFAULT_ORIGIN: &str = "https://app.amber.com.au";

/// Feed credentials and site selection.
#[derive(Clone)]
pub struct Credentials {
    auth_token: String,
    site_id: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either value is empty.
    pub fn new(
        auth_token: impl Into<String>,
        site_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let auth_token = auth_token.into().trim().to_string();
        let site_id = site_id.into().trim().to_string();

        if auth_token.is_empty() {
            return Err(ConfigError::EmptyValue("AMBER_AUTH_TOKEN".to_string()));
        }
        if site_id.is_empty() {
            return Err(ConfigError::EmptyValue("AMBER_SITE_ID".to_string()));
        }

        Ok(Self {
            auth_token,
            site_id,
        })
    }

    /// Get the bearer token.
    #[must_use]
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// Get the site identifier.
    #[must_use]
    pub fn site_id(&self) -> &str {
        &self.site_id
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_token", &"[REDACTED]")
            .field("site_id", &self.site_id)
            .finish()
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Endpoint URL.
    pub url: String,
    /// `Origin` header value.
    pub origin: String,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// How long to wait for traffic after a ping before giving up.
    pub heartbeat_timeout: Duration,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter as a fraction of the delay (0 = none).
    pub reconnect_jitter: f64,
    /// Capacity of the host event broadcast channel.
    pub event_capacity: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(30),
            reconnect_delay_initial: Duration::from_secs(5),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.0,
            event_capacity: 256,
        }
    }
}

/// Which channels the host reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSelection {
    /// General supply channel.
    pub general: bool,
    /// Feed-in channel.
    pub feed_in: bool,
    /// Controlled load channel.
    pub controlled_load: bool,
}

impl Default for ChannelSelection {
    fn default() -> Self {
        Self {
            general: true,
            feed_in: true,
            controlled_load: false,
        }
    }
}

impl ChannelSelection {
    /// Enabled channel identifiers, in a fixed order.
    #[must_use]
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            (self.general, CHANNEL_GENERAL),
            (self.feed_in, CHANNEL_FEED_IN),
            (self.controlled_load, CHANNEL_CONTROLLED_LOAD),
        ]
        .into_iter()
        .filter_map(|(on, channel)| on.then_some(channel))
        .collect()
    }
}

/// Complete stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Credentials and site.
    pub credentials: Credentials,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Reported channels.
    pub channels: ChannelSelection,
    /// Raise the crate's log level to debug.
    pub debug_logging: bool,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl StreamConfig {
    /// Create configuration with default settings.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            websocket: WebSocketSettings::default(),
            channels: ChannelSelection::default(),
            debug_logging: false,
            metrics_port: 0,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key → value source.
    ///
    /// # Errors
    ///
    /// Returns an error if required keys are missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth_token = lookup("AMBER_AUTH_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("AMBER_AUTH_TOKEN".to_string()))?;
        let site_id = lookup("AMBER_SITE_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("AMBER_SITE_ID".to_string()))?;
        let credentials = Credentials::new(auth_token, site_id)?;

        let defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            url: lookup("AMBER_WS_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.url),
            origin: lookup("AMBER_ORIGIN")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.origin),
            heartbeat_interval: parse_nonzero_secs(
                &lookup,
                "AMBER_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_nonzero_secs(
                &lookup,
                "AMBER_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            connect_timeout: parse_nonzero_secs(
                &lookup,
                "AMBER_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout,
            ),
            reconnect_delay_initial: parse_nonzero_secs(
                &lookup,
                "AMBER_RECONNECT_DELAY_MIN_SECS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_nonzero_secs(
                &lookup,
                "AMBER_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_checked_f64(
                &lookup,
                "AMBER_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
                |m| m.is_finite() && m > 0.0,
            ),
            reconnect_jitter: parse_checked_f64(
                &lookup,
                "AMBER_RECONNECT_JITTER",
                defaults.reconnect_jitter,
                f64::is_finite,
            )
            .clamp(0.0, 1.0),
            event_capacity: parse_or(&lookup, "AMBER_EVENT_CAPACITY", defaults.event_capacity),
        };

        let channel_defaults = ChannelSelection::default();
        let channels = ChannelSelection {
            general: parse_bool(&lookup, "AMBER_CHANNEL_GENERAL", channel_defaults.general),
            feed_in: parse_bool(&lookup, "AMBER_CHANNEL_FEED_IN", channel_defaults.feed_in),
            controlled_load: parse_bool(
                &lookup,
                "AMBER_CHANNEL_CONTROLLED_LOAD",
                channel_defaults.controlled_load,
            ),
        };

        Ok(Self {
            credentials,
            websocket,
            channels,
            debug_logging: parse_bool(&lookup, "AMBER_DEBUG_LOGGING", false),
            metrics_port: parse_or(&lookup, "AMBER_METRICS_PORT", 0),
        })
    }

    /// The connect request for the configured endpoint.
    #[must_use]
    pub fn connect_request(&self) -> ConnectRequest {
        ConnectRequest {
            url: self.websocket.url.clone(),
            auth_token: self.credentials.auth_token().to_string(),
            origin: self.websocket.origin.clone(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

/// Like [`parse_duration_secs`], but zero falls back to the default.
fn parse_nonzero_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_duration_secs(lookup, key, default);
    if value.is_zero() {
        tracing::warn!(
            key,
            default_secs = default.as_secs(),
            "Zero duration is not allowed, using default"
        );
        return default;
    }
    value
}

fn parse_checked_f64<F, P>(lookup: &F, key: &str, default: f64, valid: P) -> f64
where
    F: Fn(&str) -> Option<String>,
    P: Fn(f64) -> bool,
{
    let value = parse_or(lookup, key, default);
    if valid(value) {
        value
    } else {
        tracing::warn!(key, value, default, "Invalid value, using default");
        default
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
