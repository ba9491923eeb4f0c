//! Client configuration loaded from TOML with environment overrides.

use std::path::Path;
use std::time::Duration;

use chimonca_wire::PlayerId;
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::channel::ChannelConfig;
use crate::session::SessionConfig;

/// Environment variable overriding the access token.
pub const TOKEN_ENV: &str = "CHIMONCA_TOKEN";
/// Environment variable overriding the player id.
pub const PLAYER_ID_ENV: &str = "CHIMONCA_PLAYER_ID";

/// Settings for one client process.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
pub struct ClientConfig {
    /// REST base URL, e.g. `http://localhost:8080/api`.
    api_base_url: String,

    /// STOMP WebSocket endpoint, e.g. `ws://localhost:8080/ws`.
    ws_url: String,

    /// The local player.
    player_id: PlayerId,

    /// Bearer token for REST calls and the STOMP CONNECT frame.
    #[serde(default)]
    access_token: Option<String>,

    /// Seconds the turn holder has before the fallback action fires.
    #[serde(default = "default_turn_seconds")]
    turn_seconds: u64,

    /// Seconds a broken channel may stay down before the session is forfeited.
    #[serde(default = "default_grace_seconds")]
    grace_seconds: u64,

    /// Fixed delay between channel reconnect attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    reconnect_delay_ms: u64,

    /// Deck size the matchmaking queue expects.
    #[serde(default = "default_required_card_count")]
    required_card_count: usize,

    /// `host` header of the STOMP CONNECT frame.
    #[serde(default = "default_stomp_host")]
    stomp_host: String,
}

fn default_turn_seconds() -> u64 {
    90
}

fn default_grace_seconds() -> u64 {
    30
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_required_card_count() -> usize {
    7
}

fn default_stomp_host() -> String {
    "localhost".to_string()
}

impl ClientConfig {
    /// Creates a configuration with default timings.
    #[instrument(skip(api_base_url, ws_url))]
    pub fn new(api_base_url: String, ws_url: String, player_id: PlayerId) -> Self {
        Self {
            api_base_url,
            ws_url,
            player_id,
            access_token: None,
            turn_seconds: default_turn_seconds(),
            grace_seconds: default_grace_seconds(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            required_card_count: default_required_card_count(),
            stomp_host: default_stomp_host(),
        }
    }

    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(player = %config.player_id, api = %config.api_base_url, "Config loaded");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CHIMONCA_TOKEN` and `CHIMONCA_PLAYER_ID` from the environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(
            std::env::var(TOKEN_ENV).ok(),
            std::env::var(PLAYER_ID_ENV).ok(),
        )
    }

    /// Applies explicit overrides; `None` leaves a value untouched.
    #[instrument(skip(self, token))]
    pub fn with_overrides(
        mut self,
        token: Option<String>,
        player_id: Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            debug!("Access token taken from environment");
            self.access_token = Some(token);
        }
        if let Some(raw) = player_id {
            let id = raw.trim().parse::<i64>().map_err(|e| {
                ConfigError::new(format!("Invalid {} '{}': {}", PLAYER_ID_ENV, raw, e))
            })?;
            self.player_id = PlayerId(id);
        }
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.is_empty() {
            return Err(ConfigError::new("api_base_url must not be empty".to_string()));
        }
        if self.ws_url.is_empty() {
            return Err(ConfigError::new("ws_url must not be empty".to_string()));
        }
        if self.turn_seconds == 0 {
            return Err(ConfigError::new("turn_seconds must be positive".to_string()));
        }
        Ok(())
    }

    /// Timings for the session engine.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_turn_duration(Duration::from_secs(self.turn_seconds))
            .with_grace_duration(Duration::from_secs(self.grace_seconds))
    }

    /// Channel settings including the CONNECT identity headers.
    pub fn channel_config(&self) -> ChannelConfig {
        let mut config = ChannelConfig::new(self.stomp_host.clone())
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
            .with_connect_header("playerId", self.player_id.to_string());
        if let Some(token) = &self.access_token {
            config = config.with_connect_header("Authorization", format!("Bearer {}", token));
        }
        config
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
