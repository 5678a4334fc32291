use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::config::defaults::{
    DEFAULT_GATEWAY_URL, DEFAULT_LISTEN, DEFAULT_MODEL, DEFAULT_MODEL_LABEL, DEFAULT_RELAY_URL,
};
use crate::core::config::io::ConfigError;
use crate::core::prompt::AgentMode;

/// Overrides `relay_url` for client commands.
pub const RELAY_URL_ENV: &str = "AGENTDESK_RELAY_URL";
/// Bearer credential the client presents to the relay.
pub const RELAY_TOKEN_ENV: &str = "AGENTDESK_RELAY_TOKEN";

/// Settings persisted in `config.toml`. Every key is optional; accessors
/// fall back to the built-in defaults.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub relay_url: Option<String>,
    pub default_mode: Option<AgentMode>,
    pub listen: Option<String>,
    pub gateway_url: Option<String>,
    pub model: Option<String>,
    pub model_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    RelayUrl,
    DefaultMode,
    Listen,
    GatewayUrl,
    Model,
    ModelLabel,
}

pub const ALL_KEYS: [ConfigKey; 6] = [
    ConfigKey::RelayUrl,
    ConfigKey::DefaultMode,
    ConfigKey::Listen,
    ConfigKey::GatewayUrl,
    ConfigKey::Model,
    ConfigKey::ModelLabel,
];

impl ConfigKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::RelayUrl => "relay_url",
            ConfigKey::DefaultMode => "default_mode",
            ConfigKey::Listen => "listen",
            ConfigKey::GatewayUrl => "gateway_url",
            ConfigKey::Model => "model",
            ConfigKey::ModelLabel => "model_label",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ALL_KEYS
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownKey(s.trim().to_string()))
    }
}

impl Config {
    /// Relay base URL, with `AGENTDESK_RELAY_URL` taking precedence.
    pub fn relay_url(&self) -> String {
        self.relay_url_with_override(std::env::var(RELAY_URL_ENV).ok())
    }

    pub fn relay_url_with_override(&self, env_override: Option<String>) -> String {
        env_override
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.relay_url.clone())
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string())
    }

    pub fn mode(&self) -> AgentMode {
        self.default_mode.unwrap_or_default()
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let listen = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
        parse_listen(listen)
    }

    pub fn gateway_url(&self) -> &str {
        self.gateway_url.as_deref().unwrap_or(DEFAULT_GATEWAY_URL)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn model_label(&self) -> &str {
        self.model_label.as_deref().unwrap_or(DEFAULT_MODEL_LABEL)
    }

    /// Validate and store a value for `key`.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::InvalidValue {
                key,
                reason: "value must not be empty".to_string(),
            });
        }

        match key {
            ConfigKey::RelayUrl | ConfigKey::GatewayUrl => {
                if !crate::utils::url::is_http_url(value) {
                    return Err(ConfigError::InvalidValue {
                        key,
                        reason: format!("'{value}' is not an http(s) URL"),
                    });
                }
                let slot = if key == ConfigKey::RelayUrl {
                    &mut self.relay_url
                } else {
                    &mut self.gateway_url
                };
                *slot = Some(crate::utils::url::normalize_base_url(value));
            }
            ConfigKey::DefaultMode => {
                let mode = value.parse::<AgentMode>().map_err(|reason| {
                    ConfigError::InvalidValue { key, reason }
                })?;
                self.default_mode = Some(mode);
            }
            ConfigKey::Listen => {
                parse_listen(value)?;
                self.listen = Some(value.to_string());
            }
            ConfigKey::Model => self.model = Some(value.to_string()),
            ConfigKey::ModelLabel => self.model_label = Some(value.to_string()),
        }
        Ok(())
    }

    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::RelayUrl => self.relay_url = None,
            ConfigKey::DefaultMode => self.default_mode = None,
            ConfigKey::Listen => self.listen = None,
            ConfigKey::GatewayUrl => self.gateway_url = None,
            ConfigKey::Model => self.model = None,
            ConfigKey::ModelLabel => self.model_label = None,
        }
    }
}

fn parse_listen(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue {
            key: ConfigKey::Listen,
            reason: format!("'{value}' is not a socket address: {e}"),
        })
}

/// Format a path for display, abbreviating the home directory.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
