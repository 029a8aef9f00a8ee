// Application configuration
// Logging can only be switched off entirely in development builds

use serde::Deserialize;
use std::env;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // debug builds log by default

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // release builds stay quiet unless VCHAT_LOG is set

// Extra switches for development builds
#[cfg(debug_assertions)]
pub mod dev {
    // Flip to false to silence logging completely while developing.
    // Only honored in debug builds.
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Runtime settings, overridable through `VCHAT_*` environment variables.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// length of the human-shareable signaling id
    pub signaling_id_length: usize,
    /// prefix of the username sent with a call request
    pub display_name_prefix: String,
    /// relay endpoint the client connects to
    pub relay_url: String,
    /// address the relay binary listens on
    pub relay_listen: String,
    /// fallback tracing filter when RUST_LOG is unset
    pub log_filter: String,
    /// forces logging on in release builds
    pub force_logging: bool,
    /// capacity of the UI notification channel
    pub event_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            signaling_id_length: 5,
            display_name_prefix: "user-".into(),
            relay_url: "ws://127.0.0.1:9000".into(),
            relay_listen: "127.0.0.1:9000".into(),
            log_filter: "info".into(),
            force_logging: false,
            event_capacity: 64,
        }
    }
}

impl AppConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = env::var("VCHAT_ID_LENGTH") {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => config.signaling_id_length = n,
                _ => eprintln!("ignoring invalid VCHAT_ID_LENGTH={v}"),
            }
        }
        if let Ok(v) = env::var("VCHAT_NAME_PREFIX") {
            config.display_name_prefix = v;
        }
        if let Ok(v) = env::var("VCHAT_RELAY_URL") {
            config.relay_url = v;
        }
        if let Ok(v) = env::var("VCHAT_RELAY_LISTEN") {
            config.relay_listen = v;
        }
        if let Ok(v) = env::var("VCHAT_LOG") {
            config.log_filter = v;
            config.force_logging = true;
        }
        if let Ok(v) = env::var("VCHAT_EVENT_CAPACITY") {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => config.event_capacity = n,
                _ => eprintln!("ignoring invalid VCHAT_EVENT_CAPACITY={v}"),
            }
        }
        config
    }

    /// Whether the tracing subscriber should be installed at all.
    pub fn logging_enabled(&self) -> bool {
        if self.force_logging {
            return true;
        }
        LOGGING_ENABLED && dev::ENABLE_LOGGING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_give_five_char_ids() {
        let config = AppConfig::default();
        assert_eq!(config.signaling_id_length, 5);
        assert_eq!(config.display_name_prefix, "user-");
        assert!(config.event_capacity > 0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"relay_url": "ws://relay.local:1234"}"#).unwrap();
        assert_eq!(config.relay_url, "ws://relay.local:1234");
        assert_eq!(config.signaling_id_length, 5);
    }
}
