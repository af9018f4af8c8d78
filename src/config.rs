// Конфигурация приложения
// Логирование по умолчанию включено только в режиме разработки

use crate::error::PadError;
use crate::peer::ice::default_ice_servers;
use crate::peer::types::ServerConfig;
use crate::session::AcceptPolicy;
use crate::surface::{PenStyle, Viewport};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

// Дополнительные настройки для режима разработки
#[cfg(debug_assertions)]
pub mod dev {
    // Фильтр tracing по умолчанию; RUST_LOG его перекрывает
    pub const DEFAULT_FILTER: &str = "drawpad=debug,drawpad_lib=debug,webrtc=warn";
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const DEFAULT_FILTER: &str = "drawpad=info,drawpad_lib=info,webrtc=error";
}

pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:9000";
pub const DEFAULT_RELAY_BIND: &str = "0.0.0.0:9000";
pub const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Адрес relay, через который endpoint'ы получают код и обмениваются SDP
    pub relay_url: String,
    /// Где слушает `drawpad relay`
    pub relay_bind: String,
    pub join_timeout_secs: u64,
    pub accept_policy: AcceptPolicy,
    pub canvas: CanvasConfig,
    pub pen: PenStyle,
    pub ice_servers: Vec<ServerConfig>,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,
    pub filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.into(),
            relay_bind: DEFAULT_RELAY_BIND.into(),
            join_timeout_secs: DEFAULT_JOIN_TIMEOUT_SECS,
            accept_policy: AcceptPolicy::default(),
            canvas: CanvasConfig::default(),
            pen: PenStyle::default(),
            ice_servers: default_ice_servers(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: LOGGING_ENABLED,
            filter: dev::DEFAULT_FILTER.into(),
        }
    }
}

impl Config {
    /// Файл (если задан), затем переменные окружения `DRAWPAD_*`
    pub fn load(path: Option<&Path>) -> Result<Self, PadError> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, PadError> {
        Ok(toml::from_str(raw)?)
    }

    /// Переопределения из окружения. Некорректные значения пропускаются.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DRAWPAD_RELAY_URL") {
            self.relay_url = url;
        }
        if let Some(bind) = lookup("DRAWPAD_RELAY_BIND") {
            self.relay_bind = bind;
        }
        if let Some(raw) = lookup("DRAWPAD_JOIN_TIMEOUT_SECS") {
            match raw.parse() {
                Ok(secs) => self.join_timeout_secs = secs,
                Err(_) => tracing::warn!(value = %raw, "ignoring bad DRAWPAD_JOIN_TIMEOUT_SECS"),
            }
        }
        if let Some(raw) = lookup("DRAWPAD_LOG") {
            match raw.as_str() {
                "off" | "0" | "false" => self.logging.enabled = false,
                filter => {
                    self.logging.enabled = true;
                    self.logging.filter = filter.to_string();
                }
            }
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn viewport(&self) -> Result<Viewport, PadError> {
        Viewport::new(self.canvas.width, self.canvas.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::LineCap;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.relay_url, DEFAULT_RELAY_URL);
        assert_eq!(c.join_timeout(), Duration::from_secs(15));
        assert_eq!(c.accept_policy, AcceptPolicy::RejectExtra);
        assert_eq!(c.pen.line_cap, LineCap::Round);
        assert!(c.viewport().is_ok());
        assert!(!c.ice_servers.is_empty());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = Config::from_toml(
            r##"
            relay_url = "ws://relay.local:9000"
            accept_policy = "drop_silently"

            [canvas]
            width = 1024.0

            [pen]
            color = "#3366ff"
            "##,
        )
        .unwrap();
        assert_eq!(c.relay_url, "ws://relay.local:9000");
        assert_eq!(c.accept_policy, AcceptPolicy::DropSilently);
        assert_eq!(c.canvas.width, 1024.0);
        assert_eq!(c.canvas.height, 600.0);
        assert_eq!(c.pen.color, "#3366ff");
        assert_eq!(c.join_timeout_secs, DEFAULT_JOIN_TIMEOUT_SECS);
    }

    #[test]
    fn ice_servers_from_toml() {
        let c = Config::from_toml(
            r#"
            [[ice_servers]]
            id = "office"
            type = "turn"
            url = "turn.example.org:3478"
            username = "u"
            credential = "p"
            "#,
        )
        .unwrap();
        assert_eq!(c.ice_servers.len(), 1);
        assert_eq!(c.ice_servers[0].r#type, "turn");
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(matches!(
            Config::from_toml("join_timeout_secs = \"soon\""),
            Err(PadError::Config(_))
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("DRAWPAD_RELAY_URL", "ws://10.0.0.2:9000"),
            ("DRAWPAD_JOIN_TIMEOUT_SECS", "3"),
            ("DRAWPAD_LOG", "drawpad=trace"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        c.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.relay_url, "ws://10.0.0.2:9000");
        assert_eq!(c.join_timeout(), Duration::from_secs(3));
        assert!(c.logging.enabled);
        assert_eq!(c.logging.filter, "drawpad=trace");
    }

    #[test]
    fn bad_env_values_are_skipped() {
        let mut c = Config::default();
        c.apply_overrides(|k| match k {
            "DRAWPAD_JOIN_TIMEOUT_SECS" => Some("later".into()),
            "DRAWPAD_LOG" => Some("off".into()),
            _ => None,
        });
        assert_eq!(c.join_timeout_secs, DEFAULT_JOIN_TIMEOUT_SECS);
        assert!(!c.logging.enabled);
    }
}
