use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Base URL of the realtime server (http, https, ws or wss)
    pub url: String,
    /// Socket.IO namespace dedicated to device readings
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_namespace() -> String {
    "/device-readings".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_connect_attempts() -> u32 {
    3
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        config.realtime.validate()?;
        Ok(config)
    }
}

impl RealtimeConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if !self.namespace.starts_with('/') {
            anyhow::bail!(
                "realtime.namespace must start with '/', got {:?}",
                self.namespace
            );
        }
        if self.connect_attempts == 0 {
            anyhow::bail!("realtime.connect_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Engine.IO websocket endpoint derived from the base URL.
    ///
    /// `http`/`https` map to `ws`/`wss`; the namespace is not part of the
    /// URL, it is joined during the Socket.IO handshake.
    pub fn socket_url(&self) -> anyhow::Result<String> {
        let base = self.url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            anyhow::bail!("Unsupported realtime URL scheme: {}", self.url);
        };
        Ok(format!("{}/socket.io/?EIO=4&transport=websocket", ws_base))
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            namespace: default_namespace(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            realtime: RealtimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
