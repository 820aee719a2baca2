use std::fs;
use std::time::Duration;

use anyhow::Result;
use mukstagram_realtime::backoff::ReconnectPolicy;
use mukstagram_realtime::endpoint::DEFAULT_API_URL;
use mukstagram_realtime::{ClientConfig, Endpoint};
use mukstagram_ws::limits::{
    GatewayLimits, CHAT_MESSAGES_PER_MINUTE_DEFAULT, TYPING_EVENTS_PER_MINUTE_DEFAULT,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

fn harden_secret_file_permissions(path: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: generate_random_hex(64),
            jwt_expiry_seconds: default_jwt_expiry(),
        }
    }
}

/// Client side of the channel, used by `listen`.
#[derive(Debug, Deserialize, Serialize)]
pub struct RealtimeConfig {
    /// REST API base; the websocket URL is derived from it.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Fixed websocket URL, overriding the derived one.
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: None,
            token_file: None,
            heartbeat_interval_seconds: default_heartbeat_interval(),
            connect_timeout_seconds: default_connect_timeout(),
            reconnect_base_ms: default_reconnect_base(),
            reconnect_max_delay_ms: default_reconnect_max_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl RealtimeConfig {
    pub fn client_config(&self) -> Result<ClientConfig> {
        let endpoint = match self.ws_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(ws_url) => Endpoint::from_ws_url(ws_url)?,
            None => Endpoint::from_api_url(&self.api_url)?,
        };
        let mut config = ClientConfig::new(endpoint);
        config.heartbeat_interval = Duration::from_secs(self.heartbeat_interval_seconds.max(1));
        config.connect_timeout = Duration::from_secs(self.connect_timeout_seconds.max(1));
        config.reconnect = ReconnectPolicy {
            base: Duration::from_millis(self.reconnect_base_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        };
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_chat_rate")]
    pub chat_messages_per_minute: u32,
    #[serde(default = "default_typing_rate")]
    pub typing_events_per_minute: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            chat_messages_per_minute: default_chat_rate(),
            typing_events_per_minute: default_typing_rate(),
        }
    }
}

impl GatewayConfig {
    pub fn limits(&self) -> GatewayLimits {
        GatewayLimits {
            chat_messages_per_minute: self.chat_messages_per_minute,
            typing_events_per_minute: self.typing_events_per_minute,
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Generate a cryptographically random hex string of the given length.
fn generate_random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..16u8);
            char::from(if idx < 10 { b'0' + idx } else { b'a' + idx - 10 })
        })
        .collect()
}

fn default_jwt_expiry() -> u64 {
    1800
}
fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_reconnect_base() -> u64 {
    1000
}
fn default_reconnect_max_delay() -> u64 {
    30_000
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_chat_rate() -> u32 {
    CHAT_MESSAGES_PER_MINUTE_DEFAULT
}
fn default_typing_rate() -> u32 {
    TYPING_EVENTS_PER_MINUTE_DEFAULT
}

fn looks_like_placeholder_secret(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return true;
    }
    normalized.contains("change_me")
        || normalized.contains("replace_me")
        || normalized.contains("replace_with")
        || normalized.starts_with("example")
        || normalized == "devsecret"
        || normalized == "secret"
}

fn validate_secret_configuration(config: &Config) -> Result<()> {
    let jwt_secret = config.auth.jwt_secret.trim();
    if jwt_secret.len() < 32 || looks_like_placeholder_secret(jwt_secret) {
        anyhow::bail!(
            "Invalid auth.jwt_secret: use a strong random secret (at least 32 characters) and never leave placeholder values"
        );
    }
    Ok(())
}

/// Generate a commented config file template with the given values filled in.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Mukstagram Realtime Configuration
# Generated automatically on first run. Edit as needed.

[server]
bind_address = "{bind_address}"

[auth]
jwt_secret = "{jwt_secret}"
jwt_expiry_seconds = {jwt_expiry}

[realtime]
# REST API base URL; the websocket endpoint is derived as <api_url>/ws/connect
# with http -> ws and https -> wss.
api_url = "{api_url}"
# Pin the websocket URL instead of deriving it:
# ws_url = "ws://127.0.0.1:8000/api/ws/connect"
# File holding the access token used by `listen`:
# token_file = "config/token"
heartbeat_interval_seconds = {heartbeat}
connect_timeout_seconds = {connect_timeout}
reconnect_base_ms = {reconnect_base}
reconnect_max_delay_ms = {reconnect_max}
max_reconnect_attempts = {max_attempts}

[gateway]
chat_messages_per_minute = {chat_rate}
typing_events_per_minute = {typing_rate}
"#,
        bind_address = config.server.bind_address,
        jwt_secret = config.auth.jwt_secret,
        jwt_expiry = config.auth.jwt_expiry_seconds,
        api_url = config.realtime.api_url,
        heartbeat = config.realtime.heartbeat_interval_seconds,
        connect_timeout = config.realtime.connect_timeout_seconds,
        reconnect_base = config.realtime.reconnect_base_ms,
        reconnect_max = config.realtime.reconnect_max_delay_ms,
        max_attempts = config.realtime.max_reconnect_attempts,
        chat_rate = config.gateway.chat_messages_per_minute,
        typing_rate = config.gateway.typing_events_per_minute,
    )
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file not found at '{}', generating defaults...", path);
            let config = Config::default();

            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }

            let template = generate_config_template(&config);
            fs::write(path, &template)?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };
        let _ = harden_secret_file_permissions(path);

        config.apply_env_overrides(|name| std::env::var(name).ok());
        validate_secret_configuration(&config)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var("MUKSTAGRAM_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = var("MUKSTAGRAM_JWT_SECRET") {
            self.auth.jwt_secret = value;
        }
        if let Some(value) = var("MUKSTAGRAM_JWT_EXPIRY_SECONDS") {
            if let Ok(parsed) = value.parse::<u64>() {
                self.auth.jwt_expiry_seconds = parsed;
            }
        }
        if let Some(value) = var("MUKSTAGRAM_API_URL") {
            self.realtime.api_url = value;
        }
        if let Some(value) = var("MUKSTAGRAM_WS_URL") {
            self.realtime.ws_url = Some(value);
        }
        if let Some(value) = var("MUKSTAGRAM_TOKEN_FILE") {
            self.realtime.token_file = Some(value);
        }
        if let Some(value) = var("MUKSTAGRAM_WS_MAX_MESSAGES_PER_MINUTE") {
            if let Ok(parsed) = value.trim().parse::<u32>() {
                self.gateway.chat_messages_per_minute = parsed;
            }
        }
        if let Some(value) = var("MUKSTAGRAM_WS_MAX_TYPING_EVENTS_PER_MINUTE") {
            if let Ok(parsed) = value.trim().parse::<u32>() {
                self.gateway.typing_events_per_minute = parsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn first_run_generates_a_loadable_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/mukstagram.toml");
        let path = path.to_str().expect("utf8 path");

        let generated = Config::load(path).expect("generate config");
        assert_eq!(generated.auth.jwt_secret.len(), 64);

        let reloaded = Config::load(path).expect("reload config");
        assert_eq!(reloaded.auth.jwt_secret, generated.auth.jwt_secret);
        assert_eq!(reloaded.realtime.api_url, DEFAULT_API_URL);
        assert_eq!(reloaded.gateway.chat_messages_per_minute, 240);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("mukstagram.toml");
        fs::write(&path, "[auth]\njwt_secret = \"change_me_change_me_change_me_change_me\"\n")
            .expect("write config");
        assert!(Config::load(path.to_str().expect("utf8 path")).is_err());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("MUKSTAGRAM_BIND_ADDRESS", "127.0.0.1:9000"),
            ("MUKSTAGRAM_WS_URL", "wss://rt.example.com/api/ws/connect"),
            ("MUKSTAGRAM_WS_MAX_TYPING_EVENTS_PER_MINUTE", "30"),
            ("MUKSTAGRAM_JWT_EXPIRY_SECONDS", "not-a-number"),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.gateway.typing_events_per_minute, 30);
        assert_eq!(config.auth.jwt_expiry_seconds, 1800);
        assert_eq!(
            config.realtime.ws_url.as_deref(),
            Some("wss://rt.example.com/api/ws/connect")
        );
    }

    #[test]
    fn client_config_derives_or_pins_the_endpoint() {
        let mut realtime = RealtimeConfig {
            api_url: "https://mukstagram.example/api".into(),
            ..RealtimeConfig::default()
        };
        let derived = realtime.client_config().expect("derived");
        assert_eq!(
            derived.endpoint.url().as_str(),
            "wss://mukstagram.example/api/ws/connect"
        );
        assert_eq!(derived.reconnect, ReconnectPolicy::default());
        assert_eq!(derived.heartbeat_interval, Duration::from_secs(30));

        realtime.ws_url = Some("ws://127.0.0.1:8000/api/ws/connect".into());
        let pinned = realtime.client_config().expect("pinned");
        assert_eq!(
            pinned.endpoint.url().as_str(),
            "ws://127.0.0.1:8000/api/ws/connect"
        );

        realtime.ws_url = Some("ftp://nope".into());
        assert!(realtime.client_config().is_err());
    }
}
