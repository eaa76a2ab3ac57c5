use std::{path::Path, time::Duration};

use {
    anyhow::Context,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use botwire_wecom::BotConfig;

/// Standard config file name, checked in the working directory.
pub const CONFIG_FILENAME: &str = "botwire.toml";

/// Top-level `botwire.toml` schema.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub callback: CallbackConfig,
    pub command: CommandConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// Credentials and timings for the callback endpoint.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Callback token from the console.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
    /// 43-character base64 AES key from the console.
    #[serde(serialize_with = "serialize_secret")]
    pub encoding_aes_key: Secret<String>,
    pub corp_id: String,
    /// Idle session lifetime in seconds.
    pub session_ttl_secs: u64,
    /// First-chunk race window in milliseconds.
    pub first_chunk_timeout_ms: u64,
    /// Refresh poll hold time in milliseconds.
    pub refresh_timeout_ms: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            encoding_aes_key: Secret::new(String::new()),
            corp_id: String::new(),
            session_ttl_secs: 60,
            first_chunk_timeout_ms: 200,
            refresh_timeout_ms: 500,
        }
    }
}

impl std::fmt::Debug for CallbackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackConfig")
            .field("token", &"[REDACTED]")
            .field("encoding_aes_key", &"[REDACTED]")
            .field("corp_id", &self.corp_id)
            .finish_non_exhaustive()
    }
}

impl CallbackConfig {
    pub fn bot_config(&self) -> BotConfig {
        BotConfig {
            session_ttl: Duration::from_secs(self.session_ttl_secs),
            first_chunk_timeout: Duration::from_millis(self.first_chunk_timeout_ms),
            refresh_timeout: Duration::from_millis(self.refresh_timeout_ms),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Command prefix.
    pub prefix: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self { prefix: "/".into() }
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Load config from `path`.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut config: AppConfig =
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load `./botwire.toml` when present, falling back to defaults plus
/// environment overrides.
pub fn discover_and_load() -> anyhow::Result<AppConfig> {
    let path = Path::new(CONFIG_FILENAME);
    if path.exists() {
        return load_config(path);
    }
    tracing::debug!("no config file found, using defaults");
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Credentials can come from the environment instead of the config file.
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(token) = std::env::var("BOTWIRE_TOKEN") {
        config.callback.token = Secret::new(token);
    }
    if let Ok(key) = std::env::var("BOTWIRE_AES_KEY") {
        config.callback.encoding_aes_key = Secret::new(key);
    }
    if let Ok(corp_id) = std::env::var("BOTWIRE_CORP_ID") {
        config.callback.corp_id = corp_id;
    }
}
