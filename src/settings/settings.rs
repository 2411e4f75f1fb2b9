use crate::application_port::{DEFAULT_LIFETIME, DEFAULT_TOKEN_ID_LENGTH, TokenConfig};
use crate::domain_port::DEFAULT_KEY_PREFIX;
use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub token: Token,
    #[serde(default)]
    pub redis: Redis,
    #[serde(default)]
    pub file: FileBackend,
    pub http: Http,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Token {
    pub backend: String, // "memory", "redis" or "file"
    #[serde(default = "default_lifetime_secs")]
    pub lifetime_secs: u64,
    #[serde(default)]
    pub single_session: bool,
    #[serde(default)]
    pub multi_login: bool,
    #[serde(default)]
    pub auto_refresh: bool,
    #[serde(default)]
    pub secret_key: SecretKey,
    #[serde(default = "default_token_id_length")]
    pub token_id_length: usize,
    #[serde(default)]
    pub public_paths: Vec<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Signing secret. Never printed.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(pub String);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("<unset>")
        } else {
            f.write_str("<redacted>")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Redis {
    pub dsn: String,
}

impl Default for Redis {
    fn default() -> Self {
        Redis {
            dsn: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FileBackend {
    pub path: PathBuf,
}

impl Default for FileBackend {
    fn default() -> Self {
        FileBackend {
            path: std::env::temp_dir().join("tokenkeeper.snapshot.json"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

fn default_lifetime_secs() -> u64 {
    DEFAULT_LIFETIME.as_secs()
}

fn default_token_id_length() -> usize {
    DEFAULT_TOKEN_ID_LENGTH
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl Token {
    pub fn to_token_config(&self) -> TokenConfig {
        TokenConfig {
            lifetime: Duration::from_secs(self.lifetime_secs),
            single_session: self.single_session,
            multi_login: self.multi_login,
            auto_refresh: self.auto_refresh,
            secret_key: self.secret_key.0.as_bytes().to_vec(),
            token_id_length: self.token_id_length,
            public_paths: self.public_paths.clone(),
        }
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

const ENV_PREFIX: &str = "TOKENKEEPER";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    // e.g. TOKENKEEPER__TOKEN__BACKEND=redis
    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("token.public_paths")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
