use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

fn default_catalog_source() -> String {
    "products.json".to_string()
}

fn default_page_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_proxy_listen() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_url() -> String {
    OPENAI_CHAT_URL.to_string()
}

fn default_page_max_tokens() -> u32 {
    800
}

fn default_proxy_max_tokens() -> u32 {
    300
}

fn default_credential_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// File path or http(s) URL of the products document
    #[serde(default = "default_catalog_source")]
    pub source: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PageConfig {
    #[serde(default = "default_page_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Client-side credential for direct calls. Local testing only.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_page_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_listen")]
    pub listen: String,
    #[serde(default = "default_api_url")]
    pub upstream_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_proxy_max_tokens")]
    pub default_max_tokens: u32,
    /// Environment variable holding the upstream credential, read per request
    #[serde(default = "default_credential_env")]
    pub credential_env: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            source: default_catalog_source(),
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        PageConfig {
            listen: default_page_listen(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            proxy_url: None,
            api_key: None,
            model: default_model(),
            max_tokens: default_page_max_tokens(),
            api_url: default_api_url(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            listen: default_proxy_listen(),
            upstream_url: default_api_url(),
            default_model: default_model(),
            default_max_tokens: default_proxy_max_tokens(),
            credential_env: default_credential_env(),
        }
    }
}

/// How the page reaches the model, decided once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    None,
    Proxy(String),
    Direct(String),
}

impl Transport {
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::None => "none",
            Transport::Proxy(_) => "proxy",
            Transport::Direct(_) => "direct",
        }
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TransportConfig {
    /// Proxy wins whenever it is configured; the direct credential is only a fallback.
    pub fn select(&self) -> Transport {
        if let Some(url) = present(&self.proxy_url) {
            Transport::Proxy(url)
        } else if let Some(key) = present(&self.api_key) {
            Transport::Direct(key)
        } else {
            Transport::None
        }
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("ROUTINE_PROXY_URL") {
            self.proxy_url = Some(url);
        }
        if let Ok(key) = std::env::var("ROUTINE_API_KEY") {
            self.api_key = Some(key);
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let mut config = Self::load_from(&Self::get_config_path());
        config.transport.apply_env();
        config
    }

    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => warn!("Error parsing {}: {}. Using defaults.", config_path.display(), e),
                },
                Err(e) => warn!("Error reading {}: {}. Using defaults.", config_path.display(), e),
            }
        }

        Config::default()
    }

    pub fn get_config_path() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/routine-bar/config.toml")
        } else {
            PathBuf::from("config.toml")
        }
    }
}
