//! TOML configuration.
//!
//! ```toml
//! [local]
//! path = "./data/lps.sqlite"
//!
//! [remote]                      # omit (or leave empty) for local-only mode
//! url = "https://xyzcompany.supabase.co"
//! anon_key = "eyJ..."
//! # access_token = "..."        # or SUPABASE_ACCESS_TOKEN; absent = guest mode
//!
//! [llm]
//! provider = "openai"           # or "disabled"
//! model = "gpt-4o-mini"
//!
//! [storage]                     # optional S3-compatible object storage
//! bucket = "policy-uploads"
//! region = "eu-west-1"
//!
//! [ids]
//! scheme = "short"              # or "uuid"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{Context, Result};
use policy_sim_core::ids::IdScheme;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Longest presigned URL lifetime S3 accepts (7 days).
pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 604_800;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub local: LocalConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub ids: IdsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalConfig {
    pub path: PathBuf,
}

/// Supabase project settings. Absent or empty `url`/`anon_key` means
/// local-only mode.
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            access_token: None,
            timeout_secs: default_remote_timeout(),
        }
    }
}

fn default_remote_timeout() -> u64 {
    30
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        non_empty(&self.url).is_some() && non_empty(&self.anon_key).is_some()
    }

    /// The session token: config first, then `SUPABASE_ACCESS_TOKEN`.
    pub fn resolved_access_token(&self) -> Option<String> {
        non_empty(&self.access_token).or_else(|| {
            std::env::var("SUPABASE_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty())
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            max_document_chars: default_max_document_chars(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_temperature() -> f64 {
    0.2
}
fn default_max_document_chars() -> usize {
    30_000
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_presign_expiry")]
    pub presign_expiry_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_prefix() -> String {
    "uploads/".to_string()
}
fn default_presign_expiry() -> u64 {
    900
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IdsConfig {
    #[serde(default)]
    pub scheme: IdScheme,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// Local-only defaults, used when no config file is present.
    pub fn minimal() -> Self {
        Self {
            local: LocalConfig {
                path: PathBuf::from("./data/lps.sqlite"),
            },
            remote: RemoteConfig::default(),
            llm: LlmConfig::default(),
            storage: None,
            ids: IdsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Some(url) = non_empty(&config.remote.url) {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("remote.url must start with http:// or https://");
        }
    }
    if config.remote.timeout_secs == 0 {
        anyhow::bail!("remote.timeout_secs must be > 0");
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }
    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if config.llm.max_document_chars == 0 {
        anyhow::bail!("llm.max_document_chars must be > 0");
    }

    if let Some(storage) = &config.storage {
        if storage.bucket.trim().is_empty() {
            anyhow::bail!("storage.bucket must not be empty");
        }
        if storage.presign_expiry_secs == 0 || storage.presign_expiry_secs > MAX_PRESIGN_EXPIRY_SECS
        {
            anyhow::bail!(
                "storage.presign_expiry_secs must be in [1, {}]",
                MAX_PRESIGN_EXPIRY_SECS
            );
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_is_local_only() {
        let cfg = parse_config("[local]\npath = \"/tmp/x.sqlite\"\n").unwrap();
        assert!(!cfg.remote.is_configured());
        assert!(!cfg.llm.is_enabled());
        assert!(cfg.storage.is_none());
        assert_eq!(cfg.ids.scheme, IdScheme::Short);
        assert_eq!(cfg.server.bind, "127.0.0.1:7340");
    }

    #[test]
    fn test_empty_remote_values_are_unconfigured() {
        let cfg = parse_config(
            "[local]\npath = \"x\"\n[remote]\nurl = \"\"\nanon_key = \"   \"\n",
        )
        .unwrap();
        assert!(!cfg.remote.is_configured());
    }

    #[test]
    fn test_remote_configured() {
        let cfg = parse_config(
            "[local]\npath = \"x\"\n[remote]\nurl = \"https://p.supabase.co\"\nanon_key = \"k\"\n",
        )
        .unwrap();
        assert!(cfg.remote.is_configured());
    }

    #[test]
    fn test_rejects_bad_remote_url() {
        let err = parse_config("[local]\npath = \"x\"\n[remote]\nurl = \"ftp://p\"\nanon_key = \"k\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("remote.url"));
    }

    #[test]
    fn test_openai_requires_model() {
        let err = parse_config("[local]\npath = \"x\"\n[llm]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("llm.model"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        assert!(parse_config("[local]\npath = \"x\"\n[llm]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_uuid_id_scheme() {
        let cfg = parse_config("[local]\npath = \"x\"\n[ids]\nscheme = \"uuid\"\n").unwrap();
        assert_eq!(cfg.ids.scheme, IdScheme::Uuid);
    }

    #[test]
    fn test_storage_expiry_bounds() {
        let ok = parse_config("[local]\npath = \"x\"\n[storage]\nbucket = \"b\"\n").unwrap();
        assert_eq!(ok.storage.unwrap().presign_expiry_secs, 900);
        assert!(parse_config(
            "[local]\npath = \"x\"\n[storage]\nbucket = \"b\"\npresign_expiry_secs = 999999\n"
        )
        .is_err());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let err = parse_config("[local]\npath = \"x\"\n[llm]\ntimeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("llm.timeout_secs"));
        let err =
            parse_config("[local]\npath = \"x\"\n[remote]\ntimeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("remote.timeout_secs"));
    }

    #[test]
    fn test_example_config_parses() {
        let cfg = parse_config(include_str!("../config/lps.example.toml")).unwrap();
        assert!(!cfg.remote.is_configured());
        assert!(!cfg.llm.is_enabled());
        assert!(cfg.storage.is_none());
        assert_eq!(cfg.ids.scheme, IdScheme::Short);
    }
}
