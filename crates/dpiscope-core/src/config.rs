use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration, one TOML table per concern. Every field has a default.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub probe: ProbeConfig,
    pub registry: RegistryConfig,
    pub sweep: SweepConfig,
    pub whoami: WhoamiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProbeConfig {
    /// Shared by every timed operation in a run.
    pub timeout_ms: u64,
    /// Bytes pushed by each DPI method (request body, or summed query padding).
    pub payload_bytes: usize,
    /// Padding carried by a single request of the large-reqline method.
    pub reqline_chunk_bytes: usize,
    pub scheme: String,
    pub accept_invalid_certs: bool,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RegistryConfig {
    /// `owner/name` of the repository whose commits tag share layouts.
    pub repo: String,
    pub api_url: String,
    pub raw_url: String,
    pub layout_path: String,
    pub roster_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SweepConfig {
    pub sample_size: usize,
    /// Alive hosts after which the rest of a subnet's probes are cancelled.
    pub alive_min: usize,
    pub only_24_prefix: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WhoamiConfig {
    pub ripe_api_url: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "User-Agent".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
        );
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        );
        headers.insert("Accept-Language".to_string(), "en-US,en;q=0.9".to_string());

        Self {
            timeout_ms: 5000,
            payload_bytes: 64 * 1024,
            reqline_chunk_bytes: 2048,
            scheme: "https".to_string(),
            accept_invalid_certs: true,
            headers,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            repo: "hyperion-cs/dpi-checkers".to_string(),
            api_url: "https://api.github.com".to_string(),
            raw_url: "https://raw.githubusercontent.com".to_string(),
            layout_path: "ru/tcp-16-20/share/layout.json".to_string(),
            roster_path: "ru/tcp-16-20/suite.v2.json".to_string(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sample_size: 25,
            alive_min: 3,
            only_24_prefix: true,
        }
    }
}

impl Default for WhoamiConfig {
    fn default() -> Self {
        Self {
            ripe_api_url: "https://stat.ripe.net/data/".to_string(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Validation(msg.to_string()));

        if self.probe.timeout_ms == 0 {
            return fail("probe.timeout_ms must be positive");
        }
        if self.probe.payload_bytes == 0 {
            return fail("probe.payload_bytes must be positive");
        }
        if self.probe.reqline_chunk_bytes == 0 {
            return fail("probe.reqline_chunk_bytes must be positive");
        }
        if self.probe.scheme != "http" && self.probe.scheme != "https" {
            return fail("probe.scheme must be `http` or `https`");
        }
        if !self.registry.repo.contains('/') {
            return fail("registry.repo must look like `owner/name`");
        }
        if self.sweep.sample_size == 0 || self.sweep.alive_min == 0 {
            return fail("sweep.sample_size and sweep.alive_min must be positive");
        }
        Ok(())
    }
}
