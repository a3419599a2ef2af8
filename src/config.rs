// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "FEEDWARDEN_CONFIG_PATH";
const ENV_MONTHLY: &str = "FEEDWARDEN_SERP_MONTHLY_LIMIT";
const ENV_BIND: &str = "FEEDWARDEN_BIND_ADDR";

/// Engine knobs. Operators set one rate-limit number (monthly); the daily and
/// hourly caps are derived from it in `GlobalLimits::from_monthly`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub serp_api_monthly_limit: u32,
    pub scheduler_interval_secs: u64,
    pub backlog_batch_size: usize,
    pub bind_addr: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            serp_api_monthly_limit: 1000,
            scheduler_interval_secs: 60,
            backlog_batch_size: 500,
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from an explicit TOML path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config from {}", path.display()))?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $FEEDWARDEN_CONFIG_PATH
    /// 2) config/feedwarden.toml
    /// 3) built-in defaults
    /// Env overrides for the monthly knob and bind address apply on top.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("FEEDWARDEN_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let fallback = PathBuf::from("config/feedwarden.toml");
            if fallback.exists() {
                Self::load_from(&fallback)?
            } else {
                Self::default()
            }
        };

        if let Some(monthly) = std::env::var(ENV_MONTHLY)
            .ok()
            .and_then(|v| v.parse().ok())
        {
            cfg.serp_api_monthly_limit = monthly;
        }
        if let Ok(addr) = std::env::var(ENV_BIND) {
            cfg.bind_addr = addr;
        }
        Ok(cfg)
    }
}
