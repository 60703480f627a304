use crate::core::value_date;
use anyhow::{Context, Result, anyhow};
use chrono::{FixedOffset, NaiveTime};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_UPSTREAM_URL: &str = "https://www.bcv.org.ve";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.4951.64 Safari/537.36";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// The BCV certificate chain is incomplete on many hosts, so verification
    /// is off unless explicitly enabled.
    pub accept_invalid_certs: bool,
    pub usd_selector: String,
    pub eur_selector: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: true,
            usd_selector: "div#dolar strong".to_string(),
            eur_selector: "div#euro strong".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local times (`HH:MM`) at which rates are refreshed every day.
    pub refresh_times: Vec<String>,
    pub utc_offset_hours: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            refresh_times: vec!["12:00".to_string(), "16:05".to_string()],
            utc_offset_hours: value_date::CARACAS_UTC_OFFSET_HOURS,
        }
    }
}

impl ScheduleConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        value_date::offset_from_hours(self.utc_offset_hours)
            .ok_or_else(|| anyhow!("Invalid UTC offset: {} hours", self.utc_offset_hours))
    }

    pub fn slots(&self) -> Result<Vec<NaiveTime>> {
        let mut slots = self
            .refresh_times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t, "%H:%M")
                    .with_context(|| format!("Invalid refresh time: '{t}' (expected HH:MM)"))
            })
            .collect::<Result<Vec<_>>>()?;
        slots.sort();
        slots.dedup();
        Ok(slots)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Loads the default config file, falling back to built-in defaults when
    /// it does not exist.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("ve", "tasabcv", "tasabcv")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
