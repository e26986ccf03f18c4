use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime settings for the upload engine and its HTTP transport.
/// Defaults < config file < `CATALOGDROP_*` environment variables.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub server_url: String,
    pub upload_path: String,
    pub progress_path: String,
    pub status_path: String,
    pub upload_field: String,
    pub settle_delay_ms: u64,
    pub simulator_tick_ms: u64,
    pub simulator_max_step: f64,
    pub smoothing_tick_ms: u64,
    pub stream_idle_timeout_secs: Option<u64>,
    pub connect_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            upload_path: "/upload".to_string(),
            progress_path: "/upload/progress".to_string(),
            status_path: "/upload/status".to_string(),
            upload_field: "file".to_string(),
            settle_delay_ms: 3000,
            simulator_tick_ms: 200,
            simulator_max_step: 15.0,
            smoothing_tick_ms: 50,
            stream_idle_timeout_secs: Some(120),
            connect_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    /// Load config, layering an optional TOML file and the environment over defaults.
    /// Without an explicit path the platform config dir is used if the file exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = default_config_path().filter(|p| p.exists()) {
                    tracing::debug!(path = %path.display(), "loading config file");
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        let config: EngineConfig = figment
            .merge(Env::prefixed("CATALOGDROP_"))
            .extract()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.server_url)
            .with_context(|| format!("server_url is not a valid URL: {}", self.server_url))?;

        if self.simulator_tick_ms == 0 {
            bail!("simulator_tick_ms must be greater than zero");
        }
        if self.smoothing_tick_ms == 0 {
            bail!("smoothing_tick_ms must be greater than zero");
        }
        if self.simulator_max_step.is_nan() || self.simulator_max_step <= 0.0 {
            bail!("simulator_max_step must be positive");
        }
        if self.upload_field.trim().is_empty() {
            bail!("upload_field must not be empty");
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn simulator_tick(&self) -> Duration {
        Duration::from_millis(self.simulator_tick_ms)
    }

    pub fn smoothing_tick(&self) -> Duration {
        Duration::from_millis(self.smoothing_tick_ms)
    }

    /// `None` when the watchdog is off (unset or 0)
    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        self.stream_idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn upload_url(&self) -> String {
        join_url(&self.server_url, &self.upload_path)
    }

    pub fn progress_url(&self, job_id: &str) -> String {
        format!("{}/{}", join_url(&self.server_url, &self.progress_path), job_id)
    }

    pub fn status_url(&self, job_id: &str) -> String {
        format!("{}/{}", join_url(&self.server_url, &self.status_path), job_id)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "catalogdrop").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/').trim_end_matches('/')
    )
}
