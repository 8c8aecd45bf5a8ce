use crate::error::{ReplayError, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const BASE_CONFIG: &str = "shopee-replay/config.toml";
pub const DEFAULT_API_BASE: &str = "https://live.shopee.ph/api/v1/replay";

/// What to do with the remaining records once one of them fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Continue,
    Abort,
}

/// Everything the pipeline needs to know, passed around explicitly.
///
/// Defaults are overlaid by the TOML file and then by command line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api_base: String,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    /// File name pattern, `{record_id}` is substituted.
    pub output_template: String,
    pub ffmpeg: String,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub mux_timeout_secs: u64,
    pub keep_segments: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base: DEFAULT_API_BASE.to_string(),
            output_dir: PathBuf::from("."),
            scratch_dir: PathBuf::from("downloads"),
            output_template: "shopee_replay_{record_id}.mp4".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            user_agent: concat!("shopee-replay/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            mux_timeout_secs: 600,
            keep_segments: false,
            failure_policy: FailurePolicy::Continue,
        }
    }
}

impl Config {
    /// Loads `path` if given, otherwise the user config file if there is one,
    /// otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        if let Some(path) = path {
            return Config::from_file(path);
        }
        match config_dir().map(|dir| dir.join(BASE_CONFIG)) {
            Some(user) if user.exists() => Config::from_file(&user),
            _ => {
                debug!("no config file, using defaults");
                Ok(Config::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReplayError::Config(format!("can't read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loading config");
        Config::from_toml(&contents)
            .map_err(|e| ReplayError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(contents: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ReplayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ffmpeg.trim().is_empty() {
            return Err(ReplayError::Config("ffmpeg program must not be empty".into()));
        }
        if !self.output_template.contains("{record_id}") {
            return Err(ReplayError::Config(
                "output_template needs a {record_id} placeholder".into(),
            ));
        }
        if self.request_timeout_secs == 0 || self.mux_timeout_secs == 0 {
            return Err(ReplayError::Config("timeouts must be at least one second".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn mux_timeout(&self) -> Duration {
        Duration::from_secs(self.mux_timeout_secs)
    }

    pub fn output_path(&self, record_id: &str) -> PathBuf {
        self.output_dir
            .join(self.output_template.replace("{record_id}", record_id))
    }

    /// Each record gets its own scratch directory so two records never share
    /// segment files.
    pub fn scratch_for(&self, record_id: &str) -> PathBuf {
        self.scratch_dir.join(record_id)
    }
}
