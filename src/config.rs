use std::{env, fs, path::{Path, PathBuf}, time::Duration};

#[allow(unused_imports)]
use log::{info,warn,debug,error};
use serde::Deserialize;

use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "podscribe.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    IOError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub podchaser: PodchaserConfig,
    pub backend: BackendConfig,
    pub output: OutputConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PodchaserConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub page_size: usize,
    /// Episodes fetched when a title filter is given, so the filter sees past the head.
    pub scan_limit: usize,
}

impl Default for PodchaserConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::podchaser::API_URL.to_owned(),
            token: None,
            page_size: 25,
            scan_limit: 100,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub program: String,
    pub app_name: String,
    pub app_path: String,
    pub entrypoint: String,
    pub settle_delay_secs: u64,
    pub job_timeout_secs: u64,
    pub concurrency: usize,
    pub readiness: ReadinessConfig,
    pub result_marker: String,
    pub segments_marker: String,
    pub json_marker: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: "modal".to_owned(),
            app_name: "example-base-whisper".to_owned(),
            app_path: "src/podcast_transcription/modal_client.py".to_owned(),
            entrypoint: "main".to_owned(),
            settle_delay_secs: 10,
            job_timeout_secs: 3600,
            concurrency: 1,
            readiness: ReadinessConfig::default(),
            result_marker: "TRANSCRIPTION RESULT:".to_owned(),
            segments_marker: "TIMESTAMPED SEGMENTS:".to_owned(),
            json_marker: "TRANSCRIPTION JSON:".to_owned(),
        }
    }
}

impl BackendConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// `<app_path>::<entrypoint>`, the target handed to `run`.
    pub fn entrypoint_ref(&self) -> String {
        format!("{}::{}", self.app_path, self.entrypoint)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ReadinessConfig {
    pub attempts: u32,
    pub backoff_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_secs: 5,
            timeout_secs: 60,
        }
    }
}

impl ReadinessConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.attempts,
            Duration::from_secs(self.backoff_secs),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("transcriptions"),
        }
    }
}

impl Config {
    /// Reads `path`, or `podscribe.toml` when it exists, then layers `.env` and the
    /// process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => {
                debug!("no config file, using defaults");
                Self::default()
            }
        };
        if dotenv::dotenv().is_ok() {
            debug!("loaded .env");
        }
        config.apply_env(|k| env::var(k).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("loading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::IOError {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_owned(),
            source,
        })
    }

    pub fn apply_env<F>(&mut self, var: F)
        where F: Fn(&str) -> Option<String> {
        if let Some(token) = var("PODCHASER_DEV_KEY").filter(|t| !t.is_empty()) {
            self.podchaser.token = Some(token);
        }
        if let Some(dir) = var("PODSCRIBE_OUTPUT_DIR").filter(|d| !d.is_empty()) {
            self.output.dir = PathBuf::from(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_backend() {
        let c = Config::default();
        assert_eq!(c.backend.program, "modal");
        assert_eq!(c.backend.job_timeout(), Duration::from_secs(3600));
        assert_eq!(c.backend.readiness.attempts, 3);
        assert_eq!(c.backend.entrypoint_ref(), "src/podcast_transcription/modal_client.py::main");
        assert_eq!(c.output.dir, PathBuf::from("transcriptions"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c: Config = toml::from_str(r#"
            [backend]
            concurrency = 4
            [backend.readiness]
            backoff_secs = 1
        "#).unwrap();
        assert_eq!(c.backend.concurrency, 4);
        assert_eq!(c.backend.readiness.backoff_secs, 1);
        assert_eq!(c.backend.readiness.attempts, 3);
        assert_eq!(c.podchaser.page_size, 25);
    }

    #[test]
    fn env_overrides_file() {
        let mut c: Config = toml::from_str(r#"
            [podchaser]
            token = "from-file"
        "#).unwrap();
        c.apply_env(|k| match k {
            "PODCHASER_DEV_KEY" => Some("from-env".to_owned()),
            "PODSCRIBE_OUTPUT_DIR" => Some(String::new()),
            _ => None,
        });
        assert_eq!(c.podchaser.token.as_deref(), Some("from-env"));
        assert_eq!(c.output.dir, PathBuf::from("transcriptions"));
    }
}
