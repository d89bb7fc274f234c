//! Runtime configuration for the `cdp-orchestrator` binary: where test
//! definitions live, and how to launch/attach to Chrome.
//!
//! Layered the way `config` crate users typically do: built-in defaults,
//! then an optional file, then `CDP_ORCHESTRATOR__*` environment overrides.

use std::path::PathBuf;

use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory scanned for `*.json` test definitions.
    #[serde(default = "default_tests_dir")]
    pub tests_dir: PathBuf,

    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub json_logs: bool,

    #[serde(default)]
    pub cdp: CdpConfig,
}

fn default_tests_dir() -> PathBuf {
    PathBuf::from("./tests")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tests_dir: default_tests_dir(),
            log_level: None,
            json_logs: false,
            cdp: CdpConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads `path` (if it exists) over built-in defaults, then layers
    /// `CDP_ORCHESTRATOR__*` environment variables on top (e.g.
    /// `CDP_ORCHESTRATOR__CDP__HEADLESS=false`).
    pub fn load(path: Option<&PathBuf>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("tests_dir", "./tests")?
            .set_default("json_logs", false)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("cdp-orchestrator").required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CDP_ORCHESTRATOR")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_local_tests_dir() {
        let config = AppConfig::default();
        assert_eq!(config.tests_dir, PathBuf::from("./tests"));
        assert!(!config.json_logs);
    }
}
