//! CLI configuration, loaded from a JSON file.
//!
//! Every section is optional; missing values fall back to defaults.

use std::path::Path;

use anyhow::Context;
use clap::ValueEnum;
use flow::RetrievalConfig;
use platform::SimulatedPlatformConfig;
use serde::{Deserialize, Serialize};
use submission::SubmissionMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub log: LogConfig,
    pub retrieval: RetrievalConfig,
    pub session: SessionConfig,
}

impl CliConfig {
    /// Loads the configuration at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_json::from_str::<CliConfig>(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => CliConfig::default(),
        };
        config
            .retrieval
            .validate()
            .context("invalid retrieval configuration")?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub filter: String,
    pub format: LogFormat,
    /// OTLP/gRPC collector endpoint. Spans are only exported when set.
    pub otlp_endpoint: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
            otlp_endpoint: None,
        }
    }
}

/// What the scripted session starts from and how the simulated user answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub consent_given: bool,
    pub initial_mode: SubmissionMode,
    pub platform: SimulatedPlatformConfig,
    pub user: UserAnswers,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            consent_given: true,
            initial_mode: SubmissionMode::Inactive,
            platform: SimulatedPlatformConfig::default(),
            user: UserAnswers::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAnswers {
    /// Answer to the prompt asking to switch tracing on.
    pub accept_tracing: bool,
    pub permission: PermissionAnswer,
    /// How often the user presses "retry" after a failure before giving up.
    pub retries: u32,
}

impl Default for UserAnswers {
    fn default() -> Self {
        Self {
            accept_tracing: true,
            permission: PermissionAnswer::Grant,
            retries: 1,
        }
    }
}

/// How the platform's permission flow ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAnswer {
    /// The user approves and the platform grants access.
    Grant,
    /// The user backs out of the flow.
    Cancel,
    /// The user approves but the platform refuses access anyway.
    PlatformDenies,
}
