//! Layered configuration: built-in defaults, an optional global file, an
//! optional project file, then an environment override merged last (§4.12).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::SourceConfig;
use crate::error::{Code, OpticsError};

/// The process/session configuration. `element_sources` accepts the
/// `elements_sources` spelling as a synonym at deserialize time (§9
/// Design Notes, Open Question resolution): both land in the same field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_true")]
    pub console: bool,
    #[serde(default)]
    pub driver_sources: Vec<SourceConfig>,
    #[serde(default, alias = "elements_sources")]
    pub element_sources: Vec<SourceConfig>,
    #[serde(default)]
    pub text_detection: Vec<SourceConfig>,
    #[serde(default)]
    pub image_detection: Vec<SourceConfig>,
    #[serde(default)]
    pub json_log: bool,
    #[serde(default)]
    pub json_log_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub project_path: Option<PathBuf>,
    #[serde(default)]
    pub execution_output_path: Option<PathBuf>,
    #[serde(default = "default_halt_duration")]
    pub halt_duration: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_halt_duration() -> f64 {
    0.1
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            console: true,
            driver_sources: Vec::new(),
            element_sources: Vec::new(),
            text_detection: Vec::new(),
            image_detection: Vec::new(),
            json_log: false,
            json_log_path: None,
            log_level: default_log_level(),
            project_path: None,
            execution_output_path: None,
            halt_duration: default_halt_duration(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Config {
    /// Parses a YAML config file, normalizing the `element_sources`/
    /// `elements_sources` synonym via serde's `alias`. A missing *optional*
    /// file is not an error at this layer; callers decide whether the
    /// layer is required.
    pub fn from_yaml_str(raw: &str) -> Result<Self, OpticsError> {
        serde_yaml::from_str(raw)
            .map_err(|e| OpticsError::new(Code::E0501, format!("invalid config: {e}")).with_cause(e))
    }

    /// Deep-merges `other` over `self`, `other` winning field by field for
    /// anything it sets non-default (mirrors the source's `deep_merge`,
    /// simplified to whole-field precedence since Rust's typed config has
    /// no free-form dict merge).
    pub fn merged_with(mut self, other: Config) -> Self {
        self.console = other.console;
        if !other.driver_sources.is_empty() {
            self.driver_sources = other.driver_sources;
        }
        if !other.element_sources.is_empty() {
            self.element_sources = other.element_sources;
        }
        if !other.text_detection.is_empty() {
            self.text_detection = other.text_detection;
        }
        if !other.image_detection.is_empty() {
            self.image_detection = other.image_detection;
        }
        self.json_log = other.json_log;
        if other.json_log_path.is_some() {
            self.json_log_path = other.json_log_path;
        }
        self.log_level = other.log_level;
        if other.project_path.is_some() {
            self.project_path = other.project_path;
        }
        if other.execution_output_path.is_some() {
            self.execution_output_path = other.execution_output_path;
        }
        self.halt_duration = other.halt_duration;
        self.max_attempts = other.max_attempts;
        self
    }

    /// Applies the `TEST_SESSION_ENV_VARIABLES` JSON-object override, the
    /// last layer applied (§4.12). A malformed or absent value leaves the
    /// config untouched, matching the source's fall-back-to-default
    /// behavior.
    pub fn apply_env_override(self, raw: Option<&str>) -> Self {
        let Some(raw) = raw else { return self };
        let Ok(serde_json::Value::Object(incoming)) = serde_json::from_str::<serde_json::Value>(raw) else {
            return self;
        };

        let mut value = serde_json::to_value(&self).unwrap_or(serde_json::Value::Null);
        if let serde_json::Value::Object(existing) = &mut value {
            for (k, v) in incoming {
                existing.insert(k, v);
            }
        }
        serde_json::from_value(value).unwrap_or(self)
    }
}
