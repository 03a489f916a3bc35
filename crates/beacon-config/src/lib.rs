use beacon_contracts::{UserId, DEFAULT_COLLECT_BASE_URL};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../config/config.schema.json"
));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("{0} is required")]
    MissingCredential(&'static str),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub measurement_id: String,
    pub api_secret: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_COLLECT_BASE_URL.to_string()
}

impl Config {
    pub fn new(measurement_id: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            measurement_id: measurement_id.into(),
            api_secret: api_secret.into(),
            user_id: None,
            client_id: None,
            endpoint: Endpoint::default(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint.base_url = base_url.into();
        self
    }

    /// Checks the invariants a session relies on. Called again on session
    /// construction, so hand-built configs get the same treatment as loaded ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.measurement_id.trim().is_empty() {
            return Err(ConfigError::MissingCredential("measurement_id"));
        }
        if self.api_secret.trim().is_empty() {
            return Err(ConfigError::MissingCredential("api_secret"));
        }
        if matches!(self.client_id.as_deref(), Some(v) if v.trim().is_empty()) {
            return Err(ConfigError::UnsupportedConfig(
                "client_id must not be empty when set".to_string(),
            ));
        }
        let base = self.endpoint.base_url.as_str();
        if !base.starts_with("https://") && !base.starts_with("http://") {
            return Err(ConfigError::UnsupportedConfig(format!(
                "endpoint.base_url={base} is not supported; expected an http(s) URL"
            )));
        }
        Ok(())
    }
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}
