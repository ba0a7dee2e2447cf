use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "sleuth.toml";

const KNOWN_PROVIDERS: &[&str] = &["anthropic", "openai", "custom"];

/// Top-level Sleuth configuration, matching `sleuth.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleuthConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub quotes: QuotesSection,
    #[serde(default)]
    pub reveal: RevealSection,
    #[serde(default)]
    pub investigation: InvestigationSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// One of `anthropic`, `openai`, `custom` (OpenAI-compatible endpoint).
    pub provider: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Empty means the provider's public endpoint.
    pub base_url: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: String::new(),
            temperature: 0.2,
            max_tokens: 2048,
            timeout_secs: 60,
        }
    }
}

impl LlmSection {
    pub fn base_url(&self) -> Option<&str> {
        let url = self.base_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotesSection {
    pub enabled: bool,
    /// Abort the investigation when the quote fetch fails or returns no rows.
    pub required: bool,
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for QuotesSection {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            base_url: "https://stooq.com".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 15,
        }
    }
}

impl QuotesSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealSection {
    /// Fixed pause between two revealed steps.
    pub delay_ms: u64,
    /// How many positions back a cross-validation step points.
    pub cross_validate_lookback: usize,
}

impl Default for RevealSection {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            cross_validate_lookback: 2,
        }
    }
}

impl RevealSection {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationSection {
    /// Prepend an "Expected Inputs / Outputs" step to every investigation.
    pub include_brief: bool,
}

impl SleuthConfig {
    /// Parse a config from TOML text and validate it.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load `path` if given, else `./sleuth.toml` if present, else defaults.
    pub fn discover(path: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default_path = cwd.join(CONFIG_FILE_NAME);
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !KNOWN_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "llm.provider must be one of {}, got {:?}",
                KNOWN_PROVIDERS.join(", "),
                self.llm.provider
            )));
        }
        if self.llm.provider == "custom" && self.llm.base_url().is_none() {
            return Err(ConfigError::Invalid(
                "llm.base_url is required for the custom provider".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.timeout_secs == 0 || self.quotes.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.reveal.cross_validate_lookback == 0 {
            return Err(ConfigError::Invalid(
                "reveal.cross_validate_lookback must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
