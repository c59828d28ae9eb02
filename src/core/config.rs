use crate::errors::{FormError, Result};
use crate::types::Viewport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub session: SessionConfig,
    pub llm: LlmConfig,
    pub verify: VerifyConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub disable_images: bool,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub navigation_timeout_ms: u64,
    pub element_timeout_ms: u64,
    pub inter_field_delay_ms: u64,
    pub inter_job_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub max_job_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Base URL of the endpoint. `None` disables the classifier entirely.
    pub endpoint: Option<String>,
    pub model: String,
    pub temperature: f32,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_excerpt_chars: usize,
    pub min_confidence: f64,
    pub cache_path: PathBuf,
}

/// What to conclude when a submission produced a changed page but neither
/// success nor error wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InconclusivePolicy {
    #[default]
    Failure,
    Success,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub inconclusive: InconclusivePolicy,
    pub extra_success_keywords: Vec<String>,
    pub extra_error_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub profile_dir: PathBuf,
    pub jobs_file: PathBuf,
    pub output_dir: PathBuf,
    pub submit: bool,
    pub tab_order_fallback: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            disable_images: false,
            args: vec![],
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 60_000,
            element_timeout_ms: 15_000,
            inter_field_delay_ms: 200,
            inter_job_delay_ms: 2_000,
            settle_delay_ms: 2_000,
            max_job_attempts: 2,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            endpoint: None,
            model: "mistral".to_string(),
            temperature: 0.1,
            api_key: None,
            timeout_ms: 30_000,
            max_excerpt_chars: 3_000,
            min_confidence: 0.6,
            cache_path: PathBuf::from(".field-mappings.json"),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from("./in"),
            jobs_file: PathBuf::from("./job_urls.txt"),
            output_dir: PathBuf::from("./out"),
            submit: true,
            tab_order_fallback: true,
        }
    }
}

impl SessionConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn inter_field_delay(&self) -> Duration {
        Duration::from_millis(self.inter_field_delay_ms)
    }

    pub fn inter_job_delay(&self) -> Duration {
        Duration::from_millis(self.inter_job_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Config {
    /// Loads the JSON config file when given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    FormError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&raw)?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlays environment variables. The lookup is injected so tests do not
    /// have to touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(headless) = lookup("FORMPILOT_HEADLESS") {
            self.browser.headless = headless != "false" && headless != "0";
        }
        if let Some(dir) = lookup("FORMPILOT_OUTPUT_DIR") {
            self.run.output_dir = PathBuf::from(dir);
        }

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.provider = LlmProvider::OpenAi;
            self.llm.api_key = Some(key);
            self.llm.endpoint = Some(
                lookup("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            );
            if let Some(model) = lookup("OPENAI_MODEL") {
                self.llm.model = model;
            } else if self.llm.model == LlmConfig::default().model {
                self.llm.model = "gpt-4o-mini".to_string();
            }
        } else if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.llm.provider = LlmProvider::Ollama;
            self.llm.endpoint = Some(url);
            if let Some(model) = lookup("OLLAMA_MODEL") {
                self.llm.model = model;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.browser.headless);
        assert!(config.llm.endpoint.is_none());
        assert_eq!(config.session.max_job_attempts, 2);
        assert_eq!(config.verify.inconclusive, InconclusivePolicy::Failure);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"session": {"inter_job_delay_ms": 10}}"#).unwrap();
        assert_eq!(config.session.inter_job_delay_ms, 10);
        assert_eq!(config.session.element_timeout_ms, 15_000);
        assert_eq!(config.run.output_dir, PathBuf::from("./out"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OLLAMA_BASE_URL", "http://localhost:11434"),
            ("OLLAMA_MODEL", "llama3"),
            ("FORMPILOT_HEADLESS", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert!(!config.browser.headless);
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.endpoint.as_deref(), Some("http://localhost:11434"));
        assert_eq!(config.llm.model, "llama3");
    }

    #[test]
    fn test_openai_key_selects_provider() {
        let mut config = Config::default();
        config.apply_env(|k| (k == "OPENAI_API_KEY").then(|| "sk-test".to_string()));
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(
            config.llm.endpoint.as_deref(),
            Some("https://api.openai.com/v1")
        );
    }
}
