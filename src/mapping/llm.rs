use crate::core::config::{LlmConfig, LlmProvider};
use crate::dom::element::ElementDescriptor;
use crate::errors::{FormError, Result};
use crate::mapping::cache::{CacheKey, JsonFileCache, MappingCache, MemoryCache};
use crate::mapping::field::{FieldMapping, FieldType, Locator};
use crate::mapping::prompt::{build_classification_prompt, PromptContext};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierStrategy {
    Selector,
    CoordinateClick,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassificationTarget {
    Selector(String),
    Point { x: f64, y: f64 },
}

/// A validated classifier answer. Confidence is not gated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub strategy: ClassifierStrategy,
    pub target: ClassificationTarget,
    pub action: String,
    pub value: Option<String>,
    pub field_path: Option<String>,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

const ACTIONS: &[&str] = &["fill", "type", "select", "check", "upload", "click", "skip"];

impl Classification {
    /// Mapping for `descriptor`, or `None` when the model chose to skip it.
    pub fn to_mapping(&self, descriptor: &ElementDescriptor) -> Option<FieldMapping> {
        let field_type = match self.action.as_str() {
            "skip" => return None,
            "select" => FieldType::Select,
            "check" => match FieldType::from_descriptor(descriptor) {
                FieldType::Radio => FieldType::Radio,
                _ => FieldType::Checkbox,
            },
            "upload" => FieldType::File,
            "click" => FieldType::Click,
            _ => match FieldType::from_descriptor(descriptor) {
                t if t.is_textual() => t,
                _ => FieldType::Text,
            },
        };
        let locator = match &self.target {
            ClassificationTarget::Selector(selector) => Locator::css(selector.clone()),
            ClassificationTarget::Point { x, y } => Locator::Point { x: *x, y: *y },
        };

        let mut mapping = FieldMapping::llm(locator, &descriptor.field_key(), field_type, self.confidence)
            .set_required(descriptor.required);
        if let Some(path) = &self.field_path {
            mapping = mapping.with_path(path);
        }
        if let Some(value) = &self.value {
            mapping = mapping.with_static_value(value.clone());
        }
        Some(mapping)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClassification {
    strategy: Option<String>,
    selector: Option<String>,
    target: Option<Value>,
    x: Option<f64>,
    y: Option<f64>,
    action: Option<String>,
    value: Option<Value>,
    field_path: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
}

/// Parses a model response. Anything malformed or missing a required key
/// yields `None`.
pub fn parse_classification(text: &str) -> Option<Classification> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: RawClassification = serde_json::from_str(&text[start..=end]).ok()?;

    let strategy = match raw.strategy?.trim().to_lowercase().as_str() {
        "selector" => ClassifierStrategy::Selector,
        "coordinate_click" | "coordinate" => ClassifierStrategy::CoordinateClick,
        _ => return None,
    };

    let action = raw.action?.trim().to_lowercase();
    if !ACTIONS.contains(&action.as_str()) {
        return None;
    }
    let action = if action == "type" { "fill".to_string() } else { action };

    let confidence = raw.confidence?;
    if !(0.0..=1.0).contains(&confidence) {
        return None;
    }

    let target = match strategy {
        ClassifierStrategy::Selector => {
            let selector = raw
                .selector
                .or_else(|| raw.target.as_ref().and_then(|t| t.as_str().map(str::to_string)))
                .filter(|s| !s.trim().is_empty())?;
            ClassificationTarget::Selector(selector)
        }
        ClassifierStrategy::CoordinateClick => {
            let from_target = raw.target.as_ref().and_then(|t| {
                Some((t.get("x")?.as_f64()?, t.get("y")?.as_f64()?))
            });
            let (x, y) = match (raw.x, raw.y) {
                (Some(x), Some(y)) => (x, y),
                _ => from_target?,
            };
            ClassificationTarget::Point { x, y }
        }
    };

    let value = match raw.value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    };

    Some(Classification {
        strategy,
        target,
        action,
        value,
        field_path: raw.field_path.filter(|p| !p.trim().is_empty()),
        confidence,
        reasoning: raw.reasoning,
    })
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Raw completion text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, temperature: f32, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
            "options": { "temperature": self.temperature },
        });
        let resp = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(FormError::Llm(format!("ollama returned {}: {}", status, text)));
        }
        let parsed: OllamaResponse = resp.json().await?;
        Ok(parsed.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.trim().to_string(),
            temperature,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    response_format: Value,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You classify web form fields. Answer with a single JSON object.",
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: json!({ "type": "json_object" }),
        };
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(FormError::Llm(format!("openai returned {}: {}", status, text)));
        }
        let parsed: ChatResponse = resp.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// `None` when no endpoint is configured.
pub fn client_from_config(config: &LlmConfig) -> Result<Option<Box<dyn LlmClient>>> {
    let Some(endpoint) = config.endpoint.as_deref() else {
        return Ok(None);
    };
    let timeout = Duration::from_millis(config.timeout_ms);
    let client: Box<dyn LlmClient> = match config.provider {
        LlmProvider::Ollama => Box::new(OllamaClient::new(
            endpoint,
            &config.model,
            config.temperature,
            timeout,
        )?),
        LlmProvider::OpenAi => {
            let key = config.api_key.as_deref().ok_or_else(|| {
                FormError::Config("openai provider requires an API key".to_string())
            })?;
            Box::new(OpenAiClient::new(
                endpoint,
                &config.model,
                key,
                config.temperature,
                timeout,
            )?)
        }
    };
    Ok(Some(client))
}

/// Classifies fields the heuristics could not place.
///
/// Without a client every call returns `None` and nothing else changes.
pub struct LlmClassifier {
    client: Option<Box<dyn LlmClient>>,
    cache: Box<dyn MappingCache>,
    max_excerpt_chars: usize,
    calls: usize,
}

impl LlmClassifier {
    pub fn new(
        client: Option<Box<dyn LlmClient>>,
        cache: Box<dyn MappingCache>,
        max_excerpt_chars: usize,
    ) -> Self {
        Self {
            client,
            cache,
            max_excerpt_chars,
            calls: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, Box::new(MemoryCache::new()), 0)
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = client_from_config(config)?;
        match &client {
            Some(c) => info!("field classifier enabled ({}, model {})", c.name(), config.model),
            None => info!("field classifier disabled: no LLM endpoint configured"),
        }
        Ok(Self::new(
            client,
            Box::new(JsonFileCache::open(&config.cache_path)),
            config.max_excerpt_chars,
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Number of requests actually sent to the model.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub async fn classify(
        &mut self,
        site: &str,
        descriptor: &ElementDescriptor,
        context: &PromptContext,
    ) -> Option<Classification> {
        let client = self.client.as_ref()?;

        let key = CacheKey::new(
            site,
            &descriptor.field_key(),
            &descriptor.input_type,
            descriptor.label_text.as_deref().unwrap_or(""),
        );
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "classification cache hit");
            return Some(hit);
        }

        let prompt = build_classification_prompt(site, descriptor, context, self.max_excerpt_chars);
        self.calls += 1;
        let text = match client.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(field = %descriptor.field_key(), "classifier unavailable: {}", e);
                return None;
            }
        };

        let Some(classification) = parse_classification(&text) else {
            warn!(field = %descriptor.field_key(), "discarding malformed classifier response");
            return None;
        };

        self.cache.put(&key, classification.clone());
        if let Err(e) = self.cache.flush() {
            warn!("could not persist mapping cache: {}", e);
        }
        Some(classification)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.cache.flush()
    }
}
