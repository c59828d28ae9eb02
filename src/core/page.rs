use crate::errors::Result;
use crate::utils::javascript;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Structured reads of the live page. Each variant renders to a script whose
/// result is JSON text; drivers that can answer natively override
/// [`PageDriver::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageQuery {
    /// Every candidate interactive element with raw style and geometry data.
    InteractiveElements,
    /// Blur whatever has focus and put focus on the document body.
    FocusBody,
    /// The element that currently has keyboard focus, or null.
    FocusedElement,
    /// Visible elements flagged invalid by the page.
    ValidationErrors,
    /// Current value and checked state of one element, or null if absent.
    FieldState { selector: String },
    /// `innerText` of the body.
    VisibleText,
    /// Submit the first form natively; returns whether a form existed.
    SubmitFirstForm,
}

impl PageQuery {
    pub fn script(&self) -> String {
        match self {
            PageQuery::InteractiveElements => javascript::interactive_elements(),
            PageQuery::FocusBody => javascript::FOCUS_BODY.to_string(),
            PageQuery::FocusedElement => javascript::focused_element(),
            PageQuery::ValidationErrors => javascript::validation_errors(),
            PageQuery::FieldState { selector } => javascript::field_state(selector),
            PageQuery::VisibleText => javascript::VISIBLE_TEXT.to_string(),
            PageQuery::SubmitFirstForm => javascript::SUBMIT_FIRST_FORM.to_string(),
        }
    }
}

/// Page capability consumed by every component. Every call suspends until
/// the browser acknowledges it or its timeout elapses.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Clear the element, then type `value` into it.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Choose the option whose value equals `value` exactly.
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<()>;

    async fn upload_files(&self, selector: &str, paths: &[PathBuf]) -> Result<()>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn evaluate(&self, script: &str) -> Result<Value>;

    async fn press_key(&self, key: &str) -> Result<()>;

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()>;

    /// Select all content of the focused control and delete it.
    async fn clear_focused(&self) -> Result<()>;

    /// Type into whatever has focus.
    async fn type_keys(&self, text: &str) -> Result<()>;

    async fn content(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn close(&self) -> Result<()>;

    async fn query(&self, query: &PageQuery) -> Result<Value> {
        let raw = self.evaluate(&query.script()).await?;
        Ok(decode_script_result(raw))
    }
}

/// Scripts hand back `JSON.stringify(...)` output; unwrap it when possible.
pub fn decode_script_result(raw: Value) -> Value {
    match raw {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}
