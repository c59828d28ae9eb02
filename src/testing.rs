//! In-memory page and browser used by unit and scenario tests. The page keeps
//! a flat list of elements, laid out in one column, and answers every
//! [`PageQuery`] natively instead of running scripts.

use crate::core::{BrowserTrait, Config, PageDriver, PageQuery};
use crate::dom::element::RawElement;
use crate::errors::{FormError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const ROW_HEIGHT: f64 = 40.0;
const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Debug, Clone)]
struct MockElement {
    raw: RawElement,
    value: String,
    checked: bool,
    files: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct MockState {
    url: String,
    elements: Vec<MockElement>,
    focused: Option<usize>,
    endless_focus: bool,
    focus_moves: usize,
    context_lost: bool,
    navigation_error: Option<String>,
    content_fails_after_submit: bool,
    malformed_validation: bool,
    submitted: bool,
    success_text: Option<String>,
    validation_errors: Vec<(String, String)>,
    clicks: Vec<String>,
    closed: bool,
}

impl MockState {
    fn resolve(&self, selector: &str) -> Option<usize> {
        if let Some(i) = self.elements.iter().position(|e| e.raw.selector == selector) {
            return Some(i);
        }
        let (tag, attrs) = parse_simple_selector(selector)?;
        self.elements.iter().position(|e| {
            let raw = &e.raw;
            tag.as_deref().map_or(true, |t| raw.tag == t)
                && attrs.iter().all(|(attr, value)| match attr.as_str() {
                    "id" => raw.id == *value,
                    "name" => raw.name == *value,
                    "type" => raw.input_type == *value,
                    _ => false,
                })
        })
    }

    fn element(&mut self, selector: &str) -> Result<&mut MockElement> {
        let index = self
            .resolve(selector)
            .ok_or_else(|| FormError::ElementNotFound(selector.to_string()))?;
        Ok(&mut self.elements[index])
    }

    fn by_name(&self, name: &str) -> Option<&MockElement> {
        self.elements.iter().find(|e| e.raw.name == name)
    }

    fn check_context(&self) -> Result<()> {
        if self.context_lost {
            return Err(FormError::JavaScriptFailed(
                "Execution context was destroyed".to_string(),
            ));
        }
        Ok(())
    }

    fn focusable(&self) -> Vec<usize> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.raw.disabled && e.raw.display != "none")
            .map(|(i, _)| i)
            .collect()
    }

    fn press_submit(&mut self, index: usize) {
        let raw = &self.elements[index].raw;
        if raw.tag == "button" || raw.input_type == "submit" {
            self.submit();
        }
    }

    fn submit(&mut self) {
        self.submitted = true;
        if self.success_text.is_some() {
            self.url = format!("{}#submitted", self.url);
        }
    }

    fn html(&self) -> String {
        if self.submitted {
            if let Some(text) = &self.success_text {
                return format!("<html><body><main><p>{}</p></main></body></html>", text);
            }
        }
        let mut body = String::from("<form>");
        for e in &self.elements {
            body.push_str(&format!(
                "<{tag} name=\"{name}\" type=\"{ty}\" value=\"{value}\"{checked}>{text}</{tag}>",
                tag = e.raw.tag,
                name = e.raw.name,
                ty = e.raw.input_type,
                value = e.value,
                checked = if e.checked { " checked" } else { "" },
                text = e.raw.text,
            ));
        }
        body.push_str("</form>");
        format!("<html><head><title>Mock page</title></head><body>{}</body></html>", body)
    }

    fn visible_text(&self) -> String {
        if self.submitted {
            if let Some(text) = &self.success_text {
                return text.clone();
            }
        }
        self.elements
            .iter()
            .map(|e| e.raw.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn focused_raw(&self) -> Value {
        if self.endless_focus {
            let mut raw = RawElement::input(&format!("trap{}", self.focus_moves));
            raw.path = format!("body > div:nth-of-type({})", self.focus_moves);
            return json!(raw);
        }
        match self.focused {
            Some(i) => {
                let mut raw = self.elements[i].raw.clone();
                if raw.path.is_empty() {
                    raw.path = raw.selector.clone();
                }
                json!(raw)
            }
            None => Value::Null,
        }
    }
}

/// Handles `tag`, `#id`, `[attr="v"]` and `tag[attr="v"]`.
fn parse_simple_selector(selector: &str) -> Option<(Option<String>, Vec<(String, String)>)> {
    let selector = selector.trim();
    if let Some(id) = selector.strip_prefix('#') {
        if id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Some((None, vec![("id".to_string(), id.to_string())]));
        }
        return None;
    }

    let (tag, rest) = match selector.find('[') {
        Some(i) => (&selector[..i], &selector[i..]),
        None => (selector, ""),
    };
    if !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let mut attrs = Vec::new();
    for part in rest.split(']').filter(|p| !p.is_empty()) {
        let part = part.strip_prefix('[')?;
        let (attr, value) = part.split_once('=')?;
        attrs.push((attr.to_string(), value.trim_matches('"').to_string()));
    }
    let tag = (!tag.is_empty()).then(|| tag.to_string());
    if tag.is_none() && attrs.is_empty() {
        return None;
    }
    Some((tag, attrs))
}

/// Cloning shares state, so a test can keep a handle to a page that a
/// [`MockBrowser`] hands out.
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    state: Arc<Mutex<MockState>>,
}

impl MockPage {
    pub fn new() -> Self {
        let page = Self::default();
        page.lock().url = "about:blank".to_string();
        page
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Appends `raw` below the previous element.
    pub fn with_element(self, mut raw: RawElement) -> Self {
        {
            let mut state = self.lock();
            raw.rect.y = 10.0 + state.elements.len() as f64 * ROW_HEIGHT;
            state.elements.push(MockElement {
                raw,
                value: String::new(),
                checked: false,
                files: Vec::new(),
            });
        }
        self
    }

    pub fn with_button(self, selector: &str, text: &str) -> Self {
        let mut raw = RawElement::input("");
        raw.tag = "button".to_string();
        raw.input_type = "button".to_string();
        raw.text = text.to_string();
        raw.selector = selector.to_string();
        if let Some(id) = selector.strip_prefix('#') {
            raw.id = id.to_string();
        }
        self.with_element(raw)
    }

    /// Text the page shows once a form was submitted.
    pub fn with_success_text(self, text: &str) -> Self {
        self.lock().success_text = Some(text.to_string());
        self
    }

    /// Every Tab press lands on a never-seen element.
    pub fn with_endless_focus(self) -> Self {
        self.lock().endless_focus = true;
        self
    }

    /// Reading the page content fails once the form has been submitted.
    pub fn with_content_error_after_submit(self) -> Self {
        self.lock().content_fails_after_submit = true;
        self
    }

    /// The validation scan answers with something that is not a list.
    pub fn with_malformed_validation(self) -> Self {
        self.lock().malformed_validation = true;
        self
    }

    pub fn with_navigation_error(self, message: &str) -> Self {
        self.lock().navigation_error = Some(message.to_string());
        self
    }

    pub fn lose_context(&self) {
        self.lock().context_lost = true;
    }

    pub fn set_value(&self, name: &str, value: &str) {
        let mut state = self.lock();
        if let Some(e) = state.elements.iter_mut().find(|e| e.raw.name == name) {
            e.value = value.to_string();
        }
    }

    pub fn add_validation_error(&self, selector: &str, message: &str) {
        self.lock()
            .validation_errors
            .push((selector.to_string(), message.to_string()));
    }

    pub fn value_of(&self, name: &str) -> Option<String> {
        self.lock().by_name(name).map(|e| e.value.clone())
    }

    pub fn is_checked(&self, name: &str) -> bool {
        self.lock().by_name(name).map(|e| e.checked).unwrap_or(false)
    }

    pub fn uploaded(&self, name: &str) -> Vec<PathBuf> {
        self.lock()
            .by_name(name)
            .map(|e| e.files.clone())
            .unwrap_or_default()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn was_submitted(&self) -> bool {
        self.lock().submitted
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.lock();
        if let Some(message) = &state.navigation_error {
            return Err(FormError::NavigationFailed(format!("{}: {}", url, message)));
        }
        state.url = url.to_string();
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        let state = self.lock();
        state.check_context()?;
        state
            .resolve(selector)
            .map(|_| ())
            .ok_or_else(|| FormError::Timeout(format!("waiting for {}", selector)))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        let element = state.element(selector)?;
        if matches!(element.raw.tag.as_str(), "button" | "select") {
            return Err(FormError::InvalidValue {
                field: selector.to_string(),
                reason: format!("cannot type into <{}>", element.raw.tag),
            });
        }
        element.value = value.to_string();
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.lock();
        let index = state
            .resolve(selector)
            .ok_or_else(|| FormError::ElementNotFound(selector.to_string()))?;
        state.clicks.push(selector.to_string());
        state.focused = Some(index);
        state.press_submit(index);
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        let element = state.element(selector)?;
        if !element.raw.options.iter().any(|o| o.value == value) {
            return Err(FormError::OptionNotFound {
                selector: selector.to_string(),
                value: value.to_string(),
            });
        }
        element.value = value.to_string();
        Ok(())
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<()> {
        self.lock().element(selector)?.checked = checked;
        Ok(())
    }

    async fn upload_files(&self, selector: &str, paths: &[PathBuf]) -> Result<()> {
        let mut state = self.lock();
        let element = state.element(selector)?;
        if element.raw.input_type != "file" {
            return Err(FormError::InvalidValue {
                field: selector.to_string(),
                reason: "not a file input".to_string(),
            });
        }
        element.files = paths.to_vec();
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(FAKE_PNG.to_vec())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.lock().check_context()?;
        Err(FormError::JavaScriptFailed(format!(
            "mock page cannot run scripts ({} bytes)",
            script.len()
        )))
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        state.check_context()?;
        if key != "Tab" {
            return Ok(());
        }
        state.focus_moves += 1;
        let order = state.focusable();
        if order.is_empty() {
            state.focused = None;
            return Ok(());
        }
        state.focused = match state.focused.and_then(|f| order.iter().position(|&i| i == f)) {
            Some(at) => Some(order[(at + 1) % order.len()]),
            None => Some(order[0]),
        };
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        let mut state = self.lock();
        let index = state
            .elements
            .iter()
            .position(|e| e.raw.rect.contains(x, y))
            .ok_or_else(|| FormError::ElementNotFound(format!("nothing at ({}, {})", x, y)))?;
        state.focused = Some(index);
        state.press_submit(index);
        Ok(())
    }

    async fn clear_focused(&self) -> Result<()> {
        let mut state = self.lock();
        if let Some(i) = state.focused {
            state.elements[i].value.clear();
        }
        Ok(())
    }

    async fn type_keys(&self, text: &str) -> Result<()> {
        let mut state = self.lock();
        let i = state
            .focused
            .ok_or_else(|| FormError::ElementNotFound("no focused element".to_string()))?;
        state.elements[i].value.push_str(text);
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        let state = self.lock();
        if state.content_fails_after_submit && state.submitted {
            return Err(FormError::JavaScriptFailed("page content unavailable".to_string()));
        }
        Ok(state.html())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok("Mock page".to_string())
    }

    async fn close(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }

    async fn query(&self, query: &PageQuery) -> Result<Value> {
        let mut state = self.lock();
        state.check_context()?;
        let value = match query {
            PageQuery::InteractiveElements => {
                let raws: Vec<RawElement> = state.elements.iter().map(|e| e.raw.clone()).collect();
                json!(raws)
            }
            PageQuery::FocusBody => {
                state.focused = None;
                Value::Null
            }
            PageQuery::FocusedElement => state.focused_raw(),
            PageQuery::ValidationErrors if state.malformed_validation => json!({"errors": "unreadable"}),
            PageQuery::ValidationErrors => Value::Array(
                state
                    .validation_errors
                    .iter()
                    .map(|(selector, message)| json!({"selector": selector, "message": message}))
                    .collect(),
            ),
            PageQuery::FieldState { selector } => match state.resolve(selector) {
                Some(i) => {
                    let e = &state.elements[i];
                    json!({
                        "type": e.raw.input_type,
                        "value": e.value,
                        "checked": e.checked,
                        "selector": e.raw.selector,
                    })
                }
                None => Value::Null,
            },
            PageQuery::VisibleText => Value::String(state.visible_text()),
            PageQuery::SubmitFirstForm => {
                if state.elements.is_empty() {
                    Value::Bool(false)
                } else {
                    state.submit();
                    Value::Bool(true)
                }
            }
        };
        Ok(value)
    }
}

/// Hands out the same shared [`MockPage`] for every `new_page` call.
#[derive(Debug, Clone)]
pub struct MockBrowser {
    page: MockPage,
    running: bool,
    fail_launch: bool,
}

impl MockBrowser {
    pub fn new(page: MockPage) -> Self {
        Self {
            page,
            running: false,
            fail_launch: false,
        }
    }

    pub fn failing(page: MockPage) -> Self {
        Self {
            fail_launch: true,
            ..Self::new(page)
        }
    }
}

#[async_trait]
impl BrowserTrait for MockBrowser {
    type Page = MockPage;

    async fn launch(&mut self, _config: &Config) -> Result<()> {
        if self.fail_launch {
            return Err(FormError::LaunchFailed("mock browser refused to start".to_string()));
        }
        self.running = true;
        Ok(())
    }

    async fn new_page(&self) -> Result<MockPage> {
        if !self.running {
            return Err(FormError::BrowserNotLaunched);
        }
        Ok(self.page.clone())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    async fn close(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_selector_parsing() {
        assert_eq!(
            parse_simple_selector("input[type=\"email\"]"),
            Some((Some("input".into()), vec![("type".into(), "email".into())]))
        );
        assert_eq!(parse_simple_selector("textarea"), Some((Some("textarea".into()), vec![])));
        assert_eq!(parse_simple_selector("div.obfuscated > input"), None);
    }

    #[tokio::test]
    async fn test_selectors_resolve_against_elements() {
        let mut email = RawElement::input("mail");
        email.input_type = "email".into();
        let page = MockPage::new().with_element(email);
        assert!(page
            .wait_for_selector("input[type=\"email\"]", Duration::ZERO)
            .await
            .is_ok());
        assert!(page.wait_for_selector("#nope", Duration::ZERO).await.is_err());
    }
}
