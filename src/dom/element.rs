use crate::types::ElementRect;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Input,
    Textarea,
    Select,
    ContentEditable,
    Button,
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
}

/// One interactive element as seen by the last inspection. Never cached across
/// navigations: the element it points at may no longer exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub tag_kind: TagKind,
    pub input_type: String,
    pub dom_id: Option<String>,
    pub dom_name: Option<String>,
    pub label_text: Option<String>,
    pub placeholder: Option<String>,
    pub aria_label: Option<String>,
    pub text_content: Option<String>,
    pub required: bool,
    pub disabled: bool,
    pub read_only: bool,
    pub visible: bool,
    pub bounding_box: ElementRect,
    pub tab_index: i32,
    pub select_options: Vec<SelectOption>,
    /// CSS locator computed by the page (`#id`, unique `tag[name]`, or a
    /// `nth-of-type` chain).
    pub selector: String,
    /// Positional ancestor path, e.g. `/html[1]/body[2]/form[1]/input[3]`.
    pub path: String,
}

const NON_FILLABLE_INPUT_TYPES: &[&str] = &["submit", "reset", "button", "hidden", "image"];

impl ElementDescriptor {
    pub fn new(tag_kind: TagKind, selector: impl Into<String>) -> Self {
        let input_type = match tag_kind {
            TagKind::Input => "text",
            TagKind::Textarea => "textarea",
            TagKind::Select => "select",
            TagKind::ContentEditable => "contenteditable",
            TagKind::Button => "submit",
            TagKind::Link => "link",
        };
        Self {
            tag_kind,
            input_type: input_type.to_string(),
            dom_id: None,
            dom_name: None,
            label_text: None,
            placeholder: None,
            aria_label: None,
            text_content: None,
            required: false,
            disabled: false,
            read_only: false,
            visible: true,
            bounding_box: ElementRect::new(0.0, 0.0, 120.0, 24.0),
            tab_index: 0,
            select_options: Vec::new(),
            selector: selector.into(),
            path: String::new(),
        }
    }

    pub fn with_input_type(mut self, input_type: &str) -> Self {
        self.input_type = input_type.to_lowercase();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.dom_name = Some(name.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.dom_id = Some(id.to_string());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label_text = Some(label.to_string());
        self
    }

    pub fn with_options(mut self, options: Vec<SelectOption>) -> Self {
        self.select_options = options;
        self
    }

    pub fn set_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// The most specific human-meaningful handle: name, id, label, placeholder.
    pub fn field_key(&self) -> String {
        [
            &self.dom_name,
            &self.dom_id,
            &self.label_text,
            &self.placeholder,
            &self.aria_label,
        ]
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| self.selector.clone())
    }

    pub fn is_file(&self) -> bool {
        self.tag_kind == TagKind::Input && self.input_type == "file"
    }

    pub fn is_select(&self) -> bool {
        self.tag_kind == TagKind::Select
    }

    pub fn is_checkable(&self) -> bool {
        self.tag_kind == TagKind::Input && matches!(self.input_type.as_str(), "checkbox" | "radio")
    }

    /// Controls that accept a value: no buttons, links, hidden or submit inputs,
    /// nothing disabled or read-only.
    pub fn is_fillable(&self) -> bool {
        if !self.visible || self.disabled || self.read_only {
            return false;
        }
        match self.tag_kind {
            TagKind::Button | TagKind::Link => false,
            TagKind::Input => !NON_FILLABLE_INPUT_TYPES.contains(&self.input_type.as_str()),
            _ => true,
        }
    }

    /// Whether a label/name/id matches `needle`, case-insensitively.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [
            &self.dom_name,
            &self.dom_id,
            &self.label_text,
            &self.placeholder,
            &self.aria_label,
        ]
        .into_iter()
        .flatten()
        .any(|s| s.to_lowercase() == needle)
    }

    /// One-line description used in LLM prompts and logs.
    pub fn describe(&self) -> String {
        let mut parts = vec![];

        match self.tag_kind {
            TagKind::Input => parts.push(format!("{} input field", self.input_type)),
            TagKind::Button => parts.push("button".to_string()),
            TagKind::Link => parts.push("link".to_string()),
            TagKind::Select => parts.push("dropdown menu".to_string()),
            TagKind::Textarea => parts.push("text area".to_string()),
            TagKind::ContentEditable => parts.push("editable text region".to_string()),
        }

        if let Some(name) = &self.dom_name {
            parts.push(format!("named '{}'", name));
        }
        if let Some(id) = &self.dom_id {
            parts.push(format!("with ID '{}'", id));
        }
        if let Some(label) = &self.label_text {
            parts.push(format!("labeled '{}'", label));
        }
        if let Some(placeholder) = &self.placeholder {
            if self.label_text.as_ref() != Some(placeholder) {
                parts.push(format!("placeholder '{}'", placeholder));
            }
        }
        if !self.select_options.is_empty() {
            let options: Vec<&str> = self
                .select_options
                .iter()
                .take(10)
                .map(|o| o.value.as_str())
                .collect();
            parts.push(format!("options [{}]", options.join(", ")));
        }
        if self.required {
            parts.push("(required)".to_string());
        }

        parts.join(" ")
    }
}

/// Element data exactly as the inspection script reports it, before
/// visibility filtering and label/tab-index normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawElement {
    pub tag: String,
    #[serde(rename = "type")]
    pub input_type: String,
    pub id: String,
    pub name: String,
    pub role: String,
    pub content_editable: bool,
    pub has_href: bool,
    pub for_label: String,
    pub ancestor_label: String,
    pub aria_label: String,
    pub labelledby_text: String,
    pub placeholder: String,
    pub text: String,
    pub required: bool,
    pub disabled: bool,
    pub read_only: bool,
    pub display: String,
    pub visibility: String,
    pub opacity: Option<f64>,
    pub pointer_events: String,
    pub rect: ElementRect,
    pub tab_index_attr: Option<i32>,
    pub options: Vec<SelectOption>,
    pub selector: String,
    pub path: String,
}

impl RawElement {
    pub fn input(name: &str) -> Self {
        Self {
            tag: "input".to_string(),
            input_type: "text".to_string(),
            name: name.to_string(),
            display: "inline-block".to_string(),
            visibility: "visible".to_string(),
            opacity: Some(1.0),
            pointer_events: "auto".to_string(),
            rect: ElementRect::new(10.0, 10.0, 200.0, 24.0),
            selector: format!("input[name=\"{}\"]", name),
            ..Default::default()
        }
    }
}
