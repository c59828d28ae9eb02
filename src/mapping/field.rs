use crate::dom::element::{ElementDescriptor, TagKind};
use crate::profile::ProfileData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a mapping addresses its element. CSS selectors come from inspection,
/// positions from the tab-order walk, points from coordinate classifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Locator {
    Css(String),
    Position(usize),
    Point { x: f64, y: f64 },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn as_css(&self) -> Option<&str> {
        match self {
            Locator::Css(selector) => Some(selector),
            _ => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "{}", selector),
            Locator::Position(position) => write!(f, "tab#{}", position),
            Locator::Point { x, y } => write!(f, "@({:.0},{:.0})", x, y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Tel,
    Url,
    Number,
    Password,
    Textarea,
    ContentEditable,
    Select,
    Checkbox,
    Radio,
    File,
    Date,
    Click,
}

impl FieldType {
    pub fn from_descriptor(descriptor: &ElementDescriptor) -> Self {
        match descriptor.tag_kind {
            TagKind::Textarea => FieldType::Textarea,
            TagKind::Select => FieldType::Select,
            TagKind::ContentEditable => FieldType::ContentEditable,
            TagKind::Button | TagKind::Link => FieldType::Click,
            TagKind::Input => match descriptor.input_type.as_str() {
                "email" => FieldType::Email,
                "tel" => FieldType::Tel,
                "url" => FieldType::Url,
                "number" => FieldType::Number,
                "password" => FieldType::Password,
                "checkbox" => FieldType::Checkbox,
                "radio" => FieldType::Radio,
                "file" => FieldType::File,
                "date" => FieldType::Date,
                _ => FieldType::Text,
            },
        }
    }

    /// Types filled by clear-then-type.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldType::Text
                | FieldType::Email
                | FieldType::Tel
                | FieldType::Url
                | FieldType::Number
                | FieldType::Password
                | FieldType::Textarea
                | FieldType::ContentEditable
                | FieldType::Date
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Tel => "tel",
            FieldType::Url => "url",
            FieldType::Number => "number",
            FieldType::Password => "password",
            FieldType::Textarea => "textarea",
            FieldType::ContentEditable => "contenteditable",
            FieldType::Select => "select",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::File => "file",
            FieldType::Date => "date",
            FieldType::Click => "click",
        }
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.trim().to_lowercase().as_str() {
            "text" | "input" => FieldType::Text,
            "email" => FieldType::Email,
            "tel" | "phone" => FieldType::Tel,
            "url" => FieldType::Url,
            "number" => FieldType::Number,
            "password" => FieldType::Password,
            "textarea" => FieldType::Textarea,
            "contenteditable" => FieldType::ContentEditable,
            "select" => FieldType::Select,
            "checkbox" => FieldType::Checkbox,
            "radio" => FieldType::Radio,
            "file" | "upload" => FieldType::File,
            "date" => FieldType::Date,
            "click" | "button" => FieldType::Click,
            other => return Err(format!("unknown field type '{}'", other)),
        };
        Ok(parsed)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    Heuristic,
    Llm,
    Manual,
}

impl MappingSource {
    pub fn priority(&self) -> u8 {
        match self {
            MappingSource::Heuristic => 1,
            MappingSource::Llm => 2,
            MappingSource::Manual => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub locator: Locator,
    pub field_name: String,
    pub profile_field_path: Option<String>,
    pub field_type: FieldType,
    /// Literal value that overrides the profile lookup.
    pub static_value: Option<String>,
    pub source: MappingSource,
    /// Only meaningful for `MappingSource::Llm`.
    pub confidence: Option<f64>,
    pub required: bool,
    /// A failed non-optional field fails the whole job.
    pub optional: bool,
    /// `chrono` format for date fields; ISO when absent.
    pub date_format: Option<String>,
}

impl FieldMapping {
    fn base(locator: Locator, field_name: &str, field_type: FieldType, source: MappingSource) -> Self {
        Self {
            locator,
            field_name: field_name.to_string(),
            profile_field_path: None,
            field_type,
            static_value: None,
            source,
            confidence: None,
            required: false,
            optional: true,
            date_format: None,
        }
    }

    pub fn heuristic(locator: Locator, field_name: &str, field_type: FieldType) -> Self {
        Self::base(locator, field_name, field_type, MappingSource::Heuristic)
    }

    pub fn manual(locator: Locator, field_name: &str, field_type: FieldType) -> Self {
        Self::base(locator, field_name, field_type, MappingSource::Manual)
    }

    pub fn llm(locator: Locator, field_name: &str, field_type: FieldType, confidence: f64) -> Self {
        let mut mapping = Self::base(locator, field_name, field_type, MappingSource::Llm);
        mapping.confidence = Some(confidence.clamp(0.0, 1.0));
        mapping
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.profile_field_path = Some(path.to_string());
        self
    }

    pub fn with_static_value(mut self, value: impl Into<String>) -> Self {
        self.static_value = Some(value.into());
        self
    }

    pub fn with_date_format(mut self, format: &str) -> Self {
        self.date_format = Some(format.to_string());
        self
    }

    pub fn set_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Static value first, then the profile path. Empty strings count as absent.
    pub fn resolve_value(&self, profile: &ProfileData) -> Option<String> {
        self.static_value
            .clone()
            .or_else(|| {
                self.profile_field_path
                    .as_deref()
                    .and_then(|path| profile.get_string(path))
            })
            .filter(|v| !v.trim().is_empty())
    }

    /// Whether this mapping can produce a value at all.
    pub fn has_value_source(&self) -> bool {
        self.static_value.is_some() || self.profile_field_path.is_some()
    }
}

/// Merged mappings, one per locator, kept in insertion order.
///
/// When two strategies propose the same locator the higher-priority source
/// wins (manual > llm > heuristic); on a tie the first proposal stays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingSet {
    entries: Vec<FieldMapping>,
}

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the mapping was stored.
    pub fn insert(&mut self, mapping: FieldMapping) -> bool {
        match self.entries.iter().position(|m| m.locator == mapping.locator) {
            None => {
                self.entries.push(mapping);
                true
            }
            Some(index) => {
                if mapping.source.priority() > self.entries[index].source.priority() {
                    self.entries[index] = mapping;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn get(&self, locator: &Locator) -> Option<&FieldMapping> {
        self.entries.iter().find(|m| &m.locator == locator)
    }

    pub fn contains(&self, locator: &Locator) -> bool {
        self.get(locator).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldMapping> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[FieldMapping] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<FieldMapping> {
        self.entries
    }
}

impl Extend<FieldMapping> for MappingSet {
    fn extend<T: IntoIterator<Item = FieldMapping>>(&mut self, iter: T) {
        for mapping in iter {
            self.insert(mapping);
        }
    }
}

impl FromIterator<FieldMapping> for MappingSet {
    fn from_iter<T: IntoIterator<Item = FieldMapping>>(iter: T) -> Self {
        let mut set = MappingSet::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn css(s: &str) -> Locator {
        Locator::css(s)
    }

    #[test]
    fn test_merge_precedence() {
        let mut set = MappingSet::new();
        assert!(set.insert(
            FieldMapping::heuristic(css("#email"), "email", FieldType::Email).with_path("contact.email")
        ));
        assert!(set.insert(
            FieldMapping::llm(css("#email"), "email", FieldType::Email, 0.9).with_path("personal.email")
        ));
        assert!(set.insert(
            FieldMapping::manual(css("#email"), "email", FieldType::Email).with_static_value("x@y.z")
        ));
        // lower priority never displaces a manual mapping
        assert!(!set.insert(FieldMapping::heuristic(css("#email"), "email", FieldType::Email)));

        assert_eq!(set.len(), 1);
        let winner = set.get(&css("#email")).unwrap();
        assert_eq!(winner.source, MappingSource::Manual);
        assert_eq!(winner.static_value.as_deref(), Some("x@y.z"));
    }

    #[test]
    fn test_equal_priority_keeps_first_and_preserves_order() {
        let set: MappingSet = vec![
            FieldMapping::heuristic(css("#b"), "b", FieldType::Text).with_path("first"),
            FieldMapping::heuristic(css("#a"), "a", FieldType::Text),
            FieldMapping::heuristic(css("#b"), "b", FieldType::Text).with_path("second"),
        ]
        .into_iter()
        .collect();

        let names: Vec<&str> = set.iter().map(|m| m.field_name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(
            set.get(&css("#b")).unwrap().profile_field_path.as_deref(),
            Some("first")
        );
    }

    #[test]
    fn test_resolve_value_prefers_static() {
        let profile = ProfileData::from_value(json!({"personal": {"firstName": "Anna"}}));
        let from_profile = FieldMapping::heuristic(css("#f"), "f", FieldType::Text)
            .with_path("personal.firstName");
        assert_eq!(from_profile.resolve_value(&profile).as_deref(), Some("Anna"));

        let overridden = from_profile.clone().with_static_value("Override");
        assert_eq!(overridden.resolve_value(&profile).as_deref(), Some("Override"));

        let missing = FieldMapping::heuristic(css("#g"), "g", FieldType::Text).with_path("nope");
        assert_eq!(missing.resolve_value(&profile), None);

        let blank = FieldMapping::heuristic(css("#h"), "h", FieldType::Text).with_static_value("  ");
        assert_eq!(blank.resolve_value(&profile), None);
    }

    #[test]
    fn test_field_type_parsing() {
        assert_eq!("Upload".parse::<FieldType>().unwrap(), FieldType::File);
        assert_eq!("checkbox".parse::<FieldType>().unwrap(), FieldType::Checkbox);
        assert!("slider".parse::<FieldType>().is_err());
        assert_eq!(Locator::Position(3).to_string(), "tab#3");
    }
}
