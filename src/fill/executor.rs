use crate::core::PageDriver;
use crate::dom::tab_order::{fill_by_position, TabOrderMap};
use crate::errors::{FormError, Result};
use crate::mapping::field::{FieldMapping, FieldType, Locator};
use crate::profile::ProfileData;
use crate::utils::truncate_chars;
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

const INPUT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d", "%m/%d/%Y"];
const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
const LOGGED_VALUE_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStatus {
    Filled,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOutcome {
    pub field_name: String,
    pub locator: String,
    pub field_type: FieldType,
    pub status: FillStatus,
    /// Truncated copy of the value that was entered or attempted.
    pub value: Option<String>,
    pub message: Option<String>,
    pub via_tab_order: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillReport {
    pub filled: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    /// Failures of non-optional fields; any entry fails the job.
    pub blocking: Vec<String>,
    pub outcomes: Vec<FieldOutcome>,
}

impl FillReport {
    pub fn total(&self) -> usize {
        self.filled + self.skipped + self.errors.len()
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocking.is_empty()
    }
}

/// Applies mappings one field at a time. A failing field is recorded and the
/// next one is attempted; nothing here aborts the batch.
#[derive(Debug, Clone)]
pub struct FillExecutor {
    element_timeout: Duration,
    inter_field_delay: Duration,
    tab_order: Option<TabOrderMap>,
}

impl FillExecutor {
    pub fn new(element_timeout: Duration, inter_field_delay: Duration) -> Self {
        Self {
            element_timeout,
            inter_field_delay,
            tab_order: None,
        }
    }

    /// Enables the positional fallback for textual fields whose selector fill
    /// failed, and makes `Locator::Position` mappings resolvable.
    pub fn with_tab_order(mut self, map: TabOrderMap) -> Self {
        self.tab_order = Some(map);
        self
    }

    pub async fn fill<'a, P, I>(&self, page: &P, mappings: I, profile: &ProfileData) -> FillReport
    where
        P: PageDriver + ?Sized,
        I: IntoIterator<Item = &'a FieldMapping>,
    {
        let mut report = FillReport::default();

        for mapping in mappings {
            let locator = mapping.locator.to_string();
            let value = if mapping.field_type == FieldType::Click {
                Some(mapping.static_value.clone().unwrap_or_else(|| "click".to_string()))
            } else {
                mapping.resolve_value(profile)
            };

            let Some(value) = value else {
                debug!(selector = %locator, field = %mapping.field_name, "no value, skipping");
                report.skipped += 1;
                report.outcomes.push(FieldOutcome {
                    field_name: mapping.field_name.clone(),
                    locator,
                    field_type: mapping.field_type,
                    status: FillStatus::Skipped,
                    value: None,
                    message: None,
                    via_tab_order: false,
                });
                continue;
            };

            let shown = truncate_chars(&value, LOGGED_VALUE_CHARS);
            let mut via_tab_order = false;
            let mut result = self.apply(page, mapping, &value).await;

            if let Err(e) = &result {
                if let Some(outcome) = self.positional_fallback(page, mapping, &value).await {
                    debug!(selector = %locator, "selector fill failed ({}), used tab order", e);
                    result = outcome;
                    via_tab_order = true;
                }
            }

            match result {
                Ok(()) => {
                    debug!(selector = %locator, value = %shown, "filled");
                    report.filled += 1;
                    report.outcomes.push(FieldOutcome {
                        field_name: mapping.field_name.clone(),
                        locator,
                        field_type: mapping.field_type,
                        status: FillStatus::Filled,
                        value: Some(shown),
                        message: None,
                        via_tab_order,
                    });
                }
                Err(e) => {
                    let message = format!("{} ('{}'): {}", locator, shown, e);
                    warn!(selector = %locator, value = %shown, "fill failed: {}", e);
                    if !mapping.optional {
                        report.blocking.push(message.clone());
                    }
                    report.errors.push(message);
                    report.outcomes.push(FieldOutcome {
                        field_name: mapping.field_name.clone(),
                        locator,
                        field_type: mapping.field_type,
                        status: FillStatus::Failed,
                        value: Some(shown),
                        message: Some(e.to_string()),
                        via_tab_order,
                    });
                }
            }

            if !self.inter_field_delay.is_zero() {
                tokio::time::sleep(self.inter_field_delay).await;
            }
        }

        info!(
            "fill finished: {} filled, {} skipped, {} errors",
            report.filled,
            report.skipped,
            report.errors.len()
        );
        report
    }

    async fn apply<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        mapping: &FieldMapping,
        value: &str,
    ) -> Result<()> {
        match mapping.field_type {
            FieldType::Date => {
                let formatted = normalize_date(value, mapping.date_format.as_deref())?;
                self.type_text(page, &mapping.locator, &formatted).await
            }
            t if t.is_textual() => self.type_text(page, &mapping.locator, value).await,
            FieldType::Select => {
                let selector = require_css(mapping)?;
                page.wait_for_selector(selector, self.element_timeout).await?;
                page.select_option(selector, value).await
            }
            FieldType::Checkbox | FieldType::Radio => {
                let checked = parse_bool(value).ok_or_else(|| FormError::InvalidValue {
                    field: mapping.field_name.clone(),
                    reason: format!("'{}' is not a boolean", value),
                })?;
                let selector = require_css(mapping)?;
                page.wait_for_selector(selector, self.element_timeout).await?;
                page.set_checked(selector, checked).await
            }
            FieldType::File => {
                let path = PathBuf::from(value);
                if !path.is_file() {
                    return Err(FormError::FileMissing(path.display().to_string()));
                }
                let selector = require_css(mapping)?;
                page.wait_for_selector(selector, self.element_timeout).await?;
                page.upload_files(selector, &[path]).await
            }
            _ => match &mapping.locator {
                Locator::Css(selector) => {
                    page.wait_for_selector(selector, self.element_timeout).await?;
                    page.click(selector).await
                }
                Locator::Point { x, y } => page.mouse_click(*x, *y).await,
                Locator::Position(position) => {
                    let field = self.tab_field(*position)?;
                    let (x, y) = field.descriptor.bounding_box.center();
                    page.mouse_click(x, y).await
                }
            },
        }
    }

    async fn type_text<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        locator: &Locator,
        value: &str,
    ) -> Result<()> {
        match locator {
            Locator::Css(selector) => {
                page.wait_for_selector(selector, self.element_timeout).await?;
                page.fill(selector, value).await
            }
            Locator::Position(position) => {
                let field = self.tab_field(*position)?;
                fill_by_position(page, field, value).await
            }
            Locator::Point { x, y } => {
                page.mouse_click(*x, *y).await?;
                page.clear_focused().await?;
                page.type_keys(value).await
            }
        }
    }

    fn tab_field(&self, position: usize) -> Result<&crate::dom::TabOrderField> {
        self.tab_order
            .as_ref()
            .and_then(|map| map.get(position))
            .ok_or_else(|| FormError::ElementNotFound(format!("tab-order position {}", position)))
    }

    /// Only for textual CSS mappings whose element shows up in the tab walk.
    async fn positional_fallback<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        mapping: &FieldMapping,
        value: &str,
    ) -> Option<Result<()>> {
        let map = self.tab_order.as_ref()?;
        if !mapping.field_type.is_textual() || mapping.locator.as_css().is_none() {
            return None;
        }
        let field = map.find(&mapping.field_name)?;
        let value = match mapping.field_type {
            FieldType::Date => normalize_date(value, mapping.date_format.as_deref()).ok()?,
            _ => value.to_string(),
        };
        Some(fill_by_position(page, field, &value).await)
    }
}

fn require_css(mapping: &FieldMapping) -> Result<&str> {
    mapping.locator.as_css().ok_or_else(|| FormError::InvalidValue {
        field: mapping.field_name.clone(),
        reason: format!("{} fields need a CSS selector", mapping.field_type),
    })
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" | "checked" | "ja" | "tak" | "y" => Some(true),
        "false" | "no" | "0" | "off" | "unchecked" | "nein" | "nie" | "n" => Some(false),
        _ => None,
    }
}

/// Checks a `chrono` output format for dates. Unknown specifiers and time
/// or zone fields are rejected.
pub fn validate_date_format(format: &str) -> Result<()> {
    let invalid = |reason: String| FormError::InvalidValue {
        field: "date_format".to_string(),
        reason,
    };
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(invalid(format!("'{}' is not a valid date format", format)));
    }
    let sample = NaiveDate::from_ymd_opt(2000, 1, 31).ok_or_else(|| invalid("no sample date".to_string()))?;
    let mut out = String::new();
    write!(out, "{}", sample.format(format))
        .map_err(|_| invalid(format!("'{}' needs more than a date", format)))
}

/// Re-renders a date in `output_format` (ISO when `None`).
pub fn normalize_date(value: &str, output_format: Option<&str>) -> Result<String> {
    let trimmed = value.trim();
    let date = INPUT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| FormError::InvalidValue {
            field: "date".to_string(),
            reason: format!("unrecognised date '{}'", trimmed),
        })?;
    let format = output_format.unwrap_or(DEFAULT_DATE_FORMAT);
    validate_date_format(format)?;
    let mut out = String::new();
    write!(out, "{}", date.format(format)).map_err(|_| FormError::InvalidValue {
        field: "date".to_string(),
        reason: format!("cannot render with '{}'", format),
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::element::RawElement;
    use crate::dom::TabOrderMapper;
    use crate::testing::MockPage;
    use serde_json::json;

    fn executor() -> FillExecutor {
        FillExecutor::new(Duration::from_millis(50), Duration::ZERO)
    }

    fn text(selector: &str, name: &str, path: &str) -> FieldMapping {
        FieldMapping::heuristic(Locator::css(selector), name, FieldType::Text).with_path(path)
    }

    fn profile() -> ProfileData {
        ProfileData::from_value(json!({
            "personal": {"firstName": "Anna", "lastName": "Kowalska", "birthDate": "24.12.1990"},
        }))
    }

    #[tokio::test]
    async fn test_bad_selector_does_not_abort_remaining_fields() {
        let page = MockPage::new()
            .with_element(RawElement::input("firstname"))
            .with_element(RawElement::input("lastname"));
        let mappings = vec![
            text("input[name=\"firstname\"]", "firstname", "personal.firstName"),
            text("#does-not-exist", "ghost", "personal.firstName"),
            text("input[name=\"lastname\"]", "lastname", "personal.lastName"),
            text("input[name=\"middle\"]", "middle", "personal.middleName"),
        ];

        let report = executor().fill(&page, &mappings, &profile()).await;

        assert_eq!(report.filled, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("#does-not-exist ('Anna')"));
        assert_eq!(report.total(), mappings.len());
        assert!(!report.is_blocked());
        assert_eq!(page.value_of("lastname").as_deref(), Some("Kowalska"));
    }

    #[tokio::test]
    async fn test_non_optional_failure_is_blocking() {
        let page = MockPage::new();
        let mappings = vec![text("#missing", "missing", "personal.firstName").set_optional(false)];
        let report = executor().fill(&page, &mappings, &profile()).await;
        assert!(report.is_blocked());
    }

    #[tokio::test]
    async fn test_select_fails_closed() {
        let mut select = RawElement::input("country");
        select.tag = "select".into();
        select.options = vec![crate::dom::SelectOption {
            value: "PL".into(),
            text: "Poland".into(),
        }];
        let page = MockPage::new().with_element(select);
        let mappings = vec![
            FieldMapping::manual(Locator::css("input[name=\"country\"]"), "country", FieldType::Select)
                .with_static_value("Germany"),
        ];

        let report = executor().fill(&page, &mappings, &profile()).await;
        assert_eq!(report.errors.len(), 1);
        assert_eq!(page.value_of("country").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_missing_upload_is_a_field_error() {
        let mut cv = RawElement::input("cv");
        cv.input_type = "file".into();
        let page = MockPage::new().with_element(cv);
        let mappings = vec![
            FieldMapping::heuristic(Locator::css("input[name=\"cv\"]"), "cv", FieldType::File)
                .with_static_value("/no/such/resume.pdf"),
        ];

        let report = executor().fill(&page, &mappings, &profile()).await;
        assert_eq!(report.filled, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("File not found"));
    }

    #[tokio::test]
    async fn test_checkbox_and_date_dispatch() {
        let mut agree = RawElement::input("agree");
        agree.input_type = "checkbox".into();
        let mut birth = RawElement::input("birth");
        birth.input_type = "date".into();
        let page = MockPage::new().with_element(agree).with_element(birth);
        let mappings = vec![
            FieldMapping::heuristic(Locator::css("input[name=\"agree\"]"), "agree", FieldType::Checkbox)
                .with_static_value("true"),
            FieldMapping::heuristic(Locator::css("input[name=\"birth\"]"), "birth", FieldType::Date)
                .with_path("personal.birthDate"),
        ];

        let report = executor().fill(&page, &mappings, &profile()).await;
        assert_eq!(report.filled, 2);
        assert!(page.is_checked("agree"));
        assert_eq!(page.value_of("birth").as_deref(), Some("1990-12-24"));
    }

    #[tokio::test]
    async fn test_tab_order_fallback_after_selector_failure() {
        let page = MockPage::new().with_element(RawElement::input("firstname"));
        let map = TabOrderMapper::new().map_by_tab_order(&page).await.unwrap();
        let mappings = vec![text("div.obfuscated > input", "firstname", "personal.firstName")];

        let report = executor()
            .with_tab_order(map)
            .fill(&page, &mappings, &profile())
            .await;

        assert_eq!(report.filled, 1);
        assert!(report.outcomes[0].via_tab_order);
        assert_eq!(page.value_of("firstname").as_deref(), Some("Anna"));
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("24.12.1990", None).unwrap(), "1990-12-24");
        assert_eq!(normalize_date("1990-12-24", Some("%d.%m.%Y")).unwrap(), "24.12.1990");
        assert!(normalize_date("next tuesday", None).is_err());
        assert!(normalize_date("1990-12-24", Some("%Q")).is_err());
        assert!(normalize_date("1990-12-24", Some("%d.%m.%Y %H:%M")).is_err());
        assert!(validate_date_format("%d/%m/%Y").is_ok());
    }

    #[tokio::test]
    async fn test_date_format_override_is_applied() {
        let mut birth = RawElement::input("birthdate");
        birth.input_type = "date".into();
        let page = MockPage::new().with_element(birth);
        let mappings = vec![FieldMapping::manual(
            Locator::css("input[name=\"birthdate\"]"),
            "birthdate",
            FieldType::Date,
        )
        .with_path("personal.birthDate")
        .with_date_format("%d.%m.%Y")];

        let report = executor().fill(&page, &mappings, &profile()).await;
        assert_eq!(report.filled, 1);
        assert_eq!(page.value_of("birthdate").as_deref(), Some("24.12.1990"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Ja"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
