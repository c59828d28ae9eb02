use crate::core::{PageDriver, PageQuery};
use crate::mapping::field::{FieldMapping, FieldType};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Advisory only; never blocks a submit attempt.
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PageValidationError {
    message: String,
    selector: String,
}

#[derive(Debug, Deserialize)]
struct FieldState {
    #[serde(rename = "type", default)]
    input_type: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    checked: bool,
}

#[derive(Debug, Default, Clone)]
pub struct FormValidator;

impl FormValidator {
    pub fn new() -> Self {
        Self
    }

    /// Page-reported invalid markers become errors; required mappings whose
    /// live element reads empty or unchecked become warnings.
    pub async fn validate<'a, P, I>(&self, page: &P, mappings: I) -> ValidationReport
    where
        P: PageDriver + ?Sized,
        I: IntoIterator<Item = &'a FieldMapping>,
    {
        let mut report = ValidationReport::default();

        match page.query(&PageQuery::ValidationErrors).await {
            Ok(value) => match serde_json::from_value::<Vec<PageValidationError>>(value) {
                Ok(found) => {
                    for err in found {
                        report.errors.push(format!("{}: {}", err.selector, err.message));
                    }
                }
                Err(e) => {
                    warn!("unreadable validation scan result: {}", e);
                    report
                        .warnings
                        .push(format!("validation scan returned malformed data: {}", e));
                }
            },
            Err(e) => report
                .warnings
                .push(format!("could not scan for validation errors: {}", e)),
        }

        for mapping in mappings.into_iter().filter(|m| m.required) {
            let Some(selector) = mapping.locator.as_css() else {
                continue;
            };
            let state = page
                .query(&PageQuery::FieldState {
                    selector: selector.to_string(),
                })
                .await;

            let state: Option<FieldState> = match state {
                Ok(value) => serde_json::from_value(value).ok().flatten(),
                Err(e) => {
                    report
                        .warnings
                        .push(format!("{}: could not read field state: {}", selector, e));
                    continue;
                }
            };

            match state {
                None => report
                    .warnings
                    .push(format!("{}: required field not found", selector)),
                Some(state) => {
                    let checkable = matches!(mapping.field_type, FieldType::Checkbox | FieldType::Radio)
                        || matches!(state.input_type.as_str(), "checkbox" | "radio");
                    if checkable && !state.checked {
                        report
                            .warnings
                            .push(format!("{}: required field is unchecked", selector));
                    } else if !checkable && state.value.trim().is_empty() {
                        report
                            .warnings
                            .push(format!("{}: required field is empty", selector));
                    }
                }
            }
        }

        report.valid = report.errors.is_empty();
        if report.valid {
            debug!("validation passed with {} warnings", report.warnings.len());
        } else {
            warn!("page reports {} validation errors", report.errors.len());
        }
        report
    }
}
