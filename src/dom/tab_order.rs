use crate::core::{PageDriver, PageQuery};
use crate::dom::element::{ElementDescriptor, RawElement};
use crate::dom::inspector::descriptor_from_raw;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Hard cap on focus moves so focus traps cannot hang a job.
pub const MAX_TAB_ITERATIONS: usize = 100;

const TAB_SKIPPED_TYPES: &[&str] = &[
    "checkbox", "radio", "submit", "button", "file", "hidden", "reset", "image",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabOrderField {
    pub position: usize,
    pub descriptor: ElementDescriptor,
}

impl TabOrderField {
    pub fn path(&self) -> &str {
        &self.descriptor.path
    }
}

/// Fillable controls in natural focus order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabOrderMap {
    pub fields: Vec<TabOrderField>,
    pub iterations: usize,
    pub loop_detected: bool,
}

impl TabOrderMap {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&TabOrderField> {
        self.fields.get(position)
    }

    /// Field whose name, id or label equals `key` (case-insensitive).
    pub fn find(&self, key: &str) -> Option<&TabOrderField> {
        self.fields.iter().find(|f| f.descriptor.mentions(key))
    }
}

#[derive(Debug, Clone)]
pub struct TabOrderMapper {
    max_iterations: usize,
}

impl Default for TabOrderMapper {
    fn default() -> Self {
        Self {
            max_iterations: MAX_TAB_ITERATIONS,
        }
    }
}

impl TabOrderMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.min(MAX_TAB_ITERATIONS);
        self
    }

    /// Walks focus from the document body with repeated Tab presses until a
    /// structural path repeats or the iteration cap is hit.
    pub async fn map_by_tab_order<P: PageDriver + ?Sized>(&self, page: &P) -> Result<TabOrderMap> {
        let mut map = TabOrderMap::default();
        let mut seen: HashSet<String> = HashSet::new();

        page.query(&PageQuery::FocusBody).await?;

        for _ in 0..self.max_iterations {
            map.iterations += 1;

            if let Err(e) = page.press_key("Tab").await {
                if e.is_context_lost() {
                    warn!("page changed during tab walk, keeping {} fields", map.len());
                    break;
                }
                return Err(e);
            }

            let focused = match page.query(&PageQuery::FocusedElement).await {
                Ok(value) => value,
                Err(e) if e.is_context_lost() => {
                    warn!("page changed during tab walk, keeping {} fields", map.len());
                    break;
                }
                Err(e) => return Err(e),
            };
            if focused.is_null() {
                continue;
            }

            let raw: RawElement = serde_json::from_value(focused)?;
            if raw.path.is_empty() {
                continue;
            }
            if !seen.insert(raw.path.clone()) {
                debug!(path = %raw.path, "focus returned to a visited element");
                map.loop_detected = true;
                break;
            }

            let Some(descriptor) = descriptor_from_raw(raw) else {
                continue;
            };
            if is_tab_fillable(&descriptor) {
                let position = map.fields.len();
                debug!(position, path = %descriptor.path, "tab order field");
                map.fields.push(TabOrderField {
                    position,
                    descriptor,
                });
            }
        }

        debug!(
            "tab walk finished after {} moves with {} fields (loop detected: {})",
            map.iterations,
            map.len(),
            map.loop_detected
        );
        Ok(map)
    }
}

/// Text-like controls only; checkables, buttons and files stay on the
/// selector-based path.
pub fn is_tab_fillable(descriptor: &ElementDescriptor) -> bool {
    descriptor.is_fillable()
        && !descriptor.is_select()
        && !TAB_SKIPPED_TYPES.contains(&descriptor.input_type.as_str())
}

/// Positional fill: click the recorded centre, select all, delete, type.
pub async fn fill_by_position<P: PageDriver + ?Sized>(
    page: &P,
    field: &TabOrderField,
    value: &str,
) -> Result<()> {
    let (x, y) = field.descriptor.bounding_box.center();
    page.mouse_click(x, y).await?;
    page.clear_focused().await?;
    page.type_keys(value).await
}
