use crate::core::{PageDriver, PageQuery};
use crate::dom::element::{ElementDescriptor, RawElement, TagKind};
use crate::utils::collapse_whitespace;
use tracing::{debug, warn};

/// Enumerates the interactive elements of the live page.
///
/// Invisible elements (hidden by style, transparent, click-through or with
/// zero area) are dropped entirely so honeypot fields can never be targeted.
#[derive(Debug, Default, Clone)]
pub struct ElementInspector;

impl ElementInspector {
    pub fn new() -> Self {
        Self
    }

    /// Re-queries the page on every call. An empty result means "inspect again
    /// once navigation settles", not "this page has no form".
    pub async fn inspect<P: PageDriver + ?Sized>(&self, page: &P) -> Vec<ElementDescriptor> {
        let value = match page.query(&PageQuery::InteractiveElements).await {
            Ok(value) => value,
            Err(e) if e.is_context_lost() => {
                debug!("page context lost during inspection: {}", e);
                return Vec::new();
            }
            Err(e) => {
                warn!("element inspection failed: {}", e);
                return Vec::new();
            }
        };

        let raws: Vec<RawElement> = match serde_json::from_value(value) {
            Ok(raws) => raws,
            Err(e) => {
                warn!("unexpected inspection payload: {}", e);
                return Vec::new();
            }
        };

        let total = raws.len();
        let descriptors: Vec<ElementDescriptor> =
            raws.into_iter().filter_map(descriptor_from_raw).collect();
        debug!(
            "inspected {} candidates, {} visible interactive elements",
            total,
            descriptors.len()
        );
        descriptors
    }
}

/// Normalises one raw element; `None` when it is invisible or not interactive.
pub fn descriptor_from_raw(raw: RawElement) -> Option<ElementDescriptor> {
    if !is_visible(&raw) {
        return None;
    }
    let tag_kind = tag_kind(&raw)?;

    let input_type = match tag_kind {
        TagKind::Input if raw.input_type.is_empty() => "text".to_string(),
        TagKind::Input => raw.input_type.clone(),
        TagKind::Button if raw.input_type.is_empty() => "submit".to_string(),
        TagKind::Button => raw.input_type.clone(),
        TagKind::Textarea => "textarea".to_string(),
        TagKind::Select => "select".to_string(),
        TagKind::ContentEditable => "contenteditable".to_string(),
        TagKind::Link => "link".to_string(),
    };

    let label_text = resolve_label(&raw);
    let tab_index = normalize_tab_index(&raw, tag_kind);

    Some(ElementDescriptor {
        tag_kind,
        input_type,
        dom_id: non_empty(&raw.id),
        dom_name: non_empty(&raw.name),
        label_text,
        placeholder: non_empty(&raw.placeholder),
        aria_label: non_empty(&raw.aria_label),
        text_content: non_empty(&raw.text),
        required: raw.required,
        disabled: raw.disabled,
        read_only: raw.read_only,
        visible: true,
        bounding_box: raw.rect,
        tab_index,
        select_options: raw.options,
        selector: raw.selector,
        path: raw.path,
    })
}

pub fn is_visible(raw: &RawElement) -> bool {
    if raw.display.eq_ignore_ascii_case("none") {
        return false;
    }
    if matches!(raw.visibility.to_lowercase().as_str(), "hidden" | "collapse") {
        return false;
    }
    if raw.opacity.map_or(false, |o| o <= 0.0) {
        return false;
    }
    if raw.pointer_events.eq_ignore_ascii_case("none") {
        return false;
    }
    raw.rect.area() > 0.0
}

fn tag_kind(raw: &RawElement) -> Option<TagKind> {
    match raw.tag.as_str() {
        "input" => Some(TagKind::Input),
        "textarea" => Some(TagKind::Textarea),
        "select" => Some(TagKind::Select),
        "button" => Some(TagKind::Button),
        "a" if raw.has_href => Some(TagKind::Link),
        _ if raw.content_editable || raw.role == "textbox" => Some(TagKind::ContentEditable),
        _ if raw.role == "button" => Some(TagKind::Button),
        _ => None,
    }
}

/// `<label for>` text, then an enclosing `<label>`, then `aria-label`, then
/// `aria-labelledby` targets, then the placeholder. First non-empty wins.
pub fn resolve_label(raw: &RawElement) -> Option<String> {
    [
        &raw.for_label,
        &raw.ancestor_label,
        &raw.aria_label,
        &raw.labelledby_text,
        &raw.placeholder,
    ]
    .into_iter()
    .map(|s| collapse_whitespace(s))
    .find(|s| !s.is_empty())
}

/// Natively focusable controls get `0` when the attribute is absent or `-1`.
pub fn normalize_tab_index(raw: &RawElement, kind: TagKind) -> i32 {
    let natively_focusable = match kind {
        TagKind::Input
        | TagKind::Textarea
        | TagKind::Select
        | TagKind::Button
        | TagKind::Link => true,
        TagKind::ContentEditable => raw.content_editable,
    };
    match raw.tab_index_attr {
        None | Some(-1) if natively_focusable => 0,
        Some(value) => value,
        None => -1,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPage;
    use crate::types::ElementRect;

    #[test]
    fn test_hidden_and_zero_area_elements_are_dropped() {
        let mut display_none = RawElement::input("a");
        display_none.display = "none".into();
        let mut hidden = RawElement::input("b");
        hidden.visibility = "hidden".into();
        let mut transparent = RawElement::input("c");
        transparent.opacity = Some(0.0);
        let mut zero = RawElement::input("d");
        zero.rect = ElementRect::new(5.0, 5.0, 0.0, 20.0);
        let mut click_through = RawElement::input("e");
        click_through.pointer_events = "none".into();

        for raw in [display_none, hidden, transparent, zero, click_through] {
            assert!(descriptor_from_raw(raw).is_none());
        }
        assert!(descriptor_from_raw(RawElement::input("visible")).is_some());
    }

    #[test]
    fn test_label_resolution_order() {
        let mut raw = RawElement::input("x");
        raw.placeholder = "Placeholder".into();
        raw.labelledby_text = "Labelled by".into();
        assert_eq!(resolve_label(&raw).as_deref(), Some("Labelled by"));

        raw.aria_label = "Aria".into();
        assert_eq!(resolve_label(&raw).as_deref(), Some("Aria"));

        raw.ancestor_label = "  Wrapping\n label ".into();
        assert_eq!(resolve_label(&raw).as_deref(), Some("Wrapping label"));

        raw.for_label = "Explicit".into();
        assert_eq!(resolve_label(&raw).as_deref(), Some("Explicit"));

        let bare = RawElement::input("y");
        assert_eq!(resolve_label(&bare), None);
    }

    #[test]
    fn test_tab_index_normalisation() {
        let mut raw = RawElement::input("x");
        assert_eq!(normalize_tab_index(&raw, TagKind::Input), 0);
        raw.tab_index_attr = Some(-1);
        assert_eq!(normalize_tab_index(&raw, TagKind::Input), 0);
        raw.tab_index_attr = Some(4);
        assert_eq!(normalize_tab_index(&raw, TagKind::Input), 4);

        let mut div = RawElement::input("d");
        div.tag = "div".into();
        div.role = "textbox".into();
        assert_eq!(normalize_tab_index(&div, TagKind::ContentEditable), -1);
        div.tab_index_attr = Some(-1);
        assert_eq!(normalize_tab_index(&div, TagKind::ContentEditable), -1);
        div.content_editable = true;
        assert_eq!(normalize_tab_index(&div, TagKind::ContentEditable), 0);
    }

    #[test]
    fn test_anchor_without_href_is_ignored() {
        let mut raw = RawElement::input("a");
        raw.tag = "a".into();
        assert!(descriptor_from_raw(raw.clone()).is_none());
        raw.has_href = true;
        let link = descriptor_from_raw(raw).unwrap();
        assert_eq!(link.tag_kind, TagKind::Link);
    }

    #[test]
    fn test_input_type_defaults() {
        let mut raw = RawElement::input("n");
        raw.input_type = String::new();
        assert_eq!(descriptor_from_raw(raw).unwrap().input_type, "text");

        let mut button = RawElement::input("go");
        button.tag = "button".into();
        button.input_type = String::new();
        let desc = descriptor_from_raw(button).unwrap();
        assert_eq!(desc.tag_kind, TagKind::Button);
        assert_eq!(desc.input_type, "submit");
    }

    #[tokio::test]
    async fn test_inspect_filters_live_page() {
        let mut honeypot = RawElement::input("website_url");
        honeypot.display = "none".into();
        let page = MockPage::new()
            .with_element(RawElement::input("firstname"))
            .with_element(honeypot);

        let found = ElementInspector::new().inspect(&page).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dom_name.as_deref(), Some("firstname"));
    }

    #[tokio::test]
    async fn test_inspect_returns_empty_when_context_is_gone() {
        let page = MockPage::new().with_element(RawElement::input("firstname"));
        page.lose_context();
        assert!(ElementInspector::new().inspect(&page).await.is_empty());
    }
}
