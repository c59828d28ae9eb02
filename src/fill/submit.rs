use crate::core::{PageDriver, PageQuery};
use crate::dom::element::{ElementDescriptor, TagKind};
use crate::errors::{FormError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SUBMIT_WORDS: &[&str] = &[
    "submit", "send", "apply", "absenden", "senden", "bewerben", "weiter", "wyślij", "aplikuj",
];

/// How the form was finally submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "method", content = "selector")]
pub enum SubmitMethod {
    Preferred(String),
    SubmitControl(String),
    ButtonText(String),
    NativeForm,
}

/// Tries, in order: site-preferred selectors, native submit controls, buttons
/// whose text reads like a submit word, then `requestSubmit()` on the first
/// form.
pub async fn submit_form<P: PageDriver + ?Sized>(
    page: &P,
    preferred: &[&str],
    descriptors: &[ElementDescriptor],
    timeout: Duration,
) -> Result<SubmitMethod> {
    for selector in preferred {
        if page.wait_for_selector(selector, timeout).await.is_ok() && page.click(selector).await.is_ok()
        {
            return Ok(SubmitMethod::Preferred(selector.to_string()));
        }
        debug!(selector, "preferred submit selector unavailable");
    }

    let usable = descriptors.iter().filter(|d| !d.disabled && d.visible);

    for descriptor in usable.clone().filter(|d| is_submit_control(d)) {
        if page.click(&descriptor.selector).await.is_ok() {
            return Ok(SubmitMethod::SubmitControl(descriptor.selector.clone()));
        }
    }

    for descriptor in usable.filter(|d| is_submit_like_button(d)) {
        if page.click(&descriptor.selector).await.is_ok() {
            return Ok(SubmitMethod::ButtonText(descriptor.selector.clone()));
        }
    }

    let submitted = page.query(&PageQuery::SubmitFirstForm).await?;
    if submitted.as_bool().unwrap_or(false) {
        return Ok(SubmitMethod::NativeForm);
    }
    Err(FormError::ElementNotFound("submit control".to_string()))
}

fn is_submit_control(descriptor: &ElementDescriptor) -> bool {
    matches!(descriptor.tag_kind, TagKind::Input | TagKind::Button)
        && descriptor.input_type == "submit"
}

fn is_submit_like_button(descriptor: &ElementDescriptor) -> bool {
    if !matches!(descriptor.tag_kind, TagKind::Button | TagKind::Link) {
        return false;
    }
    let text = [&descriptor.text_content, &descriptor.aria_label]
        .into_iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    SUBMIT_WORDS.iter().any(|word| text.contains(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPage;

    fn button(selector: &str, input_type: &str, text: &str) -> ElementDescriptor {
        let mut d = ElementDescriptor::new(TagKind::Button, selector).with_input_type(input_type);
        d.text_content = Some(text.to_string());
        d
    }

    #[tokio::test]
    async fn test_preferred_selector_wins() {
        let page = MockPage::new().with_button("#apply-now", "Jetzt bewerben");
        let method = submit_form(&page, &["#apply-now"], &[], Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(method, SubmitMethod::Preferred("#apply-now".into()));
    }

    #[tokio::test]
    async fn test_button_text_before_native_submit() {
        let page = MockPage::new().with_button("#go", "Bewerbung absenden");
        let descriptors = vec![
            button("#help", "button", "Hilfe"),
            button("#go", "button", "Bewerbung absenden"),
        ];
        let method = submit_form(&page, &["#missing"], &descriptors, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(method, SubmitMethod::ButtonText("#go".into()));
    }

    #[tokio::test]
    async fn test_native_submit_as_last_resort() {
        let page = MockPage::new().with_element(crate::dom::RawElement::input("email"));
        let method = submit_form(&page, &[], &[], Duration::from_millis(10)).await.unwrap();
        assert_eq!(method, SubmitMethod::NativeForm);
        assert!(page.was_submitted());
    }
}
