use crate::dom::element::ElementDescriptor;
use crate::utils::truncate_chars;

/// Page-level context shared by every classification on one page.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub page_excerpt: String,
    pub profile_paths: Vec<String>,
}

const MAX_PROFILE_PATHS: usize = 60;

/// Builds the classification prompt. The excerpt is cut to `max_excerpt_chars`
/// so prompt size stays bounded regardless of page size.
pub fn build_classification_prompt(
    site: &str,
    descriptor: &ElementDescriptor,
    context: &PromptContext,
    max_excerpt_chars: usize,
) -> String {
    let excerpt = truncate_chars(&context.page_excerpt, max_excerpt_chars);
    let paths = context
        .profile_paths
        .iter()
        .take(MAX_PROFILE_PATHS)
        .map(|p| format!("- {}", p))
        .collect::<Vec<_>>()
        .join("\n");

    let (x, y) = descriptor.bounding_box.center();

    format!(
        r#"You are an expert web form analyzer filling a job application on {site}.

Field to classify:
- description: {description}
- selector: {selector}
- type: {input_type}
- center: x={x:.0}, y={y:.0}

Applicant profile fields available:
{paths}

Page content (truncated):
{excerpt}

Decide how to interact with this field. Respond with a JSON object only:
{{
  "strategy": "selector" | "coordinate_click",
  "selector": "CSS selector (when strategy is selector)",
  "x": number, "y": number,
  "action": "fill" | "select" | "check" | "upload" | "click" | "skip",
  "fieldPath": "profile field path from the list above, or null",
  "value": "literal value when no profile field applies, or null",
  "confidence": 0.0-1.0,
  "reasoning": "short explanation"
}}"#,
        site = site,
        description = descriptor.describe(),
        selector = descriptor.selector,
        input_type = descriptor.input_type,
        x = x,
        y = y,
        paths = if paths.is_empty() { "- (none)".to_string() } else { paths },
        excerpt = excerpt,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::element::TagKind;

    #[test]
    fn test_prompt_bounds_page_excerpt() {
        let descriptor = ElementDescriptor::new(TagKind::Textarea, "#q1").with_label("Why us?");
        let context = PromptContext {
            page_excerpt: "x".repeat(10_000),
            profile_paths: vec!["personal.firstName".into(), "coverLetter".into()],
        };
        let prompt = build_classification_prompt("jobs.example.com", &descriptor, &context, 3000);

        assert!(prompt.contains("labeled 'Why us?'"));
        assert!(prompt.contains("- coverLetter"));
        assert!(prompt.len() < 5_000);
    }
}
