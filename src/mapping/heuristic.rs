use crate::dom::element::ElementDescriptor;
use crate::mapping::documents::{DocumentKind, DocumentLookup};
use crate::mapping::field::{FieldMapping, FieldType, Locator};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    /// Ordered, first match wins. `full name` sits after the first/last split
    /// and the short `fname`/`lname` forms only match at a word start so that
    /// `fullname` is not read as a last name.
    static ref FIELD_RULES: Vec<(Regex, &'static str)> = vec![
        (r"(?i)first.?name|given.?name|vorname|imi[eę]|(^|[^a-z])f_?name", "personal.firstName"),
        (r"(?i)last.?name|family.?name|surname|nachname|nazwisko|(^|[^a-z])l_?name", "personal.lastName"),
        (r"(?i)full.?name|complete.?name|your.?name|vollst(ä|ae)ndiger.?name|^\s*name\s*\*?\s*$", "personal.fullName"),
        (r"(?i)birth|(^|[^a-z])dob([^a-z]|$)|geburtsdatum", "personal.birthDate"),
        (r"(?i)e-?mail", "contact.email"),
        (r"(?i)phone|mobile|telefon|handy|(^|[^a-z])tel([^a-z]|$)", "contact.phone"),
        (r"(?i)address|street|stra(ß|ss)e|adresse", "contact.address"),
        (r"(?i)city|town|wohnort|stadt|(^|[^a-z])ort([^a-z]|$)", "contact.city"),
        (r"(?i)zip|postal|post.?code|plz|postleitzahl", "contact.zip"),
        (r"(?i)country|^\s*land\s*\*?\s*$", "contact.country"),
        (r"(?i)linked.?in", "social.linkedin"),
        (r"(?i)git.?hub", "social.github"),
        (r"(?i)portfolio|website|homepage", "social.website"),
        (r"(?i)position|job.?title|desired.?role|stelle", "target.position"),
        (r"(?i)salary|compensation|gehalt", "target.salary"),
        (r"(?i)notice.?period|k(ü|ue)ndigungsfrist", "target.noticePeriod"),
        (r"(?i)cover.?letter|anschreiben|motivation", "coverLetter"),
    ]
    .into_iter()
    .map(|(pattern, path)| (Regex::new(pattern).unwrap(), path))
    .collect();

    static ref FILE_RULES: Vec<(Regex, DocumentKind)> = vec![
        (r"(?i)(^|[^a-z])cv([^a-z]|$)|resume|r[eé]sum[eé]|lebenslauf", DocumentKind::Resume),
        (r"(?i)cover.?letter|anschreiben|motivation", DocumentKind::CoverLetter),
        (r"(?i)photo|foto|bild|picture|portrait", DocumentKind::Photo),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).unwrap(), kind))
    .collect();

    static ref CONSENT: Regex =
        Regex::new(r"(?i)terms|privacy|gdpr|dsgvo|datenschutz|consent|einwillig|agree|agreement").unwrap();

    static ref NEWSLETTER: Regex =
        Regex::new(r"(?i)newsletter|marketing|promotion|werbung|updates").unwrap();
}

/// Result of a heuristic pass. `unmapped` holds the elements no rule covered
/// and that the classifier may still look at.
#[derive(Debug, Clone, Default)]
pub struct HeuristicMapping {
    pub mappings: Vec<FieldMapping>,
    pub unmapped: Vec<ElementDescriptor>,
}

#[derive(Debug, Default, Clone)]
pub struct HeuristicMapper;

impl HeuristicMapper {
    pub fn new() -> Self {
        Self
    }

    /// Deterministic for identical input.
    pub fn map<D: DocumentLookup + ?Sized>(
        &self,
        descriptors: &[ElementDescriptor],
        documents: &D,
    ) -> HeuristicMapping {
        let mut result = HeuristicMapping::default();

        for descriptor in descriptors.iter().filter(|d| d.is_fillable()) {
            let locator = Locator::css(descriptor.selector.clone());
            let field_name = descriptor.field_key();
            let field_type = FieldType::from_descriptor(descriptor);
            let candidates = candidate_texts(descriptor);

            if descriptor.is_file() {
                let mut mapping = FieldMapping::heuristic(locator, &field_name, FieldType::File)
                    .set_required(descriptor.required);
                if let Some(kind) = match_file_kind(&candidates) {
                    match documents.find_document(kind) {
                        Some(path) => {
                            mapping = mapping.with_static_value(path.to_string_lossy());
                        }
                        None => debug!(field = %field_name, ?kind, "no document for upload field"),
                    }
                }
                result.mappings.push(mapping);
                continue;
            }

            if descriptor.input_type == "checkbox" {
                if candidates.iter().any(|t| NEWSLETTER.is_match(t)) {
                    debug!(field = %field_name, "leaving opt-in checkbox unticked");
                    continue;
                }
                if candidates.iter().any(|t| CONSENT.is_match(t)) {
                    result.mappings.push(
                        FieldMapping::heuristic(locator, &field_name, FieldType::Checkbox)
                            .with_static_value("true")
                            .set_required(descriptor.required),
                    );
                    continue;
                }
            }

            match match_rule(&candidates) {
                Some(path) => {
                    debug!(field = %field_name, path, "heuristic match");
                    result.mappings.push(
                        FieldMapping::heuristic(locator, &field_name, field_type)
                            .with_path(path)
                            .set_required(descriptor.required),
                    );
                }
                None if descriptor.is_select() => {
                    result.mappings.push(
                        FieldMapping::heuristic(locator, &field_name, FieldType::Select)
                            .set_required(descriptor.required),
                    );
                }
                None => result.unmapped.push(descriptor.clone()),
            }
        }

        result
    }
}

fn candidate_texts(descriptor: &ElementDescriptor) -> Vec<&str> {
    [&descriptor.dom_name, &descriptor.dom_id, &descriptor.label_text]
        .into_iter()
        .flatten()
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .collect()
}

/// Rule order is primary; within a rule name, id and label are tried in turn.
pub fn match_rule(candidates: &[&str]) -> Option<&'static str> {
    FIELD_RULES
        .iter()
        .find(|(pattern, _)| candidates.iter().any(|text| pattern.is_match(text)))
        .map(|(_, path)| *path)
}

pub fn match_file_kind(candidates: &[&str]) -> Option<DocumentKind> {
    FILE_RULES
        .iter()
        .find(|(pattern, _)| candidates.iter().any(|text| pattern.is_match(text)))
        .map(|(_, kind)| *kind)
}
