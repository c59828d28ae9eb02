use crate::mapping::documents::{DocumentKind, DocumentLookup};
use crate::mapping::field::{FieldMapping, FieldType, Locator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Site-specific behaviour. New sites get a variant and an entry in
/// [`select_strategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    Default,
    BewerbungJobs,
    LocalMock,
}

const KNOWN_HOSTS: &[(&str, Strategy)] = &[
    ("bewerbung.jobs", Strategy::BewerbungJobs),
    ("localhost", Strategy::LocalMock),
    ("127.0.0.1", Strategy::LocalMock),
];

const COMMON_CONSENT_BUTTONS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    "button[data-testid=\"uc-accept-all-button\"]",
];

/// Exact host, then subdomain suffix, then partial name, then base domain.
pub fn select_strategy(hostname: &str) -> Strategy {
    let host = hostname.trim().trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    if let Some((_, strategy)) = KNOWN_HOSTS.iter().find(|(known, _)| *known == host) {
        return *strategy;
    }
    if let Some((_, strategy)) = KNOWN_HOSTS
        .iter()
        .find(|(known, _)| host.ends_with(&format!(".{}", known)))
    {
        return *strategy;
    }
    if let Some((_, strategy)) = KNOWN_HOSTS.iter().find(|(known, _)| {
        let name = known.split('.').next().unwrap_or(known);
        name.len() > 3 && host.contains(name)
    }) {
        return *strategy;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() > 2 {
        let base = labels[labels.len() - 2..].join(".");
        if let Some((_, strategy)) = KNOWN_HOSTS.iter().find(|(known, _)| *known == base) {
            return *strategy;
        }
    }
    Strategy::Default
}

/// Strategy for a full URL; unparsable URLs fall back to the default.
pub fn strategy_for_url(url: &str) -> Strategy {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(select_strategy))
        .unwrap_or(Strategy::Default)
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Default => "default",
            Strategy::BewerbungJobs => "bewerbung.jobs",
            Strategy::LocalMock => "local-mock",
        }
    }

    /// Explicit mappings that override heuristic and classifier results for
    /// the same element.
    pub fn manual_mappings<D: DocumentLookup + ?Sized>(&self, documents: &D) -> Vec<FieldMapping> {
        match self {
            Strategy::Default => Vec::new(),
            Strategy::BewerbungJobs | Strategy::LocalMock => {
                let field = |selector: &str, name: &str, field_type: FieldType, path: &str| {
                    FieldMapping::manual(Locator::css(selector), name, field_type).with_path(path)
                };
                let mut mappings = vec![
                    field("input[name=\"firstname\"]", "firstname", FieldType::Text, "personal.firstName"),
                    field("input[name=\"lastname\"]", "lastname", FieldType::Text, "personal.lastName"),
                    field("input[type=\"email\"]", "email", FieldType::Email, "contact.email"),
                    field("input[type=\"tel\"]", "phone", FieldType::Tel, "contact.phone"),
                    field("textarea", "message", FieldType::Textarea, "coverLetter"),
                    field("input[name=\"birthdate\"]", "birthdate", FieldType::Date, "personal.birthDate")
                        .with_date_format("%d.%m.%Y"),
                ];
                let mut cv = FieldMapping::manual(Locator::css("input[type=\"file\"]"), "cv", FieldType::File);
                if let Some(path) = documents.find_document(DocumentKind::Resume) {
                    cv = cv.with_static_value(path.to_string_lossy());
                }
                mappings.push(cv);
                mappings
            }
        }
    }

    /// Clicks attempted before inspection (consent banners, "apply" buttons).
    /// Each one is optional.
    pub fn preparation_clicks(&self) -> &'static [&'static str] {
        match self {
            Strategy::Default => COMMON_CONSENT_BUTTONS,
            Strategy::BewerbungJobs => &[
                "#onetrust-accept-btn-handler",
                "button[data-testid=\"uc-accept-all-button\"]",
                "a[href*=\"bewerben\"]",
            ],
            Strategy::LocalMock => &[],
        }
    }

    pub fn submit_selectors(&self) -> &'static [&'static str] {
        match self {
            Strategy::Default => &[],
            Strategy::BewerbungJobs => &["button[type=\"submit\"]", "input[type=\"submit\"]"],
            Strategy::LocalMock => &["button[type=\"submit\"]"],
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
