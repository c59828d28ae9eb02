use crate::core::config::{InconclusivePolicy, VerifyConfig};
use crate::core::{PageDriver, PageQuery};
use crate::dom::text::visible_text;
use crate::errors::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

const SUCCESS_KEYWORDS: &[&str] = &[
    "thank you",
    "thanks for applying",
    "application received",
    "successfully submitted",
    "success",
    "vielen dank",
    "danke",
    "erfolgreich",
    "bewerbung eingegangen",
    "dziękujemy",
    "merci",
    "gracias",
];

const ERROR_KEYWORDS: &[&str] = &[
    "error",
    "failed",
    "invalid",
    "fehler",
    "fehlgeschlagen",
    "ungültig",
    "błąd",
    "erreur",
];

/// Phrases that contain a success keyword but mean the opposite. Checked
/// before anything else.
const NEGATED_PHRASES: &[&str] = &[
    "unsuccessful",
    "not successful",
    "not been submitted",
    "nicht erfolgreich",
    "nicht gesendet",
    "nicht übermittelt",
];

/// A keyword matched on word boundaries.
#[derive(Debug, Clone)]
struct Keyword {
    word: String,
    pattern: Regex,
}

impl Keyword {
    fn new(word: &str) -> Option<Self> {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return None;
        }
        match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&word))) {
            Ok(pattern) => Some(Self { word, pattern }),
            Err(e) => {
                warn!(keyword = %word, "skipping keyword: {}", e);
                None
            }
        }
    }
}

fn compile(words: &[&str]) -> Vec<Keyword> {
    words.iter().filter_map(|w| Keyword::new(w)).collect()
}

lazy_static! {
    static ref NEGATED: Vec<Keyword> = compile(NEGATED_PHRASES);
    static ref SUCCESS: Vec<Keyword> = compile(SUCCESS_KEYWORDS);
    static ref ERRORS: Vec<Keyword> = compile(ERROR_KEYWORDS);
}

fn first_match<'k>(keywords: &'k [Keyword], text: &str) -> Option<&'k Keyword> {
    keywords.iter().find(|k| k.pattern.is_match(text))
}

pub fn content_hash(html: &str) -> String {
    hex::encode(Sha256::digest(html.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionOutcome {
    /// Page content did not change at all.
    Unchanged,
    Confirmed { keyword: String },
    Rejected { keyword: String },
    /// Content changed but neither keyword list matched.
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionVerdict {
    pub outcome: SubmissionOutcome,
    pub success: bool,
    pub navigated: bool,
    pub post_hash: String,
}

/// Classifies what a submit action did by comparing page state before and
/// after it.
#[derive(Debug, Clone)]
pub struct SubmissionVerifier {
    success_keywords: Vec<Keyword>,
    error_keywords: Vec<Keyword>,
    inconclusive: InconclusivePolicy,
}

impl Default for SubmissionVerifier {
    fn default() -> Self {
        Self::from_config(&VerifyConfig::default())
    }
}

impl SubmissionVerifier {
    pub fn from_config(config: &VerifyConfig) -> Self {
        let merge = |base: &[Keyword], extra: &[String]| {
            base.iter()
                .cloned()
                .chain(extra.iter().filter_map(|s| Keyword::new(s)))
                .collect::<Vec<_>>()
        };
        Self {
            success_keywords: merge(SUCCESS.as_slice(), &config.extra_success_keywords),
            error_keywords: merge(ERRORS.as_slice(), &config.extra_error_keywords),
            inconclusive: config.inconclusive,
        }
    }

    pub fn with_policy(mut self, policy: InconclusivePolicy) -> Self {
        self.inconclusive = policy;
        self
    }

    /// Keyword classification of visible text, on word boundaries. Negated
    /// phrases and error keywords win over any success keyword.
    pub fn classify_text(&self, text: &str) -> SubmissionOutcome {
        let rejection = first_match(&NEGATED, text).or_else(|| first_match(&self.error_keywords, text));
        if let Some(keyword) = rejection {
            return SubmissionOutcome::Rejected {
                keyword: keyword.word.clone(),
            };
        }
        if let Some(keyword) = first_match(&self.success_keywords, text) {
            return SubmissionOutcome::Confirmed {
                keyword: keyword.word.clone(),
            };
        }
        SubmissionOutcome::Inconclusive
    }

    pub fn is_success(&self, outcome: &SubmissionOutcome) -> bool {
        match outcome {
            SubmissionOutcome::Confirmed { .. } => true,
            SubmissionOutcome::Inconclusive => self.inconclusive == InconclusivePolicy::Success,
            SubmissionOutcome::Unchanged | SubmissionOutcome::Rejected { .. } => false,
        }
    }

    pub async fn assess<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        pre_submit_hash: &str,
        pre_submit_url: Option<&str>,
    ) -> Result<SubmissionVerdict> {
        let html = page.content().await?;
        let post_hash = content_hash(&html);
        let navigated = match pre_submit_url {
            Some(before) => page.current_url().await.map(|now| now != before).unwrap_or(false),
            None => false,
        };

        let outcome = if post_hash == pre_submit_hash {
            SubmissionOutcome::Unchanged
        } else {
            let text = match page.query(&PageQuery::VisibleText).await {
                Ok(value) => value.as_str().map(str::to_string).unwrap_or_default(),
                Err(_) => String::new(),
            };
            let text = if text.trim().is_empty() {
                visible_text(&html)
            } else {
                text
            };
            self.classify_text(&text)
        };

        let success = self.is_success(&outcome);
        debug!(?outcome, navigated, "submission assessed");
        info!("submission {}", if success { "confirmed" } else { "not confirmed" });
        Ok(SubmissionVerdict {
            outcome,
            success,
            navigated,
            post_hash,
        })
    }

    pub async fn verify<P: PageDriver + ?Sized>(&self, page: &P, pre_submit_hash: &str) -> Result<bool> {
        Ok(self.assess(page, pre_submit_hash, None).await?.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::element::RawElement;
    use crate::testing::MockPage;

    #[test]
    fn test_error_keyword_overrides_success() {
        let verifier = SubmissionVerifier::default();
        assert_eq!(
            verifier.classify_text("Vielen Dank! Leider ist ein Fehler aufgetreten."),
            SubmissionOutcome::Rejected {
                keyword: "fehler".into()
            }
        );
        assert!(matches!(
            verifier.classify_text("Thank you for your application"),
            SubmissionOutcome::Confirmed { .. }
        ));
        assert_eq!(verifier.classify_text("Job details"), SubmissionOutcome::Inconclusive);
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let verifier = SubmissionVerifier::default();
        assert_eq!(
            verifier.classify_text("Your submission was unsuccessful, please try again."),
            SubmissionOutcome::Rejected {
                keyword: "unsuccessful".into()
            }
        );
        assert_eq!(
            verifier.classify_text("Die Übermittlung war nicht erfolgreich."),
            SubmissionOutcome::Rejected {
                keyword: "nicht erfolgreich".into()
            }
        );
        assert_eq!(
            verifier.classify_text("Ein Gedanke zum Schluss: bitte Unterlagen prüfen."),
            SubmissionOutcome::Inconclusive
        );
        assert_eq!(
            verifier.classify_text("Danke, wir melden uns."),
            SubmissionOutcome::Confirmed {
                keyword: "danke".into()
            }
        );
    }

    #[test]
    fn test_inconclusive_policy_is_configurable() {
        let strict = SubmissionVerifier::default();
        assert!(!strict.is_success(&SubmissionOutcome::Inconclusive));
        let lenient = strict.with_policy(InconclusivePolicy::Success);
        assert!(lenient.is_success(&SubmissionOutcome::Inconclusive));
        assert!(!lenient.is_success(&SubmissionOutcome::Unchanged));
    }

    #[test]
    fn test_extra_keywords_are_lowercased() {
        let config = VerifyConfig {
            extra_success_keywords: vec!["Bewerbung Gesendet".into()],
            ..Default::default()
        };
        let verifier = SubmissionVerifier::from_config(&config);
        assert!(matches!(
            verifier.classify_text("Ihre BEWERBUNG GESENDET"),
            SubmissionOutcome::Confirmed { .. }
        ));
    }

    #[tokio::test]
    async fn test_identical_hash_is_failure() {
        let page = MockPage::new().with_element(RawElement::input("email"));
        let before = content_hash(&page.content().await.unwrap());
        assert!(!SubmissionVerifier::default().verify(&page, &before).await.unwrap());
    }

    #[tokio::test]
    async fn test_changed_page_with_thanks_is_success() {
        let page = MockPage::new()
            .with_element(RawElement::input("email"))
            .with_success_text("Thank you! We received your application.");
        let before = content_hash(&page.content().await.unwrap());
        page.query(&PageQuery::SubmitFirstForm).await.unwrap();

        let verdict = SubmissionVerifier::default()
            .assess(&page, &before, Some("https://jobs.example.com/apply"))
            .await
            .unwrap();
        assert!(verdict.success);
        assert!(verdict.navigated);
    }
}
