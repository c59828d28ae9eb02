pub mod submission;
pub mod validator;

pub use submission::{content_hash, SubmissionOutcome, SubmissionVerdict, SubmissionVerifier};
pub use validator::{FormValidator, ValidationReport};
