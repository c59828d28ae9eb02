pub mod artifacts;
pub mod browser;
pub mod core;
pub mod dom;
pub mod errors;
pub mod fill;
pub mod job;
pub mod mapping;
pub mod pipeline;
pub mod profile;
pub mod strategy;
pub mod testing;
pub mod types;
pub mod utils;
pub mod verify;

pub use artifacts::{summarize, ArtifactRecorder, RunSummary};
pub use browser::{ChromeBrowser, ChromePage};
pub use crate::core::{BrowserTrait, Config, PageDriver, PageQuery};
pub use dom::{ElementDescriptor, ElementInspector, TabOrderMapper};
pub use errors::{FormError, Result};
pub use fill::{FillExecutor, FillReport};
pub use job::{BatchRunner, JobResult, JobRunner};
pub use mapping::{FieldMapping, HeuristicMapper, LlmClassifier, MappingSet};
pub use pipeline::{PipelineDefinition, PipelineRunner};
pub use profile::ProfileData;
pub use strategy::{select_strategy, Strategy};
pub use types::*;
pub use verify::{FormValidator, SubmissionVerifier};
