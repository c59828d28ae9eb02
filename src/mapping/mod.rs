pub mod cache;
pub mod documents;
pub mod field;
pub mod heuristic;
pub mod llm;
pub mod prompt;

pub use cache::{CacheKey, JsonFileCache, MappingCache, MemoryCache};
pub use documents::{Document, DocumentKind, DocumentLookup};
pub use field::{FieldMapping, FieldType, Locator, MappingSet, MappingSource};
pub use heuristic::{HeuristicMapper, HeuristicMapping};
pub use llm::{Classification, LlmClassifier, LlmClient, OllamaClient, OpenAiClient};
pub use prompt::PromptContext;
