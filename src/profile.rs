use crate::errors::{FormError, Result};
use crate::mapping::documents::{Document, DocumentKind, DocumentLookup};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CATEGORY_DIRS: &[&str] = &["personal", "education", "experience", "skills"];
const DOCUMENT_DIRS: &[&str] = &["documents", "images"];

/// Applicant data, read-only for the duration of a run.
///
/// JSON files are deep-merged into one tree. Files directly in the profile
/// directory merge at the root, files in a category directory merge under
/// that category's key. `.md`/`.txt` files are stored as strings under their
/// filename stem in the same scope.
#[derive(Debug, Clone, Default)]
pub struct ProfileData {
    data: Value,
    documents: Vec<Document>,
}

impl ProfileData {
    pub fn from_value(data: Value) -> Self {
        Self {
            data,
            documents: Vec::new(),
        }
    }

    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = documents;
        self
    }

    pub async fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(FormError::Config(format!(
                "profile directory {} does not exist",
                dir.display()
            )));
        }

        let mut data = Value::Object(Map::new());
        load_scope(dir, &mut data).await?;

        for category in CATEGORY_DIRS {
            let sub = dir.join(category);
            if !sub.is_dir() {
                continue;
            }
            let mut scope = Value::Object(Map::new());
            load_scope(&sub, &mut scope).await?;
            let mut wrapper = Map::new();
            wrapper.insert(category.to_string(), scope);
            deep_merge(&mut data, Value::Object(wrapper));
        }

        let mut documents = Vec::new();
        for doc_dir in DOCUMENT_DIRS {
            let sub = dir.join(doc_dir);
            if !sub.is_dir() {
                continue;
            }
            for path in sorted_files(&sub).await? {
                documents.push(Document::new(path));
            }
        }

        debug!(
            "loaded profile from {} ({} documents)",
            dir.display(),
            documents.len()
        );
        Ok(Self { data, documents })
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Dot-path lookup (`personal.firstName`); `None` for any missing segment.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .filter(|s| !s.is_empty())
            .try_fold(&self.data, |node, segment| match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    /// Scalar rendering of a path. Arrays of scalars are joined with `, `.
    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path).and_then(value_to_string)
    }

    pub fn get_or(&self, path: &str, default: &str) -> String {
        self.get_string(path).unwrap_or_else(|| default.to_string())
    }

    /// Every scalar leaf path, used to tell the classifier what it may ask for.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_paths(&self.data, String::new(), &mut out);
        out
    }
}

impl DocumentLookup for ProfileData {
    fn find_document(&self, kind: DocumentKind) -> Option<PathBuf> {
        self.documents.find_document(kind)
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_string).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::Null | Value::Object(_) => None,
    }
}

fn collect_paths(value: &Value, prefix: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                collect_paths(child, path, out);
            }
        }
        Value::Null => {}
        _ if !prefix.is_empty() => out.push(prefix),
        _ => {}
    }
}

/// Objects merge recursively; any other value in `overlay` replaces the base.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

async fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_hidden = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(true);
        if path.is_file() && !is_hidden {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn load_scope(dir: &Path, scope: &mut Value) -> Result<()> {
    for path in sorted_files(dir).await? {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        match ext.as_str() {
            "json" => {
                let content = tokio::fs::read_to_string(&path).await?;
                match serde_json::from_str::<Value>(&content) {
                    Ok(parsed @ Value::Object(_)) => deep_merge(scope, parsed),
                    Ok(other) => {
                        let mut wrapper = Map::new();
                        wrapper.insert(stem, other);
                        deep_merge(scope, Value::Object(wrapper));
                    }
                    Err(e) => warn!("skipping malformed profile file {}: {}", path.display(), e),
                }
            }
            "md" | "txt" => {
                let content = tokio::fs::read_to_string(&path).await?;
                let mut wrapper = Map::new();
                wrapper.insert(stem, Value::String(content.trim().to_string()));
                deep_merge(scope, Value::Object(wrapper));
            }
            _ => debug!("ignoring profile file {}", path.display()),
        }
    }
    Ok(())
}

/// One URL per line; blank lines and `#` comments are ignored.
pub fn parse_job_urls(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub async fn load_job_urls(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| FormError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(parse_job_urls(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dot_path_lookup() {
        let profile = ProfileData::from_value(json!({
            "personal": {"firstName": "Anna", "age": 31},
            "skills": {"languages": ["Polish", "German"]},
        }));
        assert_eq!(profile.get_string("personal.firstName").as_deref(), Some("Anna"));
        assert_eq!(profile.get_string("personal.age").as_deref(), Some("31"));
        assert_eq!(
            profile.get_string("skills.languages").as_deref(),
            Some("Polish, German")
        );
        assert_eq!(profile.get_string("skills.languages.1").as_deref(), Some("German"));
        assert_eq!(profile.get_string("personal.missing.deeper"), None);
        assert_eq!(profile.get_or("contact.phone", "n/a"), "n/a");
    }

    #[test]
    fn test_deep_merge_keeps_siblings() {
        let mut base = json!({"personal": {"firstName": "Anna"}});
        deep_merge(&mut base, json!({"personal": {"lastName": "Kowalska"}}));
        assert_eq!(base, json!({"personal": {"firstName": "Anna", "lastName": "Kowalska"}}));
    }

    #[test]
    fn test_parse_job_urls_ignores_comments() {
        let urls = parse_job_urls("# batch\nhttps://a.example/jobs/1\n\n  https://b.example/apply  \n#x\n");
        assert_eq!(urls, vec!["https://a.example/jobs/1", "https://b.example/apply"]);
    }

    #[tokio::test]
    async fn test_load_profile_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("contact.json"), r#"{"contact":{"email":"a@x.com"}}"#).unwrap();
        std::fs::create_dir(root.join("personal")).unwrap();
        std::fs::write(root.join("personal/info.json"), r#"{"firstName":"Anna"}"#).unwrap();
        std::fs::write(root.join("personal/summary.md"), "  Backend engineer.\n").unwrap();
        std::fs::write(root.join("coverLetter.txt"), "Dear team").unwrap();
        std::fs::create_dir(root.join("documents")).unwrap();
        std::fs::write(root.join("documents/resume.pdf"), b"%PDF").unwrap();

        let profile = ProfileData::load(root).await.unwrap();
        assert_eq!(profile.get_string("contact.email").as_deref(), Some("a@x.com"));
        assert_eq!(profile.get_string("personal.firstName").as_deref(), Some("Anna"));
        assert_eq!(
            profile.get_string("personal.summary").as_deref(),
            Some("Backend engineer.")
        );
        assert_eq!(profile.get_string("coverLetter").as_deref(), Some("Dear team"));
        assert_eq!(
            profile.find_document(DocumentKind::Resume),
            Some(root.join("documents/resume.pdf"))
        );
        assert!(profile.leaf_paths().contains(&"personal.firstName".to_string()));
    }

    #[tokio::test]
    async fn test_missing_profile_directory_is_config_error() {
        let err = ProfileData::load(Path::new("/definitely/not/here")).await.unwrap_err();
        assert!(matches!(err, FormError::Config(_)));
    }
}
