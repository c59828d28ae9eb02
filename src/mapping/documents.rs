use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
    Photo,
}

impl DocumentKind {
    /// Filename fragments that identify a document of this kind.
    pub fn filename_needles(&self) -> &'static [&'static str] {
        match self {
            DocumentKind::Resume => &["resume", "cv", "lebenslauf"],
            DocumentKind::CoverLetter => &["cover", "anschreiben", "motivation"],
            DocumentKind::Photo => &["photo", "foto", "bild", "picture", "portrait"],
        }
    }
}

/// A local file the profile offers for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub filename: String,
    pub path: PathBuf,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { filename, path }
    }
}

pub trait DocumentLookup {
    /// First registered document whose filename contains one of the kind's
    /// needles; `None` when nothing matches.
    fn find_document(&self, kind: DocumentKind) -> Option<PathBuf>;
}

impl DocumentLookup for [Document] {
    fn find_document(&self, kind: DocumentKind) -> Option<PathBuf> {
        let needles = kind.filename_needles();
        self.iter()
            .find(|doc| {
                let name = doc.filename.to_lowercase();
                needles.iter().any(|needle| name.contains(needle))
            })
            .map(|doc| doc.path.clone())
    }
}

impl DocumentLookup for Vec<Document> {
    fn find_document(&self, kind: DocumentKind) -> Option<PathBuf> {
        self.as_slice().find_document(kind)
    }
}
