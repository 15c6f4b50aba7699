use std::{
    collections::BTreeMap,
    fmt, fs,
    ops::Range,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read document {0}: {1}")]
    Io(String, #[source] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Page → paragraph range map produced by the extraction step. Purely
/// informational: navigation indices never depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageMap {
    pages: BTreeMap<u32, Range<usize>>,
}

impl PageMap {
    pub fn insert(&mut self, page: u32, paragraphs: Range<usize>) {
        self.pages.insert(page, paragraphs);
    }

    pub fn page_of(&self, paragraph_index: usize) -> Option<u32> {
        self.pages
            .iter()
            .find(|(_, range)| range.contains(&paragraph_index))
            .map(|(page, _)| *page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Immutable text snapshot. Every constructed document gets a fresh
/// revision, which keys the segmentation cache.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    revision: u64,
    text: Arc<str>,
    pages: Option<PageMap>,
}

impl Document {
    pub fn from_text(id: impl Into<String>, text: &str) -> Self {
        Self {
            id: DocumentId::new(id),
            revision: NEXT_REVISION.fetch_add(1, Ordering::Relaxed),
            text: Arc::from(text.replace("\r\n", "\n")),
            pages: None,
        }
    }

    /// Loads a UTF-8 plain text file; the path doubles as the document id.
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let text = fs::read_to_string(path)
            .map_err(|err| DocumentError::Io(path.display().to_string(), err))?;
        Ok(Self::from_text(path.display().to_string(), &text))
    }

    pub fn empty() -> Self {
        Self::from_text("", "")
    }

    pub fn with_pages(mut self, pages: PageMap) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn pages(&self) -> Option<&PageMap> {
        self.pages.as_ref()
    }
}
