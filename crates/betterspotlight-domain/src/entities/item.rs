//! Indexed items. One item per canonical file path.

use serde::{Deserialize, Serialize};

/// Coarse file kind, derived from the extension at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Markdown,
    Pdf,
    Image,
    Binary,
    Code,
}

impl ItemKind {
    /// Wire/store string for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Binary => "binary",
            Self::Code => "code",
        }
    }

    /// Classify a lowercase extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "txt" | "log" | "csv" | "text" => Self::Text,
            "md" | "markdown" => Self::Markdown,
            "pdf" => Self::Pdf,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "tiff" | "webp" | "heic" => Self::Image,
            "rs" | "py" | "js" | "ts" | "cpp" | "cc" | "c" | "h" | "hpp" | "java" | "rb" | "go"
            | "swift" | "el" | "sh" | "json" | "xml" | "yaml" | "yml" | "toml" => Self::Code,
            _ => Self::Binary,
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "markdown" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            "image" => Ok(Self::Image),
            "binary" => Ok(Self::Binary),
            "code" => Ok(Self::Code),
            _ => Err(()),
        }
    }
}

/// A stored item row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub extension: Option<String>,
    pub kind: ItemKind,
    pub size: i64,
    pub created_at: f64,
    pub modified_at: f64,
    pub indexed_at: f64,
    pub content_hash: Option<String>,
    pub sensitivity: String,
    pub is_pinned: bool,
    pub parent_path: Option<String>,
}

/// Metadata for an upsert. The store assigns/preserves the id and stamps
/// `indexed_at`.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub path: String,
    pub name: String,
    pub extension: Option<String>,
    pub kind: ItemKind,
    pub size: i64,
    pub created_at: f64,
    pub modified_at: f64,
    pub content_hash: Option<String>,
    pub sensitivity: String,
    pub parent_path: Option<String>,
}

impl NewItem {
    /// Build item metadata from a path and file facts, deriving name,
    /// extension, kind and parent path.
    #[must_use]
    pub fn from_path(path: &str, size: i64, created_at: f64, modified_at: f64) -> Self {
        let p = std::path::Path::new(path);
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_owned());
        let extension = p
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .filter(|e| !e.is_empty());
        let kind = extension
            .as_deref()
            .map_or(ItemKind::Binary, ItemKind::from_extension);
        let parent_path = p.parent().map(|d| d.to_string_lossy().into_owned());
        Self {
            path: path.to_owned(),
            name,
            extension,
            kind,
            size,
            created_at,
            modified_at,
            content_hash: None,
            sensitivity: "normal".to_owned(),
            parent_path,
        }
    }
}
