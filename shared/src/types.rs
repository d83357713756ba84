//! Common types used across the platform

use serde::{Deserialize, Serialize};

use crate::models::Brand;

/// Kinds of documents that receive a sequential, brand-prefixed number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Replacement,
    Invoice,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Replacement => "replacement",
            DocumentKind::Invoice => "invoice",
        }
    }

    /// Middle segment of the document number
    pub fn tag(&self) -> &'static str {
        match self {
            DocumentKind::Replacement => "RPL",
            DocumentKind::Invoice => "INV",
        }
    }
}

/// Format a document number (e.g., "GT-RPL-00007")
pub fn format_document_number(brand: Brand, kind: DocumentKind, sequence: i32) -> String {
    format!("{}-{}-{:05}", brand.code(), kind.tag(), sequence)
}

/// Output format for read endpoints that support export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}
