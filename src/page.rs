//! Page manifests
//!
//! A page is an ordered list of parts, each either inline fragment text or a
//! reference to a registered fragment, rendered with page-wide parameters
//! and optional per-part overrides.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::params::{ParameterSet, ParamsError};

/// Errors that can occur when loading or parsing page manifests
#[derive(Error, Debug)]
pub enum PageError {
    #[error("Failed to read page file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse page TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid page parameters: {0}")]
    Params(#[from] ParamsError),
    #[error("Part {index} must have exactly one of 'text' or 'fragment'")]
    InvalidPart { index: usize },
}

/// A page built from fragments
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Optional name for the page
    pub name: Option<String>,
    /// Parameters shared by every part
    pub params: ParameterSet,
    pub parts: Vec<PagePart>,
}

/// One section of a page
#[derive(Debug, Clone, PartialEq)]
pub enum PagePart {
    /// Fragment source written directly in the manifest
    Inline { source: String, params: ParameterSet },
    /// Reference to a fragment in the registry
    Fragment { name: String, params: ParameterSet },
}

impl PagePart {
    /// Per-part parameter overrides
    pub fn params(&self) -> &ParameterSet {
        match self {
            PagePart::Inline { params, .. } | PagePart::Fragment { params, .. } => params,
        }
    }
}

/// TOML structure for deserializing pages
#[derive(Deserialize)]
struct TomlPage {
    metadata: Option<TomlMetadata>,
    #[serde(default)]
    params: toml::Table,
    #[serde(default)]
    parts: Vec<TomlPart>,
}

#[derive(Deserialize)]
struct TomlMetadata {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPart {
    text: Option<String>,
    fragment: Option<String>,
    #[serde(default)]
    params: toml::Table,
}

impl Page {
    /// Load a page manifest from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, PageError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a page manifest from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, PageError> {
        let toml_page: TomlPage = toml::from_str(content)?;

        let parts = toml_page
            .parts
            .into_iter()
            .enumerate()
            .map(|(index, part)| {
                let params = ParameterSet::from_toml_table(&part.params)?;
                match (part.text, part.fragment) {
                    (Some(source), None) => Ok(PagePart::Inline { source, params }),
                    (None, Some(name)) => Ok(PagePart::Fragment { name, params }),
                    _ => Err(PageError::InvalidPart { index }),
                }
            })
            .collect::<Result<Vec<_>, PageError>>()?;

        Ok(Page {
            name: toml_page.metadata.and_then(|m| m.name),
            params: ParameterSet::from_toml_table(&toml_page.params)?,
            parts,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}
