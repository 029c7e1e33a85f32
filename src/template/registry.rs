//! Fragment registry for storing and retrieving shared fragments

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::ParseError;
use crate::parser::{parse, Fragment};

/// File extensions picked up by [`FragmentRegistry::load_dir`]
const FRAGMENT_EXTENSIONS: &[&str] = &["html", "htm", "frag"];

/// Errors that can occur during fragment registration and include resolution
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Fragment not found in registry
    #[error("fragment not found: {name}")]
    NotFound { name: String },

    /// Duplicate fragment name
    #[error("duplicate fragment definition: {name}")]
    Duplicate { name: String },

    /// Error reading a fragment file or directory
    #[error("error reading fragment file {path}: {message}")]
    FileReadError { path: PathBuf, message: String },

    /// Registered fragment source does not parse
    #[error("malformed fragment {name}: {}", crate::format_parse_errors(.errors))]
    Malformed {
        name: String,
        errors: Vec<ParseError>,
    },

    /// Fragment includes itself, directly or through others
    #[error("circular include detected: {chain}")]
    CircularInclude { chain: String },
}

/// A stored fragment
#[derive(Debug, Clone)]
pub struct FragmentDefinition {
    /// Registry name, `/`-separated for fragments loaded from subdirectories
    pub name: String,
    /// Original source text, kept for error reports
    pub source: String,
    /// Parsed template model
    pub fragment: Fragment,
    /// File the fragment was loaded from
    pub path: Option<PathBuf>,
}

/// Registry of named shared fragments
#[derive(Debug, Default)]
pub struct FragmentRegistry {
    fragments: HashMap<String, FragmentDefinition>,
    /// Base path for resolving relative directories
    base_path: Option<PathBuf>,
}

impl FragmentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new registry with a base path for directory resolution
    pub fn with_base_path(base_path: PathBuf) -> Self {
        Self {
            fragments: HashMap::new(),
            base_path: Some(base_path),
        }
    }

    /// Parse and register a fragment source under a name
    pub fn register_source(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), TemplateError> {
        let name = name.into();
        let source = source.into();
        let fragment = parse(&source).map_err(|errors| TemplateError::Malformed {
            name: name.clone(),
            errors,
        })?;
        self.register_definition(FragmentDefinition {
            name,
            source,
            fragment,
            path: None,
        })
    }

    /// Register a fragment definition directly
    pub fn register_definition(&mut self, def: FragmentDefinition) -> Result<(), TemplateError> {
        if self.fragments.contains_key(&def.name) {
            return Err(TemplateError::Duplicate {
                name: def.name.clone(),
            });
        }
        tracing::debug!(name = %def.name, "registered fragment");
        self.fragments.insert(def.name.clone(), def);
        Ok(())
    }

    /// Get a fragment by name
    pub fn get(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments.get(name)
    }

    /// Check if a fragment exists
    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fragments.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Get the base path
    pub fn base_path(&self) -> Option<&PathBuf> {
        self.base_path.as_ref()
    }

    /// Resolve a path relative to the base path
    pub fn resolve_path(&self, relative: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) if relative.is_relative() => base.join(relative),
            _ => relative.to_path_buf(),
        }
    }

    /// Register every fragment file below `dir`
    ///
    /// Files are named by their path relative to `dir`, without extension,
    /// with `/` as separator: `brokerages/deploy-cloud-algorithms.html`
    /// becomes `brokerages/deploy-cloud-algorithms`. Returns the number of
    /// fragments registered.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, TemplateError> {
        let root = self.resolve_path(dir);
        let mut files = Vec::new();
        collect_fragment_files(&root, &mut files)?;
        files.sort();

        for path in &files {
            let name = fragment_name(&root, path);
            let source = std::fs::read_to_string(path).map_err(|e| TemplateError::FileReadError {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let fragment = parse(&source).map_err(|errors| TemplateError::Malformed {
                name: name.clone(),
                errors,
            })?;
            self.register_definition(FragmentDefinition {
                name,
                source,
                fragment,
                path: Some(path.clone()),
            })?;
        }

        tracing::debug!(dir = %root.display(), count = files.len(), "loaded fragment directory");
        Ok(files.len())
    }
}

fn collect_fragment_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), TemplateError> {
    let read_error = |e: std::io::Error| TemplateError::FileReadError {
        path: dir.to_path_buf(),
        message: e.to_string(),
    };

    for entry in std::fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if path.is_dir() {
            collect_fragment_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| FRAGMENT_EXTENSIONS.contains(&ext))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn fragment_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
