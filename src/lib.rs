//! Fragment Composer - parameterised HTML fragments for documentation pages
//!
//! This library provides a parser, include resolver, and renderer for shared
//! markup fragments. A fragment is authored once and rendered by many pages,
//! each supplying its own parameter set.
//!
//! # Example
//!
//! ```rust
//! use fragment_composer::{render, ParameterSet};
//!
//! let params = ParameterSet::new().with("brokerage_name", "Bitfinex");
//! let html = render("<h2>{{brokerage_name}}</h2>", &params).unwrap();
//! assert_eq!(html, "<h2>Bitfinex</h2>");
//! ```

pub mod error;
pub mod lint;
pub mod page;
pub mod params;
pub mod parser;
pub mod renderer;
pub mod template;

pub use error::ParseError;
pub use lint::{LintCategory, LintWarning, PageWarning};
pub use page::{Page, PageError, PagePart};
pub use params::{ParameterSet, ParamsError, Value};
pub use parser::{parse, Fragment};
pub use renderer::{render_fragment, OutputConfig, RenderError};
pub use template::{resolve_includes, FragmentRegistry, TemplateError};

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use parser::ast::{Node, ScopeBlock, Spanned};
use template::{resolve_with_context, FragmentDefinition, ResolutionContext};

/// Errors that can occur during composition
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Fragment source does not parse
    #[error("malformed fragment: {}", format_parse_errors(.0))]
    Malformed(Vec<ParseError>),

    /// Error looking up or expanding shared fragments
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Error while rendering
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Error loading parameters
    #[error("parameter error: {0}")]
    Params(#[from] ParamsError),

    /// Error loading a page manifest
    #[error("page error: {0}")]
    Page(#[from] PageError),

    /// A page part failed to compose
    #[error("page part {index}: {source}")]
    Part {
        index: usize,
        source: Box<ComposeError>,
    },
}

impl From<Vec<ParseError>> for ComposeError {
    fn from(errors: Vec<ParseError>) -> Self {
        ComposeError::Malformed(errors)
    }
}

impl ComposeError {
    /// Format the error with source context using ariadne
    ///
    /// Only parse errors and render errors carry spans; other errors are
    /// returned as their plain message. So are render errors raised inside
    /// an included fragment, whose spans do not refer to `source`; use
    /// [`Composer::format_error`] to show those against the fragment.
    pub fn format(&self, source: &str, filename: &str) -> String {
        match self {
            ComposeError::Malformed(errors) => errors
                .iter()
                .map(|e| e.format(source, filename))
                .collect::<Vec<_>>()
                .join("\n"),
            ComposeError::Render(e) if e.origin().0.is_none() => e.format(source, filename),
            other => other.to_string(),
        }
    }
}

/// Name shown in reports about a registered fragment
fn display_name(def: &FragmentDefinition) -> String {
    match &def.path {
        Some(path) => path.display().to_string(),
        None => def.name.clone(),
    }
}

pub(crate) fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configuration for the complete composition pipeline
#[derive(Debug, Clone, Default)]
pub struct ComposeConfig {
    /// Markup output configuration
    pub output: OutputConfig,
}

impl ComposeConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output configuration
    pub fn with_output(mut self, config: OutputConfig) -> Self {
        self.output = config;
        self
    }

    /// Enable or disable HTML escaping of substituted values
    pub fn with_escape_html(mut self, escape: bool) -> Self {
        self.output = self.output.with_escape_html(escape);
        self
    }
}

/// Render fragment source with default configuration
///
/// The fragment must be self-contained: includes need a [`Composer`] with a
/// registry.
///
/// # Example
///
/// ```rust
/// use fragment_composer::{render, ParameterSet};
///
/// let params = ParameterSet::new()
///     .with("brokerage_name", "Kraken")
///     .with("is_supported", false);
///
/// let html = render(
///     "{{#if is_supported}}Deploy to {{brokerage_name}}.{{else}}Not supported.{{/if}}",
///     &params,
/// ).unwrap();
///
/// assert_eq!(html, "Not supported.");
/// ```
pub fn render(source: &str, params: &ParameterSet) -> Result<String, ComposeError> {
    render_with_config(source, params, &ComposeConfig::default())
}

/// Render fragment source with custom configuration
///
/// # Example
///
/// ```rust
/// use fragment_composer::{render_with_config, ComposeConfig, ParameterSet};
///
/// let config = ComposeConfig::new().with_escape_html(true);
/// let params = ParameterSet::new().with("pair", "BTC<USD");
///
/// let html = render_with_config("<td>{{pair}}</td>", &params, &config).unwrap();
/// assert_eq!(html, "<td>BTC&lt;USD</td>");
/// ```
pub fn render_with_config(
    source: &str,
    params: &ParameterSet,
    config: &ComposeConfig,
) -> Result<String, ComposeError> {
    let fragment = parse(source)?;
    Ok(render_fragment(&fragment, params, &config.output)?)
}

/// Renders fragments that may include shared fragments from a registry
#[derive(Debug, Default)]
pub struct Composer {
    registry: FragmentRegistry,
    config: ComposeConfig,
}

impl Composer {
    /// Create a composer with an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing registry
    pub fn with_registry(mut self, registry: FragmentRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the composition configuration
    pub fn with_config(mut self, config: ComposeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &FragmentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FragmentRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    /// Parse, resolve includes, and render fragment source
    pub fn compose(&self, source: &str, params: &ParameterSet) -> Result<String, ComposeError> {
        let fragment = parse(source)?;
        let resolved = resolve_includes(&fragment, &self.registry)?;
        Ok(render_fragment(&resolved, params, &self.config.output)?)
    }

    /// Render a registered fragment by name
    ///
    /// Render errors are attributed to the fragment, as for an include.
    pub fn render_named(&self, name: &str, params: &ParameterSet) -> Result<String, ComposeError> {
        let resolved = self.resolve_named(name)?;
        render_fragment(&resolved, params, &self.config.output)
            .map_err(|e| ComposeError::Render(e.within(name)))
    }

    /// Registered fragment `name` with its includes expanded
    fn resolve_named(&self, name: &str) -> Result<Fragment, ComposeError> {
        let def = self
            .registry
            .get(name)
            .ok_or_else(|| TemplateError::NotFound {
                name: name.to_string(),
            })?;
        let mut ctx = ResolutionContext::for_fragment(name);
        Ok(resolve_with_context(&def.fragment, &self.registry, &mut ctx)?)
    }

    /// Render every part of a page in order and concatenate the results
    ///
    /// Each part sees the page parameters with its own parameters layered on
    /// top. A failing part is reported with its index.
    pub fn compose_page(&self, page: &Page) -> Result<String, ComposeError> {
        tracing::debug!(name = ?page.name, parts = page.parts.len(), "composing page");

        let mut out = String::new();
        for (index, part) in page.parts.iter().enumerate() {
            let params = page.params.merged(part.params());
            let rendered = match part {
                PagePart::Inline { source, .. } => self.compose(source, &params),
                PagePart::Fragment { name, .. } => self.render_named(name, &params),
            }
            .map_err(|e| ComposeError::Part {
                index,
                source: Box::new(e),
            })?;
            out.push_str(&rendered);
        }
        Ok(out)
    }

    /// Lint fragment source against a parameter set
    ///
    /// Includes are expanded when the registry has fragments, so warnings
    /// inside them name the included fragment. With an empty registry they
    /// stay unresolved and are reported as such.
    pub fn check(
        &self,
        source: &str,
        params: &ParameterSet,
    ) -> Result<Vec<LintWarning>, ComposeError> {
        let fragment = self.resolve_source(source)?;
        Ok(lint::check(&fragment, params))
    }

    /// Parse source and expand its includes when the registry has fragments
    fn resolve_source(&self, source: &str) -> Result<Fragment, ComposeError> {
        let fragment = parse(source)?;
        if self.registry.is_empty() {
            return Ok(fragment);
        }
        Ok(resolve_includes(&fragment, &self.registry)?)
    }

    /// Lint every part of a page
    ///
    /// Each part is checked with the parameters it would be rendered with.
    /// A part's own parameters are reported as unused for that part; a
    /// page-wide parameter only when no part references it, with no part
    /// index.
    pub fn check_page(&self, page: &Page) -> Result<Vec<PageWarning>, ComposeError> {
        let mut found = Vec::new();
        let mut referenced = BTreeSet::new();

        for (index, part) in page.parts.iter().enumerate() {
            let params = page.params.merged(part.params());
            let (warnings, used) =
                self.check_part(part, &params)
                    .map_err(|e| ComposeError::Part {
                        index,
                        source: Box::new(e),
                    })?;

            let part_warnings = warnings.into_iter().chain(
                part.params()
                    .iter()
                    .filter(|(name, _)| !used.contains(*name))
                    .map(|(name, _)| lint::unused(name)),
            );
            found.extend(part_warnings.map(|warning| PageWarning {
                part: Some(index),
                warning,
            }));
            referenced.extend(used);
        }

        for (name, _) in page.params.iter() {
            if !referenced.contains(name) {
                found.push(PageWarning {
                    part: None,
                    warning: lint::unused(name),
                });
            }
        }
        Ok(found)
    }

    fn check_part(
        &self,
        part: &PagePart,
        params: &ParameterSet,
    ) -> Result<(Vec<LintWarning>, BTreeSet<String>), ComposeError> {
        match part {
            PagePart::Inline { source, .. } => {
                let fragment = self.resolve_source(source)?;
                Ok(lint::check_usage(&fragment, params))
            }
            PagePart::Fragment { name, .. } => {
                // Wrap the body so warnings name the fragment they point into
                let resolved = self.resolve_named(name)?;
                let scope = Node::Scope(ScopeBlock {
                    fragment: name.clone(),
                    bindings: Vec::new(),
                    nodes: Arc::new(resolved.nodes),
                });
                let wrapped = Fragment::new(vec![Spanned::new(scope, 0..0)]);
                Ok(lint::check_usage(&wrapped, params))
            }
        }
    }

    /// Format an error, showing render errors from included fragments
    /// against the fragment's own source
    ///
    /// `source` and `filename` describe the fragment that was composed. For
    /// page errors the failing part is reported by index.
    pub fn format_error(&self, err: &ComposeError, source: &str, filename: &str) -> String {
        match err {
            ComposeError::Render(e) => match e.origin().0.and_then(|name| self.registry.get(name)) {
                Some(def) => e.format(&def.source, &display_name(def)),
                None => err.format(source, filename),
            },
            ComposeError::Part { index, source: inner } => match inner.as_ref() {
                ComposeError::Render(e) if e.origin().0.is_some() => {
                    format!("page part {}:\n{}", index, self.format_error(inner, "", ""))
                }
                _ => err.to_string(),
            },
            other => other.format(source, filename),
        }
    }

    /// Source text and display name of the fragment a lint warning points into
    ///
    /// Falls back to `source` and `filename` for warnings about the checked
    /// fragment itself.
    pub fn warning_source<'a>(
        &'a self,
        warning: &LintWarning,
        source: &'a str,
        filename: &str,
    ) -> (&'a str, String) {
        match warning.fragment.as_deref().and_then(|name| self.registry.get(name)) {
            Some(def) => (def.source.as_str(), display_name(def)),
            None => (source, filename.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_placeholder() {
        let params = ParameterSet::new().with("name", "Bitfinex");
        let html = render("<b>{{name}}</b> and {{name}}", &params).unwrap();
        insta::assert_snapshot!(html, @"<b>Bitfinex</b> and Bitfinex");
    }

    #[test]
    fn test_render_missing_parameter() {
        let result = render("<p>{{name}}</p>", &ParameterSet::new());
        match result {
            Err(ComposeError::Render(RenderError::MissingParameter { name, span })) => {
                assert_eq!(name, "name");
                assert_eq!(span, 5..9);
            }
            other => panic!("Expected missing parameter, got {:?}", other),
        }
    }

    #[test]
    fn test_render_malformed() {
        let result = render("{{#if a}}open", &ParameterSet::new());
        assert!(matches!(result, Err(ComposeError::Malformed(_))));
    }

    #[test]
    fn test_render_include_without_registry() {
        let result = render("{{> settlements}}", &ParameterSet::new());
        assert!(matches!(
            result,
            Err(ComposeError::Render(RenderError::UnresolvedInclude { .. }))
        ));
    }

    #[test]
    fn test_format_malformed_has_context() {
        let source = "<p>{{name</p>";
        let err = render(source, &ParameterSet::new()).unwrap_err();
        let formatted = err.format(source, "page.html");
        assert!(formatted.contains("page.html"));
        assert!(formatted.contains("never closed"));
    }

    #[test]
    fn test_composer_include_bindings_override() {
        let mut composer = Composer::new();
        composer
            .registry_mut()
            .register_source("greeting", "Hello {{who}}")
            .unwrap();

        let params = ParameterSet::new().with("who", "caller");
        let html = composer
            .compose("{{> greeting}} / {{> greeting who=\"binding\"}}", &params)
            .unwrap();
        assert_eq!(html, "Hello caller / Hello binding");
    }

    #[test]
    fn test_composer_render_named_missing() {
        let composer = Composer::new();
        let result = composer.render_named("nowhere", &ParameterSet::new());
        assert!(matches!(
            result,
            Err(ComposeError::Template(TemplateError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_compose_page_part_error_index() {
        let page = Page::from_str(
            "[[parts]]\ntext = \"ok\"\n\n[[parts]]\ntext = \"{{absent}}\"\n",
        )
        .unwrap();
        let result = Composer::new().compose_page(&page);
        match result {
            Err(ComposeError::Part { index, source }) => {
                assert_eq!(index, 1);
                assert!(matches!(*source, ComposeError::Render(_)));
            }
            other => panic!("Expected part error, got {:?}", other),
        }
    }

    fn settlements_composer() -> Composer {
        let mut composer = Composer::new();
        composer
            .registry_mut()
            .register_source("settlements", "<p>{{settlement}}</p>")
            .unwrap();
        composer
    }

    #[test]
    fn test_format_error_uses_included_fragment_source() {
        let composer = settlements_composer();
        let source = "<div>{{> settlements}}</div>";
        let err = composer.compose(source, &ParameterSet::new()).unwrap_err();

        match &err {
            ComposeError::Render(e) => {
                assert_eq!(e.origin().0, Some("settlements"));
                assert_eq!(&"<p>{{settlement}}</p>"[e.span().clone()], "settlement");
            }
            other => panic!("Expected render error, got {:?}", other),
        }

        let formatted = composer.format_error(&err, source, "page.html");
        assert!(formatted.contains("settlements"));
        assert!(formatted.contains("missing parameter 'settlement'"));
        assert!(!formatted.contains("page.html"));

        // Without the registry there is no source to point into
        let plain = err.format(source, "page.html");
        assert!(!plain.contains("page.html"));
        assert!(plain.contains("in fragment 'settlements'"));
    }

    #[test]
    fn test_check_names_included_fragment() {
        let composer = settlements_composer();
        let source = "{{name}}{{> settlements}}";
        let params = ParameterSet::new().with("name", "Kraken");
        let warnings = composer.check(source, &params).unwrap();

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].category, LintCategory::Missing);
        assert_eq!(warnings[0].fragment.as_deref(), Some("settlements"));

        let (text, name) = composer.warning_source(&warnings[0], source, "page.html");
        assert_eq!(name, "settlements");
        assert_eq!(&text[warnings[0].span.clone().unwrap()], "settlement");
    }

    #[test]
    fn test_check_page_reports_parts() {
        let composer = settlements_composer();
        let page = Page::from_str(
            r#"
[params]
name = "Kraken"
extra = "never used"

[[parts]]
text = "{{name}}{{> settlements}}"

[[parts]]
fragment = "settlements"
[parts.params]
settlement = "T+0"
stray = "z"
"#,
        )
        .unwrap();

        let found: Vec<_> = composer
            .check_page(&page)
            .unwrap()
            .into_iter()
            .map(|w| (w.part, w.warning.category, w.warning.fragment, w.warning.message))
            .collect();
        assert_eq!(
            found,
            vec![
                (
                    Some(0),
                    LintCategory::Missing,
                    Some("settlements".to_string()),
                    "parameter 'settlement' is referenced but not supplied".to_string()
                ),
                (
                    Some(1),
                    LintCategory::Unused,
                    None,
                    "parameter 'stray' is never referenced".to_string()
                ),
                (
                    None,
                    LintCategory::Unused,
                    None,
                    "parameter 'extra' is never referenced".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_check_page_malformed_part_index() {
        let page = Page::from_str("[[parts]]\ntext = \"ok\"\n\n[[parts]]\ntext = \"{{#if a}}\"\n").unwrap();
        match Composer::new().check_page(&page) {
            Err(ComposeError::Part { index, source }) => {
                assert_eq!(index, 1);
                assert!(matches!(*source, ComposeError::Malformed(_)));
            }
            other => panic!("Expected part error, got {:?}", other),
        }
    }

    #[test]
    fn test_compose_page_part_params_override() {
        let page = Page::from_str(
            r#"
[params]
name = "page"

[[parts]]
text = "{{name}}|"

[[parts]]
text = "{{name}}"
[parts.params]
name = "part"
"#,
        )
        .unwrap();
        let html = Composer::new().compose_page(&page).unwrap();
        assert_eq!(html, "page|part");
    }
}
