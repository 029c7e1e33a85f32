//! Error types for rendering

use thiserror::Error;

use crate::parser::ast::Span;

/// Errors that can occur while rendering a fragment
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    /// A placeholder, condition or list names a parameter that was not supplied
    #[error("missing parameter '{name}'")]
    MissingParameter { name: String, span: Span },

    /// A parameter is used in a way its type does not allow
    #[error("parameter '{name}' is a {found}, expected a {expected}")]
    InvalidParameterType {
        name: String,
        expected: String,
        found: String,
        span: Span,
    },

    /// An include reached the renderer without being resolved
    #[error("include '{name}' was not resolved (no fragment registry consulted)")]
    UnresolvedInclude { name: String, span: Span },

    /// Error raised inside an included fragment; spans refer to that fragment
    #[error("in fragment '{fragment}': {error}")]
    Included {
        fragment: String,
        error: Box<RenderError>,
    },
}

impl RenderError {
    /// Create a missing parameter error
    pub fn missing(name: impl Into<String>, span: Span) -> Self {
        Self::MissingParameter {
            name: name.into(),
            span,
        }
    }

    /// Create an invalid parameter type error
    pub fn invalid_type(
        name: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::InvalidParameterType {
            name: name.into(),
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    /// Wrap an error raised while rendering the body of `fragment`
    pub fn within(self, fragment: impl Into<String>) -> Self {
        Self::Included {
            fragment: fragment.into(),
            error: Box::new(self),
        }
    }

    /// The innermost included fragment the error comes from, if any, and the
    /// underlying error
    pub fn origin(&self) -> (Option<&str>, &RenderError) {
        let mut fragment = None;
        let mut current = self;
        while let RenderError::Included { fragment: name, error } = current {
            fragment = Some(name.as_str());
            current = error.as_ref();
        }
        (fragment, current)
    }

    /// Source location of the offending tag, within the fragment named by
    /// [`RenderError::origin`]
    pub fn span(&self) -> &Span {
        match self.origin().1 {
            RenderError::MissingParameter { span, .. }
            | RenderError::InvalidParameterType { span, .. }
            | RenderError::UnresolvedInclude { span, .. } => span,
            RenderError::Included { error, .. } => error.span(),
        }
    }

    /// Format the error with source context using ariadne
    ///
    /// `source` must be the text of the fragment the error comes from. For
    /// errors inside includes, see [`RenderError::origin`].
    pub fn format(&self, source: &str, filename: &str) -> String {
        let leaf = self.origin().1;
        let message = self.to_string();
        let label = leaf.to_string();
        crate::error::report(source, filename, leaf.span().clone(), &message, &label)
    }
}
