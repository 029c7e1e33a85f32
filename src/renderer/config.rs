//! Configuration for markup output

/// Configuration options for rendered markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// HTML-escape substituted parameter values (literal text is never escaped)
    pub escape_html: bool,

    /// Collapse runs of blank lines left behind by omitted blocks into one
    pub collapse_blank_lines: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            escape_html: false,
            collapse_blank_lines: false,
        }
    }
}

impl OutputConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether substituted values are HTML-escaped
    pub fn with_escape_html(mut self, escape: bool) -> Self {
        self.escape_html = escape;
        self
    }

    /// Set whether runs of blank lines are collapsed
    pub fn with_collapse_blank_lines(mut self, collapse: bool) -> Self {
        self.collapse_blank_lines = collapse;
        self
    }
}
