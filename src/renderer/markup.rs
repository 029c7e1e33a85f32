//! Markup generation from the template model

use std::borrow::Cow;

use crate::params::{ParameterSet, Value};
use crate::parser::ast::{Binding, Fragment, Node, Spanned};

use super::{OutputConfig, RenderError};

/// Render a fragment against a parameter set
///
/// Rendering is a pure function of its inputs. On error nothing is returned,
/// so callers never see partial output.
pub fn render_fragment(
    fragment: &Fragment,
    params: &ParameterSet,
    config: &OutputConfig,
) -> Result<String, RenderError> {
    tracing::debug!(
        nodes = fragment.nodes.len(),
        params = params.len(),
        "rendering fragment"
    );

    let mut builder = MarkupBuilder::new(params, config);
    builder.render_nodes(&fragment.nodes)?;
    Ok(builder.finish())
}

/// Names bound by an enclosing block
enum Frame<'a> {
    /// One iteration of `#each`
    Loop {
        item: &'a str,
        index: usize,
        len: usize,
    },
    /// Literal bindings of an expanded include
    Bindings(&'a [Binding]),
}

/// Build markup incrementally
struct MarkupBuilder<'a> {
    params: &'a ParameterSet,
    config: &'a OutputConfig,
    frames: Vec<Frame<'a>>,
    out: String,
}

impl<'a> MarkupBuilder<'a> {
    fn new(params: &'a ParameterSet, config: &'a OutputConfig) -> Self {
        Self {
            params,
            config,
            frames: Vec::new(),
            out: String::new(),
        }
    }

    /// Look a name up in the enclosing blocks, innermost first, then in the
    /// parameter set
    fn lookup(&self, name: &str) -> Option<Cow<'a, Value>> {
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Loop { item, index, len } => match name {
                    "this" => return Some(Cow::Owned(Value::Str(item.to_string()))),
                    "@index" => return Some(Cow::Owned(Value::Str(index.to_string()))),
                    "@first" => return Some(Cow::Owned(Value::Bool(*index == 0))),
                    "@last" => return Some(Cow::Owned(Value::Bool(index + 1 == *len))),
                    _ => {}
                },
                Frame::Bindings(bindings) => {
                    if let Some(b) = bindings.iter().find(|b| b.name.node.as_str() == name) {
                        return Some(Cow::Owned(Value::Str(b.value.node.clone())));
                    }
                }
            }
        }
        self.params.get(name).map(Cow::Borrowed)
    }

    fn render_nodes(&mut self, nodes: &'a [Spanned<Node>]) -> Result<(), RenderError> {
        for node in nodes {
            self.render_node(node)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &'a Spanned<Node>) -> Result<(), RenderError> {
        match &node.node {
            Node::Text(text) => self.out.push_str(text),

            Node::Placeholder(p) => {
                let name = p.name.node.as_str();
                match self.lookup(name) {
                    Some(value) => match value.as_ref() {
                        Value::Str(s) => self.push_value(s),
                        other => {
                            return Err(RenderError::invalid_type(
                                name,
                                "string",
                                other.kind(),
                                p.name.span.clone(),
                            ))
                        }
                    },
                    None => match &p.default {
                        Some(default) => self.push_value(&default.node),
                        None => return Err(RenderError::missing(name, p.name.span.clone())),
                    },
                }
            }

            Node::Conditional(c) => {
                let name = c.condition.node.as_str();
                let value = self
                    .lookup(name)
                    .ok_or_else(|| RenderError::missing(name, c.condition.span.clone()))?;
                let branch = if value.is_truthy() != c.negated {
                    &c.then_branch
                } else {
                    &c.else_branch
                };
                self.render_nodes(branch)?;
            }

            Node::Each(e) => {
                let name = e.list.node.as_str();
                let value = self
                    .lookup(name)
                    .ok_or_else(|| RenderError::missing(name, e.list.span.clone()))?;
                let items: &'a [String] = match value {
                    Cow::Borrowed(Value::List(items)) => items.as_slice(),
                    other => {
                        return Err(RenderError::invalid_type(
                            name,
                            "list",
                            other.kind(),
                            e.list.span.clone(),
                        ))
                    }
                };

                if items.is_empty() {
                    self.render_nodes(&e.empty_branch)?;
                } else {
                    for (index, item) in items.iter().enumerate() {
                        self.frames.push(Frame::Loop {
                            item: item.as_str(),
                            index,
                            len: items.len(),
                        });
                        let result = self.render_nodes(&e.body);
                        self.frames.pop();
                        result?;
                    }
                }
            }

            Node::Include(inc) => {
                return Err(RenderError::UnresolvedInclude {
                    name: inc.fragment.node.clone(),
                    span: node.span.clone(),
                })
            }

            Node::Scope(scope) => {
                self.frames.push(Frame::Bindings(&scope.bindings));
                let result = self.render_nodes(&scope.nodes);
                self.frames.pop();
                result.map_err(|e| e.within(scope.fragment.as_str()))?;
            }
        }
        Ok(())
    }

    fn push_value(&mut self, value: &str) {
        if self.config.escape_html {
            self.out.push_str(&escape_html(value));
        } else {
            self.out.push_str(value);
        }
    }

    fn finish(self) -> String {
        if self.config.collapse_blank_lines {
            collapse_blank_lines(&self.out)
        } else {
            self.out
        }
    }
}

/// Escape the characters that are significant in HTML text and attributes
pub fn escape_html(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// Keep at most one blank line in a row
fn collapse_blank_lines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_blank = false;
    for line in s.split_inclusive('\n') {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        if blank {
            if line.ends_with('\n') {
                out.push('\n');
            }
        } else {
            out.push_str(line);
        }
        previous_blank = blank;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn render(source: &str, params: &ParameterSet) -> Result<String, RenderError> {
        let frag = parse(source).expect("Should parse");
        render_fragment(&frag, params, &OutputConfig::default())
    }

    #[test]
    fn test_text_passthrough() {
        let out = render("<p>Trades settle immediately.</p>", &ParameterSet::new()).unwrap();
        assert_eq!(out, "<p>Trades settle immediately.</p>");
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let params = ParameterSet::new().with("name", "Bitfinex");
        let out = render("{{name}} and {{ name }}: <b>{{name}}</b>", &params).unwrap();
        assert_eq!(out, "Bitfinex and Bitfinex: <b>Bitfinex</b>");
    }

    #[test]
    fn test_missing_parameter() {
        let err = render("<p>{{missing}}</p>", &ParameterSet::new()).unwrap_err();
        assert_eq!(err, RenderError::missing("missing", 5..12));
    }

    #[test]
    fn test_default_used_only_when_absent() {
        let source = r#"Data provider: {{data_provider | "QuantConnect"}}"#;
        assert_eq!(
            render(source, &ParameterSet::new()).unwrap(),
            "Data provider: QuantConnect"
        );
        let params = ParameterSet::new().with("data_provider", "Polygon");
        assert_eq!(render(source, &params).unwrap(), "Data provider: Polygon");
    }

    #[test]
    fn test_conditional_true_and_false() {
        let source = "a{{#if cash}}[cash]{{/if}}b";
        let on = ParameterSet::new().with("cash", true);
        let off = ParameterSet::new().with("cash", false);
        assert_eq!(render(source, &on).unwrap(), "a[cash]b");
        assert_eq!(render(source, &off).unwrap(), "ab");
    }

    #[test]
    fn test_conditional_else_and_unless() {
        let source = "{{#if ok}}yes{{else}}no{{/if}}/{{#unless ok}}off{{else}}on{{/unless}}";
        let on = ParameterSet::new().with("ok", true);
        let off = ParameterSet::new().with("ok", false);
        assert_eq!(render(source, &on).unwrap(), "yes/on");
        assert_eq!(render(source, &off).unwrap(), "no/off");
    }

    #[test]
    fn test_condition_on_string_uses_truthiness() {
        let source = "{{#if details}}{{details}}{{else}}none{{/if}}";
        let empty = ParameterSet::new().with("details", "");
        let full = ParameterSet::new().with("details", "<li>Enter your API key.</li>");
        assert_eq!(render(source, &empty).unwrap(), "none");
        assert_eq!(render(source, &full).unwrap(), "<li>Enter your API key.</li>");
    }

    #[test]
    fn test_untaken_branch_may_reference_missing() {
        let source = "{{#if is_supported}}{{brokerage_details}}{{else}}unsupported{{/if}}";
        let params = ParameterSet::new().with("is_supported", false);
        assert_eq!(render(source, &params).unwrap(), "unsupported");
    }

    #[test]
    fn test_missing_condition() {
        let err = render("{{#if flag}}x{{/if}}", &ParameterSet::new()).unwrap_err();
        assert!(matches!(err, RenderError::MissingParameter { ref name, .. } if name == "flag"));
    }

    #[test]
    fn test_each_with_locals() {
        let source = "{{#each markets}}{{@index}}:{{this}}{{#unless @last}}, {{/unless}}{{/each}}";
        let params = ParameterSet::new().with("markets", vec!["spot", "margin", "futures"]);
        assert_eq!(render(source, &params).unwrap(), "0:spot, 1:margin, 2:futures");
    }

    #[test]
    fn test_each_first() {
        let source = "{{#each xs}}{{#if @first}}<ul>{{/if}}<li>{{this}}</li>{{/each}}";
        let params = ParameterSet::new().with("xs", vec!["a", "b"]);
        assert_eq!(render(source, &params).unwrap(), "<ul><li>a</li><li>b</li>");
    }

    #[test]
    fn test_each_empty_branch() {
        let source = "{{#each xs}}{{this}}{{else}}No markets.{{/each}}";
        let params = ParameterSet::new().with("xs", Vec::<String>::new());
        assert_eq!(render(source, &params).unwrap(), "No markets.");
    }

    #[test]
    fn test_each_outer_parameters_visible() {
        let source = "{{#each xs}}{{brokerage}}-{{this}};{{/each}}";
        let params = ParameterSet::new()
            .with("brokerage", "Bybit")
            .with("xs", vec!["spot", "futures"]);
        assert_eq!(render(source, &params).unwrap(), "Bybit-spot;Bybit-futures;");
    }

    #[test]
    fn test_nested_each_shadows_this() {
        let source = "{{#each a}}{{#each b}}{{this}}{{/each}}|{{this}} {{/each}}";
        let params = ParameterSet::new()
            .with("a", vec!["x", "y"])
            .with("b", vec!["1", "2"]);
        assert_eq!(render(source, &params).unwrap(), "12|x 12|y ");
    }

    #[test]
    fn test_placeholder_of_wrong_type() {
        let params = ParameterSet::new().with("flag", true);
        let err = render("{{flag}}", &params).unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidParameterType { ref expected, ref found, .. }
                if expected == "string" && found == "boolean"
        ));
    }

    #[test]
    fn test_each_of_wrong_type() {
        let params = ParameterSet::new().with("xs", "not a list");
        let err = render("{{#each xs}}{{this}}{{/each}}", &params).unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameterType { .. }));
    }

    #[test]
    fn test_loop_local_outside_loop_is_missing() {
        let err = render("{{this}}", &ParameterSet::new()).unwrap_err();
        assert!(matches!(err, RenderError::MissingParameter { .. }));
    }

    #[test]
    fn test_error_inside_scope_names_fragment() {
        use crate::parser::ast::ScopeBlock;
        use std::sync::Arc;

        let inner = parse("<p>{{settlement}}</p>").unwrap();
        let frag = Fragment::new(vec![Spanned::new(
            Node::Scope(ScopeBlock {
                fragment: "settlements".to_string(),
                bindings: Vec::new(),
                nodes: Arc::new(inner.nodes),
            }),
            0..17,
        )]);

        let err = render_fragment(&frag, &ParameterSet::new(), &OutputConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::missing("settlement", 5..15).within("settlements")
        );
    }

    #[test]
    fn test_unresolved_include() {
        let err = render("{{> settlements}}", &ParameterSet::new()).unwrap_err();
        assert!(matches!(err, RenderError::UnresolvedInclude { ref name, .. } if name == "settlements"));
    }

    #[test]
    fn test_escape_html() {
        let frag = parse("<td>{{v}}</td>").unwrap();
        let params = ParameterSet::new().with("v", "<b>\"Q&A\"</b>");
        let config = OutputConfig::new().with_escape_html(true);
        let out = render_fragment(&frag, &params, &config).unwrap();
        assert_eq!(out, "<td>&lt;b&gt;&quot;Q&amp;A&quot;&lt;/b&gt;</td>");
    }

    #[test]
    fn test_escape_html_borrowed_when_clean() {
        assert!(matches!(escape_html("Kraken"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_collapse_blank_lines() {
        let source = "<ol>\n{{#if a}}\n<li>a</li>\n{{/if}}\n\n{{#if b}}\n<li>b</li>\n{{/if}}\n</ol>\n";
        let frag = parse(source).unwrap();
        let params = ParameterSet::new().with("a", false).with("b", false);
        let config = OutputConfig::new().with_collapse_blank_lines(true);
        let out = render_fragment(&frag, &params, &config).unwrap();
        assert_eq!(out, "<ol>\n\n</ol>\n");
    }

    #[test]
    fn test_render_is_deterministic() {
        let source = "{{#each xs}}{{this}}{{/each}}{{#if f}}{{n}}{{/if}}";
        let params = ParameterSet::new()
            .with("xs", vec!["a", "b"])
            .with("f", true)
            .with("n", "N");
        let first = render(source, &params).unwrap();
        let second = render(source, &params).unwrap();
        assert_eq!(first, second);
    }
}
