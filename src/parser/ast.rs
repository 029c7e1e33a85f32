//! Template model for fragments
//!
//! A fragment is a flat list of nodes; block nodes own their children. The
//! model carries no executable code, so placeholder usage can be inspected
//! before anything is rendered.

use std::collections::BTreeSet;
use std::sync::Arc;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Parameter name (letters, digits, `_` and `-`; loop locals start with `@`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Names bound by an enclosing `#each` rather than by the parameter set
    pub fn is_loop_local(&self) -> bool {
        self.0 == "this" || self.0.starts_with('@')
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root node - a parsed fragment
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pub nodes: Vec<Spanned<Node>>,
}

/// A single template node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal markup, copied verbatim
    Text(String),
    /// `{{name}}` or `{{name | "default"}}`
    Placeholder(Placeholder),
    /// `{{#if flag}} ... {{else}} ... {{/if}}` and `#unless`
    Conditional(Conditional),
    /// `{{#each items}} ... {{else}} ... {{/each}}`
    Each(EachBlock),
    /// `{{> name key="value"}}`, replaced by `Scope` once resolved
    Include(IncludeDecl),
    /// An expanded include: the included nodes plus the include's bindings
    Scope(ScopeBlock),
}

/// Named slot replaced by a parameter value
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub name: Spanned<Identifier>,
    pub default: Option<Spanned<String>>,
}

/// Block included or omitted depending on a parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Spanned<Identifier>,
    /// True for `#unless`
    pub negated: bool,
    pub then_branch: Vec<Spanned<Node>>,
    pub else_branch: Vec<Spanned<Node>>,
}

/// Block repeated once per list item
#[derive(Debug, Clone, PartialEq)]
pub struct EachBlock {
    pub list: Spanned<Identifier>,
    pub body: Vec<Spanned<Node>>,
    /// Rendered instead of the body when the list is empty
    pub empty_branch: Vec<Spanned<Node>>,
}

/// Reference to another registered fragment
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDecl {
    pub fragment: Spanned<String>,
    pub bindings: Vec<Binding>,
}

/// Literal string parameter attached to an include
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: Spanned<Identifier>,
    pub value: Spanned<String>,
}

/// Included fragment body with its bindings layered over the caller's parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeBlock {
    pub fragment: String,
    pub bindings: Vec<Binding>,
    /// Shared between every include of the same fragment
    pub nodes: Arc<Vec<Spanned<Node>>>,
}

impl Fragment {
    /// Create a fragment from nodes
    pub fn new(nodes: Vec<Spanned<Node>>) -> Self {
        Self { nodes }
    }

    /// Append another fragment's nodes after this one's
    pub fn concat(mut self, other: Fragment) -> Self {
        self.nodes.extend(other.nodes);
        self
    }

    /// True when the fragment has no tags at all
    pub fn is_static(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| matches!(n.node, Node::Text(_)))
    }

    /// Every parameter name the fragment refers to, in any branch
    ///
    /// Loop locals and names bound by resolved includes are not parameters
    /// and are left out.
    pub fn parameter_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_names(&self.nodes, &[], false, &mut names);
        names
    }

    /// Parameter names that must be supplied: referenced without a default
    pub fn required_parameters(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_names(&self.nodes, &[], true, &mut names);
        names
    }

    /// Names of fragments included but not yet resolved
    pub fn includes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_includes(&self.nodes, &mut out);
        out
    }
}

fn collect_names(
    nodes: &[Spanned<Node>],
    bound: &[&str],
    required_only: bool,
    names: &mut BTreeSet<String>,
) {
    let note = |id: &Identifier, names: &mut BTreeSet<String>| {
        if !id.is_loop_local() && !bound.contains(&id.as_str()) {
            names.insert(id.0.clone());
        }
    };

    for node in nodes {
        match &node.node {
            Node::Text(_) | Node::Include(_) => {}
            Node::Placeholder(p) => {
                if !(required_only && p.default.is_some()) {
                    note(&p.name.node, names);
                }
            }
            Node::Conditional(c) => {
                note(&c.condition.node, names);
                collect_names(&c.then_branch, bound, required_only, names);
                collect_names(&c.else_branch, bound, required_only, names);
            }
            Node::Each(e) => {
                note(&e.list.node, names);
                collect_names(&e.body, bound, required_only, names);
                collect_names(&e.empty_branch, bound, required_only, names);
            }
            Node::Scope(s) => {
                let mut inner: Vec<&str> = bound.to_vec();
                inner.extend(s.bindings.iter().map(|b| b.name.node.as_str()));
                collect_names(&s.nodes, &inner, required_only, names);
            }
        }
    }
}

fn collect_includes<'a>(nodes: &'a [Spanned<Node>], out: &mut Vec<&'a str>) {
    for node in nodes {
        match &node.node {
            Node::Include(inc) => out.push(inc.fragment.node.as_str()),
            Node::Conditional(c) => {
                collect_includes(&c.then_branch, out);
                collect_includes(&c.else_branch, out);
            }
            Node::Each(e) => {
                collect_includes(&e.body, out);
                collect_includes(&e.empty_branch, out);
            }
            Node::Scope(s) => collect_includes(&s.nodes, out),
            Node::Text(_) | Node::Placeholder(_) => {}
        }
    }
}
