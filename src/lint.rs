//! Static checks of a fragment against a parameter set.
//!
//! Unlike rendering, which only looks at the branch a condition selects,
//! the checks here walk every branch, so a parameter that is only missing
//! when a flag flips is still reported.

use std::collections::BTreeSet;
use std::fmt;

use crate::params::ParameterSet;
use crate::parser::ast::{Fragment, Identifier, Node, Span, Spanned};

/// A lint warning about a fragment/parameter mismatch
#[derive(Debug, Clone, PartialEq)]
pub struct LintWarning {
    pub category: LintCategory,
    pub message: String,
    /// Location of the offending tag; `None` for unused parameters
    pub span: Option<Span>,
    /// Included fragment the span refers to; `None` for the checked fragment itself
    pub fragment: Option<String>,
}

/// A lint warning found while checking a page
#[derive(Debug, Clone, PartialEq)]
pub struct PageWarning {
    /// Index of the part; `None` for page-wide parameters no part uses
    pub part: Option<usize>,
    pub warning: LintWarning,
}

/// Category of lint finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintCategory {
    Missing,
    Type,
    Unused,
    Include,
}

impl LintCategory {
    /// Whether a finding of this category makes rendering fail
    pub fn is_error(&self) -> bool {
        matches!(self, LintCategory::Missing | LintCategory::Type)
    }
}

impl fmt::Display for LintCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintCategory::Missing => write!(f, "missing"),
            LintCategory::Type => write!(f, "type"),
            LintCategory::Unused => write!(f, "unused"),
            LintCategory::Include => write!(f, "include"),
        }
    }
}

/// Run all checks on a fragment.
///
/// Warnings are ordered by position in the source, with unused parameters
/// last in name order.
pub fn check(fragment: &Fragment, params: &ParameterSet) -> Vec<LintWarning> {
    let (mut warnings, used) = check_usage(fragment, params);
    for (name, _) in params.iter() {
        if !used.contains(name) {
            warnings.push(unused(name));
        }
    }
    warnings
}

/// Run the tag checks only, returning the parameters the fragment references
///
/// No unused-parameter warnings are produced; callers combining several
/// fragments decide what counts as unused.
pub fn check_usage(fragment: &Fragment, params: &ParameterSet) -> (Vec<LintWarning>, BTreeSet<String>) {
    let mut checker = Checker {
        params,
        scopes: Vec::new(),
        used: BTreeSet::new(),
        warnings: Vec::new(),
    };
    checker.check_nodes(&fragment.nodes);
    let used = checker.used.iter().map(|name| name.to_string()).collect();
    (checker.warnings, used)
}

/// Warning for a supplied parameter nothing references
pub(crate) fn unused(name: &str) -> LintWarning {
    LintWarning {
        category: LintCategory::Unused,
        message: format!("parameter '{}' is never referenced", name),
        span: None,
        fragment: None,
    }
}

/// How a name is used by a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Usage {
    /// Substituted by a placeholder
    Text,
    /// Tested by `#if`/`#unless`
    Condition,
    /// Iterated by `#each`
    List,
}

impl Usage {
    fn expected(self) -> &'static str {
        match self {
            Usage::Text => "string",
            Usage::Condition => "any value",
            Usage::List => "list",
        }
    }
}

/// Kind of value a name resolves to inside a block, when the block binds it
#[derive(Debug, Clone, Copy)]
enum Bound {
    Str,
    Bool,
}

/// Names bound by an enclosing block
enum Scope<'a> {
    Loop,
    Include {
        fragment: &'a str,
        bindings: Vec<&'a str>,
    },
}

struct Checker<'a> {
    params: &'a ParameterSet,
    scopes: Vec<Scope<'a>>,
    used: BTreeSet<&'a str>,
    warnings: Vec<LintWarning>,
}

impl<'a> Checker<'a> {
    fn check_nodes(&mut self, nodes: &'a [Spanned<Node>]) {
        for node in nodes {
            self.check_node(node);
        }
    }

    fn check_node(&mut self, node: &'a Spanned<Node>) {
        match &node.node {
            Node::Text(_) => {}
            Node::Placeholder(p) => {
                self.check_use(&p.name, Usage::Text, p.default.is_some());
            }
            Node::Conditional(c) => {
                self.check_use(&c.condition, Usage::Condition, false);
                self.check_nodes(&c.then_branch);
                self.check_nodes(&c.else_branch);
            }
            Node::Each(e) => {
                self.check_use(&e.list, Usage::List, false);
                self.scopes.push(Scope::Loop);
                self.check_nodes(&e.body);
                self.scopes.pop();
                self.check_nodes(&e.empty_branch);
            }
            Node::Include(inc) => {
                self.warnings.push(LintWarning {
                    category: LintCategory::Include,
                    message: format!("include '{}' is not resolved", inc.fragment.node),
                    span: Some(node.span.clone()),
                    fragment: self.current_fragment(),
                });
            }
            Node::Scope(s) => {
                let bindings = s.bindings.iter().map(|b| b.name.node.as_str()).collect();
                self.scopes.push(Scope::Include {
                    fragment: s.fragment.as_str(),
                    bindings,
                });
                self.check_nodes(&s.nodes);
                self.scopes.pop();
            }
        }
    }

    /// Resolve a name against enclosing blocks, innermost first
    fn bound(&self, name: &str) -> Option<Bound> {
        for scope in self.scopes.iter().rev() {
            match scope {
                Scope::Loop => match name {
                    "this" | "@index" => return Some(Bound::Str),
                    "@first" | "@last" => return Some(Bound::Bool),
                    _ => {}
                },
                Scope::Include { bindings, .. } => {
                    if bindings.contains(&name) {
                        return Some(Bound::Str);
                    }
                }
            }
        }
        None
    }

    /// Innermost included fragment being checked
    fn current_fragment(&self) -> Option<String> {
        self.scopes.iter().rev().find_map(|scope| match scope {
            Scope::Include { fragment, .. } => Some(fragment.to_string()),
            Scope::Loop => None,
        })
    }

    fn check_use(&mut self, id: &'a Spanned<Identifier>, usage: Usage, has_default: bool) {
        let name = id.node.as_str();

        let found = match self.bound(name) {
            Some(Bound::Str) => Some("string"),
            Some(Bound::Bool) => Some("boolean"),
            None => match self.params.get(name) {
                Some(value) => {
                    self.used.insert(name);
                    Some(value.kind())
                }
                None => None,
            },
        };

        match found {
            None if !has_default => self.warnings.push(LintWarning {
                category: LintCategory::Missing,
                message: format!("parameter '{}' is referenced but not supplied", name),
                span: Some(id.span.clone()),
                fragment: self.current_fragment(),
            }),
            None => {}
            Some(found) if !fits(usage, found) => self.warnings.push(LintWarning {
                category: LintCategory::Type,
                message: format!(
                    "parameter '{}' is a {}, used as a {}",
                    name,
                    found,
                    usage.expected()
                ),
                span: Some(id.span.clone()),
                fragment: self.current_fragment(),
            }),
            Some(_) => {}
        }
    }
}

fn fits(usage: Usage, found: &str) -> bool {
    match usage {
        Usage::Condition => true,
        Usage::Text => found == "string",
        Usage::List => found == "list",
    }
}
