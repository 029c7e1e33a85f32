//! Include resolution - expands include references into scoped fragment bodies

use std::collections::HashMap;
use std::sync::Arc;

use crate::parser::ast::{
    Conditional, EachBlock, Fragment, IncludeDecl, Node, ScopeBlock, Spanned,
};

use super::registry::{FragmentRegistry, TemplateError};

/// Context for include resolution
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    /// Fragments currently being expanded, outermost first
    pub resolving: Vec<String>,
    /// Expanded bodies, reused by later includes of the same fragment
    resolved: HashMap<String, Arc<Vec<Spanned<Node>>>>,
}

impl ResolutionContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context for a fragment that is itself registered under `name`
    ///
    /// An include of `name` from inside it is then reported as circular.
    pub fn for_fragment(name: impl Into<String>) -> Self {
        Self {
            resolving: vec![name.into()],
            resolved: HashMap::new(),
        }
    }

    /// Check if a fragment is currently being expanded (cycle detection)
    pub fn is_resolving(&self, name: &str) -> bool {
        self.resolving.iter().any(|n| n == name)
    }

    /// Mark a fragment as being expanded
    pub fn start_resolving(&mut self, name: &str) {
        self.resolving.push(name.to_string());
    }

    /// Mark a fragment as done
    pub fn done_resolving(&mut self) {
        self.resolving.pop();
    }

    /// Include chain ending in `name`, as `a -> b -> a`
    fn chain_to(&self, name: &str) -> String {
        let mut chain = self.resolving.clone();
        chain.push(name.to_string());
        chain.join(" -> ")
    }
}

/// Replace every include in a fragment with the referenced fragment's nodes
///
/// Includes inside conditional and repeated blocks are expanded too, whether
/// or not the block would be rendered. The result contains no
/// [`Node::Include`] nodes.
pub fn resolve_includes(
    fragment: &Fragment,
    registry: &FragmentRegistry,
) -> Result<Fragment, TemplateError> {
    let mut ctx = ResolutionContext::new();
    resolve_with_context(fragment, registry, &mut ctx)
}

/// Resolve includes with an explicit context
pub fn resolve_with_context(
    fragment: &Fragment,
    registry: &FragmentRegistry,
    ctx: &mut ResolutionContext,
) -> Result<Fragment, TemplateError> {
    Ok(Fragment::new(resolve_nodes(&fragment.nodes, registry, ctx)?))
}

fn resolve_nodes(
    nodes: &[Spanned<Node>],
    registry: &FragmentRegistry,
    ctx: &mut ResolutionContext,
) -> Result<Vec<Spanned<Node>>, TemplateError> {
    nodes
        .iter()
        .map(|node| resolve_node(node, registry, ctx))
        .collect()
}

fn resolve_node(
    node: &Spanned<Node>,
    registry: &FragmentRegistry,
    ctx: &mut ResolutionContext,
) -> Result<Spanned<Node>, TemplateError> {
    let resolved = match &node.node {
        Node::Include(inc) => Node::Scope(resolve_include(inc, registry, ctx)?),
        Node::Conditional(c) => Node::Conditional(Conditional {
            condition: c.condition.clone(),
            negated: c.negated,
            then_branch: resolve_nodes(&c.then_branch, registry, ctx)?,
            else_branch: resolve_nodes(&c.else_branch, registry, ctx)?,
        }),
        Node::Each(e) => Node::Each(EachBlock {
            list: e.list.clone(),
            body: resolve_nodes(&e.body, registry, ctx)?,
            empty_branch: resolve_nodes(&e.empty_branch, registry, ctx)?,
        }),
        Node::Scope(s) => Node::Scope(ScopeBlock {
            fragment: s.fragment.clone(),
            bindings: s.bindings.clone(),
            nodes: Arc::new(resolve_nodes(&s.nodes, registry, ctx)?),
        }),
        Node::Text(_) | Node::Placeholder(_) => node.node.clone(),
    };
    Ok(Spanned::new(resolved, node.span.clone()))
}

/// Expand a single include into a scope block
fn resolve_include(
    inc: &IncludeDecl,
    registry: &FragmentRegistry,
    ctx: &mut ResolutionContext,
) -> Result<ScopeBlock, TemplateError> {
    let name = inc.fragment.node.as_str();

    if ctx.is_resolving(name) {
        return Err(TemplateError::CircularInclude {
            chain: ctx.chain_to(name),
        });
    }

    // A cached body was fully expanded once, so it holds no cycle
    let nodes = match ctx.resolved.get(name) {
        Some(nodes) => Arc::clone(nodes),
        None => {
            let def = registry.get(name).ok_or_else(|| TemplateError::NotFound {
                name: name.to_string(),
            })?;

            tracing::debug!(fragment = name, depth = ctx.resolving.len(), "expanding include");

            ctx.start_resolving(name);
            let nodes = resolve_nodes(&def.fragment.nodes, registry, ctx);
            ctx.done_resolving();

            let nodes = Arc::new(nodes?);
            ctx.resolved.insert(name.to_string(), Arc::clone(&nodes));
            nodes
        }
    };

    Ok(ScopeBlock {
        fragment: name.to_string(),
        bindings: inc.bindings.clone(),
        nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn registry_with(entries: &[(&str, &str)]) -> FragmentRegistry {
        let mut registry = FragmentRegistry::new();
        for (name, source) in entries {
            registry
                .register_source(*name, *source)
                .expect("Should register");
        }
        registry
    }

    #[test]
    fn test_resolution_context_chain() {
        let mut ctx = ResolutionContext::new();
        assert!(!ctx.is_resolving("a"));

        ctx.start_resolving("a");
        ctx.start_resolving("b");
        assert!(ctx.is_resolving("a"));
        assert_eq!(ctx.chain_to("a"), "a -> b -> a");

        ctx.done_resolving();
        assert!(!ctx.is_resolving("b"));
    }

    #[test]
    fn test_include_becomes_scope() {
        let registry = registry_with(&[("settlements", "<p>{{settlement}}</p>")]);
        let frag = parse("<div>{{> settlements settlement=\"T+0\"}}</div>").unwrap();

        let resolved = resolve_includes(&frag, &registry).expect("Should resolve");
        assert!(resolved.includes().is_empty());
        match &resolved.nodes[1].node {
            Node::Scope(scope) => {
                assert_eq!(scope.fragment, "settlements");
                assert_eq!(scope.bindings.len(), 1);
                assert_eq!(scope.nodes.len(), 3);
            }
            other => panic!("Expected scope, got {:?}", other),
        }
    }

    #[test]
    fn test_include_inside_untaken_branch_is_still_resolved() {
        let registry = registry_with(&[("note", "<em>note</em>")]);
        let frag = parse("{{#if show}}{{> note}}{{/if}}").unwrap();

        let resolved = resolve_includes(&frag, &registry).expect("Should resolve");
        assert!(resolved.includes().is_empty());
    }

    #[test]
    fn test_nested_includes() {
        let registry = registry_with(&[
            ("outer", "[{{> inner}}]"),
            ("inner", "inner"),
        ]);
        let frag = parse("{{> outer}}").unwrap();
        let resolved = resolve_includes(&frag, &registry).expect("Should resolve");
        assert!(resolved.includes().is_empty());
    }

    #[test]
    fn test_missing_fragment() {
        let registry = FragmentRegistry::new();
        let frag = parse("{{> nowhere}}").unwrap();
        let result = resolve_includes(&frag, &registry);
        assert!(matches!(
            result,
            Err(TemplateError::NotFound { ref name }) if name == "nowhere"
        ));
    }

    #[test]
    fn test_circular_include() {
        let registry = registry_with(&[("a", "{{> b}}"), ("b", "{{> a}}")]);
        let frag = parse("{{> a}}").unwrap();

        match resolve_includes(&frag, &registry) {
            Err(TemplateError::CircularInclude { chain }) => assert_eq!(chain, "a -> b -> a"),
            other => panic!("Expected circular include, got {:?}", other),
        }
    }

    #[test]
    fn test_self_include_from_registered_fragment() {
        let registry = registry_with(&[("loop", "x{{> loop}}")]);
        let def = registry.get("loop").unwrap();
        let mut ctx = ResolutionContext::for_fragment("loop");

        let result = resolve_with_context(&def.fragment, &registry, &mut ctx);
        assert!(matches!(result, Err(TemplateError::CircularInclude { .. })));
    }

    #[test]
    fn test_repeated_includes_share_one_body() {
        // Each level includes the next twice; bodies must not be copied per include
        let mut entries = Vec::new();
        for level in 0..24 {
            entries.push((
                format!("level{}", level),
                format!("{{{{> level{next}}}}}{{{{> level{next}}}}}", next = level + 1),
            ));
        }
        entries.push(("level24".to_string(), "leaf".to_string()));

        let mut registry = FragmentRegistry::new();
        for (name, source) in &entries {
            registry.register_source(name.as_str(), source.as_str()).unwrap();
        }

        let frag = parse("{{> level0}}").unwrap();
        let resolved = resolve_includes(&frag, &registry).expect("Should resolve");
        match &resolved.nodes[0].node {
            Node::Scope(top) => match (&top.nodes[0].node, &top.nodes[1].node) {
                (Node::Scope(a), Node::Scope(b)) => assert!(Arc::ptr_eq(&a.nodes, &b.nodes)),
                other => panic!("Expected two scopes, got {:?}", other),
            },
            other => panic!("Expected scope, got {:?}", other),
        }
    }

    #[test]
    fn test_cached_fragment_still_detects_cycle() {
        let registry = registry_with(&[("a", "{{> b}}{{> b}}"), ("b", "{{> c}}"), ("c", "{{> b}}")]);
        let frag = parse("{{> a}}").unwrap();
        match resolve_includes(&frag, &registry) {
            Err(TemplateError::CircularInclude { chain }) => assert_eq!(chain, "a -> b -> c -> b"),
            other => panic!("Expected circular include, got {:?}", other),
        }
    }

    #[test]
    fn test_same_fragment_twice_is_not_circular() {
        let registry = registry_with(&[("sep", "<hr>")]);
        let frag = parse("{{> sep}}a{{> sep}}").unwrap();
        assert!(resolve_includes(&frag, &registry).is_ok());
    }
}
