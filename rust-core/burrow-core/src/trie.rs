//! # Route Trie
//!
//! Segment trie backing the [`Router`](crate::Router).
//!
//! Nodes live in a single arena and refer to their children by index. Every
//! level keeps literal children keyed by their exact text, plus at most one
//! parameter child and at most one wildcard child. A parameter child keeps the
//! name it was first registered with, so `/users/:id` followed by
//! `/users/:slug/posts` share one node bound as `id`.
//!
//! ## Lookup precedence
//!
//! At each level a literal child is tried first, then the parameter child,
//! then the wildcard child. A parameter binding only survives if the whole
//! remaining path matched below it.

use crate::route::{SegmentKind, WILDCARD_PARAM};
use crate::router::Method;
use std::collections::HashMap;

/// Index of a node in the trie arena
pub type NodeId = usize;

const ROOT: NodeId = 0;

/// One path segment level
#[derive(Debug, Clone)]
pub struct Node<H, M> {
    /// Literal registration text of this level (`""` for the root)
    segment: String,
    kind: SegmentKind,
    literals: HashMap<String, NodeId>,
    param: Option<NodeId>,
    wildcard: Option<NodeId>,
    handlers: HashMap<Method, H>,
    middleware: Vec<M>,
}

impl<H, M> Node<H, M> {
    fn new(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            kind: SegmentKind::classify(segment),
            literals: HashMap::new(),
            param: None,
            wildcard: None,
            handlers: HashMap::new(),
            middleware: Vec::new(),
        }
    }

    /// Registration text of this level
    #[must_use]
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Segment classification
    #[must_use]
    pub const fn kind(&self) -> &SegmentKind {
        &self.kind
    }

    /// Handler registered for `method`, if any
    #[must_use]
    pub fn handler(&self, method: Method) -> Option<&H> {
        self.handlers.get(&method)
    }

    /// Middleware accumulated at this node, in registration order
    #[must_use]
    pub fn middleware(&self) -> &[M] {
        &self.middleware
    }

    /// Methods with a handler here, in declaration order
    #[must_use]
    pub fn methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    /// Whether any method has a handler here
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.handlers.is_empty()
    }

    fn children(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .literals
            .values()
            .copied()
            .chain(self.param)
            .chain(self.wildcard)
            .collect();
        // arena ids grow with insertion
        ids.sort_unstable();
        ids
    }
}

/// Arena-backed segment trie
#[derive(Debug, Clone)]
pub struct RouteTrie<H, M> {
    nodes: Vec<Node<H, M>>,
}

impl<H, M> Default for RouteTrie<H, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, M> RouteTrie<H, M> {
    /// Create a trie holding only the root
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new("")],
        }
    }

    /// Number of nodes, root included
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The trie always holds its root
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Borrow a node
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this trie.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node<H, M> {
        &self.nodes[id]
    }

    /// Walk `segments` from the root, creating missing nodes, and return the terminal node
    pub fn insert(&mut self, segments: &[String]) -> NodeId {
        let mut current = ROOT;
        for segment in segments {
            current = self.child_or_insert(current, segment);
        }
        current
    }

    /// Store `handler` for `method` at `id`, returning the handler it replaced
    pub fn set_handler(&mut self, id: NodeId, method: Method, handler: H) -> Option<H> {
        self.nodes[id].handlers.insert(method, handler)
    }

    /// Append middleware to the node's bound list
    pub fn bind_middleware(&mut self, id: NodeId, middleware: impl IntoIterator<Item = M>) {
        self.nodes[id].middleware.extend(middleware);
    }

    fn child_or_insert(&mut self, parent: NodeId, segment: &str) -> NodeId {
        let kind = SegmentKind::classify(segment);
        let existing = match kind {
            SegmentKind::Literal => self.nodes[parent].literals.get(segment).copied(),
            SegmentKind::Param(_) => self.nodes[parent].param,
            SegmentKind::Wildcard => self.nodes[parent].wildcard,
        };
        if let Some(id) = existing {
            return id;
        }

        let id = self.nodes.len();
        self.nodes.push(Node::new(segment));
        let slot = &mut self.nodes[parent];
        match kind {
            SegmentKind::Literal => {
                slot.literals.insert(segment.to_string(), id);
            }
            SegmentKind::Param(_) => slot.param = Some(id),
            SegmentKind::Wildcard => slot.wildcard = Some(id),
        }
        id
    }

    /// Find the node matching `segments`, ignoring methods
    ///
    /// Returns the matched node and the parameter bindings collected on the
    /// successful path, in binding order. A later binding of the same name
    /// overrides an earlier one when the caller collects them into a map.
    #[must_use]
    pub fn search(&self, segments: &[String]) -> Option<(NodeId, Vec<(String, String)>)> {
        let mut bindings = Vec::new();
        let found = self.search_from(ROOT, segments, 0, &mut bindings)?;
        Some((found, bindings))
    }

    fn search_from(
        &self,
        id: NodeId,
        segments: &[String],
        index: usize,
        bindings: &mut Vec<(String, String)>,
    ) -> Option<NodeId> {
        let node = &self.nodes[id];

        let Some(segment) = segments.get(index) else {
            if node.is_terminal() {
                return Some(id);
            }
            return self.capture_rest(node, segments, index, bindings);
        };

        if let Some(&child) = node.literals.get(segment) {
            if let Some(found) = self.search_from(child, segments, index + 1, bindings) {
                return Some(found);
            }
        }

        if let Some(child) = node.param {
            if let Some(name) = self.nodes[child].kind.param_name() {
                let mark = bindings.len();
                bindings.push((name.to_string(), segment.clone()));
                if let Some(found) = self.search_from(child, segments, index + 1, bindings) {
                    return Some(found);
                }
                // backtrack: the binding belongs to a failed branch
                bindings.truncate(mark);
            }
        }

        self.capture_rest(node, segments, index, bindings)
    }

    /// Wildcard step: capture `segments[index..]` and stop at the wildcard node
    fn capture_rest(
        &self,
        node: &Node<H, M>,
        segments: &[String],
        index: usize,
        bindings: &mut Vec<(String, String)>,
    ) -> Option<NodeId> {
        let child = node.wildcard?;
        if !self.nodes[child].is_terminal() {
            return None;
        }
        bindings.push((WILDCARD_PARAM.to_string(), segments[index..].join("/")));
        Some(child)
    }

    /// Visit every terminal node with its rebuilt path, depth first
    pub fn for_each_terminal(&self, mut visit: impl FnMut(&str, &Node<H, M>)) {
        let mut stack = vec![(ROOT, String::new())];
        while let Some((id, prefix)) = stack.pop() {
            let node = &self.nodes[id];
            let path = if id == ROOT {
                prefix
            } else {
                format!("{prefix}/{}", node.segment)
            };
            if node.is_terminal() {
                visit(if path.is_empty() { "/" } else { path.as_str() }, node);
            }
            for child in node.children().into_iter().rev() {
                stack.push((child, path.clone()));
            }
        }
    }
}
