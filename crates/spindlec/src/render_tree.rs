//! Development-time record of the component tree produced by a render.
//!
//! A runtime reports each component through [`DebugRenderTree::create`] when it is
//! instantiated and [`DebugRenderTree::did_render`] once its bounds are known; devtools
//! read the result back with [`DebugRenderTree::capture`]. Nodes are keyed by the
//! runtime's own component state handle `S`.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde::Serialize;
use serde_json::Value;

use crate::template::Template;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTreeError {
    pub message: String,
}

impl RenderTreeError {
    fn bug(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::error::Error for RenderTreeError {}

impl fmt::Display for RenderTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// What the runtime knows about a component when it creates it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderNode {
    /// `component`, `outlet`, `engine`, ...
    pub kind: String,
    pub name: String,
    pub args: Value,
    pub instance: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub args: Value,
    pub instance: Value,
    pub template: Option<String>,
    pub bounds: Value,
    pub children: Vec<CapturedNode>,
}

#[derive(Debug)]
struct NodeEntry {
    node: RenderNode,
    template: Option<String>,
    bounds: Option<Value>,
    children: Vec<usize>,
}

/// Stable identity of a node; outlives the node's state once released.
#[derive(Debug)]
struct RefEntry<S> {
    state: Option<S>,
}

#[derive(Debug)]
pub struct DebugRenderTree<S> {
    stack: Vec<S>,
    refs: Vec<RefEntry<S>>,
    ref_of: HashMap<S, usize>,
    roots: Vec<usize>,
    nodes: HashMap<S, NodeEntry>,
}

impl<S> Default for DebugRenderTree<S> {
    fn default() -> Self {
        Self {
            stack: Vec::new(),
            refs: Vec::new(),
            ref_of: HashMap::new(),
            roots: Vec::new(),
            nodes: HashMap::new(),
        }
    }
}

impl<S> DebugRenderTree<S>
where
    S: Clone + Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.reset();
    }

    pub fn create(&mut self, state: S, node: RenderNode) -> Result<(), RenderTreeError> {
        if self.ref_of.contains_key(&state) {
            return Err(RenderTreeError::bug("BUG: child already appended"));
        }
        let id = self.refs.len();
        self.refs.push(RefEntry {
            state: Some(state.clone()),
        });
        self.ref_of.insert(state.clone(), id);

        match self.stack.last() {
            Some(parent) => {
                let parent = self
                    .nodes
                    .get_mut(parent)
                    .ok_or_else(|| RenderTreeError::bug("BUG: missing node"))?;
                parent.children.push(id);
            }
            None => self.roots.push(id),
        }

        self.nodes.insert(
            state.clone(),
            NodeEntry {
                node,
                template: None,
                bounds: None,
                children: Vec::new(),
            },
        );
        self.stack.push(state);
        Ok(())
    }

    /// Re-enters an existing node, for components whose layout changes on update.
    pub fn update(&mut self, state: S) {
        self.stack.push(state);
    }

    pub fn set_template(&mut self, state: &S, template: &Template) -> Result<(), RenderTreeError> {
        self.node_for(state)?.template = template.module_name().map(str::to_string);
        Ok(())
    }

    pub fn did_render(&mut self, state: &S, bounds: Value) -> Result<(), RenderTreeError> {
        match self.stack.last() {
            Some(current) if current == state => {}
            current => {
                return Err(RenderTreeError::bug(format!(
                    "BUG: expecting {current:?}, got {state:?}"
                )))
            }
        }
        self.node_for(state)?.bounds = Some(bounds);
        self.exit()
    }

    pub fn will_destroy(&mut self, state: &S) -> Result<(), RenderTreeError> {
        let id = *self
            .ref_of
            .get(state)
            .ok_or_else(|| RenderTreeError::bug("BUG: missing ref"))?;
        let entry = &mut self.refs[id];
        if entry.state.take().is_none() {
            return Err(RenderTreeError::bug("BUG: double release?"));
        }
        Ok(())
    }

    pub fn commit(&mut self) {
        self.reset();
    }

    /// Snapshot of every live root and its live descendants. Released roots are
    /// forgotten.
    pub fn capture(&mut self) -> Result<Vec<CapturedNode>, RenderTreeError> {
        let refs = &self.refs;
        self.roots.retain(|id| refs[*id].state.is_some());
        self.capture_refs(&self.roots)
    }

    fn capture_refs(&self, ids: &[usize]) -> Result<Vec<CapturedNode>, RenderTreeError> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(state) = &self.refs[id].state {
                out.push(self.capture_node(id, state)?);
            }
        }
        Ok(out)
    }

    fn capture_node(&self, id: usize, state: &S) -> Result<CapturedNode, RenderTreeError> {
        let entry = self
            .nodes
            .get(state)
            .ok_or_else(|| RenderTreeError::bug("BUG: missing node"))?;
        let bounds = entry
            .bounds
            .clone()
            .ok_or_else(|| RenderTreeError::bug("BUG: missing bounds"))?;
        Ok(CapturedNode {
            id: format!("render-node:{id}"),
            kind: entry.node.kind.clone(),
            name: entry.node.name.clone(),
            args: entry.node.args.clone(),
            instance: entry.node.instance.clone(),
            template: entry.template.clone(),
            bounds,
            children: self.capture_refs(&entry.children)?,
        })
    }

    fn node_for(&mut self, state: &S) -> Result<&mut NodeEntry, RenderTreeError> {
        self.nodes
            .get_mut(state)
            .ok_or_else(|| RenderTreeError::bug("BUG: missing node"))
    }

    fn exit(&mut self) -> Result<(), RenderTreeError> {
        self.stack
            .pop()
            .map(drop)
            .ok_or_else(|| RenderTreeError::bug("BUG: unbalanced pop"))
    }

    fn reset(&mut self) {
        if !self.stack.is_empty() {
            // An error interrupted the last render.
            log::debug!("render tree: discarding {} open node(s)", self.stack.len());
            self.stack.clear();
        }
    }
}
