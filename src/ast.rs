use std::collections::{BTreeSet, HashMap};

use crate::span::Span;
use crate::typeck::types::Type;

/// Handle to a node stored in an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Top-level compilation unit; introduces a local scope.
    Script { body: NodeId },
    Body { children: Vec<NodeId> },
    Noop,

    Fixnum(i64),
    Float(f64),
    Str(String),
    Boolean(bool),
    Null,

    Local { name: String },
    LocalAssignment { name: String, value: NodeId },
    FieldAccess { name: String },
    FieldAssignment { name: String, value: NodeId },
    /// Reference to a class by name; evaluates to the class (meta) type.
    Constant { name: String },
    Call { target: NodeId, name: String, args: Vec<NodeId> },
    /// Call on the ambient `self`.
    FunctionalCall { name: String, args: Vec<NodeId> },
    MethodDefinition {
        name: String,
        params: Vec<Param>,
        return_type: Option<String>,
        body: NodeId,
        is_static: bool,
    },
    ClassDefinition {
        name: String,
        superclass: Option<String>,
        interfaces: Vec<String>,
        body: NodeId,
    },

    Condition { predicate: NodeId },
    If { condition: NodeId, then_branch: Option<NodeId>, else_branch: Option<NodeId> },
    Loop {
        init: Option<NodeId>,
        condition: Option<NodeId>,
        pre: Option<NodeId>,
        body: Option<NodeId>,
        post: Option<NodeId>,
        check_first: bool,
        negative: bool,
    },
    Return { value: Option<NodeId> },
    Break,
    Next,
    Redo,
    Raise { args: Vec<NodeId> },
    RescueClause { types: Vec<String>, name: Option<String>, body: NodeId },
    Rescue { body: NodeId, clauses: Vec<NodeId> },
    Ensure { body: NodeId, clause: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_name: String,
}

impl Param {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into() }
    }
}

impl NodeKind {
    /// Child handles in evaluation order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Script { body } => vec![*body],
            NodeKind::Body { children } => children.clone(),
            NodeKind::LocalAssignment { value, .. } | NodeKind::FieldAssignment { value, .. } => vec![*value],
            NodeKind::Call { target, args, .. } => {
                let mut out = vec![*target];
                out.extend(args.iter().copied());
                out
            }
            NodeKind::FunctionalCall { args, .. } | NodeKind::Raise { args } => args.clone(),
            NodeKind::MethodDefinition { body, .. }
            | NodeKind::ClassDefinition { body, .. }
            | NodeKind::RescueClause { body, .. } => vec![*body],
            NodeKind::Condition { predicate } => vec![*predicate],
            NodeKind::If { condition, then_branch, else_branch } => {
                let mut out = vec![*condition];
                out.extend(then_branch.iter().chain(else_branch.iter()).copied());
                out
            }
            NodeKind::Loop { init, condition, pre, body, post, .. } => {
                [init, condition, pre, body, post].into_iter().flatten().copied().collect()
            }
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::Rescue { body, clauses } => {
                let mut out = vec![*body];
                out.extend(clauses.iter().copied());
                out
            }
            NodeKind::Ensure { body, clause } => vec![*body, *clause],
            NodeKind::Noop
            | NodeKind::Fixnum(_)
            | NodeKind::Float(_)
            | NodeKind::Str(_)
            | NodeKind::Boolean(_)
            | NodeKind::Null
            | NodeKind::Local { .. }
            | NodeKind::FieldAccess { .. }
            | NodeKind::Constant { .. }
            | NodeKind::Break
            | NodeKind::Next
            | NodeKind::Redo => Vec::new(),
        }
    }

    /// Nodes that own a table of local variables.
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            NodeKind::Script { .. } | NodeKind::MethodDefinition { .. } | NodeKind::ClassDefinition { .. }
        )
    }

    pub fn describe(&self) -> String {
        match self {
            NodeKind::Script { .. } => "Script".into(),
            NodeKind::Body { .. } => "Body".into(),
            NodeKind::Noop => "Noop".into(),
            NodeKind::Fixnum(v) => format!("Fixnum({v})"),
            NodeKind::Float(v) => format!("Float({v})"),
            NodeKind::Str(s) => format!("String({s:?})"),
            NodeKind::Boolean(b) => format!("Boolean({b})"),
            NodeKind::Null => "Null".into(),
            NodeKind::Local { name } => format!("Local({name})"),
            NodeKind::LocalAssignment { name, .. } => format!("LocalAssignment({name})"),
            NodeKind::FieldAccess { name } => format!("FieldAccess(@{name})"),
            NodeKind::FieldAssignment { name, .. } => format!("FieldAssignment(@{name})"),
            NodeKind::Constant { name } => format!("Constant({name})"),
            NodeKind::Call { name, .. } => format!("Call({name})"),
            NodeKind::FunctionalCall { name, .. } => format!("FunctionalCall({name})"),
            NodeKind::MethodDefinition { name, .. } => format!("MethodDefinition({name})"),
            NodeKind::ClassDefinition { name, .. } => format!("ClassDefinition({name})"),
            NodeKind::Condition { .. } => "Condition".into(),
            NodeKind::If { .. } => "If".into(),
            NodeKind::Loop { .. } => "Loop".into(),
            NodeKind::Return { .. } => "Return".into(),
            NodeKind::Break => "Break".into(),
            NodeKind::Next => "Next".into(),
            NodeKind::Redo => "Redo".into(),
            NodeKind::Raise { .. } => "Raise".into(),
            NodeKind::RescueClause { name: Some(n), .. } => format!("RescueClause({n})"),
            NodeKind::RescueClause { .. } => "RescueClause".into(),
            NodeKind::Rescue { .. } => "Rescue".into(),
            NodeKind::Ensure { .. } => "Ensure".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Non-owning back-reference; only used for position and ancestor queries.
    pub parent: Option<NodeId>,
    pub span: Span,
    /// Expansion of this node produced by the macro layer, if any.
    pub inlined: Option<NodeId>,
    resolved: bool,
    inferred: Option<Type>,
}

impl Node {
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Cached type. Only meaningful once `is_resolved` is true; before that it
    /// may hold a speculative type adopted from partial progress.
    pub fn inferred_type(&self) -> Option<&Type> {
        self.inferred.as_ref()
    }
}

/// Arena owning every node of one compilation unit.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    declared: HashMap<NodeId, BTreeSet<String>>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Construct a node. The closure receives the new node's handle so children
    /// built inside it can name it as their parent, and returns the node kind.
    pub fn build<F>(&mut self, parent: Option<NodeId>, span: Span, f: F) -> NodeId
    where
        F: FnOnce(&mut Ast, NodeId) -> NodeKind,
    {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind: NodeKind::Noop,
            parent,
            span,
            inlined: None,
            resolved: false,
            inferred: None,
        });
        let kind = f(self, id);
        self.nodes[id.0 as usize].kind = kind;
        id
    }

    /// Construct a childless node.
    pub fn leaf(&mut self, parent: Option<NodeId>, span: Span, kind: NodeKind) -> NodeId {
        self.build(parent, span, |_, _| kind)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0 as usize].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.0 as usize].span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0 as usize].parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.kind(id).children()
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.0 as usize].kind = kind;
    }

    pub fn reparent(&mut self, id: NodeId, parent: NodeId) {
        self.nodes[id.0 as usize].parent = Some(parent);
    }

    pub fn set_inlined(&mut self, id: NodeId, expansion: NodeId) {
        self.nodes[id.0 as usize].inlined = Some(expansion);
    }

    pub fn is_resolved(&self, id: NodeId) -> bool {
        self.nodes[id.0 as usize].resolved
    }

    pub fn inferred_type(&self, id: NodeId) -> Option<&Type> {
        self.nodes[id.0 as usize].inferred.as_ref()
    }

    /// Mark a node resolved with its final type. Resolution is monotonic: an
    /// already-resolved node keeps its original type.
    pub fn resolve(&mut self, id: NodeId, ty: Type) -> Type {
        let node = &mut self.nodes[id.0 as usize];
        if !node.resolved {
            node.resolved = true;
            node.inferred = Some(ty);
        }
        node.inferred.clone().unwrap_or(Type::Error)
    }

    /// Record a speculative type for a pending node without resolving it.
    pub fn set_speculative(&mut self, id: NodeId, ty: Type) {
        let node = &mut self.nodes[id.0 as usize];
        if !node.resolved {
            node.inferred = Some(ty);
        }
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |p| self.parent(*p))
    }

    /// Nearest enclosing node that owns a local-variable table.
    pub fn scope_of(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id).find(|a| self.kind(*a).is_scope())
    }

    /// Scope used for local bindings of `id`: the nearest scope node, or the
    /// root of a detached tree.
    pub fn scope_for(&self, id: NodeId) -> NodeId {
        self.scope_of(id)
            .or_else(|| self.ancestors(id).last())
            .unwrap_or(id)
    }

    pub fn declare_local(&mut self, scope: NodeId, name: impl Into<String>) {
        self.declared.entry(scope).or_default().insert(name.into());
    }

    pub fn scope_locals(&self, scope: NodeId) -> Vec<String> {
        self.declared.get(&scope).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn describe(&self, id: NodeId) -> String {
        self.kind(id).describe()
    }

    /// Whether the body of a loop contains a `redo` that targets it. The scan
    /// follows inlined expansions and never descends into a nested loop.
    pub fn loop_has_redo(&self, loop_id: NodeId) -> bool {
        self.find_redo(&self.children(loop_id))
    }

    fn find_redo(&self, nodes: &[NodeId]) -> bool {
        for &start in nodes {
            let mut id = start;
            while let Some(expansion) = self.node(id).inlined {
                id = expansion;
            }
            match self.kind(id) {
                NodeKind::Redo => return true,
                NodeKind::Loop { .. } => continue,
                _ => {
                    if self.find_redo(&self.children(id)) {
                        return true;
                    }
                }
            }
        }
        false
    }
}
