//! Property-based tests for the resolution cycle.
//!
//! Random scripts mix forward references, unknown names and branch
//! conflicts; whatever the mix, the cycle must stop within its pass budget
//! and leave every reached node resolved.

#[path = "../common/mod.rs"]
mod common;

use common::{Tree, env};
use kestrel::ast::NodeId;
use kestrel::config::InferenceConfig;
use kestrel::typeck::resolve::MAX_EXTENSION_PASSES;
use proptest::prelude::*;

const VARS: &[&str] = &["a", "b", "c"];
const METHODS: &[&str] = &["first", "second"];

#[derive(Debug, Clone)]
enum Lit {
    Int,
    Str,
    Bool,
}

#[derive(Debug, Clone)]
enum Stmt {
    Assign(usize, Lit),
    Read(usize),
    CallLater(usize),
    Branch(Lit, Lit),
    Raise,
    Loop(usize),
}

fn arb_lit() -> impl Strategy<Value = Lit> {
    prop_oneof![Just(Lit::Int), Just(Lit::Str), Just(Lit::Bool)]
}

fn arb_stmt() -> impl Strategy<Value = Stmt> {
    prop_oneof![
        (0..VARS.len(), arb_lit()).prop_map(|(v, l)| Stmt::Assign(v, l)),
        (0..VARS.len()).prop_map(Stmt::Read),
        (0..METHODS.len()).prop_map(Stmt::CallLater),
        (arb_lit(), arb_lit()).prop_map(|(a, b)| Stmt::Branch(a, b)),
        Just(Stmt::Raise),
        (0..VARS.len()).prop_map(Stmt::Loop),
    ]
}

fn lit(t: &mut Tree, lit: &Lit) -> NodeId {
    match lit {
        Lit::Int => t.int(1),
        Lit::Str => t.string("s"),
        Lit::Bool => t.boolean(true),
    }
}

fn build(t: &mut Tree, stmts: &[Stmt], define: &[bool]) -> NodeId {
    let mut children = Vec::new();
    for stmt in stmts {
        let id = match stmt {
            Stmt::Assign(v, l) => {
                let value = lit(t, l);
                t.assign(VARS[*v], value)
            }
            Stmt::Read(v) => t.local(VARS[*v]),
            Stmt::CallLater(m) => t.fcall(METHODS[*m], vec![]),
            Stmt::Branch(a, b) => {
                let c = t.boolean(true);
                let a = lit(t, a);
                let b = lit(t, b);
                t.if_(c, Some(a), Some(b))
            }
            Stmt::Raise => {
                let msg = t.string("boom");
                t.raise(vec![msg])
            }
            Stmt::Loop(v) => {
                let pred = t.local(VARS[*v]);
                let brk = t.add(kestrel::ast::NodeKind::Break);
                t.while_(pred, vec![brk])
            }
        };
        children.push(id);
    }
    for (name, defined) in METHODS.iter().zip(define) {
        if *defined {
            let body = t.int(7);
            children.push(t.def(name, &[], None, vec![body]));
        }
    }
    t.script(children)
}

fn descendants(t: &Tree, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut work = vec![root];
    while let Some(id) = work.pop() {
        out.push(id);
        work.extend(t.ast.children(id));
    }
    out
}

proptest! {
    #[test]
    fn cycle_stays_within_budget_and_resolves_everything(
        stmts in prop::collection::vec(arb_stmt(), 1..12),
        define in prop::collection::vec(any::<bool>(), METHODS.len()),
    ) {
        let mut t = Tree::new();
        let root = build(&mut t, &stmts, &define);
        let mut env = env(InferenceConfig::default());

        env.define_type("Script", None, Vec::new(), |env, _| env.infer(&mut t.ast, root));
        let pending = env.deferred_nodes().len();
        let report = env.resolve(&mut t.ast, false).unwrap();

        prop_assert!(report.passes <= pending + 1 + MAX_EXTENSION_PASSES);
        prop_assert!(report.extension_passes <= MAX_EXTENSION_PASSES);
        prop_assert!(report.final_state.is_terminal());
        prop_assert!(env.deferred_nodes().is_empty());
        prop_assert!(t.ast.is_resolved(root));
        for id in descendants(&t, root) {
            if t.ast.is_resolved(id) {
                prop_assert!(t.ast.inferred_type(id).is_some());
            }
        }
        for id in &report.forced {
            prop_assert!(env.has_error_for(*id));
        }
    }

    #[test]
    fn second_resolve_changes_nothing(
        stmts in prop::collection::vec(arb_stmt(), 1..12),
        define in prop::collection::vec(any::<bool>(), METHODS.len()),
    ) {
        let mut t = Tree::new();
        let root = build(&mut t, &stmts, &define);
        let mut env = env(InferenceConfig::default());

        env.define_type("Script", None, Vec::new(), |env, _| env.infer(&mut t.ast, root));
        env.resolve(&mut t.ast, false).unwrap();
        let errors = env.errors().to_vec();
        let types: Vec<_> = descendants(&t, root).into_iter().map(|id| t.ast.inferred_type(id).cloned()).collect();

        let again = env.resolve(&mut t.ast, false).unwrap();
        prop_assert_eq!(again.passes, 0);
        prop_assert_eq!(env.errors(), errors.as_slice());
        let after: Vec<_> = descendants(&t, root).into_iter().map(|id| t.ast.inferred_type(id).cloned()).collect();
        prop_assert_eq!(types, after);
    }
}
