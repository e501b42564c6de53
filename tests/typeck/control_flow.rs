//! Inference of conditionals, loops, jumps and exception handling.
#[path = "../common/mod.rs"]
mod common;

use common::{Tree, env, int, string};
use kestrel::ast::NodeKind;
use kestrel::config::InferenceConfig;
use kestrel::typeck::env::Environment;
use kestrel::typeck::infer_program_with;
use kestrel::typeck::resolve::ResolveState;
use kestrel::typeck::types::Type;

fn infer(t: &mut Tree, root: kestrel::ast::NodeId) -> kestrel::typeck::InferenceOutcome {
    infer_program_with(env(InferenceConfig::default()), &mut t.ast, root).unwrap()
}

/// Run only the initial inference, leaving the deferred set for the caller.
fn infer_once(t: &mut Tree, root: kestrel::ast::NodeId) -> Environment {
    let mut env = env(InferenceConfig::default());
    env.define_type("Script", None, Vec::new(), |env, _| env.infer(&mut t.ast, root));
    env
}

// ---- if / condition ----

#[test]
fn if_with_matching_branches_has_branch_type() {
    let mut t = Tree::new();
    let c = t.boolean(true);
    let a = t.int(1);
    let b = t.int(2);
    let iff = t.if_(c, Some(a), Some(b));
    let root = t.script(vec![iff]);

    let out = infer(&mut t, root);
    assert_eq!(t.type_of(iff), Some(int()));
    assert_eq!(out.root_type, int());
    assert!(out.env.errors().is_empty());
    assert_eq!(out.report.passes, 0);
    assert_eq!(out.report.final_state, ResolveState::Converged);
}

#[test]
fn if_with_incompatible_branches_is_an_error() {
    let mut t = Tree::new();
    let c = t.boolean(true);
    let a = t.int(1);
    let b = t.string("a");
    let iff = t.if_(c, Some(a), Some(b));
    let root = t.script(vec![iff]);

    let out = infer(&mut t, root);
    assert_eq!(t.type_of(iff), Some(Type::Error));
    assert_eq!(out.env.errors().len(), 1);
    assert_eq!(
        out.env.errors()[0].message,
        "if statement with incompatible result types (int and java.lang.String)"
    );
    assert_eq!(out.env.errors()[0].node, Some(iff));
}

#[test]
fn if_without_else_has_then_type() {
    let mut t = Tree::new();
    let c = t.boolean(false);
    let a = t.int(1);
    let iff = t.if_(c, Some(a), None);
    let root = t.script(vec![iff]);

    infer(&mut t, root);
    assert_eq!(t.type_of(iff), Some(int()));
}

#[test]
fn if_without_branches_has_no_type() {
    let mut t = Tree::new();
    let c = t.boolean(false);
    let iff = t.if_(c, None, None);
    let root = t.script(vec![iff]);

    infer(&mut t, root);
    assert_eq!(t.type_of(iff), Some(Type::NoType));
}

#[test]
fn if_in_statement_position_narrows_to_void() {
    let mut t = Tree::new();
    let c = t.boolean(true);
    let brk = t.add(NodeKind::Break);
    let b = t.int(2);
    let iff = t.if_(c, Some(brk), Some(b));
    let root = t.script(vec![iff]);

    infer(&mut t, root);
    assert_eq!(t.type_of(iff), Some(Type::Void));
}

#[test]
fn if_with_raising_branch_takes_other_branch_type() {
    let mut t = Tree::new();
    let c = t.boolean(true);
    let a = t.int(1);
    let msg = t.string("nope");
    let raise = t.raise(vec![msg]);
    let iff = t.if_(c, Some(a), Some(raise));
    let root = t.script(vec![iff]);

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    assert_eq!(t.type_of(raise), Some(Type::Unreachable));
    assert_eq!(t.type_of(iff), Some(int()));
}

#[test]
fn if_keeps_branch_type_while_condition_is_pending() {
    let mut t = Tree::new();
    let ready = t.fcall("ready", vec![]);
    let a = t.int(1);
    let b = t.int(2);
    let iff = t.if_(ready, Some(a), Some(b));
    let yes = t.boolean(true);
    let def = t.def("ready", &[], None, vec![yes]);
    let root = t.script(vec![iff, def]);
    let NodeKind::If { condition, .. } = t.ast.kind(iff).clone() else { unreachable!() };

    let mut env = infer_once(&mut t, root);
    assert!(env.is_deferred(condition));
    assert!(env.is_deferred(iff));
    assert!(!t.ast.is_resolved(iff));
    assert_eq!(t.ast.inferred_type(iff), Some(&int()));
    assert_eq!(t.type_of(a), Some(int()));
    assert_eq!(t.type_of(b), Some(int()));

    let report = env.resolve(&mut t.ast, false).unwrap();
    assert!(env.errors().is_empty());
    assert_eq!(report.passes, 1);
    assert_eq!(t.ast.kind(condition), &NodeKind::Condition { predicate: ready });
    assert_eq!(t.type_of(condition), Some(Type::named("boolean")));
    assert_eq!(t.type_of(iff), Some(int()));
}

#[test]
fn non_boolean_condition_is_rewritten_into_null_check() {
    let mut t = Tree::new();
    let pred = t.int(1);
    let a = t.int(1);
    let b = t.int(2);
    let iff = t.if_(pred, Some(a), Some(b));
    let root = t.script(vec![iff]);
    let NodeKind::If { condition, .. } = t.ast.kind(iff).clone() else { unreachable!() };

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    assert_eq!(out.report.final_state, ResolveState::Converged);
    assert_eq!(out.report.passes, 1);

    let NodeKind::Condition { predicate: comparison } = t.ast.kind(condition).clone() else {
        panic!("condition lost its kind");
    };
    assert_ne!(comparison, pred);
    let NodeKind::Call { target, name, args } = t.ast.kind(comparison).clone() else {
        panic!("expected a call, got {}", t.ast.describe(comparison));
    };
    assert_eq!(target, pred);
    assert_eq!(name, "!=");
    assert_eq!(args.len(), 1);
    assert_eq!(t.ast.kind(args[0]), &NodeKind::Null);
    assert_eq!(t.ast.parent(pred), Some(comparison));
    assert_eq!(t.ast.parent(comparison), Some(condition));
    assert_eq!(t.type_of(condition), Some(Type::named("boolean")));
    assert_eq!(t.type_of(iff), Some(int()));
}

#[test]
fn boolean_condition_is_left_alone() {
    let mut t = Tree::new();
    let pred = t.boolean(true);
    let cond = t.condition(pred);
    let root = t.script(vec![cond]);

    infer(&mut t, root);
    assert_eq!(t.ast.kind(cond), &NodeKind::Condition { predicate: pred });
    assert_eq!(t.type_of(cond), Some(Type::named("boolean")));
}

// ---- loops and jumps ----

#[test]
fn loop_is_void() {
    let mut t = Tree::new();
    let pred = t.boolean(true);
    let one = t.int(1);
    let lp = t.while_(pred, vec![one]);
    let root = t.script(vec![lp]);

    let out = infer(&mut t, root);
    assert_eq!(t.type_of(lp), Some(Type::Void));
    assert_eq!(out.report.passes, 0);
}

#[test]
fn loop_waits_for_pending_body() {
    let mut t = Tree::new();
    let pred = t.boolean(true);
    let later = t.fcall("later", vec![]);
    let lp = t.while_(pred, vec![later]);
    let one = t.int(1);
    let def = t.def("later", &[], None, vec![one]);
    let root = t.script(vec![lp, def]);

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    assert_eq!(t.type_of(later), Some(int()));
    assert_eq!(t.type_of(lp), Some(Type::Void));
    assert_eq!(out.report.passes, 1);
}

#[test]
fn jumps_are_void() {
    let mut t = Tree::new();
    let brk = t.add(NodeKind::Break);
    let nxt = t.add(NodeKind::Next);
    let redo = t.add(NodeKind::Redo);
    let pred = t.boolean(true);
    let lp = t.while_(pred, vec![brk, nxt, redo]);
    let root = t.script(vec![lp]);

    infer(&mut t, root);
    for id in [brk, nxt, redo] {
        assert_eq!(t.type_of(id), Some(Type::Void));
    }
    assert!(t.ast.loop_has_redo(lp));
}

#[test]
fn return_takes_value_type() {
    let mut t = Tree::new();
    let one = t.int(1);
    let ret = t.ret(Some(one));
    let def = t.def("one", &[], None, vec![ret]);
    let bare = t.ret(None);
    let nothing = t.def("nothing", &[], None, vec![bare]);
    let root = t.script(vec![def, nothing]);

    let out = infer(&mut t, root);
    assert_eq!(t.type_of(ret), Some(int()));
    assert_eq!(t.type_of(bare), Some(Type::NoType));
    let script = Type::named("Script");
    assert_eq!(out.env.method_type(&script, "one", &[]), Some(int()));
    assert_eq!(out.env.method_type(&script, "nothing", &[]), Some(Type::Void));
}

#[test]
fn return_of_forward_call_resolves_after_cycle() {
    let mut t = Tree::new();
    let call = t.fcall("b", vec![]);
    let ret = t.ret(Some(call));
    let a = t.def("a", &[], None, vec![ret]);
    let s = t.string("b");
    let b = t.def("b", &[], None, vec![s]);
    let root = t.script(vec![a, b]);

    let out = infer(&mut t, root);
    assert_eq!(t.type_of(ret), Some(string()));
    assert_eq!(t.type_of(a), Some(string()));
    assert_eq!(out.env.method_type(&Type::named("Script"), "a", &[]), Some(string()));
}

#[test]
fn return_waits_while_value_is_only_speculative() {
    let mut t = Tree::new();
    let c = t.boolean(true);
    let one = t.int(1);
    let later = t.fcall("later", vec![]);
    let iff = t.if_(c, Some(one), Some(later));
    let ret = t.ret(Some(iff));
    let pick = t.def("pick", &[], None, vec![ret]);
    let two = t.int(2);
    let def = t.def("later", &[], None, vec![two]);
    let root = t.script(vec![pick, def]);

    let mut env = infer_once(&mut t, root);
    assert_eq!(t.ast.inferred_type(iff), Some(&int()));
    assert!(!t.ast.is_resolved(iff));
    assert!(!t.ast.is_resolved(ret));
    assert!(env.is_deferred(ret));

    let report = env.resolve(&mut t.ast, false).unwrap();
    assert!(env.errors().is_empty());
    assert_eq!(report.passes, 1);
    assert_eq!(t.type_of(ret), Some(int()));
    assert_eq!(env.method_type(&Type::named("Script"), "pick", &[]), Some(int()));
}

// ---- raise ----

#[test]
fn raising_a_throwable_instance_is_not_rewritten() {
    let mut t = Tree::new();
    let e = t.local("e");
    let raise = t.raise(vec![e]);
    let def = t.def("boom", &[("e", "Throwable")], None, vec![raise]);
    let root = t.script(vec![def]);

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    assert_eq!(t.ast.kind(raise), &NodeKind::Raise { args: vec![e] });
    assert_eq!(t.type_of(raise), Some(Type::Unreachable));
}

#[test]
fn raising_a_message_constructs_default_exception() {
    let mut t = Tree::new();
    let msg = t.string("boom");
    let raise = t.raise(vec![msg]);
    let root = t.script(vec![raise]);

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    assert_eq!(t.type_of(raise), Some(Type::Unreachable));

    let NodeKind::Raise { args } = t.ast.kind(raise).clone() else { unreachable!() };
    assert_eq!(args.len(), 1);
    let construct = args[0];
    let NodeKind::Call { target, name, args: ctor_args } = t.ast.kind(construct).clone() else {
        panic!("expected construction, got {}", t.ast.describe(construct));
    };
    assert_eq!(name, "new");
    assert_eq!(ctor_args, vec![msg]);
    assert_eq!(
        t.ast.kind(target),
        &NodeKind::Constant { name: "java.lang.RuntimeException".into() }
    );
    assert_eq!(t.ast.parent(msg), Some(construct));
    assert_eq!(t.type_of(construct), Some(Type::named("java.lang.RuntimeException")));
}

#[test]
fn raising_a_bare_class_constructs_it_without_arguments() {
    let mut t = Tree::new();
    let class = t.constant("RuntimeException");
    let raise = t.raise(vec![class]);
    let root = t.script(vec![raise]);

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    let NodeKind::Raise { args } = t.ast.kind(raise).clone() else { unreachable!() };
    assert_eq!(args.len(), 1);
    let construct = args[0];
    let NodeKind::Call { target, name, args: ctor_args } = t.ast.kind(construct).clone() else {
        panic!("expected construction, got {}", t.ast.describe(construct));
    };
    assert_eq!(target, class);
    assert_eq!(name, "new");
    assert!(ctor_args.is_empty());
    assert_eq!(t.ast.parent(class), Some(construct));
    assert_eq!(t.ast.parent(construct), Some(raise));
    assert_eq!(t.type_of(construct), Some(Type::named("java.lang.RuntimeException")));
    assert_eq!(t.type_of(raise), Some(Type::Unreachable));
}

#[test]
fn raising_a_class_with_message_constructs_that_class() {
    let mut t = Tree::new();
    let class = t.constant("Exception");
    let msg = t.string("bad input");
    let raise = t.raise(vec![class, msg]);
    let root = t.script(vec![raise]);

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    let NodeKind::Raise { args } = t.ast.kind(raise).clone() else { unreachable!() };
    let NodeKind::Call { target, args: ctor_args, .. } = t.ast.kind(args[0]).clone() else {
        panic!("expected construction");
    };
    assert_eq!(target, class);
    assert_eq!(ctor_args, vec![msg]);
    assert_eq!(t.type_of(args[0]), Some(Type::named("java.lang.Exception")));
    assert_eq!(t.type_of(raise), Some(Type::Unreachable));
}

#[test]
fn raise_honours_configured_default_exception() {
    let mut t = Tree::new();
    let raise = t.raise(vec![]);
    let root = t.script(vec![raise]);
    let config = InferenceConfig {
        default_exception: "java.lang.IllegalStateException".into(),
        ..InferenceConfig::default()
    };

    let out = infer_program_with(env(config), &mut t.ast, root).unwrap();
    assert!(out.env.errors().is_empty());
    let NodeKind::Raise { args } = t.ast.kind(raise).clone() else { unreachable!() };
    assert_eq!(t.type_of(args[0]), Some(Type::named("java.lang.IllegalStateException")));
}

// ---- rescue / ensure ----

#[test]
fn rescue_clause_shadows_local_only_inside_clause() {
    let mut t = Tree::new();
    let five = t.int(5);
    let assign = t.assign("e", five);
    let e_inside = t.local("e");
    let to_s = t.call(e_inside, "toString", vec![]);
    let clause = t.rescue_clause(&["Exception"], Some("e"), vec![to_s]);
    let one = t.int(1);
    let rescue = t.rescue(vec![one], vec![clause]);
    let e_after = t.local("e");
    let root = t.script(vec![assign, rescue, e_after]);

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    // The clause needed a second pass, so the shadow was installed and removed twice.
    assert_eq!(out.report.passes, 1);
    assert_eq!(t.type_of(e_inside), Some(Type::named("java.lang.Exception")));
    assert_eq!(t.type_of(e_after), Some(int()));
    assert_eq!(out.env.local_type(root, "e"), Some(int()));
    assert_eq!(t.type_of(clause), Some(string()));
    assert_eq!(t.type_of(rescue), Some(int()));
    assert!(t.ast.scope_locals(root).contains(&"e".to_string()));
}

#[test]
fn rescue_clause_without_types_binds_throwable() {
    let mut t = Tree::new();
    let e = t.local("err");
    let clause = t.rescue_clause(&[], Some("err"), vec![e]);
    let body = t.string("ok");
    let rescue = t.rescue(vec![body], vec![clause]);
    let root = t.script(vec![rescue]);

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    assert_eq!(t.type_of(e), Some(Type::named("java.lang.Throwable")));
    assert_eq!(t.type_of(rescue), Some(string()));
    assert_eq!(out.env.local_type(root, "err"), None);
}

#[test]
fn rescue_clause_with_several_types_binds_throwable() {
    let mut t = Tree::new();
    let e = t.local("err");
    let clause = t.rescue_clause(&["RuntimeException", "java.lang.Error"], Some("err"), vec![e]);
    let body = t.int(1);
    let rescue = t.rescue(vec![body], vec![clause]);
    let root = t.script(vec![rescue]);

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    assert_eq!(t.type_of(e), Some(Type::named("java.lang.Throwable")));
    assert_eq!(t.type_of(clause), Some(Type::named("java.lang.Throwable")));
    assert_eq!(t.type_of(rescue), Some(int()));
    assert_eq!(out.env.local_type(root, "err"), None);
}

#[test]
fn shadowed_local_is_restored_on_every_retry_of_a_clause() {
    let mut t = Tree::new();
    let e_inside = t.local("e");
    let to_s = t.call(e_inside, "toString", vec![]);
    let early = t.fcall("first", vec![]);
    let clause = t.rescue_clause(&["Exception"], Some("e"), vec![to_s, early]);
    let one = t.int(1);
    let rescue = t.rescue(vec![one], vec![clause]);
    let late = t.fcall("first", vec![]);
    let assign = t.assign("e", late);
    let e_after = t.local("e");
    let second_call = t.fcall("second", vec![]);
    let first = t.def("first", &[], None, vec![second_call]);
    let two = t.int(2);
    let second = t.def("second", &[], None, vec![two]);
    let root = t.script(vec![rescue, assign, e_after, first, second]);

    let mut env = infer_once(&mut t, root);
    assert!(env.is_deferred(clause));
    assert_eq!(env.local_type(root, "e"), None);

    let report = env.resolve(&mut t.ast, false).unwrap();
    assert!(env.errors().is_empty());
    // `first` is only learned during the first pass, so the clause runs a third time.
    assert_eq!(report.passes, 2);
    assert_eq!(report.final_state, ResolveState::Converged);
    assert_eq!(t.type_of(e_inside), Some(Type::named("java.lang.Exception")));
    assert_eq!(t.type_of(clause), Some(int()));
    assert_eq!(t.type_of(assign), Some(int()));
    assert_eq!(t.type_of(e_after), Some(int()));
    assert_eq!(env.local_type(root, "e"), Some(int()));
}

#[test]
fn rescue_clause_with_unknown_type_fails_after_cycle() {
    let mut t = Tree::new();
    let body = t.int(0);
    let clause = t.rescue_clause(&["NoSuchError"], None, vec![body]);
    let one = t.int(1);
    let rescue = t.rescue(vec![one], vec![clause]);
    let root = t.script(vec![rescue]);

    let out = infer(&mut t, root);
    assert_eq!(out.env.errors().len(), 1);
    assert_eq!(out.env.errors()[0].node, Some(clause));
    assert_eq!(out.env.errors()[0].message, "Could not infer typing for node");
    assert_eq!(t.type_of(clause), Some(Type::Error));
    assert_eq!(t.type_of(rescue), Some(int()));
    assert_eq!(out.report.extension_passes, 2);
}

#[test]
fn ensure_has_body_type() {
    let mut t = Tree::new();
    let one = t.int(1);
    let cleanup = t.string("cleanup");
    let ensure = t.ensure(vec![one], vec![cleanup]);
    let root = t.script(vec![ensure]);

    infer(&mut t, root);
    assert_eq!(t.type_of(ensure), Some(int()));
    assert_eq!(t.type_of(cleanup), Some(string()));
}

#[test]
fn ensure_clause_is_inferred_before_body() {
    let mut t = Tree::new();
    let x = t.local("x");
    let s = t.string("done");
    let assign = t.assign("x", s);
    let ensure = t.ensure(vec![x], vec![assign]);
    let root = t.script(vec![ensure]);

    let out = infer(&mut t, root);
    assert!(out.env.errors().is_empty());
    // The body reads a local the clause binds, so it only resolves without a pass if the clause ran first.
    assert_eq!(out.report.passes, 0);
    assert_eq!(t.type_of(x), Some(string()));
    assert_eq!(t.type_of(ensure), Some(string()));
}
