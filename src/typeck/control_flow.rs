//! Inference for conditionals, loops, jumps and exception handling.

use crate::ast::{Ast, NodeId, NodeKind};
use super::env::Environment;
use super::errors::{InferResult, InferenceError};
use super::infer::settle;
use super::types::Type;

/// Infer a branch predicate. Anything that is not already a boolean is
/// rewritten in place into `predicate != nil`.
pub(super) fn infer_condition(env: &mut Environment, ast: &mut Ast, id: NodeId, predicate: NodeId) -> InferResult {
    let Some(ty) = env.infer(ast, predicate) else {
        env.defer(ast, id);
        return Ok(None);
    };
    if ty.is_boolean() || ty.is_error() {
        let settled = ast.is_resolved(predicate);
        return settle(env, ast, id, Some(ty), settled);
    }

    let span = ast.span(predicate);
    let comparison = ast.build(Some(id), span, |ast, call| {
        ast.reparent(predicate, call);
        let null = ast.leaf(Some(call), span, NodeKind::Null);
        NodeKind::Call { target: predicate, name: "!=".to_string(), args: vec![null] }
    });
    tracing::trace!(node = %id, predicate_type = %ty, "rewrote condition into null check");
    ast.set_kind(id, NodeKind::Condition { predicate: comparison });

    let ty = env.infer(ast, comparison);
    let settled = ast.is_resolved(comparison);
    settle(env, ast, id, ty, settled)
}

pub(super) fn infer_if(
    env: &mut Environment,
    ast: &mut Ast,
    id: NodeId,
    condition: NodeId,
    then_branch: Option<NodeId>,
    else_branch: Option<NodeId>,
) -> InferResult {
    let condition_ty = env.infer(ast, condition);
    if condition_ty.is_none() {
        // The branches do not depend on the condition's type.
        env.defer(ast, condition);
    }

    let then_ty = then_branch.map(|b| env.infer(ast, b));
    let else_ty = else_branch.map(|b| env.infer(ast, b));

    let ty = match (then_ty, else_ty) {
        (Some(Some(then_ty)), Some(Some(else_ty))) => match env.narrow(&then_ty, &else_ty) {
            Some(ty) => ty,
            None => {
                return Err(InferenceError::new(format!(
                    "if statement with incompatible result types ({then_ty} and {else_ty})"
                )));
            }
        },
        (Some(Some(ty)), None) | (None, Some(Some(ty))) => ty,
        // One branch known: adopt it for now and come back for the other.
        (Some(Some(ty)), Some(None)) | (Some(None), Some(Some(ty))) => ty,
        (None, None) => Type::NoType,
        (Some(None), _) | (_, Some(None)) => {
            env.defer(ast, id);
            return Ok(None);
        }
    };

    let settled = condition_ty.is_some()
        && then_branch.iter().chain(else_branch.iter()).all(|b| ast.is_resolved(*b));
    if settled {
        return Ok(Some(ast.resolve(id, ty)));
    }
    ast.set_speculative(id, ty.clone());
    env.defer(ast, id);
    Ok(Some(ty))
}

/// Loops have five optional slots: init, condition, pre-body, body, post-body.
/// A missing slot counts as known. The loop itself is a statement and types as void.
pub(super) fn infer_loop(env: &mut Environment, ast: &mut Ast, id: NodeId, slots: [Option<NodeId>; 5]) -> InferResult {
    let mut complete = true;
    for slot in slots {
        let ty = match slot {
            Some(node) => env.infer(ast, node),
            None => Some(Type::NoType),
        };
        complete &= ty.is_some();
    }
    settle(env, ast, id, complete.then_some(Type::Void), true)
}

pub(super) fn infer_return(env: &mut Environment, ast: &mut Ast, id: NodeId, value: Option<NodeId>) -> InferResult {
    let Some(value) = value else {
        return Ok(Some(ast.resolve(id, Type::NoType)));
    };
    let ty = env.infer(ast, value);
    // A type alone is not enough while something inside the value is still pending.
    let settled = ast.is_resolved(value);
    settle(env, ast, id, ty, settled)
}

/// `raise` always types as unreachable. Anything other than a single
/// throwable instance is rewritten into an explicit exception construction.
pub(super) fn infer_raise(env: &mut Environment, ast: &mut Ast, id: NodeId, args: &[NodeId]) -> InferResult {
    if let [arg] = args {
        let Some(ty) = env.infer(ast, *arg) else {
            env.defer(ast, id);
            return Ok(None);
        };
        if env.is_throwable(&ty) || ty.is_error() {
            let settled = ast.is_resolved(*arg);
            return settle(env, ast, id, Some(Type::Unreachable), settled);
        }
    }

    let mut arg_types = Vec::with_capacity(args.len());
    for &arg in args {
        arg_types.push(env.infer(ast, arg));
    }
    if arg_types.first().is_some_and(Option::is_none) {
        env.defer(ast, id);
        return Ok(None);
    }

    let explicit_class = matches!(arg_types.first(), Some(Some(ty)) if env.is_throwable_class(ty));
    let (class_node, constructor_args) = if explicit_class {
        (Some(args[0]), args[1..].to_vec())
    } else {
        (None, args.to_vec())
    };
    let default_exception = env.config().default_exception.clone();
    let span = ast.span(id);
    let construct = ast.build(Some(id), span, |ast, call| {
        let target = match class_node {
            Some(node) => {
                ast.reparent(node, call);
                node
            }
            None => ast.leaf(Some(call), span, NodeKind::Constant { name: default_exception.clone() }),
        };
        for &arg in &constructor_args {
            ast.reparent(arg, call);
        }
        NodeKind::Call { target, name: "new".to_string(), args: constructor_args }
    });
    tracing::trace!(node = %id, class = %default_exception, explicit_class, "rewrote raise into construction");
    ast.set_kind(id, NodeKind::Raise { args: vec![construct] });

    let ty = env.infer(ast, construct).map(|_| Type::Unreachable);
    let settled = ast.is_resolved(construct);
    settle(env, ast, id, ty, settled)
}

/// A `rescue` clause. A bound exception name shadows any local of the same name
/// for the duration of the clause body only.
pub(super) fn infer_rescue_clause(
    env: &mut Environment,
    ast: &mut Ast,
    id: NodeId,
    types: &[String],
    name: Option<&str>,
    body: NodeId,
) -> InferResult {
    let mut exception_types = Vec::with_capacity(types.len());
    for type_name in types {
        let Some(ty) = env.known_type(type_name) else {
            env.defer(ast, id);
            return Ok(None);
        };
        exception_types.push(ty);
    }

    let ty = match name {
        Some(name) => {
            let scope = ast.scope_for(id);
            ast.declare_local(scope, name);
            let bound = match exception_types.as_slice() {
                [single] => single.clone(),
                _ => Type::named(env.config().throwable.clone()),
            };
            env.with_shadowed_local(scope, name, bound, |env| env.infer(ast, body))
        }
        None => env.infer(ast, body),
    };
    let settled = ast.is_resolved(body);
    settle(env, ast, id, ty, settled)
}

/// The protected body's type is the expression's type; clause types are only
/// required to be known, not to agree with it.
pub(super) fn infer_rescue(env: &mut Environment, ast: &mut Ast, id: NodeId, body: NodeId, clauses: &[NodeId]) -> InferResult {
    let body_ty = env.infer(ast, body);
    let mut clauses_known = true;
    for &clause in clauses {
        clauses_known &= env.infer(ast, clause).is_some();
    }
    settle(env, ast, id, body_ty, clauses_known)
}

pub(super) fn infer_ensure(env: &mut Environment, ast: &mut Ast, id: NodeId, body: NodeId, clause: NodeId) -> InferResult {
    env.infer(ast, clause);
    let ty = env.infer(ast, body);
    settle(env, ast, id, ty, true)
}
