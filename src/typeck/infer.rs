use crate::ast::{Ast, NodeId, NodeKind, Param};
use super::control_flow;
use super::env::Environment;
use super::errors::{InferResult, InferenceError};
use super::platform::STRING;
use super::types::Type;

/// Per-variant inference. Called only through `Environment::infer`, which
/// handles already-resolved nodes and converts errors into recorded state.
pub(super) fn infer_node(env: &mut Environment, ast: &mut Ast, id: NodeId) -> InferResult {
    let kind = ast.kind(id).clone();
    match kind {
        NodeKind::Script { body } => infer_script(env, ast, id, body),
        NodeKind::Body { children } => infer_body(env, ast, id, &children),
        NodeKind::Noop => Ok(Some(ast.resolve(id, Type::NoType))),
        NodeKind::Fixnum(_) => Ok(Some(ast.resolve(id, Type::named("int")))),
        NodeKind::Float(_) => Ok(Some(ast.resolve(id, Type::named("double")))),
        NodeKind::Str(_) => Ok(Some(ast.resolve(id, Type::named(STRING)))),
        NodeKind::Boolean(_) => Ok(Some(ast.resolve(id, Type::named("boolean")))),
        NodeKind::Null => Ok(Some(ast.resolve(id, Type::Null))),
        NodeKind::Local { name } => infer_local(env, ast, id, &name),
        NodeKind::LocalAssignment { name, value } => infer_local_assignment(env, ast, id, &name, value),
        NodeKind::FieldAccess { name } => infer_field_access(env, ast, id, &name),
        NodeKind::FieldAssignment { name, value } => infer_field_assignment(env, ast, id, &name, value),
        NodeKind::Constant { name } => infer_constant(env, ast, id, &name),
        NodeKind::Call { target, name, args } => infer_call(env, ast, id, Some(target), &name, &args),
        NodeKind::FunctionalCall { name, args } => infer_call(env, ast, id, None, &name, &args),
        NodeKind::MethodDefinition { name, params, return_type, body, is_static } => {
            infer_method_definition(env, ast, id, &name, &params, return_type.as_deref(), body, is_static)
        }
        NodeKind::ClassDefinition { name, superclass, interfaces, body } => {
            infer_class_definition(env, ast, id, &name, superclass.as_deref(), &interfaces, body)
        }
        NodeKind::Condition { predicate } => control_flow::infer_condition(env, ast, id, predicate),
        NodeKind::If { condition, then_branch, else_branch } => {
            control_flow::infer_if(env, ast, id, condition, then_branch, else_branch)
        }
        NodeKind::Loop { init, condition, pre, body, post, .. } => {
            control_flow::infer_loop(env, ast, id, [init, condition, pre, body, post])
        }
        NodeKind::Return { value } => control_flow::infer_return(env, ast, id, value),
        NodeKind::Break | NodeKind::Next | NodeKind::Redo => Ok(Some(ast.resolve(id, Type::Void))),
        NodeKind::Raise { args } => control_flow::infer_raise(env, ast, id, &args),
        NodeKind::RescueClause { types, name, body } => {
            control_flow::infer_rescue_clause(env, ast, id, &types, name.as_deref(), body)
        }
        NodeKind::Rescue { body, clauses } => control_flow::infer_rescue(env, ast, id, body, &clauses),
        NodeKind::Ensure { body, clause } => control_flow::infer_ensure(env, ast, id, body, clause),
    }
}

/// Resolve `id` with `ty` once it is known and `settled` holds; otherwise defer it.
pub(super) fn settle(env: &mut Environment, ast: &mut Ast, id: NodeId, ty: Option<Type>, settled: bool) -> InferResult {
    match ty {
        Some(ty) if settled => Ok(Some(ast.resolve(id, ty))),
        _ => {
            env.defer(ast, id);
            Ok(None)
        }
    }
}

/// Look up a named type, deferring `id` when it is not known yet.
fn require_type(env: &mut Environment, ast: &mut Ast, id: NodeId, name: &str) -> Option<Type> {
    let found = env.known_type(name);
    if found.is_none() {
        env.defer(ast, id);
    }
    found
}

fn infer_script(env: &mut Environment, ast: &mut Ast, id: NodeId, body: NodeId) -> InferResult {
    let ty = env.infer(ast, body);
    let settled = ast.is_resolved(body);
    settle(env, ast, id, ty, settled)
}

fn infer_body(env: &mut Environment, ast: &mut Ast, id: NodeId, children: &[NodeId]) -> InferResult {
    let mut last = Some(Type::NoType);
    let mut settled = true;
    for &child in children {
        last = env.infer(ast, child);
        settled &= last.is_some() && ast.is_resolved(child);
    }
    if settled {
        return Ok(last.map(|ty| ast.resolve(id, ty)));
    }
    // Report the last child's type even while an earlier child is pending so
    // enclosing definitions can make progress.
    if let Some(ty) = &last {
        ast.set_speculative(id, ty.clone());
    }
    env.defer(ast, id);
    Ok(last)
}

fn infer_local(env: &mut Environment, ast: &mut Ast, id: NodeId, name: &str) -> InferResult {
    let scope = ast.scope_for(id);
    let ty = env.local_type(scope, name);
    settle(env, ast, id, ty, true)
}

fn infer_local_assignment(env: &mut Environment, ast: &mut Ast, id: NodeId, name: &str, value: NodeId) -> InferResult {
    let scope = ast.scope_for(id);
    ast.declare_local(scope, name);
    let value_ty = env.infer(ast, value);
    let bound = env.learn_local_type(scope, name, value_ty);
    let settled = ast.is_resolved(value);
    settle(env, ast, id, bound, settled)
}

fn infer_field_access(env: &mut Environment, ast: &mut Ast, id: NodeId, name: &str) -> InferResult {
    let Some(self_ty) = env.self_type().cloned() else {
        return Err(InferenceError::new(format!("field '@{name}' used outside of any type")));
    };
    let ty = env.field_type(&self_ty, name);
    settle(env, ast, id, ty, true)
}

fn infer_field_assignment(env: &mut Environment, ast: &mut Ast, id: NodeId, name: &str, value: NodeId) -> InferResult {
    let Some(self_ty) = env.self_type().cloned() else {
        return Err(InferenceError::new(format!("field '@{name}' assigned outside of any type")));
    };
    let value_ty = env.infer(ast, value);
    let bound = env.learn_field_type(&self_ty, name, value_ty);
    let settled = ast.is_resolved(value);
    settle(env, ast, id, bound, settled)
}

fn infer_constant(env: &mut Environment, ast: &mut Ast, id: NodeId, name: &str) -> InferResult {
    let ty = env.known_type(name).map(|t| t.meta());
    settle(env, ast, id, ty, true)
}

fn infer_call(
    env: &mut Environment,
    ast: &mut Ast,
    id: NodeId,
    target: Option<NodeId>,
    name: &str,
    args: &[NodeId],
) -> InferResult {
    let target_ty = match target {
        Some(target) => env.infer(ast, target),
        None => match env.self_type() {
            Some(ty) => Some(ty.clone()),
            None => return Err(InferenceError::new(format!("call to '{name}' has no receiver in scope"))),
        },
    };
    let mut params = Vec::with_capacity(args.len());
    for &arg in args {
        params.push(env.infer(ast, arg));
    }
    let (Some(target_ty), Some(params)) = (target_ty, params.into_iter().collect::<Option<Vec<_>>>()) else {
        env.defer(ast, id);
        return Ok(None);
    };

    if let Some(ty) = env.method_type(&target_ty, name, &params) {
        return Ok(Some(ast.resolve(id, ty)));
    }

    // A user class with no constructor gets the implicit no-argument one, but
    // only once nothing else can make progress.
    let implicit_constructor = name == "new"
        && params.is_empty()
        && target_ty.is_meta()
        && env.last_chance()
        && target_ty.name().is_some_and(|n| env.is_user_defined(n));
    if implicit_constructor {
        let instance = target_ty.unmeta();
        tracing::debug!(class = %instance, "assuming default constructor");
        env.learn_method_type(&instance, "initialize", &[], Type::Void);
        return Ok(Some(ast.resolve(id, instance)));
    }

    env.defer(ast, id);
    Ok(None)
}

#[allow(clippy::too_many_arguments)]
fn infer_method_definition(
    env: &mut Environment,
    ast: &mut Ast,
    id: NodeId,
    name: &str,
    params: &[Param],
    return_type: Option<&str>,
    body: NodeId,
    is_static: bool,
) -> InferResult {
    let Some(self_ty) = env.self_type().cloned() else {
        return Err(InferenceError::new(format!("method '{name}' defined outside of any type")));
    };
    let target = if is_static { self_ty.meta() } else { self_ty };

    let mut param_types = Vec::with_capacity(params.len());
    for param in params {
        let Some(ty) = require_type(env, ast, id, &param.type_name) else {
            return Ok(None);
        };
        param_types.push(ty);
    }
    for (param, ty) in params.iter().zip(&param_types) {
        ast.declare_local(id, &param.name);
        env.learn_local_type(id, &param.name, Some(ty.clone()));
    }

    let declared = match return_type {
        Some(type_name) => {
            let Some(ty) = require_type(env, ast, id, type_name) else {
                return Ok(None);
            };
            // Known up front, so calls elsewhere (including recursive ones) resolve immediately.
            env.learn_method_type(&target, name, &param_types, ty.clone());
            Some(ty)
        }
        None => None,
    };

    let body_ty = env.with_self_type(Some(target.clone()), |env| env.infer(ast, body));
    let returns = match (declared, body_ty) {
        (Some(declared), _) => Some(declared),
        (None, Some(ty)) => {
            let ty = if ty == Type::NoType { Type::Void } else { ty };
            // Possibly speculative; relearned on the next pass if the body changes its mind.
            env.learn_method_type(&target, name, &param_types, ty.clone());
            Some(ty)
        }
        (None, None) => None,
    };

    if returns.is_some() && ast.is_resolved(body) {
        return Ok(returns.map(|ty| ast.resolve(id, ty)));
    }
    env.defer(ast, id);
    Ok(returns)
}

fn infer_class_definition(
    env: &mut Environment,
    ast: &mut Ast,
    id: NodeId,
    name: &str,
    superclass: Option<&str>,
    interfaces: &[String],
    body: NodeId,
) -> InferResult {
    let superclass = match superclass {
        Some(sup) => match require_type(env, ast, id, sup) {
            Some(ty) => Some(ty),
            None => return Ok(None),
        },
        None => None,
    };
    let mut iface_types = Vec::with_capacity(interfaces.len());
    for iface in interfaces {
        let Some(ty) = require_type(env, ast, id, iface) else {
            return Ok(None);
        };
        iface_types.push(ty);
    }

    let (ty, body_ty) = env.define_type(name, superclass, iface_types, |env, ty| {
        (ty.clone(), env.infer(ast, body))
    });
    let settled = ast.is_resolved(body);
    settle(env, ast, id, body_ty.map(|_| ty), settled)
}
