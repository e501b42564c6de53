use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::ast::{Ast, NodeId};
use crate::config::InferenceConfig;
use super::errors::InferenceError;
use super::infer::infer_node;
use super::methods::MethodTable;
use super::platform;
use super::plugin::{self, PluginRegistry};
use super::types::{Type, TypeDefinition, TypeHierarchy, TypeRef};

/// Owner of every binding produced during inference of one compilation unit:
/// known types, locals per scope, fields per class, method signatures, the
/// deferred worklist and the error list.
#[derive(Debug)]
pub struct Environment {
    known_types: HashMap<String, Type>,
    aliases: HashMap<String, String>,
    hierarchy: TypeHierarchy,
    user_types: HashSet<String>,
    self_type: Option<Type>,
    local_types: HashMap<NodeId, HashMap<String, Type>>,
    field_types: HashMap<Type, HashMap<String, Type>>,
    methods: MethodTable,
    /// Pending nodes, each with the `self` type in effect when it was deferred.
    pub(super) deferred: BTreeMap<NodeId, Option<Type>>,
    errors: Vec<InferenceError>,
    plugins: Arc<PluginRegistry>,
    config: InferenceConfig,
    pub(super) cycling: bool,
    pub(super) error_next: bool,
    pub(super) last_chance: bool,
}

impl Environment {
    /// Environment seeded with platform types, using the process-wide plugins.
    pub fn new(config: InferenceConfig) -> Self {
        Self::with_plugins(config, plugin::global())
    }

    pub fn with_plugins(config: InferenceConfig, plugins: Arc<PluginRegistry>) -> Self {
        let mut env = Self {
            known_types: HashMap::new(),
            aliases: HashMap::new(),
            hierarchy: TypeHierarchy::new(),
            user_types: HashSet::new(),
            self_type: None,
            local_types: HashMap::new(),
            field_types: HashMap::new(),
            methods: MethodTable::new(),
            deferred: BTreeMap::new(),
            errors: Vec::new(),
            plugins,
            config,
            cycling: false,
            error_next: false,
            last_chance: false,
        };
        platform::seed(&mut env);
        env
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    // ---- Types ----

    /// Look up a type by name. `"self"` names the ambient self type.
    pub fn known_type(&self, name: &str) -> Option<Type> {
        if name == "self" {
            return self.self_type.clone();
        }
        self.known_types.get(name).cloned()
    }

    /// Platform lookup by fully qualified name.
    pub fn type_by_name(&self, name: &str) -> Option<Type> {
        self.known_type(name)
    }

    pub fn learn_type(&mut self, name: &str, ty: Type) {
        self.known_types.insert(name.to_string(), ty);
    }

    pub(crate) fn register_definition(&mut self, def: TypeDefinition) -> Type {
        let ty = def.as_type();
        self.known_types.insert(def.name.clone(), ty.clone());
        self.hierarchy.define(def);
        ty
    }

    /// Create (or reuse) a type definition and evaluate `body` with it as the
    /// ambient self. The previous self is restored afterwards.
    pub fn define_type<R>(
        &mut self,
        name: &str,
        superclass: Option<Type>,
        interfaces: Vec<Type>,
        body: impl FnOnce(&mut Self, &Type) -> R,
    ) -> R {
        let ty = match self.hierarchy.get_mut(name) {
            Some(existing) => {
                if existing.superclass.is_none() {
                    existing.superclass = superclass;
                }
                for iface in interfaces {
                    if !existing.interfaces.contains(&iface) {
                        existing.interfaces.push(iface);
                    }
                }
                existing.as_type()
            }
            None => self.register_definition(TypeDefinition::new(name, superclass, interfaces)),
        };
        self.known_types.entry(name.to_string()).or_insert_with(|| ty.clone());
        self.user_types.insert(name.to_string());
        self.with_self_type(Some(ty.clone()), |env| body(env, &ty))
    }

    /// Whether `name` was introduced by `define_type` rather than the platform.
    pub fn is_user_defined(&self, name: &str) -> bool {
        self.user_types.contains(name)
    }

    pub fn self_type(&self) -> Option<&Type> {
        self.self_type.as_ref()
    }

    pub(super) fn set_self_type(&mut self, ty: Option<Type>) {
        self.self_type = ty;
    }

    /// Run `f` with `ty` bound as self, restoring the previous self on return.
    pub fn with_self_type<R>(&mut self, ty: Option<Type>, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = std::mem::replace(&mut self.self_type, ty);
        let result = f(self);
        self.self_type = saved;
        result
    }

    /// Make `short` a synonym for `long`, for both its instance and meta forms.
    pub fn alias_type(&mut self, short: &str, long: &str) {
        let target = self.known_types.get(long).cloned().unwrap_or_else(|| Type::named(long));
        self.known_types.insert(short.to_string(), target);
        self.aliases.insert(short.to_string(), long.to_string());
    }

    /// Replace an aliased name with the name it stands for, keeping the flags.
    pub fn expand(&self, ty: &Type) -> Type {
        match ty {
            Type::Named(r) => match self.aliases.get(&r.name) {
                Some(long) => Type::Named(TypeRef { name: long.clone(), ..r.clone() }),
                None => ty.clone(),
            },
            other => other.clone(),
        }
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    pub fn assignable_from(&self, target: &Type, source: &Type) -> bool {
        self.hierarchy.assignable_from(&self.expand(target), &self.expand(source))
    }

    pub fn compatible(&self, a: &Type, b: &Type) -> bool {
        self.narrow(a, b).is_some()
    }

    pub fn narrow(&self, a: &Type, b: &Type) -> Option<Type> {
        self.hierarchy.narrow(&self.expand(a), &self.expand(b))
    }

    /// An instance of the configured throwable root or one of its subclasses.
    pub fn is_throwable(&self, ty: &Type) -> bool {
        !ty.is_meta()
            && ty.is_reference()
            && self.assignable_from(&Type::named(self.config.throwable.clone()), ty)
    }

    /// A class reference (meta type) to a throwable class.
    pub fn is_throwable_class(&self, ty: &Type) -> bool {
        ty.is_meta() && self.is_throwable(&ty.unmeta())
    }

    // ---- Locals and fields ----

    /// Bind a local in `scope`. The first write wins: a later write with a
    /// different type leaves the original binding. Returns the bound type.
    pub fn learn_local_type(&mut self, scope: NodeId, name: &str, ty: Option<Type>) -> Option<Type> {
        let Some(ty) = ty else {
            return self.local_type(scope, name);
        };
        let bound = self
            .local_types
            .entry(scope)
            .or_default()
            .entry(name.to_string())
            .or_insert(ty);
        Some(bound.clone())
    }

    pub fn local_type(&self, scope: NodeId, name: &str) -> Option<Type> {
        self.local_types.get(&scope)?.get(name).cloned()
    }

    /// Temporarily rebind `name` in `scope` to `ty` while `f` runs. The prior
    /// binding, or its absence, is restored on every return path.
    pub fn with_shadowed_local<R>(
        &mut self,
        scope: NodeId,
        name: &str,
        ty: Type,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let locals = self.local_types.entry(scope).or_default();
        let previous = locals.insert(name.to_string(), ty);
        let result = f(self);
        let locals = self.local_types.entry(scope).or_default();
        match previous {
            Some(prev) => {
                locals.insert(name.to_string(), prev);
            }
            None => {
                locals.remove(name);
            }
        }
        result
    }

    pub fn learn_field_type(&mut self, class: &Type, name: &str, ty: Option<Type>) -> Option<Type> {
        let Some(ty) = ty else {
            return self.field_type(class, name);
        };
        let bound = self
            .field_types
            .entry(class.clone())
            .or_default()
            .entry(name.to_string())
            .or_insert(ty);
        Some(bound.clone())
    }

    pub fn field_type(&self, class: &Type, name: &str) -> Option<Type> {
        self.field_types.get(class)?.get(name).cloned()
    }

    // ---- Methods ----

    /// Record a method signature under both the literal and the alias-expanded
    /// parameter types so that lookups under either spelling succeed.
    pub fn learn_method_type(&mut self, target: &Type, name: &str, params: &[Type], ty: Type) -> Type {
        self.methods.learn(target, name, params, ty.clone());
        let expanded_target = self.expand(target);
        let expanded: Vec<Type> = params.iter().map(|p| self.expand(p)).collect();
        if expanded_target != *target || expanded.as_slice() != params {
            self.methods.learn(&expanded_target, name, &expanded, ty.clone());
        }
        ty
    }

    /// Resolve the return type of `target.name(params)`.
    ///
    /// An error target or parameter yields the error type without reporting.
    /// `new` on a class is redirected to `initialize` on its instances and
    /// yields the instance type. Plugins are only consulted while a
    /// resolution cycle is active.
    pub fn method_type(&self, target: &Type, name: &str, params: &[Type]) -> Option<Type> {
        if target.is_error() || params.iter().any(Type::is_error) {
            return Some(Type::Error);
        }
        let constructor = name == "new" && target.is_meta();
        let (target_ty, method_name) = if constructor {
            (target.unmeta(), "initialize")
        } else {
            (target.clone(), name)
        };

        let found = self
            .methods
            .lookup(&target_ty, method_name, params)
            .cloned()
            .or_else(|| {
                let expanded: Vec<Type> = params.iter().map(|p| self.expand(p)).collect();
                self.methods.lookup(&self.expand(&target_ty), method_name, &expanded).cloned()
            })
            .or_else(|| {
                if self.cycling {
                    self.plugins.resolve(self, &target_ty, method_name, params)
                } else {
                    None
                }
            })?;

        if constructor && !found.is_error() {
            Some(target_ty)
        } else {
            Some(found)
        }
    }

    pub fn method_names(&self, target: &Type) -> Vec<String> {
        self.methods.method_names(target)
    }

    // ---- Inference boundary ----

    /// Infer one node. Already-resolved nodes return their cached type without
    /// touching the environment. Any error raised by the node's rule is
    /// recorded here and the node is resolved to the error type.
    pub fn infer(&mut self, ast: &mut Ast, id: NodeId) -> Option<Type> {
        if ast.is_resolved(id) {
            return ast.inferred_type(id).cloned();
        }
        tracing::trace!(node = %id, kind = %ast.describe(id), "infer");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| infer_node(self, ast, id)));
        let err = match outcome {
            Ok(Ok(ty)) => {
                return if ast.is_resolved(id) { ast.inferred_type(id).cloned() } else { ty };
            }
            Ok(Err(err)) => err,
            Err(payload) => {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                InferenceError::new("internal error during inference").with_trace(detail)
            }
        };

        let err = if err.node.is_none() { err.at(Some(id), ast.span(id)) } else { err };
        tracing::debug!(node = %id, message = %err.message, "inference error");
        self.errors.push(err);
        self.deferred.remove(&id);
        Some(ast.resolve(id, Type::Error))
    }

    /// Postpone a node until the next resolution pass, remembering the current
    /// self type. While an error-forcing pass is active the first deferral is
    /// turned into an error instead.
    pub fn defer(&mut self, ast: &mut Ast, id: NodeId) {
        if ast.is_resolved(id) {
            return;
        }
        if self.error_next {
            self.error_next = false;
            tracing::warn!(node = %id, kind = %ast.describe(id), "forcing deferred node to fail");
            self.errors.push(
                InferenceError::new("Could not infer typing for node").at(Some(id), ast.span(id)),
            );
            self.deferred.remove(&id);
            ast.resolve(id, Type::Error);
            return;
        }
        if !self.deferred.contains_key(&id) {
            tracing::trace!(node = %id, kind = %ast.describe(id), "deferring");
            self.deferred.insert(id, self.self_type.clone());
        }
    }

    pub fn is_deferred(&self, id: NodeId) -> bool {
        self.deferred.contains_key(&id)
    }

    pub fn deferred_nodes(&self) -> Vec<NodeId> {
        self.deferred.keys().copied().collect()
    }

    pub fn errors(&self) -> &[InferenceError] {
        &self.errors
    }

    pub(super) fn push_error(&mut self, err: InferenceError) {
        self.errors.push(err);
    }

    pub fn has_error_for(&self, id: NodeId) -> bool {
        self.errors.iter().any(|e| e.node == Some(id))
    }

    pub fn is_cycling(&self) -> bool {
        self.cycling
    }

    /// Set once the resolver has stalled; rules may then fall back to defaults.
    pub fn last_chance(&self) -> bool {
        self.last_chance
    }
}
