use std::sync::{Arc, OnceLock};

use crate::diagnostics::CompileError;
use super::env::Environment;
use super::platform::STRING;
use super::types::Type;

/// External method-type resolver consulted when the environment's own
/// signature table misses during an active resolution cycle.
pub trait MethodPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn method_type(&self, env: &Environment, target: &Type, name: &str, params: &[Type]) -> Option<Type>;
}

/// Ordered plugin list. The first plugin returning a type wins.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn MethodPlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.plugins.iter().map(|p| p.name())).finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding just the platform plugin.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PlatformPlugin));
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn MethodPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn resolve(&self, env: &Environment, target: &Type, name: &str, params: &[Type]) -> Option<Type> {
        self.plugins.iter().find_map(|plugin| {
            let found = plugin.method_type(env, target, name, params)?;
            tracing::debug!(plugin = plugin.name(), %target, name, %found, "plugin resolved method");
            Some(found)
        })
    }
}

static GLOBAL: OnceLock<Arc<PluginRegistry>> = OnceLock::new();

/// Install the process-wide registry. Must happen before the first call to
/// [`global`]; a second install is rejected.
pub fn install_global(registry: PluginRegistry) -> Result<(), CompileError> {
    GLOBAL
        .set(Arc::new(registry))
        .map_err(|_| CompileError::plugin("plugin registry already installed"))
}

/// The process-wide registry, defaulting to the platform plugin.
pub fn global() -> Arc<PluginRegistry> {
    GLOBAL.get_or_init(|| Arc::new(PluginRegistry::with_defaults())).clone()
}

/// Resolves methods every platform object has, plus throwable constructors.
pub struct PlatformPlugin;

impl MethodPlugin for PlatformPlugin {
    fn name(&self) -> &str {
        "platform"
    }

    fn method_type(&self, env: &Environment, target: &Type, name: &str, params: &[Type]) -> Option<Type> {
        let boolean = Type::named("boolean");
        match (name, params) {
            ("==" | "!=", [_]) => Some(boolean),
            ("initialize", _) if env.is_throwable(target) => {
                let string = Type::named(STRING);
                let throwable = Type::named(env.config().throwable.clone());
                let accepted = match params {
                    [] => true,
                    [msg] => env.assignable_from(&string, msg),
                    [msg, cause] => env.assignable_from(&string, msg) && env.assignable_from(&throwable, cause),
                    _ => false,
                };
                accepted.then_some(Type::Void)
            }
            ("toString", []) if target.is_reference() => Some(Type::named(STRING)),
            ("hashCode", []) if target.is_reference() => Some(Type::named("int")),
            ("equals", [other]) if target.is_reference() && (other.is_reference() || *other == Type::Null) => {
                Some(boolean)
            }
            _ => None,
        }
    }
}
