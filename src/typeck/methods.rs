use std::collections::HashMap;

use super::types::Type;

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<Type, TrieNode>,
    returns: Option<Type>,
}

/// Method signatures keyed by target type, name, arity and then the ordered
/// parameter types. The terminal node holds the return type.
#[derive(Debug, Default)]
pub struct MethodTable {
    targets: HashMap<Type, HashMap<String, HashMap<usize, TrieNode>>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signature. A later learn of the same signature overwrites the return type.
    pub fn learn(&mut self, target: &Type, name: &str, params: &[Type], returns: Type) {
        let mut node = self
            .targets
            .entry(target.clone())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .entry(params.len())
            .or_default();
        for param in params {
            node = node.children.entry(param.clone()).or_default();
        }
        node.returns = Some(returns);
    }

    pub fn lookup(&self, target: &Type, name: &str, params: &[Type]) -> Option<&Type> {
        let mut node = self.targets.get(target)?.get(name)?.get(&params.len())?;
        for param in params {
            node = node.children.get(param)?;
        }
        node.returns.as_ref()
    }

    /// Names of every method known on `target`, sorted.
    pub fn method_names(&self, target: &Type) -> Vec<String> {
        let mut names: Vec<String> = self
            .targets
            .get(target)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
