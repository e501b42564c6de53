use std::collections::{HashMap, HashSet};

use super::platform::{OBJECT, PRIMITIVES};

/// A type as seen by inference. Identity of a named type is name + array flag +
/// meta flag, where meta means "the class itself" rather than an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Type {
    /// A contradiction was already reported for this value. Absorbs lookups.
    Error,
    /// The type of the null literal.
    Null,
    /// Neutral marker for an absent or empty slot.
    NoType,
    /// Control never completes normally (e.g. after a raise).
    Unreachable,
    Void,
    Named(TypeRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TypeRef {
    pub name: String,
    pub array: bool,
    pub meta: bool,
}

impl Type {
    pub fn named(name: impl Into<String>) -> Self {
        Type::Named(TypeRef { name: name.into(), array: false, meta: false })
    }

    pub fn array_of(name: impl Into<String>) -> Self {
        Type::Named(TypeRef { name: name.into(), array: true, meta: false })
    }

    /// The class-object form of this type. Sentinels have no meta form.
    pub fn meta(&self) -> Type {
        match self {
            Type::Named(r) => Type::Named(TypeRef { meta: true, ..r.clone() }),
            other => other.clone(),
        }
    }

    pub fn unmeta(&self) -> Type {
        match self {
            Type::Named(r) => Type::Named(TypeRef { meta: false, ..r.clone() }),
            other => other.clone(),
        }
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, Type::Named(r) if r.meta)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Named(r) if r.array)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Type::Named(r) => Some(&r.name),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        match self {
            Type::Named(r) => !r.array && !r.meta && PRIMITIVES.contains(&r.name.as_str()),
            _ => false,
        }
    }

    /// Non-primitive named types, including arrays and class objects.
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Named(_)) && !self.is_primitive()
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Named(r) if r.name == "boolean" && !r.array && !r.meta)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Error => write!(f, "error"),
            Type::Null => write!(f, "null"),
            Type::NoType => write!(f, "notype"),
            Type::Unreachable => write!(f, "unreachable"),
            Type::Void => write!(f, "void"),
            Type::Named(r) => {
                if r.meta {
                    write!(f, "meta ")?;
                }
                write!(f, "{}", r.name)?;
                if r.array {
                    write!(f, "[]")?;
                }
                Ok(())
            }
        }
    }
}

/// A user-defined or platform type: name, superclass and interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    pub name: String,
    pub superclass: Option<Type>,
    pub interfaces: Vec<Type>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, superclass: Option<Type>, interfaces: Vec<Type>) -> Self {
        Self { name: name.into(), superclass, interfaces }
    }

    pub fn as_type(&self) -> Type {
        Type::named(self.name.clone())
    }
}

// Java widening conversions between primitives.
const WIDENING: &[(&str, &[&str])] = &[
    ("byte", &["short", "int", "long", "float", "double"]),
    ("short", &["int", "long", "float", "double"]),
    ("char", &["int", "long", "float", "double"]),
    ("int", &["long", "float", "double"]),
    ("long", &["float", "double"]),
    ("float", &["double"]),
];

/// The subtyping relation over every definition the environment knows about.
#[derive(Debug, Default)]
pub struct TypeHierarchy {
    defs: HashMap<String, TypeDefinition>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, def: TypeDefinition) {
        self.defs.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.defs.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TypeDefinition> {
        self.defs.get_mut(name)
    }

    pub fn superclass_of(&self, name: &str) -> Option<String> {
        let declared = self
            .defs
            .get(name)
            .and_then(|def| def.superclass.as_ref())
            .and_then(|t| t.name());
        match declared {
            Some(sup) => Some(sup.to_string()),
            None if name != OBJECT => Some(OBJECT.to_string()),
            None => None,
        }
    }

    /// True if `sub` names `sup` or any transitive superclass/interface of it.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == OBJECT {
            return true;
        }
        let mut seen = HashSet::new();
        let mut work = vec![sub.to_string()];
        while let Some(name) = work.pop() {
            if name == sup {
                return true;
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(def) = self.defs.get(&name) {
                work.extend(
                    def.superclass
                        .iter()
                        .chain(def.interfaces.iter())
                        .filter_map(|t| t.name())
                        .map(str::to_string),
                );
            }
        }
        false
    }

    /// Whether a value of type `source` may be stored where `target` is expected.
    pub fn assignable_from(&self, target: &Type, source: &Type) -> bool {
        if target == source {
            return true;
        }
        match (target, source) {
            (Type::Error, _) | (_, Type::Error) | (_, Type::Unreachable) => true,
            (_, Type::Null) => target.is_reference(),
            (Type::Named(t), Type::Named(s)) => {
                if t.meta != s.meta || t.array != s.array {
                    return false;
                }
                let t_prim = PRIMITIVES.contains(&t.name.as_str());
                let s_prim = PRIMITIVES.contains(&s.name.as_str());
                match (t_prim, s_prim) {
                    (true, true) if !t.array => WIDENING
                        .iter()
                        .any(|(from, to)| *from == s.name && to.contains(&t.name.as_str())),
                    (false, false) => self.is_subtype(&s.name, &t.name),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    pub fn compatible(&self, a: &Type, b: &Type) -> bool {
        self.narrow(a, b).is_some()
    }

    /// The most specific common supertype of two types, or None when they
    /// have no usable common type (e.g. two unrelated primitives).
    pub fn narrow(&self, a: &Type, b: &Type) -> Option<Type> {
        match (a, b) {
            (Type::Error, _) | (_, Type::Error) => return Some(Type::Error),
            (Type::Unreachable, other) | (other, Type::Unreachable) => return Some(other.clone()),
            (Type::NoType, other) | (other, Type::NoType) => return Some(other.clone()),
            (Type::Void, _) | (_, Type::Void) => return Some(Type::Void),
            _ => {}
        }
        if self.assignable_from(a, b) {
            return Some(a.clone());
        }
        if self.assignable_from(b, a) {
            return Some(b.clone());
        }
        match (a, b) {
            (Type::Named(ar), Type::Named(br))
                if a.is_reference() && b.is_reference() && !ar.array && !br.array && ar.meta == br.meta =>
            {
                let mut seen = HashSet::new();
                let mut current = self.superclass_of(&ar.name);
                while let Some(name) = current {
                    if !seen.insert(name.clone()) {
                        break;
                    }
                    let candidate = Type::Named(TypeRef { name: name.clone(), array: false, meta: ar.meta });
                    if self.assignable_from(&candidate, b) {
                        return Some(candidate);
                    }
                    current = self.superclass_of(&name);
                }
                Some(Type::Named(TypeRef { name: OBJECT.to_string(), array: false, meta: ar.meta }))
            }
            _ => None,
        }
    }
}
