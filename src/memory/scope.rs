//! Lexical scopes
//!
//! Scopes live in an arena keyed by [`ScopeId`] and point at their parent by
//! id. The general scope (id 0) is the root; every other scope has exactly one
//! parent fixed at creation. Parent links are weak: if a parent has been
//! dropped, resolution simply stops there.
//!
//! # Shadowing
//!
//! Declaring a name always creates (or replaces) a binding in the declaring
//! scope. Assigning to a name mutates the binding where it is owned, so a
//! child changing a parent's variable is visible after the child exits,
//! while a child's own declaration never touches the parent's.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use super::value::{Value, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// The root scope owning the instruction log
pub const GENERAL_SCOPE: ScopeId = ScopeId(0);

/// What created a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    General,
    Block,
    Function,
    Loop,
    /// Persistent captured environment of a closure
    Closure,
    Event,
    Trigger,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScopeError {
    #[error("unresolved variable '{name}'")]
    Unresolved { name: String },

    #[error("scope {0:?} does not exist")]
    MissingScope(ScopeId),

    #[error("variable '{name}' holds a {expected}, cannot store a {got}")]
    TypeMismatch {
        name: String,
        expected: ValueKind,
        got: ValueKind,
    },
}

/// A named binding
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub declared_in: ScopeId,
    /// Kind of the first non-Error value stored
    pub ty: Option<ValueKind>,
    pub value: Value,
}

impl Variable {
    fn new(name: &str, declared_in: ScopeId, value: Value) -> Self {
        Variable {
            name: name.to_string(),
            declared_in,
            ty: Self::kind_of(&value),
            value,
        }
    }

    fn kind_of(value: &Value) -> Option<ValueKind> {
        match value {
            Value::Error(_) | Value::Unit => None,
            other => Some(other.kind()),
        }
    }

    /// Whether the binding currently holds an Error
    pub fn is_corrupted(&self) -> bool {
        self.value.is_error()
    }

    fn store(&mut self, value: Value) -> Result<(), ScopeError> {
        if let (Some(expected), Some(got)) = (self.ty, Self::kind_of(&value)) {
            if expected != got {
                return Err(ScopeError::TypeMismatch {
                    name: self.name.clone(),
                    expected,
                    got,
                });
            }
        }
        if self.ty.is_none() {
            self.ty = Self::kind_of(&value);
        }
        self.value = value;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    bindings: FxHashMap<String, Variable>,
    order: Vec<String>, // Declaration order, for deterministic capture
    children: Vec<ScopeId>,
}

impl Scope {
    fn new(id: ScopeId, parent: Option<ScopeId>, kind: ScopeKind) -> Self {
        Scope {
            id,
            parent,
            kind,
            bindings: FxHashMap::default(),
            order: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.bindings.get(name)
    }

    /// Bindings in declaration order
    pub fn bindings(&self) -> impl Iterator<Item = &Variable> {
        self.order.iter().filter_map(|name| self.bindings.get(name))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Arena of every live scope
#[derive(Debug, Clone)]
pub struct ScopeArena {
    scopes: FxHashMap<ScopeId, Scope>,
    next_id: u32,
}

impl ScopeArena {
    pub fn new() -> Self {
        let mut scopes = FxHashMap::default();
        scopes.insert(
            GENERAL_SCOPE,
            Scope::new(GENERAL_SCOPE, None, ScopeKind::General),
        );
        ScopeArena { scopes, next_id: 1 }
    }

    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(&id)
    }

    pub fn contains(&self, id: ScopeId) -> bool {
        self.scopes.contains_key(&id)
    }

    pub fn general(&self) -> Option<&Scope> {
        self.get(GENERAL_SCOPE)
    }

    /// Number of live scopes, the general scope included
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Create a scope attached to `parent`
    pub fn enter_child(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.next_id);
        self.next_id += 1;
        if let Some(p) = self.scopes.get_mut(&parent) {
            p.children.push(id);
        }
        self.scopes.insert(id, Scope::new(id, Some(parent), kind));
        id
    }

    /// Drop a scope and every descendant still open.
    ///
    /// Heap objects referenced by the dropped bindings stay allocated.
    /// The general scope is never dropped.
    pub fn exit(&mut self, id: ScopeId) {
        if id == GENERAL_SCOPE {
            return;
        }
        let Some(scope) = self.scopes.remove(&id) else {
            return;
        };
        if let Some(parent) = scope.parent.and_then(|p| self.scopes.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
        }
        let mut pending = scope.children;
        while let Some(child) = pending.pop() {
            if let Some(removed) = self.scopes.remove(&child) {
                pending.extend(removed.children);
            }
        }
    }

    /// Register a binding owned by `scope`, replacing any local binding of the same name
    pub fn declare(&mut self, scope: ScopeId, name: &str, value: Value) -> Result<(), ScopeError> {
        let target = self
            .scopes
            .get_mut(&scope)
            .ok_or(ScopeError::MissingScope(scope))?;
        if !target.bindings.contains_key(name) {
            target.order.push(name.to_string());
        }
        target
            .bindings
            .insert(name.to_string(), Variable::new(name, scope, value));
        Ok(())
    }

    /// Find the scope owning the nearest binding of `name`
    pub fn owner_of(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scopes.get(&id)?;
            if s.bindings.contains_key(name) {
                return Some(id);
            }
            current = s.parent;
        }
        None
    }

    /// Walk scope → parent → … → general looking for `name`
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Result<(ScopeId, &Variable), ScopeError> {
        let owner = self
            .owner_of(scope, name)
            .ok_or_else(|| ScopeError::Unresolved {
                name: name.to_string(),
            })?;
        self.scopes
            .get(&owner)
            .and_then(|s| s.bindings.get(name))
            .map(|v| (owner, v))
            .ok_or(ScopeError::MissingScope(owner))
    }

    pub fn lookup(&self, scope: ScopeId, name: &str) -> Result<&Value, ScopeError> {
        self.resolve(scope, name).map(|(_, v)| &v.value)
    }

    /// Mutate the nearest binding of `name` in place at its owner
    pub fn assign(&mut self, scope: ScopeId, name: &str, value: Value) -> Result<ScopeId, ScopeError> {
        let owner = self
            .owner_of(scope, name)
            .ok_or_else(|| ScopeError::Unresolved {
                name: name.to_string(),
            })?;
        self.binding_mut(owner, name)?.store(value)?;
        Ok(owner)
    }

    /// A binding declared directly in `scope`
    pub fn binding(&self, scope: ScopeId, name: &str) -> Result<&Variable, ScopeError> {
        self.scopes
            .get(&scope)
            .ok_or(ScopeError::MissingScope(scope))?
            .bindings
            .get(name)
            .ok_or_else(|| ScopeError::Unresolved {
                name: name.to_string(),
            })
    }

    fn binding_mut(&mut self, scope: ScopeId, name: &str) -> Result<&mut Variable, ScopeError> {
        self.scopes
            .get_mut(&scope)
            .ok_or(ScopeError::MissingScope(scope))?
            .bindings
            .get_mut(name)
            .ok_or_else(|| ScopeError::Unresolved {
                name: name.to_string(),
            })
    }

    /// Store into a binding declared directly in `scope`
    pub fn store_at(&mut self, scope: ScopeId, name: &str, value: Value) -> Result<(), ScopeError> {
        self.binding_mut(scope, name)?.store(value)
    }

    /// Nearest binding of every name visible from `scope`
    pub fn visible_bindings(&self, scope: ScopeId) -> Vec<(String, Value)> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut chain = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            let Some(s) = self.scopes.get(&id) else {
                break;
            };
            chain.push(s);
            current = s.parent;
        }

        let mut visible = Vec::new();
        for s in chain {
            for var in s.bindings() {
                if seen.insert(var.name.as_str()) {
                    visible.push((var.name.clone(), var.value.clone()));
                }
            }
        }
        visible
    }

    /// Explicit free: reset the nearest binding to Unit and return its old value
    pub fn free_binding(&mut self, scope: ScopeId, name: &str) -> Result<(ScopeId, Value), ScopeError> {
        let owner = self
            .owner_of(scope, name)
            .ok_or_else(|| ScopeError::Unresolved {
                name: name.to_string(),
            })?;
        let var = self.binding_mut(owner, name)?;
        var.ty = None;
        Ok((owner, std::mem::take(&mut var.value)))
    }
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}
