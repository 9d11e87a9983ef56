//! Scoped variable environment for the MPL evaluator.

use crate::value::Value;
use std::collections::BTreeMap;

/// A single scope level.
#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: BTreeMap<String, Value>,
}

/// Scoped variable environment with push/pop semantics.
///
/// Variables are looked up from innermost scope outward. `define`
/// always creates in the current (innermost) scope — redeclaration
/// overwrites. `assign` updates the first scope where the variable
/// exists and reports failure for undeclared names.
///
/// Function and rule calls evaluate against `[globals, frame]` — the
/// caller's local scopes are set aside for the duration of the call, so
/// scoping stays lexical (no dynamic scoping).
#[derive(Debug, Clone)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    /// Create a new environment with one global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Push a new scope (for blocks and call frames).
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pop the innermost scope. The global scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Define a variable in the current (innermost) scope.
    pub fn define(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.to_string(), value);
        }
    }

    /// Look up a variable, searching from innermost to outermost scope.
    pub fn get(&self, name: &str) -> Option<&Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.bindings.get(name) {
                return Some(v);
            }
        }
        None
    }

    /// Update a variable in the first scope where it exists.
    /// Returns `true` if found and updated, `false` if not declared.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if scope.bindings.contains_key(name) {
                scope.bindings.insert(name.to_string(), value);
                return true;
            }
        }
        false
    }

    /// Set aside every non-global scope, leaving `[globals]`.
    /// Used when entering a function call frame; the return value must
    /// be handed back to [`Environment::restore_locals`].
    pub fn take_locals(&mut self) -> Vec<ScopeHandle> {
        self.scopes
            .split_off(1)
            .into_iter()
            .map(ScopeHandle)
            .collect()
    }

    /// Restore scopes previously taken with [`Environment::take_locals`].
    pub fn restore_locals(&mut self, locals: Vec<ScopeHandle>) {
        self.scopes.truncate(1);
        self.scopes.extend(locals.into_iter().map(|h| h.0));
    }

    /// Number of live scopes (globals included).
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque handle to a set-aside scope (see [`Environment::take_locals`]).
#[derive(Debug)]
pub struct ScopeHandle(Scope);
