//! Namespace scope stack.
//!
//! Each prefix maps to a stack of URIs. `start_prefix_mapping` pushes, the
//! matching `end_prefix_mapping` pops exactly once. Popping a prefix without
//! an active binding is an invariant violation ([`Error::NamespaceUnderflow`]).

use crate::{Error, FastHashMap, Result};

/// Prefix → URI stack; the empty prefix is the default namespace.
#[derive(Debug, Clone, Default)]
pub struct NamespaceScope {
    bindings: FastHashMap<String, Vec<String>>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a binding for `prefix`.
    pub fn push(&mut self, prefix: &str, uri: &str) {
        match self.bindings.get_mut(prefix) {
            Some(stack) => stack.push(uri.to_string()),
            None => {
                self.bindings.insert(prefix.to_string(), vec![uri.to_string()]);
            }
        }
    }

    /// Closes the innermost binding for `prefix` and returns its URI.
    pub fn pop(&mut self, prefix: &str) -> Result<String> {
        let stack = self
            .bindings
            .get_mut(prefix)
            .ok_or_else(|| Error::NamespaceUnderflow(prefix.to_string()))?;
        let uri = stack.pop().ok_or_else(|| Error::NamespaceUnderflow(prefix.to_string()))?;
        if stack.is_empty() {
            self.bindings.remove(prefix);
        }
        Ok(uri)
    }

    /// URI currently bound to `prefix`.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .get(prefix)
            .and_then(|stack| stack.last())
            .map(String::as_str)
    }

    /// Effective bindings, sorted by prefix.
    pub fn in_scope(&self) -> Vec<(&str, &str)> {
        let mut scope: Vec<(&str, &str)> = self
            .bindings
            .iter()
            .filter_map(|(prefix, stack)| stack.last().map(|uri| (prefix.as_str(), uri.as_str())))
            .collect();
        scope.sort_unstable_by(|a, b| a.0.cmp(b.0));
        scope
    }

    /// Nesting depth of bindings for `prefix`.
    pub fn depth(&self, prefix: &str) -> usize {
        self.bindings.get(prefix).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
