//! Lexical scope chain.
//!
//! A scope frame holds `$`-value bindings, handle aliases, and imported
//! external identifier names. Values and aliases are looked up
//! case-insensitively (keys are stored case-folded with the authored
//! spelling alongside); imports are case-sensitive. Frames fork into
//! children during rendering, and each frame caches its flattened view.

use crate::error::{Result, WeftError};
use crate::handle::Handle;
use crate::value::Value;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::rc::Rc;

/// Flattened view of a scope chain: parent ⨁ local, local shadowing, keyed
/// by the case-folded name with the authored spelling kept alongside.
#[derive(Default, Clone)]
pub struct FlatScope {
    pub values: IndexMap<String, (String, Value)>,
    pub handles: IndexMap<String, (String, Handle)>,
    pub imports: FxHashSet<String>,
}

impl FlatScope {
    /// The expression-cache key contribution: sorted, case-folded handle
    /// alias names. Values never widen the key.
    pub fn handle_signature(&self) -> String {
        let mut names: Vec<&str> = self.handles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names.join("|")
    }
}

fn fold(name: &str) -> String {
    name.to_ascii_uppercase()
}

#[derive(Default)]
struct Frame {
    parent: Option<Scope>,
    values: RefCell<IndexMap<String, (String, Value)>>,
    handles: RefCell<IndexMap<String, (String, Handle)>>,
    imports: RefCell<FxHashSet<String>>,
    flat: RefCell<Option<Rc<FlatScope>>>,
}

#[derive(Clone, Default)]
pub struct Scope {
    frame: Rc<Frame>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fork(&self) -> Scope {
        Scope {
            frame: Rc::new(Frame {
                parent: Some(self.clone()),
                ..Frame::default()
            }),
        }
    }

    /// Binds a `$`-prefixed value. Rebinding the same spelling overwrites;
    /// a case-insensitive conflict with a different spelling is an error.
    pub fn bind_value(&self, name: &str, value: Value) -> Result<()> {
        let key = fold(name);
        let mut values = self.frame.values.borrow_mut();
        if let Some((existing, _)) = values.get(&key) {
            if existing != name {
                return Err(WeftError::NameCollision {
                    existing: existing.clone(),
                    incoming: name.to_string(),
                });
            }
        }
        values.insert(key, (name.to_string(), value));
        drop(values);
        self.invalidate();
        Ok(())
    }

    /// Binds a handle alias (spelled without the `@` sigil).
    pub fn bind_handle(&self, name: &str, handle: Handle) -> Result<()> {
        let key = fold(name);
        let mut handles = self.frame.handles.borrow_mut();
        if let Some((existing, bound)) = handles.get(&key) {
            if existing != name && *bound != handle {
                return Err(WeftError::NameCollision {
                    existing: existing.clone(),
                    incoming: name.to_string(),
                });
            }
        }
        handles.insert(key, (name.to_string(), handle));
        drop(handles);
        self.invalidate();
        Ok(())
    }

    /// Registers an imported external identifier name (case-sensitive).
    pub fn add_import(&self, name: &str) {
        self.frame.imports.borrow_mut().insert(name.to_string());
        self.invalidate();
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.flatten().values.get(&fold(name)).map(|(_, v)| v.clone())
    }

    pub fn handle(&self, name: &str) -> Option<Handle> {
        self.flatten()
            .handles
            .get(&fold(name))
            .map(|(_, h)| h.clone())
    }

    pub fn has_import(&self, name: &str) -> bool {
        self.flatten().imports.contains(name)
    }

    pub fn handle_signature(&self) -> String {
        self.flatten().handle_signature()
    }

    /// Cached flattening; recomputed after any local mutation.
    pub fn flatten(&self) -> Rc<FlatScope> {
        if let Some(flat) = self.frame.flat.borrow().as_ref() {
            return flat.clone();
        }
        let mut flat = match &self.frame.parent {
            Some(parent) => (*parent.flatten()).clone(),
            None => FlatScope::default(),
        };
        for (key, entry) in self.frame.values.borrow().iter() {
            flat.values.insert(key.clone(), entry.clone());
        }
        for (key, entry) in self.frame.handles.borrow().iter() {
            flat.handles.insert(key.clone(), entry.clone());
        }
        for name in self.frame.imports.borrow().iter() {
            flat.imports.insert(name.clone());
        }
        let flat = Rc::new(flat);
        *self.frame.flat.borrow_mut() = Some(flat.clone());
        flat
    }

    fn invalidate(&self) {
        *self.frame.flat.borrow_mut() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let scope = Scope::new();
        scope.bind_value("$Title", Value::text("Hi")).unwrap();
        assert_eq!(scope.value("$title"), Some(Value::text("Hi")));
        assert_eq!(scope.value("$TITLE"), Some(Value::text("Hi")));
    }

    #[test]
    fn case_conflict_in_one_frame_is_an_error() {
        let scope = Scope::new();
        scope.bind_value("$count", Value::Number(1.0)).unwrap();
        let error = scope.bind_value("$Count", Value::Number(2.0)).unwrap_err();
        assert!(matches!(error, WeftError::NameCollision { .. }));
        // Same spelling rebinds without complaint.
        scope.bind_value("$count", Value::Number(3.0)).unwrap();
        assert_eq!(scope.value("$count"), Some(Value::Number(3.0)));
    }

    #[test]
    fn equal_handle_referents_tolerate_case_variants() {
        let scope = Scope::new();
        let handle = Handle::root("global").child("user");
        scope.bind_handle("User", handle.clone()).unwrap();
        scope.bind_handle("USER", handle.clone()).unwrap();
        let other = Handle::root("global").child("other");
        assert!(scope.bind_handle("uSeR", other).is_err());
    }

    #[test]
    fn children_shadow_parents() {
        let parent = Scope::new();
        parent.bind_value("$x", Value::Number(1.0)).unwrap();
        let child = parent.fork();
        child.bind_value("$X", Value::Number(2.0)).unwrap();
        assert_eq!(child.value("$x"), Some(Value::Number(2.0)));
        assert_eq!(parent.value("$x"), Some(Value::Number(1.0)));
    }

    #[test]
    fn signature_ignores_values_and_sorts_aliases() {
        let scope = Scope::new();
        scope.bind_handle("Zeta", Handle::root("global")).unwrap();
        scope.bind_handle("alpha", Handle::root("url")).unwrap();
        scope.bind_value("$ignored", Value::Null).unwrap();
        assert_eq!(scope.handle_signature(), "ALPHA|ZETA");
    }

    #[test]
    fn imports_are_case_sensitive() {
        let scope = Scope::new();
        scope.add_import("formatDate");
        assert!(scope.has_import("formatDate"));
        assert!(!scope.has_import("formatdate"));
    }

    #[test]
    fn flatten_cache_survives_forks_and_resets_on_mutation() {
        let scope = Scope::new();
        scope.bind_value("$a", Value::Number(1.0)).unwrap();
        let first = scope.flatten();
        assert!(Rc::ptr_eq(&first, &scope.flatten()));
        scope.bind_value("$b", Value::Number(2.0)).unwrap();
        assert!(!Rc::ptr_eq(&first, &scope.flatten()));
    }
}
