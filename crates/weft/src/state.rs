//! Reactive store: named namespaces over a shared value tree.
//!
//! Namespaces are created lazily and live for the page lifetime. Writes mark
//! the owning namespace dirty; the page flush drains the dirty set and reruns
//! every mount, so one effect expression's mutations are observed atomically
//! by the next render pass.

use crate::error::{Result, WeftError};
use crate::handle::Handle;
use crate::value::{Object, Value};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::rc::Rc;

/// Namespace id for the SID-keyed local state of one element.
pub fn local_namespace(sid: &str) -> String {
    format!("local:{sid}")
}

pub const GLOBAL: &str = "global";
pub const URL: &str = "url";

#[derive(Default)]
pub struct Store {
    namespaces: RefCell<IndexMap<String, Value>>,
    dirty: RefCell<FxHashSet<String>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the namespace if absent, seeding it with `init` or an empty
    /// object. Returns whether it was created by this call.
    pub fn ensure(&self, id: &str, init: Option<Value>) -> bool {
        let mut namespaces = self.namespaces.borrow_mut();
        if namespaces.contains_key(id) {
            return false;
        }
        let seed = init.unwrap_or_else(|| Value::Object(Rc::new(Object::new())));
        namespaces.insert(id.to_string(), seed);
        true
    }

    pub fn exists(&self, id: &str) -> bool {
        self.namespaces.borrow().contains_key(id)
    }

    /// Current root value of a namespace (`Null` if absent).
    pub fn namespace(&self, id: &str) -> Value {
        self.namespaces
            .borrow()
            .get(id)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Replaces a namespace root wholesale and marks it dirty.
    pub fn set_namespace(&self, id: &str, value: Value) {
        self.namespaces.borrow_mut().insert(id.to_string(), value);
        self.dirty.borrow_mut().insert(id.to_string());
    }

    /// Drops a namespace (used by `clear-on-unmount`).
    pub fn clear(&self, id: &str) {
        if self.namespaces.borrow_mut().shift_remove(id).is_some() {
            self.dirty.borrow_mut().insert(id.to_string());
        }
    }

    /// Null-safe path read: `Null` as soon as any intermediate is missing.
    pub fn read(&self, handle: &Handle) -> Value {
        let namespaces = self.namespaces.borrow();
        let Some(mut current) = namespaces.get(handle.namespace()) else {
            return Value::Null;
        };
        for segment in handle.path() {
            match current {
                Value::Object(fields) => match fields.get(segment.as_ref()) {
                    Some(next) => current = next,
                    None => return Value::Null,
                },
                Value::List(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i))
                {
                    Some(next) => current = next,
                    None => return Value::Null,
                },
                _ => return Value::Null,
            }
        }
        current.clone()
    }

    /// Creates intermediate empty objects along the path and assigns the last
    /// segment. The namespace itself is created on first write.
    pub fn write(&self, handle: &Handle, value: Value) -> Result<()> {
        let value = value.materialize();
        let mut namespaces = self.namespaces.borrow_mut();
        let root = namespaces
            .entry(handle.namespace().to_string())
            .or_insert_with(|| Value::Object(Rc::new(Object::new())));
        write_at(root, handle.path(), value)?;
        drop(namespaces);
        self.dirty
            .borrow_mut()
            .insert(handle.namespace().to_string());
        Ok(())
    }

    pub fn take_dirty(&self) -> FxHashSet<String> {
        std::mem::take(&mut self.dirty.borrow_mut())
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.borrow().is_empty()
    }
}

fn write_at(target: &mut Value, path: &[Rc<str>], value: Value) -> Result<()> {
    let Some((head, rest)) = path.split_first() else {
        *target = value;
        return Ok(());
    };
    match target {
        Value::Object(fields) => {
            let fields = Rc::make_mut(fields);
            let slot = fields.entry(head.to_string()).or_insert(Value::Null);
            if rest.is_empty() {
                *slot = value;
                Ok(())
            } else {
                if matches!(slot, Value::Null) {
                    *slot = Value::Object(Rc::new(Object::new()));
                }
                write_at(slot, rest, value)
            }
        }
        Value::List(items) => {
            let index: usize = head.parse().map_err(|_| {
                WeftError::eval(format!("cannot write segment '{head}' into a list"))
            })?;
            let items = Rc::make_mut(items);
            let slot = items.get_mut(index).ok_or_else(|| {
                WeftError::eval(format!("list index {index} out of bounds on write"))
            })?;
            write_at(slot, rest, value)
        }
        Value::Null => {
            *target = Value::Object(Rc::new(Object::new()));
            write_at(target, path, value)
        }
        other => Err(WeftError::eval(format!(
            "cannot write segment '{head}' into {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_intermediates() {
        let store = Store::new();
        let handle = Handle::root(GLOBAL).child("a").child("b").child("c");
        store.write(&handle, Value::Number(7.0)).unwrap();
        assert_eq!(store.read(&handle), Value::Number(7.0));
        assert_eq!(
            store.read(&Handle::root(GLOBAL).child("a").child("missing")),
            Value::Null
        );
    }

    #[test]
    fn writes_mark_only_the_owning_namespace_dirty() {
        let store = Store::new();
        store.ensure(GLOBAL, None);
        store.ensure(URL, None);
        store
            .write(&Handle::root(URL).child("tab"), Value::text("settings"))
            .unwrap();
        let dirty = store.take_dirty();
        assert!(dirty.contains(URL));
        assert!(!dirty.contains(GLOBAL));
        assert!(!store.is_dirty());
    }

    #[test]
    fn list_index_read_and_write() {
        let store = Store::new();
        let users = Handle::root(GLOBAL).child("users");
        store
            .write(
                &users,
                Value::list([
                    Value::object([("name", Value::text("A"))]),
                    Value::object([("name", Value::text("B"))]),
                ]),
            )
            .unwrap();
        let second = users.child("1").child("name");
        assert_eq!(store.read(&second), Value::text("B"));
        store.write(&second, Value::text("B2")).unwrap();
        assert_eq!(store.read(&second), Value::text("B2"));
    }

    #[test]
    fn ensure_seeds_once() {
        let store = Store::new();
        assert!(store.ensure("local:abc", Some(Value::object([("n", Value::Number(1.0))]))));
        assert!(!store.ensure("local:abc", Some(Value::object([("n", Value::Number(2.0))]))));
        assert_eq!(
            store.read(&Handle::root("local:abc").child("n")),
            Value::Number(1.0)
        );
    }
}
