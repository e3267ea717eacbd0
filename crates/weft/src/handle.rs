//! Handles and the two-mode cursor.
//!
//! A handle is a value-less reference to a place in state: a namespace name
//! plus a path of segments. Cursors pair a handle with an access mode and a
//! store, and are what expressions actually see — reads walk the path
//! null-safely, writes are only legal in effect mode.

use crate::error::{Result, WeftError};
use crate::state::Store;
use crate::value::Value;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

/// A location in state: `(root namespace, path segments)`. Identity is
/// structural; handles carry no value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    root: Rc<str>,
    path: SmallVec<[Rc<str>; 4]>,
}

impl Handle {
    pub fn root(namespace: impl Into<String>) -> Self {
        Self {
            root: namespace.into().into(),
            path: SmallVec::new(),
        }
    }

    /// Extends the path by one segment.
    pub fn child(&self, segment: &str) -> Self {
        let mut path = self.path.clone();
        path.push(segment.into());
        Self {
            root: self.root.clone(),
            path,
        }
    }

    /// Extends the path by every segment of `suffix`.
    pub fn join(&self, suffix: &[Rc<str>]) -> Self {
        let mut path = self.path.clone();
        path.extend(suffix.iter().cloned());
        Self {
            root: self.root.clone(),
            path,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.root
    }

    pub fn path(&self) -> &[Rc<str>] {
        &self.path
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.path {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Access mode of a cursor: `{…}` expressions get `Pure`, `@{…}` event
/// expressions get `Effect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Pure,
    Effect,
}

/// A handle bound to a store and a mode. Cloning is cheap; equality ignores
/// the store (one store per page).
#[derive(Clone)]
pub struct Cursor {
    handle: Handle,
    mode: Mode,
    store: Rc<Store>,
}

impl Cursor {
    pub fn new(handle: Handle, mode: Mode, store: Rc<Store>) -> Self {
        Self {
            handle,
            mode,
            store,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Deep owned copy of the current value at this location.
    pub fn snapshot(&self) -> Value {
        self.store.read(&self.handle)
    }

    /// Same location, one segment deeper.
    pub fn child(&self, segment: &str) -> Cursor {
        Cursor::new(self.handle.child(segment), self.mode, self.store.clone())
    }

    /// Property access. Aggregate and missing intermediates stay cursors so
    /// chained reads never fail; scalars are returned as-is.
    pub fn get(&self, property: &str) -> Value {
        let extended = self.child(property);
        match extended.snapshot() {
            Value::Null | Value::List(_) | Value::Object(_) => Value::Cursor(extended),
            scalar => scalar,
        }
    }

    /// Routes a write through the store. Fails in pure mode.
    pub fn write(&self, value: Value) -> Result<()> {
        match self.mode {
            Mode::Pure => Err(WeftError::PureMutation {
                location: self.handle.to_string(),
            }),
            Mode::Effect => self.store.write(&self.handle, value),
        }
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && self.mode == other.mode
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({:?}, {:?})", self.handle, self.mode)
    }
}
