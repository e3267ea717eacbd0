//! The expression language inside `{…}` and `@{…}`.
//!
//! Attribute and text bodies are lexed and parsed with chumsky, rewritten
//! against the current scope (handle sigils resolve to canonical parameter
//! names), compiled once per `(text, handle signature)` through a pluggable
//! strategy, and evaluated with a per-call environment.

use crate::error::{Result, WeftError};
use crate::handle::{Cursor, Mode};
use crate::scope::Scope;
use crate::state::Store;
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

mod lexer;
pub use lexer::{lexer, Token};

mod parser;
pub use parser::{parse_expression, parser};

mod eval;
pub use eval::{eval_expr, EvalEnv};

mod compile;
pub use compile::{CompileStrategy, CompiledExpr, CompiledFn, DefaultStrategy, ExprCache};

mod interpolate;
pub use interpolate::{interpolate_text, interpolate_value, Interpolation, Segment};

/// Parsed expression tree. Handle references keep their authored spelling;
/// resolution folds case at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Expr>),
    ObjectLit(Vec<(String, Expr)>),
    /// `$value` binding or bare imported identifier.
    Ident(String),
    /// `@Name` handle reference.
    HandleRef(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
    /// `a; b; c` — evaluates left to right, yields the last value.
    Seq(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Ambient external bindings, addressed by `import` declarations.
/// Names are case-sensitive.
#[derive(Default)]
pub struct Externals {
    entries: RefCell<FxHashMap<String, External>>,
}

#[derive(Clone)]
pub enum External {
    Value(Value),
    Function(ExternalFn),
}

pub type ExternalFn = Rc<dyn Fn(&[Value]) -> Result<Value>>;

impl Externals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_value(&self, name: impl Into<String>, value: Value) {
        self.entries
            .borrow_mut()
            .insert(name.into(), External::Value(value));
    }

    pub fn register_fn<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        self.entries
            .borrow_mut()
            .insert(name.into(), External::Function(Rc::new(function)));
    }

    pub fn get(&self, name: &str) -> Option<External> {
        self.entries.borrow().get(name).cloned()
    }
}

/// Evaluates a compiled expression against a scope. The environment maps
/// `$`-values by their case-folded names and every visible handle alias to a
/// cursor in the requested mode.
pub fn evaluate(
    compiled: &CompiledExpr,
    scope: &Scope,
    store: &Rc<Store>,
    externals: &Rc<Externals>,
    mode: Mode,
) -> Result<Value> {
    let flat = scope.flatten();
    let mut vars = FxHashMap::default();
    for (key, (_, value)) in flat.values.iter() {
        vars.insert(key.clone(), value.clone());
    }
    for (key, (_, handle)) in flat.handles.iter() {
        let cursor = Cursor::new(handle.clone(), mode, store.clone());
        if let Some(Value::Cursor(existing)) = vars.get(key) {
            if existing.handle() != cursor.handle() {
                return Err(WeftError::NameCollision {
                    existing: key.clone(),
                    incoming: key.clone(),
                });
            }
        }
        vars.insert(key.clone(), Value::Cursor(cursor));
    }
    let env = EvalEnv::new(vars, flat, externals.clone());
    compiled.invoke(&env)
}

/// Statically resolves a handle expression (`@Alias.path.to[0]`) against a
/// scope: the alias must be visible, and every path step must be a literal
/// property or index.
pub fn resolve_handle_expr(scope: &Scope, text: &str) -> Result<crate::handle::Handle> {
    let expr = parse_expression(text)?;
    resolve_handle_ast(scope, &expr, text)
}

fn resolve_handle_ast(
    scope: &Scope,
    expr: &Expr,
    text: &str,
) -> Result<crate::handle::Handle> {
    match expr {
        Expr::HandleRef(name) => scope.handle(name).ok_or_else(|| WeftError::ExprParse {
            text: text.to_string(),
            message: format!("unknown handle '@{name}'"),
        }),
        Expr::Member(base, property) => {
            Ok(resolve_handle_ast(scope, base, text)?.child(property))
        }
        Expr::Index(base, index) => {
            let segment = match index.as_ref() {
                Expr::Number(n) => crate::value::format_number(*n),
                Expr::Text(t) => t.clone(),
                _ => {
                    return Err(WeftError::ExprParse {
                        text: text.to_string(),
                        message: "handle paths may only use literal indexes".to_string(),
                    })
                }
            };
            Ok(resolve_handle_ast(scope, base, text)?.child(&segment))
        }
        _ => Err(WeftError::ExprParse {
            text: text.to_string(),
            message: "expected a handle expression".to_string(),
        }),
    }
}

pub(crate) fn fold(name: &str) -> String {
    name.to_ascii_uppercase()
}
