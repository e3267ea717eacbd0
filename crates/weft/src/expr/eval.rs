//! Tree-walking evaluator for compiled expressions.
//!
//! The environment is built per call: `$`-values by case-folded name, handle
//! aliases as cursors in the requested mode, imports consulted through the
//! ambient externals registry.

use super::{fold, BinaryOp, Expr, External, Externals, UnaryOp};
use crate::error::{Result, WeftError};
use crate::handle::Cursor;
use crate::scope::FlatScope;
use crate::value::{format_number, Value};
use rustc_hash::FxHashMap;
use std::rc::Rc;

pub struct EvalEnv {
    vars: FxHashMap<String, Value>,
    flat: Rc<FlatScope>,
    externals: Rc<Externals>,
}

impl EvalEnv {
    pub fn new(
        vars: FxHashMap<String, Value>,
        flat: Rc<FlatScope>,
        externals: Rc<Externals>,
    ) -> Self {
        Self {
            vars,
            flat,
            externals,
        }
    }

    fn var(&self, name: &str) -> Option<Value> {
        self.vars.get(&fold(name)).cloned()
    }

    fn import(&self, name: &str) -> Option<External> {
        if self.flat.imports.contains(name) {
            self.externals.get(name)
        } else {
            None
        }
    }
}

pub fn eval_expr(expr: &Expr, env: &EvalEnv) -> Result<Value> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Text(t) => Ok(Value::text(t.clone())),

        Expr::List(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(eval_expr(item, env)?.materialize());
            }
            Ok(Value::list(list))
        }

        Expr::ObjectLit(fields) => {
            let mut object = indexmap::IndexMap::new();
            for (key, value) in fields {
                object.insert(key.clone(), eval_expr(value, env)?.materialize());
            }
            Ok(Value::Object(Rc::new(object)))
        }

        Expr::Ident(name) => {
            if name.starts_with('$') {
                env.var(name)
                    .ok_or_else(|| WeftError::eval(format!("unknown value '{name}'")))
            } else {
                match env.import(name) {
                    Some(External::Value(value)) => Ok(value),
                    Some(External::Function(_)) => Err(WeftError::eval(format!(
                        "import '{name}' is a function; call it"
                    ))),
                    None => Err(WeftError::eval(format!("unknown identifier '{name}'"))),
                }
            }
        }

        Expr::HandleRef(name) => env
            .var(name)
            .ok_or_else(|| WeftError::eval(format!("unknown handle '@{name}'"))),

        Expr::Member(base, property) => {
            let base = eval_expr(base, env)?;
            member(&base, property)
        }

        Expr::Index(base, index) => {
            let base = eval_expr(base, env)?;
            let index = eval_expr(index, env)?.materialize();
            match &base {
                Value::Cursor(cursor) => Ok(cursor.get(&index_segment(&index)?)),
                Value::List(items) => {
                    let i = to_number(&index)? as usize;
                    Ok(items.get(i).cloned().unwrap_or(Value::Null))
                }
                Value::Object(fields) => Ok(fields
                    .get(index.to_text().as_str())
                    .cloned()
                    .unwrap_or(Value::Null)),
                other => Err(WeftError::eval(format!("cannot index into {other:?}"))),
            }
        }

        Expr::Call(callee, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, env)?.materialize());
            }
            match callee.as_ref() {
                Expr::Ident(name) if !name.starts_with('$') => match env.import(name) {
                    Some(External::Function(function)) => function(&values),
                    Some(External::Value(_)) => {
                        Err(WeftError::eval(format!("import '{name}' is not callable")))
                    }
                    None => Err(WeftError::eval(format!("unknown function '{name}'"))),
                },
                other => Err(WeftError::eval(format!("{other:?} is not callable"))),
            }
        }

        Expr::Unary(op, operand) => {
            let operand = eval_expr(operand, env)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
                UnaryOp::Neg => Ok(Value::Number(-to_number(&operand)?)),
            }
        }

        Expr::Binary(op, left, right) => eval_binary(*op, left, right, env),

        Expr::Ternary(condition, then, otherwise) => {
            if eval_expr(condition, env)?.is_truthy() {
                eval_expr(then, env)
            } else {
                eval_expr(otherwise, env)
            }
        }

        Expr::Assign(target, value) => {
            let value = eval_expr(value, env)?.materialize();
            let cursor = eval_lvalue(target, env)?;
            cursor.write(value.clone())?;
            Ok(value)
        }

        Expr::Seq(parts) => {
            let mut last = Value::Null;
            for part in parts {
                last = eval_expr(part, env)?;
            }
            Ok(last)
        }
    }
}

/// Resolves an assignment target to a cursor. Only handle-rooted paths are
/// writable locations.
fn eval_lvalue(expr: &Expr, env: &EvalEnv) -> Result<Cursor> {
    match expr {
        Expr::HandleRef(name) => match env.var(name) {
            Some(Value::Cursor(cursor)) => Ok(cursor),
            _ => Err(WeftError::eval(format!("unknown handle '@{name}'"))),
        },
        Expr::Member(base, property) => Ok(eval_lvalue(base, env)?.child(property)),
        Expr::Index(base, index) => {
            let segment = index_segment(&eval_expr(index, env)?.materialize())?;
            Ok(eval_lvalue(base, env)?.child(&segment))
        }
        other => match eval_expr(other, env)? {
            Value::Cursor(cursor) => Ok(cursor),
            _ => Err(WeftError::eval(
                "assignment target must be a state location".to_string(),
            )),
        },
    }
}

fn member(base: &Value, property: &str) -> Result<Value> {
    match base {
        Value::Cursor(cursor) => {
            if property == "length" {
                match cursor.snapshot() {
                    list @ Value::List(_) => return member(&list, property),
                    Value::Text(text) => {
                        return Ok(Value::Number(text.chars().count() as f64))
                    }
                    _ => {}
                }
            }
            Ok(cursor.get(property))
        }
        Value::Object(fields) => Ok(fields.get(property).cloned().unwrap_or(Value::Null)),
        Value::List(items) if property == "length" => Ok(Value::Number(items.len() as f64)),
        Value::Text(text) if property == "length" => {
            Ok(Value::Number(text.chars().count() as f64))
        }
        other => Err(WeftError::eval(format!(
            "cannot read property '{property}' of {other:?}"
        ))),
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, env: &EvalEnv) -> Result<Value> {
    // Logical operators short-circuit and yield the deciding operand.
    match op {
        BinaryOp::Or => {
            let left = eval_expr(left, env)?;
            return if left.is_truthy() {
                Ok(left)
            } else {
                eval_expr(right, env)
            };
        }
        BinaryOp::And => {
            let left = eval_expr(left, env)?;
            return if left.is_truthy() {
                eval_expr(right, env)
            } else {
                Ok(left)
            };
        }
        _ => {}
    }

    let left = eval_expr(left, env)?.materialize();
    let right = eval_expr(right, env)?.materialize();
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(&left, &right))),
        BinaryOp::NotEq => Ok(Value::Bool(!loose_eq(&left, &right))),
        BinaryOp::Lt => compare(&left, &right, |ordering| ordering.is_lt()),
        BinaryOp::LtEq => compare(&left, &right, |ordering| ordering.is_le()),
        BinaryOp::Gt => compare(&left, &right, |ordering| ordering.is_gt()),
        BinaryOp::GtEq => compare(&left, &right, |ordering| ordering.is_ge()),
        BinaryOp::Add => match (&left, &right) {
            (Value::Text(_), _) | (_, Value::Text(_)) => {
                Ok(Value::text(format!("{}{}", left.to_text(), right.to_text())))
            }
            _ => Ok(Value::Number(to_number(&left)? + to_number(&right)?)),
        },
        BinaryOp::Sub => Ok(Value::Number(to_number(&left)? - to_number(&right)?)),
        BinaryOp::Mul => Ok(Value::Number(to_number(&left)? * to_number(&right)?)),
        BinaryOp::Div => Ok(Value::Number(to_number(&left)? / to_number(&right)?)),
        BinaryOp::Rem => Ok(Value::Number(to_number(&left)? % to_number(&right)?)),
        BinaryOp::Or | BinaryOp::And => unreachable!("handled above"),
    }
}

fn compare(
    left: &Value,
    right: &Value,
    check: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value> {
    let ordering = match (left, right) {
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        _ => to_number(left)?
            .partial_cmp(&to_number(right)?)
            .ok_or_else(|| WeftError::eval("incomparable values".to_string()))?,
    };
    Ok(Value::Bool(check(ordering)))
}

/// Strict equality plus numeric coercion across the number/text divide,
/// which URL-namespace values (always parsed as text) rely on.
fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Number(n), Value::Text(t)) | (Value::Text(t), Value::Number(n)) => {
            t.parse::<f64>().map(|parsed| parsed == *n).unwrap_or(false)
        }
        _ => false,
    }
}

fn to_number(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Text(t) => t
            .trim()
            .parse::<f64>()
            .map_err(|_| WeftError::eval(format!("'{t}' is not a number"))),
        Value::Null => Ok(0.0),
        Value::Cursor(cursor) => to_number(&cursor.snapshot()),
        other => Err(WeftError::eval(format!("{other:?} is not a number"))),
    }
}

fn index_segment(index: &Value) -> Result<String> {
    match index {
        Value::Number(n) => Ok(format_number(*n)),
        Value::Text(t) => Ok(t.to_string()),
        other => Err(WeftError::eval(format!("invalid index {other:?}"))),
    }
}
