//! Expression compilation and the per-page caches.
//!
//! Compilation is keyed by `(expression text, handle signature)`: the
//! signature covers only what influences the compile — visible handle
//! aliases — never the values bound at call time. The `(parameters, body) →
//! callable` step itself is owned by a pluggable strategy.

use super::interpolate::{parse_interpolation, Interpolation};
use super::lexer::lexer;
use super::parser::parse_expression;
use super::{eval_expr, EvalEnv, Token};
use crate::error::{Result, WeftError};
use crate::scope::FlatScope;
use crate::value::Value;
use chumsky::prelude::Parser as _;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub type CompiledFn = Rc<dyn Fn(&EvalEnv) -> Result<Value>>;

/// A compiled expression: the callable plus its parameter-name list and the
/// alias map from authored handle spellings to their canonical (case-folded)
/// parameter names.
pub struct CompiledExpr {
    pub text: String,
    pub params: Vec<String>,
    pub aliases: FxHashMap<String, String>,
    fun: CompiledFn,
}

impl CompiledExpr {
    pub fn invoke(&self, env: &EvalEnv) -> Result<Value> {
        (self.fun)(env)
    }
}

impl std::fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpr")
            .field("text", &self.text)
            .field("params", &self.params)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

/// Owns the `(parameters, body) → callable` step. The default strategy
/// parses the body into an AST and walks it; alternatives may route the body
/// into an isolated evaluator — runtime correctness must not depend on which
/// one is installed.
pub trait CompileStrategy {
    fn compile(&self, params: &[String], body: &str) -> Result<CompiledFn>;
}

pub struct DefaultStrategy;

impl CompileStrategy for DefaultStrategy {
    fn compile(&self, _params: &[String], body: &str) -> Result<CompiledFn> {
        let ast = parse_expression(body)?;
        Ok(Rc::new(move |env| eval_expr(&ast, env)))
    }
}

/// Process-lifetime caches for compiled expressions and interpolation
/// parses, plus the installed compile strategy and the debug counters.
pub struct ExprCache {
    strategy: RefCell<Rc<dyn CompileStrategy>>,
    compiled: RefCell<FxHashMap<String, Rc<CompiledExpr>>>,
    interpolations: RefCell<FxHashMap<String, Rc<Interpolation>>>,
    compile_count: Cell<u64>,
}

impl Default for ExprCache {
    fn default() -> Self {
        Self {
            strategy: RefCell::new(Rc::new(DefaultStrategy)),
            compiled: RefCell::new(FxHashMap::default()),
            interpolations: RefCell::new(FxHashMap::default()),
            compile_count: Cell::new(0),
        }
    }
}

impl ExprCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_strategy(&self, strategy: Rc<dyn CompileStrategy>) {
        *self.strategy.borrow_mut() = strategy;
    }

    /// Number of cache entries currently held.
    pub fn size(&self) -> usize {
        self.compiled.borrow().len()
    }

    /// Number of cache misses (actual compiles) so far.
    pub fn compile_count(&self) -> u64 {
        self.compile_count.get()
    }

    /// Drops every cached compile and interpolation parse.
    pub fn reset(&self) {
        self.compiled.borrow_mut().clear();
        self.interpolations.borrow_mut().clear();
        self.compile_count.set(0);
    }

    /// Compiles `text` against the flattened scope, or returns the cached
    /// entry for the same `(text, handle signature)`.
    pub fn compile(&self, flat: &FlatScope, text: &str) -> Result<Rc<CompiledExpr>> {
        let key = cache_key(text, &flat.handle_signature());
        if let Some(entry) = self.compiled.borrow().get(&key) {
            return Ok(entry.clone());
        }

        // The rewrite step: every @-identifier must resolve, case-
        // insensitively, to a handle alias visible in this scope.
        check_handle_refs(flat, text)?;

        let mut params: Vec<String> = flat
            .values
            .values()
            .map(|(original, _)| original.clone())
            .collect();
        let mut aliases = FxHashMap::default();
        for (canonical, (original, _)) in flat.handles.iter() {
            params.push(canonical.clone());
            if original != canonical {
                aliases.insert(original.clone(), canonical.clone());
            }
        }

        let fun = self.strategy.borrow().compile(&params, text)?;
        let entry = Rc::new(CompiledExpr {
            text: text.to_string(),
            params,
            aliases,
            fun,
        });
        self.compiled.borrow_mut().insert(key, entry.clone());
        self.compile_count.set(self.compile_count.get() + 1);
        Ok(entry)
    }

    /// Cached interpolation parse for `(text, handle signature)`.
    pub fn interpolation(&self, flat: &FlatScope, text: &str) -> Rc<Interpolation> {
        let key = cache_key(text, &flat.handle_signature());
        if let Some(parsed) = self.interpolations.borrow().get(&key) {
            return parsed.clone();
        }
        let parsed = Rc::new(parse_interpolation(self, flat, text));
        self.interpolations
            .borrow_mut()
            .insert(key, parsed.clone());
        parsed
    }
}

fn cache_key(text: &str, signature: &str) -> String {
    format!("{text}||{signature}")
}

fn check_handle_refs(flat: &FlatScope, text: &str) -> Result<()> {
    let tokens = lexer()
        .parse(text)
        .into_result()
        .map_err(|_| WeftError::ExprParse {
            text: text.to_string(),
            message: "unlexable expression".to_string(),
        })?;
    for spanned in &tokens {
        if let Token::AtIdent(name) = spanned.node {
            if !flat.handles.contains_key(&super::fold(name)) {
                return Err(WeftError::ExprParse {
                    text: text.to_string(),
                    message: format!("unknown handle '@{name}'"),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;
    use crate::scope::Scope;

    fn scope_with_handles(names: &[&str]) -> Scope {
        let scope = Scope::new();
        for name in names {
            scope.bind_handle(name, Handle::root("global")).unwrap();
        }
        scope
    }

    #[test]
    fn same_signature_compiles_once() {
        let cache = ExprCache::new();
        let a = scope_with_handles(&["Counter"]);
        let b = scope_with_handles(&["counter"]);
        // Same canonical alias set, so the second compile is a cache hit.
        cache.compile(&a.flatten(), "@Counter.open").unwrap();
        cache.compile(&b.flatten(), "@counter.open").unwrap();
        assert_eq!(cache.compile_count(), 1);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn different_signatures_compile_separately() {
        let cache = ExprCache::new();
        let a = scope_with_handles(&["Counter"]);
        let b = scope_with_handles(&["Counter", "Form"]);
        cache.compile(&a.flatten(), "@Counter.open").unwrap();
        cache.compile(&b.flatten(), "@Counter.open").unwrap();
        assert_eq!(cache.compile_count(), 2);
    }

    #[test]
    fn unknown_handle_fails_to_compile() {
        let cache = ExprCache::new();
        let scope = scope_with_handles(&["Counter"]);
        let error = cache.compile(&scope.flatten(), "@Missing.x").unwrap_err();
        assert!(matches!(error, WeftError::ExprParse { .. }));
    }

    #[test]
    fn alias_map_records_authored_spellings() {
        let cache = ExprCache::new();
        let scope = scope_with_handles(&["Counter"]);
        let compiled = cache.compile(&scope.flatten(), "1").unwrap();
        assert_eq!(compiled.aliases.get("Counter"), Some(&"COUNTER".to_string()));
        assert!(compiled.params.contains(&"COUNTER".to_string()));
    }

    #[test]
    fn reset_clears_entries_and_counters() {
        let cache = ExprCache::new();
        let scope = scope_with_handles(&[]);
        cache.compile(&scope.flatten(), "1 + 1").unwrap();
        cache.reset();
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.compile_count(), 0);
    }
}
