//! Interpolation parsing and evaluation.
//!
//! A string interleaves literal text with `{…}` expression segments. Author
//! expressions may contain unmatched `}` inside string or object literals,
//! so no brace-counting is safe: starting from each `{`, every following `}`
//! is tried in order and the first candidate body that compiles under the
//! current scope wins. A `{` with no compiling candidate is literal text.

use super::compile::{CompiledExpr, ExprCache};
use super::{evaluate, Externals};
use crate::error::Result;
use crate::handle::Mode;
use crate::scope::{FlatScope, Scope};
use crate::state::Store;
use crate::value::Value;
use std::rc::Rc;

#[derive(Clone)]
pub enum Segment {
    Literal(String),
    Expr(Rc<CompiledExpr>),
}

pub struct Interpolation {
    pub segments: Vec<Segment>,
    /// True when the whole string is a single expression, which permits
    /// value-preserving evaluation.
    pub lone: bool,
}

impl Interpolation {
    pub fn has_expressions(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Expr(_)))
    }
}

pub(super) fn parse_interpolation(
    cache: &ExprCache,
    flat: &FlatScope,
    text: &str,
) -> Interpolation {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        let (before, from_open) = rest.split_at(open);
        literal.push_str(before);
        let inner = &from_open[1..];

        let mut accepted = None;
        for (close, _) in inner.match_indices('}') {
            let body = &inner[..close];
            if let Ok(compiled) = cache.compile(flat, body) {
                accepted = Some((compiled, close));
                break;
            }
        }

        match accepted {
            Some((compiled, close)) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Expr(compiled));
                rest = &inner[close + 1..];
            }
            None => {
                literal.push('{');
                rest = inner;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    let lone = segments.len() == 1 && matches!(segments[0], Segment::Expr(_));
    Interpolation { segments, lone }
}

/// Stringifies every segment. A failing expression segment renders as a
/// bracketed marker and warns, so the surrounding UI stays coherent.
pub fn interpolate_text(
    interpolation: &Interpolation,
    scope: &Scope,
    store: &Rc<Store>,
    externals: &Rc<Externals>,
) -> String {
    let mut out = String::new();
    for segment in &interpolation.segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Expr(compiled) => {
                match evaluate(compiled, scope, store, externals, Mode::Pure) {
                    Ok(value) => out.push_str(&value.to_text()),
                    Err(error) => {
                        tracing::warn!(
                            expression = %compiled.text,
                            %error,
                            "text interpolation failed"
                        );
                        out.push_str(&format!("[Error: {error}]"));
                    }
                }
            }
        }
    }
    out
}

/// Value-preserving evaluation: a lone expression yields its raw value
/// (booleans, lists, …); anything else stringifies. Errors propagate.
pub fn interpolate_value(
    interpolation: &Interpolation,
    scope: &Scope,
    store: &Rc<Store>,
    externals: &Rc<Externals>,
) -> Result<Value> {
    if interpolation.lone {
        let Segment::Expr(compiled) = &interpolation.segments[0] else {
            unreachable!("lone interpolations hold exactly one expression");
        };
        return Ok(evaluate(compiled, scope, store, externals, Mode::Pure)?.materialize());
    }
    let mut out = String::new();
    for segment in &interpolation.segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Expr(compiled) => {
                let value = evaluate(compiled, scope, store, externals, Mode::Pure)?;
                out.push_str(&value.to_text());
            }
        }
    }
    Ok(Value::text(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;

    fn fixture() -> (ExprCache, Scope, Rc<Store>, Rc<Externals>) {
        let store = Rc::new(Store::new());
        store.ensure("global", None);
        let scope = Scope::new();
        scope.bind_handle("Global", Handle::root("global")).unwrap();
        (ExprCache::new(), scope, store, Rc::new(Externals::new()))
    }

    #[test]
    fn plain_text_has_no_expressions() {
        let (cache, scope, _, _) = fixture();
        let parsed = cache.interpolation(&scope.flatten(), "hello world");
        assert!(!parsed.has_expressions());
        assert!(!parsed.lone);
    }

    #[test]
    fn lone_expression_is_flagged() {
        let (cache, scope, _, _) = fixture();
        let parsed = cache.interpolation(&scope.flatten(), "{1 + 2}");
        assert!(parsed.lone);
    }

    #[test]
    fn object_literal_brace_does_not_end_the_expression() {
        // The first `}` closes the inner object literal and the candidate
        // "{ open: false" fails to compile, so the parser keeps trying.
        let (cache, scope, _, _) = fixture();
        let parsed = cache.interpolation(&scope.flatten(), "{ { open: false } }");
        assert!(parsed.lone);
    }

    #[test]
    fn unmatched_brace_in_string_literal() {
        let (cache, scope, store, externals) = fixture();
        let parsed = cache.interpolation(&scope.flatten(), "x{'}'}y");
        assert_eq!(
            interpolate_text(&parsed, &scope, &store, &externals),
            "x}y"
        );
    }

    #[test]
    fn non_compiling_brace_stays_literal() {
        let (cache, scope, store, externals) = fixture();
        let parsed = cache.interpolation(&scope.flatten(), "a { b");
        assert!(!parsed.has_expressions());
        assert_eq!(
            interpolate_text(&parsed, &scope, &store, &externals),
            "a { b"
        );
    }

    #[test]
    fn failing_segment_renders_bracketed_marker() {
        let (cache, scope, store, externals) = fixture();
        let parsed = cache.interpolation(&scope.flatten(), "n={$missing}");
        let rendered = interpolate_text(&parsed, &scope, &store, &externals);
        assert!(rendered.starts_with("n=[Error:"), "got {rendered}");
        // interpolate_value throws for the same input.
        assert!(interpolate_value(&parsed, &scope, &store, &externals).is_err());
    }

    #[test]
    fn lone_value_preserves_type() {
        let (cache, scope, store, externals) = fixture();
        let parsed = cache.interpolation(&scope.flatten(), "{[1, 2]}");
        let value = interpolate_value(&parsed, &scope, &store, &externals).unwrap();
        assert_eq!(value, Value::list([Value::Number(1.0), Value::Number(2.0)]));
    }

    #[test]
    fn parse_structure_is_cached_by_text_and_signature() {
        let (cache, scope, _, _) = fixture();
        let first = cache.interpolation(&scope.flatten(), "count: {1}");
        let second = cache.interpolation(&scope.flatten(), "count: {1}");
        assert!(Rc::ptr_eq(&first, &second));
    }
}
