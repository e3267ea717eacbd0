//! Iteration expansion: the `each` grammar and row rendering.
//!
//! `each="BINDINGS of {EXPR} marked by MARKER"` — bindings are `$VAR` or
//! `$VAR as ROLE`; the collection expression is found first-that-compiles
//! (its braces may be unbalanced inside literals); the marker is `{EXPR}`,
//! `index` (lists), or `field` (objects). Each row renders the loop body in
//! a forked scope, and the row marker becomes the iteration key of every
//! immediate child's SID.

use super::{FormCtx, RenderPass, SlotContext};
use crate::error::{Result, WeftError};
use crate::expr::evaluate;
use crate::handle::Mode;
use crate::scope::Scope;
use crate::sid::Sid;
use crate::template::TemplateElement;
use crate::value::{format_number, Value};
use crate::vdom::VNode;
use rustc_hash::FxHashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Value,
    Index,
    Field,
    IsFirst,
    IsLast,
}

#[derive(Debug, Clone, PartialEq)]
enum MarkerSpec {
    Expr(String),
    Index,
    Field,
}

#[derive(Debug)]
struct EachSpec {
    bindings: Vec<(String, Role)>,
    collection: String,
    marker: MarkerSpec,
}

impl<'rt> RenderPass<'rt> {
    /// Expands a `<Loop>`; pushes the produced rows (a flat fragment) and
    /// returns whether any row rendered, feeding the sibling `<Else>` chain.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn expand_loop(
        &mut self,
        element: &TemplateElement,
        scope: &Scope,
        parent_sid: &Sid,
        iteration_key: Option<&str>,
        slots: &SlotContext,
        form: Option<&FormCtx>,
        out: &mut Vec<VNode>,
    ) -> Result<bool> {
        let sid = self.element_sid(element, scope, parent_sid, iteration_key)?;
        let Some(scope) = self.prepare_scope(element, scope, &sid, true)? else {
            return Ok(false);
        };

        let each_text = element.attr("each").ok_or_else(|| {
            WeftError::syntax("each", "Loop requires an each attribute")
        })?;
        let spec = self.parse_each(&scope, each_text)?;

        let collection = {
            let compiled = self.rt.exprs.compile(&scope.flatten(), &spec.collection)?;
            evaluate(&compiled, &scope, &self.rt.store, &self.rt.externals, Mode::Pure)?
                .materialize()
        };

        let rows: Vec<(RowKey, Value)> = match &collection {
            Value::List(items) => {
                if spec.marker == MarkerSpec::Field
                    || spec.bindings.iter().any(|(_, role)| *role == Role::Field)
                {
                    return Err(WeftError::syntax(
                        "each",
                        "'field' applies to object iteration only",
                    ));
                }
                items
                    .iter()
                    .map(|item| (RowKey::Index, item.clone()))
                    .collect()
            }
            Value::Object(fields) => {
                if spec.marker == MarkerSpec::Index {
                    return Err(WeftError::syntax(
                        "each",
                        "'marked by index' applies to list iteration only",
                    ));
                }
                fields
                    .iter()
                    .map(|(key, item)| (RowKey::Field(key.clone()), item.clone()))
                    .collect()
            }
            Value::Null => Vec::new(),
            other => {
                return Err(WeftError::eval(format!(
                    "each expects a list or object, got {other:?}"
                )))
            }
        };

        let total = rows.len();
        let mut seen_markers = FxHashSet::default();

        for (position, (key, item)) in rows.into_iter().enumerate() {
            let row_scope = scope.fork();
            for (name, role) in &spec.bindings {
                let bound = match role {
                    Role::Value => item.clone(),
                    Role::Index => Value::Number(position as f64),
                    Role::Field => match &key {
                        RowKey::Field(field) => Value::text(field.clone()),
                        RowKey::Index => Value::Null,
                    },
                    Role::IsFirst => Value::Bool(position == 0),
                    Role::IsLast => Value::Bool(position + 1 == total),
                };
                row_scope.bind_value(name, bound)?;
            }

            let marker = match &spec.marker {
                MarkerSpec::Index => format_number(position as f64),
                MarkerSpec::Field => match &key {
                    RowKey::Field(field) => field.clone(),
                    RowKey::Index => unreachable!("checked against the collection shape"),
                },
                MarkerSpec::Expr(text) => {
                    let compiled = self.rt.exprs.compile(&row_scope.flatten(), text)?;
                    evaluate(
                        &compiled,
                        &row_scope,
                        &self.rt.store,
                        &self.rt.externals,
                        Mode::Pure,
                    )?
                    .marker_string()
                }
            };
            if !seen_markers.insert(marker.clone()) {
                return Err(WeftError::DuplicateMarker(marker));
            }

            let children = self.render_children(
                &element.children,
                &row_scope,
                &sid,
                Some(&marker),
                slots,
                form,
            )?;
            out.push(VNode::Fragment(children));
        }

        Ok(total > 0)
    }

    /// Parses the `each` grammar. The collection body uses the
    /// first-that-compiles rule with the constraint that the remainder must
    /// be empty or a `marked by` clause.
    fn parse_each(&mut self, scope: &Scope, text: &str) -> Result<EachSpec> {
        let of_at = text.find(" of ").ok_or_else(|| {
            WeftError::syntax("each", "missing 'of' between bindings and collection")
        })?;
        let bindings = parse_bindings(&text[..of_at])?;

        let after_of = text[of_at + 4..].trim_start();
        let inner = after_of.strip_prefix('{').ok_or_else(|| {
            WeftError::syntax("each", "collection must be an {EXPR}")
        })?;

        let flat = scope.flatten();
        let mut accepted = None;
        for (close, _) in inner.match_indices('}') {
            let body = &inner[..close];
            let remainder = inner[close + 1..].trim();
            if !(remainder.is_empty() || remainder.starts_with("marked by")) {
                continue;
            }
            if self.rt.exprs.compile(&flat, body).is_ok() {
                accepted = Some((body.to_string(), remainder));
                break;
            }
        }
        let Some((collection, remainder)) = accepted else {
            return Err(WeftError::syntax(
                "each",
                "no compiling collection expression",
            ));
        };

        let marker_text = remainder.strip_prefix("marked by").map(str::trim).ok_or_else(
            || WeftError::syntax("each", "missing 'marked by MARKER'"),
        )?;
        let marker = if marker_text == "index" {
            MarkerSpec::Index
        } else if marker_text == "field" {
            MarkerSpec::Field
        } else if let Some(body) = marker_text
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        {
            MarkerSpec::Expr(body.trim().to_string())
        } else {
            return Err(WeftError::syntax(
                "each",
                format!("invalid marker '{marker_text}'"),
            ));
        };

        Ok(EachSpec {
            bindings,
            collection,
            marker,
        })
    }
}

enum RowKey {
    Index,
    Field(String),
}

fn parse_bindings(text: &str) -> Result<Vec<(String, Role)>> {
    let mut bindings = Vec::new();
    let mut bare_seen = false;
    for part in text.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, role_text) = match part.split_once(" as ") {
            Some((name, role)) => (name.trim(), Some(role.trim())),
            None => (part, None),
        };
        if !name.starts_with('$') {
            return Err(WeftError::syntax(
                "each",
                format!("binding '{name}' must start with '$'"),
            ));
        }
        let role = match role_text {
            None => {
                if bare_seen {
                    return Err(WeftError::syntax(
                        "each",
                        "only one binding may omit its role",
                    ));
                }
                bare_seen = true;
                Role::Value
            }
            Some("value") => Role::Value,
            Some("index") => Role::Index,
            Some("field") => Role::Field,
            Some("isFirst") => Role::IsFirst,
            Some("isLast") => Role::IsLast,
            Some(other) => {
                return Err(WeftError::syntax(
                    "each",
                    format!("unknown role '{other}'"),
                ))
            }
        };
        bindings.push((name.to_string(), role));
    }
    if bindings.is_empty() {
        return Err(WeftError::syntax("each", "at least one binding required"));
    }
    Ok(bindings)
}
