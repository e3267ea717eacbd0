//! Form binding.
//!
//! A form owns a state namespace — its SID-keyed local namespace by
//! default, or a caller-provided handle via `bind` — exposed to expressions
//! under the reserved `Form` alias. Named fields inside the form are
//! auto-bound bidirectionally with input-type-specific semantics; a field's
//! own `bind` overrides the `@Form.name` derivation.

use super::{RenderPass, SlotContext};
use crate::error::{Result, WeftError};
use crate::expr::resolve_handle_expr;
use crate::handle::Handle;
use crate::scope::Scope;
use crate::sid::Sid;
use crate::state::{local_namespace, Store};
use crate::template::TemplateElement;
use crate::value::Value;
use crate::vdom::{EventHandler, VElement, VNode};
use std::rc::Rc;

#[derive(Clone)]
pub struct FormCtx {
    pub handle: Handle,
}

impl<'rt> RenderPass<'rt> {
    pub(crate) fn render_form(
        &mut self,
        element: &TemplateElement,
        scope: &Scope,
        parent_sid: &Sid,
        iteration_key: Option<&str>,
        slots: &SlotContext,
    ) -> Result<Option<VNode>> {
        let sid = self.element_sid(element, scope, parent_sid, iteration_key)?;
        let bound = element.attr("bind");
        if bound.is_some() && element.has_attr("init") {
            return Err(WeftError::InitShape(
                "init is not allowed on a bound form".to_string(),
            ));
        }

        let handle = match bound {
            Some(bind_text) => resolve_handle_expr(scope, strip_braces(bind_text))?,
            None => {
                let namespace = local_namespace(&sid);
                self.rt.store.ensure(&namespace, None);
                Handle::root(namespace)
            }
        };

        let scope = scope.fork();
        let Some(scope) = self.prepare_scope(element, &scope, &sid, bound.is_none())? else {
            return Ok(None);
        };
        if element.has_attr("clear-on-unmount") {
            self.clear_on_unmount.insert(sid.to_string());
        }
        scope.bind_handle("Form", handle.clone())?;

        let mut rendered = VElement::new("form", sid.clone());
        self.apply_attrs(element, &scope, &mut rendered)?;

        // Submission is intercepted: default navigation is suppressed and
        // any author handler runs inside the wrapper.
        let author_submit = rendered.handler("submit");
        rendered.events.retain(|(name, _)| name != "submit");
        rendered.events.push((
            "submit".to_string(),
            intercept_submit(author_submit),
        ));

        let form = FormCtx { handle };
        rendered.children =
            self.render_children(&element.children, &scope, &sid, None, slots, Some(&form))?;
        Ok(Some(VNode::Element(rendered)))
    }

    /// Binds a field bidirectionally. Inside a form, named fields derive
    /// their handle from the form handle plus `name`; an explicit `bind`
    /// overrides that and also works on fields outside any form. Runs after
    /// the property map is built so type and value attributes are already
    /// evaluated.
    pub(crate) fn bind_form_field(
        &mut self,
        element: &TemplateElement,
        scope: &Scope,
        form: Option<&FormCtx>,
        rendered: &mut VElement,
    ) -> Result<()> {
        let tag = rendered.tag.as_str();
        let custom = tag.contains('-');
        if !(custom || matches!(tag, "input" | "textarea" | "select")) {
            return Ok(());
        }

        let field = match element.attr("bind") {
            Some(bind_text) => resolve_handle_expr(scope, strip_braces(bind_text))?,
            None => {
                let Some(form) = form else {
                    return Ok(());
                };
                match rendered.prop_text("name") {
                    Some(name) if !name.is_empty() => form.handle.child(&name),
                    _ => return Ok(()),
                }
            }
        };
        let store = self.rt.store.clone();
        let current = store.read(&field);

        if custom {
            // Custom elements receive only the value property; they wire
            // their own events.
            rendered.props.insert("value".to_string(), current);
            return Ok(());
        }

        let kind = rendered
            .prop_text("type")
            .unwrap_or_default()
            .to_ascii_lowercase();

        match (tag, kind.as_str()) {
            ("input", "checkbox") => {
                if current.is_truthy() {
                    rendered.props.insert("checked".to_string(), Value::Bool(true));
                } else {
                    rendered.props.shift_remove("checked");
                }
                let writer = write_on_event(store, field, |event| {
                    Some(Value::Bool(target(event, "checked").is_truthy()))
                });
                rendered.events.push(("change".to_string(), writer));
            }
            ("input", "radio") => {
                let own_value = rendered.prop_text("value").unwrap_or_default();
                if current.to_text() == own_value {
                    rendered.props.insert("checked".to_string(), Value::Bool(true));
                } else {
                    rendered.props.shift_remove("checked");
                }
                let writer = write_on_event(store, field, move |event| {
                    target(event, "checked")
                        .is_truthy()
                        .then(|| Value::text(own_value.clone()))
                });
                rendered.events.push(("change".to_string(), writer));
            }
            ("input", "file") => {
                let writer =
                    write_on_event(store, field, |event| Some(target(event, "files")));
                rendered.events.push(("change".to_string(), writer));
            }
            ("select", _) if rendered.prop("multiple").is_some() => {
                let writer =
                    write_on_event(store, field, |event| Some(target(event, "selected")));
                rendered.events.push(("change".to_string(), writer));
            }
            _ => {
                rendered
                    .props
                    .insert("value".to_string(), Value::text(current.to_text()));
                let writer = write_on_event(store, field, |event| {
                    Some(Value::text(target(event, "value").to_text()))
                });
                rendered.events.push(("input".to_string(), writer.clone()));
                rendered.events.push(("change".to_string(), writer));
            }
        }
        Ok(())
    }
}

fn intercept_submit(author: Option<EventHandler>) -> EventHandler {
    Rc::new(move |event: Value| {
        match &author {
            Some(handler) => handler(event),
            None => Ok(()),
        }
    })
}

fn write_on_event(
    store: Rc<Store>,
    field: Handle,
    extract: impl Fn(&Value) -> Option<Value> + 'static,
) -> EventHandler {
    Rc::new(move |event: Value| {
        if let Some(value) = extract(&event) {
            store.write(&field, value)?;
        }
        Ok(())
    })
}

fn target(event: &Value, property: &str) -> Value {
    event
        .get("target")
        .and_then(|target| target.get(property))
        .cloned()
        .unwrap_or(Value::Null)
}

fn strip_braces(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .map(str::trim)
        .unwrap_or(trimmed)
}
