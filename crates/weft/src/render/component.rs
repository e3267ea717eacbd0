//! Component definitions, use-site expansion, and slot projection.
//!
//! A `<Name:Template>` element captures its parameter list, optional
//! template-level init, and child template nodes, then leaves the document.
//! A use-site binds parameters in the caller's scope, classifies children
//! into slots, and renders the template in a fresh scope whose implicit
//! self-handle roots at the instance's SID-keyed local namespace.

use super::{FormCtx, RenderPass, SlotContext, RESERVED_ATTRS};
use crate::error::{Result, WeftError};
use crate::expr::resolve_handle_expr;
use crate::handle::Handle;
use crate::scope::Scope;
use crate::sid::Sid;
use crate::state::{local_namespace, GLOBAL, URL};
use crate::template::{number_template, TemplateElement, TemplateNode};
use crate::value::Value;
use crate::vdom::VNode;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// `$name` — receives a value.
    Value,
    /// `@name` — receives a handle.
    Handle,
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Name without its sigil, authored case.
    pub name: String,
    pub kind: ParamKind,
}

pub struct ComponentDef {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub init: Option<String>,
    /// Template children, segment-numbered within this template.
    pub template: Vec<TemplateNode>,
    /// Case-folded slot names appearing in the template.
    pub slot_names: Vec<String>,
}

/// Walks a tree, removing every `Name:Template` element and returning the
/// captured definitions.
pub fn collect_templates(nodes: Vec<TemplateNode>) -> Result<(Vec<TemplateNode>, Vec<ComponentDef>)> {
    let mut kept = Vec::new();
    let mut defs = Vec::new();
    for node in nodes {
        match node {
            TemplateNode::Element(element) => {
                if let Some(name) = element.tag.strip_suffix(":Template") {
                    defs.push(capture_definition(name, &element)?);
                } else {
                    let (children, nested) =
                        collect_templates(element.children.clone())?;
                    defs.extend(nested);
                    kept.push(TemplateNode::Element(std::rc::Rc::new(TemplateElement {
                        tag: element.tag.clone(),
                        attrs: element.attrs.clone(),
                        children,
                        segment: element.segment.clone(),
                    })));
                }
            }
            other => kept.push(other),
        }
    }
    Ok((kept, defs))
}

fn capture_definition(name: &str, element: &TemplateElement) -> Result<ComponentDef> {
    let mut params = Vec::new();
    if let Some(list) = element.attr("params") {
        for part in list.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (kind, bare) = match part.split_at(1) {
                ("$", rest) => (ParamKind::Value, rest),
                ("@", rest) => (ParamKind::Handle, rest),
                _ => {
                    return Err(WeftError::syntax(
                        "params",
                        format!("parameter '{part}' must start with '$' or '@'"),
                    ))
                }
            };
            params.push(ParamSpec {
                name: bare.to_string(),
                kind,
            });
        }
    }

    let template = number_template(&element.children);
    let mut slot_names = Vec::new();
    collect_slot_names(&template, &mut slot_names);

    Ok(ComponentDef {
        name: name.to_string(),
        params,
        init: element.attr("init").map(str::to_string),
        template,
        slot_names,
    })
}

fn collect_slot_names(nodes: &[TemplateNode], out: &mut Vec<String>) {
    for node in nodes {
        if let TemplateNode::Element(element) = node {
            if let Some(name) = element.tag.strip_suffix(":Slot") {
                let folded = name.to_ascii_lowercase();
                if !out.contains(&folded) {
                    out.push(folded);
                }
            }
            collect_slot_names(&element.children, out);
        }
    }
}

impl<'rt> RenderPass<'rt> {
    /// Expands a component use-site. Errors inside the instance are caught
    /// at this boundary and replaced with an error-indicator node.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn render_component_use(
        &mut self,
        def: &ComponentDef,
        element: &TemplateElement,
        caller_scope: &Scope,
        parent_sid: &Sid,
        iteration_key: Option<&str>,
        caller_slots: &SlotContext,
        form: Option<&FormCtx>,
    ) -> Result<Option<VNode>> {
        let sid = self.element_sid(element, caller_scope, parent_sid, iteration_key)?;
        // Use-site init participates in expansion, not in the generic path.
        let Some(caller_scope) = self.prepare_scope(element, caller_scope, &sid, false)? else {
            return Ok(None);
        };

        let use_init = element.attr("init").map(str::to_string);
        if def.init.is_some() && use_init.is_some() {
            return Err(WeftError::InitShape(format!(
                "init on both the template and a use-site of '{}'",
                def.name
            )));
        }
        let init = def.init.clone().or(use_init);

        // Slot classification happens in the caller's scope.
        let mut named: FxHashMap<String, Vec<VNode>> = FxHashMap::default();
        let mut default_children = Vec::new();
        for child in &element.children {
            let slot = child
                .as_element()
                .map(|e| e.tag.to_ascii_lowercase())
                .filter(|tag| def.slot_names.contains(tag) && *tag != def.name.to_ascii_lowercase());
            match slot {
                Some(slot_tag) => {
                    let filler = child.as_element().expect("slot fillers are elements");
                    let content = self.render_children(
                        &filler.children,
                        &caller_scope,
                        &sid,
                        None,
                        caller_slots,
                        form,
                    )?;
                    named.entry(slot_tag).or_default().extend(content);
                }
                None => {
                    if !child.is_blank_text() {
                        default_children.push(child.clone());
                    }
                }
            }
        }
        if !default_children.is_empty() {
            let content = self.render_children(
                &default_children,
                &caller_scope,
                &sid,
                None,
                caller_slots,
                form,
            )?;
            named.insert(def.name.to_ascii_lowercase(), content);
        }
        let slot_context = SlotContext::new(named);

        // Fresh scope: self handle, global and URL handles, parameters.
        let instance_scope = Scope::new();
        instance_scope.bind_handle(&def.name, Handle::root(local_namespace(&sid)))?;
        instance_scope.bind_handle("Global", Handle::root(GLOBAL))?;
        instance_scope.bind_handle("Url", Handle::root(URL))?;

        let mut passthrough = Vec::new();
        for (attr, raw) in &element.attrs {
            let param = def
                .params
                .iter()
                .find(|param| param.name.eq_ignore_ascii_case(attr));
            match param {
                Some(ParamSpec {
                    name,
                    kind: ParamKind::Handle,
                }) => {
                    let text = raw
                        .trim()
                        .strip_prefix('{')
                        .and_then(|rest| rest.strip_suffix('}'))
                        .map(str::trim)
                        .unwrap_or(raw.trim());
                    let handle = resolve_handle_expr(&caller_scope, text)?;
                    instance_scope.bind_handle(name, handle)?;
                }
                Some(ParamSpec {
                    name,
                    kind: ParamKind::Value,
                }) => {
                    // A single expression evaluates in pure mode; anything
                    // else is the raw attribute string.
                    let interpolation =
                        self.rt.exprs.interpolation(&caller_scope.flatten(), raw);
                    let value = if interpolation.lone {
                        self.rt.attr_value(&caller_scope, raw)?
                    } else {
                        Value::text(raw.clone())
                    };
                    instance_scope.bind_value(&format!("${name}"), value)?;
                }
                None => {
                    if !RESERVED_ATTRS.contains(&attr.as_str()) {
                        passthrough.push((attr.clone(), raw.clone()));
                    }
                }
            }
        }

        if let Some(init_text) = &init {
            self.rt.run_init(&sid, &instance_scope, init_text)?;
        }

        let name = def.name.clone();
        let rendered = self.boundary(&sid, &name, |pass| {
            let mut children = pass.render_children(
                &def.template,
                &instance_scope,
                &sid,
                None,
                &slot_context,
                None,
            )?;
            // Passthrough attributes land on the instance's first rendered
            // element, evaluated in the caller's scope.
            if !passthrough.is_empty() {
                if let Some(VNode::Element(first)) = children
                    .iter_mut()
                    .find(|node| matches!(node, VNode::Element(_)))
                {
                    for (attr, raw) in &passthrough {
                        let value = pass.rt.attr_value(&caller_scope, raw)?;
                        if !value.is_null() {
                            first.props.insert(attr.clone(), value);
                        }
                    }
                }
            }
            Ok(VNode::Fragment(children))
        });
        Ok(Some(rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::parse_document;

    #[test]
    fn definitions_are_captured_and_removed() {
        let nodes = parse_document(
            "<div><Card:Template params=\"$title, @data\" init=\"{ { n: 1 } }\">\
             <h2>{$title}</h2><Card:Slot/></Card:Template></div>",
        )
        .unwrap();
        let (kept, defs) = collect_templates(nodes).unwrap();
        assert_eq!(defs.len(), 1);
        let def = &defs[0];
        assert_eq!(def.name, "Card");
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.params[0].kind, ParamKind::Value);
        assert_eq!(def.params[1].kind, ParamKind::Handle);
        assert!(def.init.is_some());
        assert_eq!(def.slot_names, vec!["card".to_string()]);
        // The definition left the tree; the div stays.
        let div = kept[0].as_element().unwrap();
        assert!(div.children.is_empty());
    }

    #[test]
    fn malformed_params_are_rejected() {
        let nodes =
            parse_document("<Card:Template params=\"title\"></Card:Template>").unwrap();
        assert!(collect_templates(nodes).is_err());
    }
}
