//! Bootstrap: one-time global init, root discovery, and mounting.
//!
//! The host document may carry one `<WeftInit>` (before any root) whose
//! init deep-merges into the global namespace. Every `<WeftRoot>` clones
//! its children as the authored template, yields its component definitions
//! to the registry, and mounts a render function over the shared store.

use crate::error::{Result, WeftError};
use crate::render::{collect_templates, RenderPass, Runtime, SlotContext};
use crate::scope::Scope;
use crate::sid::{root_sid, Sid};
use crate::state::{GLOBAL, URL};
use crate::template::{number_template, TemplateElement, TemplateNode};
use crate::value::{deep_merge, Value};
use crate::vdom::{error_node, VNode};
use std::cell::RefCell;
use std::rc::Rc;

pub const INIT_TAG: &str = "WeftInit";
pub const ROOT_TAG: &str = "WeftRoot";

/// A mounted declarative root: the preserved template, the root element's
/// reserved attributes, and the output of the last render pass.
pub struct MountedRoot {
    pub sid: Sid,
    element: Rc<TemplateElement>,
    template: Vec<TemplateNode>,
    output: RefCell<VNode>,
}

impl MountedRoot {
    pub fn output(&self) -> VNode {
        self.output.borrow().clone()
    }
}

/// Scans a parsed host document: runs the global init, registers component
/// templates, and returns the mounted roots (not yet rendered).
pub fn bootstrap(runtime: &Runtime, document: &[TemplateNode]) -> Result<Vec<Rc<MountedRoot>>> {
    runtime.store.ensure(GLOBAL, None);
    runtime.store.ensure(URL, None);

    let mut roots = Vec::new();
    let mut init_seen = false;
    scan(runtime, document, &mut init_seen, &mut roots)?;
    Ok(roots)
}

fn scan(
    runtime: &Runtime,
    nodes: &[TemplateNode],
    init_seen: &mut bool,
    roots: &mut Vec<Rc<MountedRoot>>,
) -> Result<()> {
    for node in nodes {
        let Some(element) = node.as_element() else {
            continue;
        };
        if element.tag_is(INIT_TAG) {
            if *init_seen {
                return Err(WeftError::StructuralViolation(
                    "multiple global-init tags".to_string(),
                ));
            }
            if !roots.is_empty() {
                return Err(WeftError::StructuralViolation(
                    "global-init must precede every declarative root".to_string(),
                ));
            }
            *init_seen = true;
            apply_global_init(runtime, element)?;
            continue;
        }
        if element.tag_is(ROOT_TAG) {
            roots.push(mount_root(runtime, element, roots.len())?);
            continue;
        }
        scan(runtime, &element.children, init_seen, roots)?;
    }
    Ok(())
}

fn apply_global_init(runtime: &Runtime, element: &TemplateElement) -> Result<()> {
    let Some(init_text) = element.attr("init") else {
        return Ok(());
    };
    let scope = base_scope()?;
    let value = runtime.attr_value(&scope, init_text)?;
    if !matches!(value, Value::Object(_)) {
        return Err(WeftError::InitShape(format!(
            "global init must evaluate to an object, got {value:?}"
        )));
    }
    let mut global = runtime.store.namespace(GLOBAL);
    deep_merge(&mut global, &value);
    runtime.store.set_namespace(GLOBAL, global);
    Ok(())
}

fn mount_root(
    runtime: &Runtime,
    element: &Rc<TemplateElement>,
    index: usize,
) -> Result<Rc<MountedRoot>> {
    // Clone-then-register: the template survives even though a live DOM
    // container would be cleared on mount.
    let (kept, definitions) = collect_templates(element.children.clone())?;
    for definition in definitions {
        runtime.register_component(definition);
    }
    let template = number_template(&kept);

    let root_key = match element.attr("id") {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("root#{index}"),
    };

    Ok(Rc::new(MountedRoot {
        sid: root_sid(&root_key),
        element: element.clone(),
        template,
        output: RefCell::new(VNode::Fragment(Vec::new())),
    }))
}

/// Top-level scope every root renders under: the global and URL handles.
fn base_scope() -> Result<Scope> {
    let scope = Scope::new();
    scope.bind_handle("Global", crate::handle::Handle::root(GLOBAL))?;
    scope.bind_handle("Url", crate::handle::Handle::root(URL))?;
    Ok(scope)
}

/// One root's render function: builds the top-level scope, applies the
/// root's own reserved attributes, renders children. Failures surface as
/// the mount's error-indicator node.
pub fn render_root(pass: &mut RenderPass<'_>, root: &MountedRoot) -> VNode {
    let result = (|| -> Result<VNode> {
        let scope = base_scope()?;
        let Some(scope) = pass.prepare_scope_for_root(&root.element, &scope, &root.sid)? else {
            return Ok(VNode::Fragment(Vec::new()));
        };
        let children = pass.render_children(
            &root.template,
            &scope,
            &root.sid,
            None,
            &SlotContext::default(),
            None,
        )?;
        Ok(VNode::Fragment(children))
    })();
    let output = match result {
        Ok(node) => node,
        Err(error) => {
            tracing::error!(%error, "root render failed");
            error_node(root.sid.clone(), &error.to_string())
        }
    };
    *root.output.borrow_mut() = output.clone();
    output
}
