//! The renderer: a recursive walk over the authored template producing
//! virtual-DOM output.
//!
//! Per element, reserved attributes are processed in a fixed order
//! (`import` → `init` → `def` → `test` → everything else), the SID is
//! derived from the parent SID and the element's *source* segment, and
//! children render under a sibling-local conditional-chain context so
//! `When`/`Else`/`Loop` siblings can coordinate.

use crate::error::{Result, WeftError};
use crate::expr::{
    evaluate, interpolate_text, interpolate_value, resolve_handle_expr, Externals, ExprCache,
};
use crate::handle::{Handle, Mode};
use crate::scope::Scope;
use crate::sid::{child_sid, Sid};
use crate::state::{local_namespace, Store};
use crate::template::{TemplateElement, TemplateNode};
use crate::value::Value;
use crate::vdom::{error_node, VElement, VNode};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::rc::Rc;

mod component;
pub use component::{collect_templates, ComponentDef, ParamKind, ParamSpec};

mod each;

mod forms;
pub use forms::FormCtx;

/// Attribute names with runtime meaning; never emitted as properties.
pub const RESERVED_ATTRS: &[&str] = &[
    "import",
    "init",
    "def",
    "test",
    "each",
    "params",
    "bind",
    "marker",
    "clear-on-unmount",
];

/// Attributes that omit on any falsy variant and emit a bare marker
/// otherwise.
pub const BOOLEAN_ATTRS: &[&str] = &[
    "checked", "disabled", "selected", "readonly", "required", "hidden", "open", "multiple",
    "autofocus",
];

/// The shared runtime every mount on a page renders against: the store, the
/// ambient externals, the expression caches, the component registry, and the
/// once-per-SID init ledger.
pub struct Runtime {
    pub store: Rc<Store>,
    pub externals: Rc<Externals>,
    pub exprs: Rc<ExprCache>,
    components: RefCell<FxHashMap<String, Rc<ComponentDef>>>,
    init_done: RefCell<FxHashSet<String>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            store: Rc::new(Store::new()),
            externals: Rc::new(Externals::new()),
            exprs: Rc::new(ExprCache::new()),
            components: RefCell::new(FxHashMap::default()),
            init_done: RefCell::new(FxHashSet::default()),
        }
    }

    /// Registers a component definition under its (case-folded) name.
    pub fn register_component(&self, def: ComponentDef) {
        self.components
            .borrow_mut()
            .insert(def.name.to_ascii_lowercase(), Rc::new(def));
    }

    pub fn component(&self, tag: &str) -> Option<Rc<ComponentDef>> {
        self.components
            .borrow()
            .get(&tag.to_ascii_lowercase())
            .cloned()
    }

    /// Runs `init` at most once per SID. The evaluated value must be an
    /// object; it seeds the SID's local namespace.
    pub fn run_init(&self, sid: &Sid, scope: &Scope, init_text: &str) -> Result<()> {
        if self.init_done.borrow().contains(sid.as_ref()) {
            return Ok(());
        }
        let interpolation = self.exprs.interpolation(&scope.flatten(), init_text);
        let value = interpolate_value(&interpolation, scope, &self.store, &self.externals)?;
        if !matches!(value, Value::Object(_)) {
            return Err(WeftError::InitShape(format!(
                "init must evaluate to an object, got {value:?}"
            )));
        }
        self.store.ensure(&local_namespace(sid), Some(value));
        self.init_done.borrow_mut().insert(sid.to_string());
        Ok(())
    }

    /// Drops a SID's local namespace and its init ledger entry, so a later
    /// remount seeds afresh. Used by `clear-on-unmount` reconciliation.
    pub fn clear_local(&self, sid: &str) {
        self.store.clear(&local_namespace(sid));
        self.init_done.borrow_mut().remove(sid);
    }

    /// Evaluates an attribute as a value-preserving interpolation.
    pub fn attr_value(&self, scope: &Scope, text: &str) -> Result<Value> {
        let interpolation = self.exprs.interpolation(&scope.flatten(), text);
        interpolate_value(&interpolation, scope, &self.store, &self.externals)
    }

    /// Evaluates an attribute as text, tolerating segment errors.
    pub fn attr_text(&self, scope: &Scope, text: &str) -> String {
        let interpolation = self.exprs.interpolation(&scope.flatten(), text);
        interpolate_text(&interpolation, scope, &self.store, &self.externals)
    }
}

/// Per-slot pre-rendered content available while a component template
/// renders. Keys are case-folded slot names.
#[derive(Default, Clone)]
pub struct SlotContext {
    slots: Rc<FxHashMap<String, Vec<VNode>>>,
}

impl SlotContext {
    pub fn new(slots: FxHashMap<String, Vec<VNode>>) -> Self {
        Self {
            slots: Rc::new(slots),
        }
    }

    fn get(&self, name: &str) -> Option<&Vec<VNode>> {
        self.slots.get(name)
    }
}

/// State of one render pass: which SIDs asked to clear their local state on
/// unmount, so the page can reconcile after the pass.
pub struct RenderPass<'rt> {
    pub rt: &'rt Runtime,
    pub clear_on_unmount: FxHashSet<String>,
}

/// Sibling-local conditional context: `Some(matched)` while a
/// `When`/`Loop` chain is open.
type Chain = Option<bool>;

impl<'rt> RenderPass<'rt> {
    pub fn new(rt: &'rt Runtime) -> Self {
        Self {
            rt,
            clear_on_unmount: FxHashSet::default(),
        }
    }

    pub fn render_children(
        &mut self,
        nodes: &[TemplateNode],
        scope: &Scope,
        parent_sid: &Sid,
        iteration_key: Option<&str>,
        slots: &SlotContext,
        form: Option<&FormCtx>,
    ) -> Result<Vec<VNode>> {
        let mut out = Vec::new();
        let mut chain: Chain = None;

        for node in nodes {
            match node {
                TemplateNode::Text(text) => {
                    if !node.is_blank_text() {
                        chain = None;
                    }
                    out.push(VNode::Text(self.rt.attr_text(scope, text)));
                }
                TemplateNode::Element(element) => {
                    if element.tag_is("When") {
                        let taken = self.render_branch(
                            element,
                            scope,
                            parent_sid,
                            iteration_key,
                            slots,
                            form,
                            &mut out,
                        )?;
                        chain = Some(taken);
                    } else if element.tag_is("Else") {
                        let Some(matched) = chain else {
                            return Err(WeftError::syntax(
                                "Else",
                                "no preceding When or Loop in this chain",
                            ));
                        };
                        if matched {
                            continue;
                        }
                        let taken = self.render_branch(
                            element,
                            scope,
                            parent_sid,
                            iteration_key,
                            slots,
                            form,
                            &mut out,
                        )?;
                        if taken {
                            chain = Some(true);
                        }
                    } else if element.tag_is("Loop") {
                        let produced = self.expand_loop(
                            element,
                            scope,
                            parent_sid,
                            iteration_key,
                            slots,
                            form,
                            &mut out,
                        )?;
                        chain = Some(produced);
                    } else {
                        chain = None;
                        if let Some(rendered) = self.render_node(
                            element,
                            scope,
                            parent_sid,
                            iteration_key,
                            slots,
                            form,
                        )? {
                            out.push(rendered);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Renders one conditional branch; returns whether it was taken. Taken
    /// branches contribute their children as a flat fragment.
    #[allow(clippy::too_many_arguments)]
    fn render_branch(
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
        let Some(branch_scope) = self.prepare_scope(element, scope, &sid, true)? else {
            return Ok(false);
        };
        let children =
            self.render_children(&element.children, &branch_scope, &sid, None, slots, form)?;
        out.push(VNode::Fragment(children));
        Ok(true)
    }

    /// Dispatch for a single non-chain element.
    fn render_node(
        &mut self,
        element: &TemplateElement,
        scope: &Scope,
        parent_sid: &Sid,
        iteration_key: Option<&str>,
        slots: &SlotContext,
        form: Option<&FormCtx>,
    ) -> Result<Option<VNode>> {
        if let Some(name) = element.tag.strip_suffix(":Template") {
            // Stray definition outside bootstrap collection; contributes
            // nothing to output.
            tracing::debug!(component = name, "skipping template definition in render");
            return Ok(None);
        }
        if let Some(name) = slot_name(&element.tag) {
            return self
                .render_slot(element, &name, scope, parent_sid, iteration_key, slots, form)
                .map(Some);
        }
        if element.tag_is("Url") {
            return self.render_url(element, scope, parent_sid, iteration_key, slots, form);
        }
        if let Some(def) = self.rt.component(&element.tag) {
            return self.render_component_use(
                &def,
                element,
                scope,
                parent_sid,
                iteration_key,
                slots,
                form,
            );
        }
        // Capitalized tags are use-sites by convention; an unregistered one
        // is a missing definition, not a plain element.
        if element
            .tag
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
        {
            return Err(WeftError::TemplateNotFound(element.tag.clone()));
        }
        if element.tag_is("form") {
            return self.render_form(element, scope, parent_sid, iteration_key, slots);
        }
        self.render_element(element, scope, parent_sid, iteration_key, slots, form)
    }

    /// SID of an element: explicit `marker` attribute if present, else the
    /// source segment, combined with the parent SID and iteration key.
    fn element_sid(
        &mut self,
        element: &TemplateElement,
        scope: &Scope,
        parent_sid: &Sid,
        iteration_key: Option<&str>,
    ) -> Result<Sid> {
        let segment = match element.attr("marker") {
            Some(marker_text) => self.rt.attr_value(scope, marker_text)?.marker_string(),
            None => element.segment.clone(),
        };
        Ok(child_sid(parent_sid, &segment, iteration_key))
    }

    /// Root elements process their reserved attributes like any element.
    pub(crate) fn prepare_scope_for_root(
        &mut self,
        element: &TemplateElement,
        scope: &Scope,
        sid: &Sid,
    ) -> Result<Option<Scope>> {
        self.prepare_scope(element, scope, sid, true)
    }

    /// Processes `import` → `init` → `def` → `test` and returns the scope
    /// the element's body runs in, or `None` when `test` is falsy.
    fn prepare_scope(
        &mut self,
        element: &TemplateElement,
        scope: &Scope,
        sid: &Sid,
        run_init: bool,
    ) -> Result<Option<Scope>> {
        let needs_fork = element.has_attr("import") || element.has_attr("def");
        let scope = if needs_fork { scope.fork() } else { scope.clone() };

        if let Some(imports) = element.attr("import") {
            for name in imports.split(',') {
                let name = name.trim();
                if !name.is_empty() {
                    scope.add_import(name);
                }
            }
        }

        if run_init {
            if let Some(init_text) = element.attr("init") {
                self.rt.run_init(sid, &scope, init_text)?;
            }
        }

        if let Some(def_text) = element.attr("def") {
            self.apply_def(&scope, sid, def_text)?;
        }

        if let Some(test_text) = element.attr("test") {
            if !self.rt.attr_value(&scope, test_text)?.is_truthy() {
                return Ok(None);
            }
        }

        Ok(Some(scope))
    }

    /// Applies a `def` attribute: a comma-separated list of
    /// `$NAME := {EXPR}`, `@NAME := @HANDLE.path`, and `@NAME as local`.
    fn apply_def(&mut self, scope: &Scope, sid: &Sid, def_text: &str) -> Result<()> {
        let mut rest = def_text.trim_start();
        while !rest.is_empty() {
            rest = match rest.chars().next() {
                Some('$') => self.apply_value_def(scope, rest)?,
                Some('@') => self.apply_handle_def(scope, sid, rest)?,
                _ => {
                    return Err(WeftError::syntax(
                        "def",
                        format!("expected $NAME or @NAME, found '{rest}'"),
                    ))
                }
            };
            rest = rest.trim_start();
            if let Some(after_comma) = rest.strip_prefix(',') {
                rest = after_comma.trim_start();
            } else if !rest.is_empty() {
                return Err(WeftError::syntax(
                    "def",
                    format!("expected ',' between declarations, found '{rest}'"),
                ));
            }
        }
        Ok(())
    }

    /// `$NAME := {EXPR}` — the brace body is found first-that-compiles, with
    /// the extra constraint that the declaration list must continue cleanly
    /// after the closing brace.
    fn apply_value_def<'t>(&mut self, scope: &Scope, text: &'t str) -> Result<&'t str> {
        let (name, rest) = split_identifier(text);
        let rest = rest.trim_start();
        let rest = rest.strip_prefix(":=").ok_or_else(|| {
            WeftError::syntax("def", format!("expected ':=' after '{name}'"))
        })?;
        let rest = rest.trim_start();
        let inner = rest.strip_prefix('{').ok_or_else(|| {
            WeftError::syntax("def", format!("expected '{{EXPR}}' after '{name} :='"))
        })?;

        let flat = scope.flatten();
        for (close, _) in inner.match_indices('}') {
            let body = &inner[..close];
            let after = inner[close + 1..].trim_start();
            if !(after.is_empty() || after.starts_with(',')) {
                continue;
            }
            if let Ok(compiled) = self.rt.exprs.compile(&flat, body) {
                let value = evaluate(
                    &compiled,
                    scope,
                    &self.rt.store,
                    &self.rt.externals,
                    Mode::Pure,
                )?
                .materialize();
                scope.bind_value(&name, value)?;
                return Ok(&inner[close + 1..]);
            }
        }
        Err(WeftError::syntax(
            "def",
            format!("no compiling expression body for '{name}'"),
        ))
    }

    /// `@NAME := @HANDLE.path` or `@NAME as local`.
    fn apply_handle_def<'t>(
        &mut self,
        scope: &Scope,
        sid: &Sid,
        text: &'t str,
    ) -> Result<&'t str> {
        let (sigiled, rest) = split_identifier(text);
        let name = sigiled.trim_start_matches('@');
        let rest_trimmed = rest.trim_start();

        if let Some(after) = rest_trimmed.strip_prefix("as local") {
            let namespace = local_namespace(sid);
            self.rt.store.ensure(&namespace, None);
            scope.bind_handle(name, Handle::root(namespace))?;
            return Ok(after);
        }

        let after_assign = rest_trimmed.strip_prefix(":=").ok_or_else(|| {
            WeftError::syntax(
                "def",
                format!("expected ':=' or 'as local' after '@{name}'"),
            )
        })?;
        let after_assign = after_assign.trim_start();
        let end = after_assign.find(',').unwrap_or(after_assign.len());
        let handle_text = after_assign[..end].trim();
        let handle_text = handle_text
            .strip_prefix('{')
            .and_then(|inner| inner.strip_suffix('}'))
            .map(str::trim)
            .unwrap_or(handle_text);
        let handle = resolve_handle_expr(scope, handle_text)?;
        scope.bind_handle(name, handle)?;
        Ok(&after_assign[end..])
    }

    /// Ordinary element: reserved attributes, property map, event wiring,
    /// children.
    pub(crate) fn render_element(
        &mut self,
        element: &TemplateElement,
        scope: &Scope,
        parent_sid: &Sid,
        iteration_key: Option<&str>,
        slots: &SlotContext,
        form: Option<&FormCtx>,
    ) -> Result<Option<VNode>> {
        let sid = self.element_sid(element, scope, parent_sid, iteration_key)?;
        let Some(scope) = self.prepare_scope(element, scope, &sid, true)? else {
            return Ok(None);
        };
        if element.has_attr("clear-on-unmount") {
            self.clear_on_unmount.insert(sid.to_string());
        }

        let mut rendered = VElement::new(element.tag.to_ascii_lowercase(), sid.clone());
        self.apply_attrs(element, &scope, &mut rendered)?;
        self.bind_form_field(element, &scope, form, &mut rendered)?;

        rendered.children =
            self.render_children(&element.children, &scope, &sid, None, slots, form)?;
        Ok(Some(VNode::Element(rendered)))
    }

    /// Evaluates non-reserved attributes into the property map and wires
    /// `on*` effect handlers.
    pub(crate) fn apply_attrs(
        &mut self,
        element: &TemplateElement,
        scope: &Scope,
        rendered: &mut VElement,
    ) -> Result<()> {
        for (name, raw) in &element.attrs {
            if RESERVED_ATTRS.contains(&name.as_str()) {
                continue;
            }
            if let Some(event) = event_name(name, raw) {
                let handler = self.effect_handler(scope, raw)?;
                rendered.events.push((event.to_string(), handler));
                continue;
            }

            let interpolation = self.rt.exprs.interpolation(&scope.flatten(), raw);
            let value = if interpolation.has_expressions() {
                interpolate_value(&interpolation, scope, &self.rt.store, &self.rt.externals)?
            } else {
                Value::text(raw.clone())
            };

            if BOOLEAN_ATTRS.contains(&name.as_str()) {
                if !value.is_boolean_off() {
                    rendered.props.insert(name.clone(), Value::Bool(true));
                }
            } else if interpolation.lone && value.is_null() {
                // Whole-expression attributes evaluating to null are omitted.
            } else {
                rendered.props.insert(name.clone(), value.materialize());
            }
        }
        Ok(())
    }

    /// Wraps an `@{EXPR}` event attribute: on invocation the scope forks,
    /// the event value binds under `$event`, and the body evaluates in
    /// effect mode.
    pub(crate) fn effect_handler(
        &mut self,
        scope: &Scope,
        raw: &str,
    ) -> Result<crate::vdom::EventHandler> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("@{")
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| {
                WeftError::syntax("on*", format!("expected @{{EXPR}}, found '{raw}'"))
            })?;
        let compiled = self.rt.exprs.compile(&scope.flatten(), body)?;
        let scope = scope.clone();
        let store = self.rt.store.clone();
        let externals = self.rt.externals.clone();
        Ok(Rc::new(move |event: Value| {
            let forked = scope.fork();
            forked.bind_value("$event", event)?;
            evaluate(&compiled, &forked, &store, &externals, Mode::Effect)?;
            Ok(())
        }))
    }

    /// Slot placeholder inside a component template: provided content wins,
    /// template-side fallback otherwise; either way wrapped in a neutral
    /// container keyed by the slot's SID.
    #[allow(clippy::too_many_arguments)]
    fn render_slot(
        &mut self,
        element: &TemplateElement,
        name: &str,
        scope: &Scope,
        parent_sid: &Sid,
        iteration_key: Option<&str>,
        slots: &SlotContext,
        form: Option<&FormCtx>,
    ) -> Result<VNode> {
        let sid = self.element_sid(element, scope, parent_sid, iteration_key)?;
        let content = match slots.get(name) {
            Some(content) => content.clone(),
            None => self.render_children(&element.children, scope, &sid, None, slots, form)?,
        };
        let mut wrapper = VElement::new("w-slot", sid);
        wrapper.children = content;
        Ok(VNode::Element(wrapper))
    }

    /// URL annotation: a neutral container carrying the include/transient
    /// key lists as data attributes for the synchronizer to discover.
    fn render_url(
        &mut self,
        element: &TemplateElement,
        scope: &Scope,
        parent_sid: &Sid,
        iteration_key: Option<&str>,
        slots: &SlotContext,
        form: Option<&FormCtx>,
    ) -> Result<Option<VNode>> {
        let sid = self.element_sid(element, scope, parent_sid, iteration_key)?;
        let Some(scope) = self.prepare_scope(element, scope, &sid, true)? else {
            return Ok(None);
        };
        let mut rendered = VElement::new("w-url", sid.clone());
        for (attr, data) in [("include", "data-url-include"), ("transient", "data-url-transient")]
        {
            if let Some(keys) = element.attr(attr) {
                let normalized = keys
                    .split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .collect::<Vec<_>>()
                    .join(",");
                rendered
                    .props
                    .insert(data.to_string(), Value::text(normalized));
            }
        }
        rendered.children =
            self.render_children(&element.children, &scope, &sid, None, slots, form)?;
        Ok(Some(VNode::Element(rendered)))
    }

    /// Component-boundary error capture: the subtree is replaced with an
    /// error-indicator node and the failure is reported.
    pub(crate) fn boundary(
        &mut self,
        sid: &Sid,
        component: &str,
        render: impl FnOnce(&mut Self) -> Result<VNode>,
    ) -> VNode {
        match render(self) {
            Ok(node) => node,
            Err(error) => {
                tracing::error!(component, %error, "component render failed");
                error_node(sid.clone(), &error.to_string())
            }
        }
    }
}

/// `Name:Slot` tags name the slot they expand; case-folded.
fn slot_name(tag: &str) -> Option<String> {
    let name = tag.strip_suffix(":Slot")?;
    Some(name.to_ascii_lowercase())
}

/// Event attributes are `on*` names whose value is an effect expression.
fn event_name<'a>(name: &'a str, raw: &str) -> Option<&'a str> {
    let event = name.strip_prefix("on")?;
    if event.is_empty() || !raw.trim_start().starts_with("@{") {
        return None;
    }
    Some(event)
}

/// Splits a leading `$name`/`@name` identifier off a `def` declaration.
fn split_identifier(text: &str) -> (String, &str) {
    let end = text
        .char_indices()
        .skip(1)
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    (text[..end].to_string(), &text[end..])
}
