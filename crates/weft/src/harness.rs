//! Headless page host.
//!
//! Owns the parsed document, the runtime, the mounted roots, and a fake
//! location fragment; injects DOM-ish events and runs the flush cycle
//! (rerender while dirty, then outbound URL sync). This is how the crate is
//! exercised without a browser — tests and the CLI both drive it.

use crate::bootstrap::{bootstrap, render_root, MountedRoot};
use crate::error::{Result, WeftError};
use crate::render::{RenderPass, Runtime};
use crate::state::URL;
use crate::template::parse_document;
use crate::url::{collect_annotations, parse_fragment, serialize_fragment};
use crate::value::Value;
use crate::vdom::{VElement, VNode};
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::rc::Rc;

pub struct Page {
    runtime: Rc<Runtime>,
    roots: Vec<Rc<MountedRoot>>,
    fragment: RefCell<String>,
    clear_flagged: RefCell<FxHashSet<String>>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").finish_non_exhaustive()
    }
}

impl Page {
    pub fn open(html: &str) -> Result<Page> {
        Self::open_with_fragment(html, "")
    }

    pub fn open_with_fragment(html: &str, fragment: &str) -> Result<Page> {
        Self::open_configured(html, fragment, |_| {})
    }

    /// Opens a page with a configuration hook that runs before anything
    /// renders — the place to register ambient externals or swap the
    /// compile strategy.
    pub fn open_configured(
        html: &str,
        fragment: &str,
        configure: impl FnOnce(&Runtime),
    ) -> Result<Page> {
        let runtime = Rc::new(Runtime::new());
        configure(&runtime);
        let document = parse_document(html)?;

        // Inbound load: the fragment overwrites the whole URL namespace
        // before anything renders. The load itself is not an outbound
        // trigger.
        runtime.store.ensure(URL, None);
        runtime
            .store
            .set_namespace(URL, parse_fragment(fragment));
        runtime.store.take_dirty();

        let roots = bootstrap(&runtime, &document)?;
        let page = Page {
            runtime,
            roots,
            fragment: RefCell::new(normalize_fragment(fragment)),
            clear_flagged: RefCell::new(FxHashSet::default()),
        };
        page.runtime.store.take_dirty();
        page.rerender();
        page.flush();
        Ok(page)
    }

    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }

    pub fn fragment(&self) -> String {
        self.fragment.borrow().clone()
    }

    /// Simulates an external fragment change (hashchange): the URL namespace
    /// is overwritten wholesale, then the page rerenders.
    pub fn set_fragment(&self, fragment: &str) {
        *self.fragment.borrow_mut() = normalize_fragment(fragment);
        self.runtime
            .store
            .set_namespace(URL, parse_fragment(fragment));
        self.runtime.store.take_dirty();
        self.rerender();
        self.flush();
    }

    pub fn html(&self) -> String {
        self.roots
            .iter()
            .map(|root| root.output().to_html())
            .collect()
    }

    pub fn text(&self) -> String {
        self.roots
            .iter()
            .map(|root| root.output().text_content())
            .collect()
    }

    pub fn find(&self, selector: &str) -> Option<VElement> {
        let matcher = Selector::parse(selector);
        let mut found = None;
        for root in &self.roots {
            root.output().visit_elements(&mut |element| {
                if found.is_none() && matcher.matches(element) {
                    found = Some(element.clone());
                }
            });
        }
        found
    }

    pub fn click(&self, selector: &str) -> Result<()> {
        self.dispatch(selector, "click", Value::object([("type", Value::text("click"))]))
    }

    pub fn input(&self, selector: &str, text: &str) -> Result<()> {
        self.dispatch(
            selector,
            "input",
            event_with_target([("value", Value::text(text))]),
        )
    }

    pub fn change(&self, selector: &str, text: &str) -> Result<()> {
        self.dispatch(
            selector,
            "change",
            event_with_target([("value", Value::text(text))]),
        )
    }

    pub fn check(&self, selector: &str, checked: bool) -> Result<()> {
        self.dispatch(
            selector,
            "change",
            event_with_target([("checked", Value::Bool(checked))]),
        )
    }

    /// Selects a radio button (checked change on that element).
    pub fn choose(&self, selector: &str) -> Result<()> {
        self.check(selector, true)
    }

    pub fn select_multiple(&self, selector: &str, values: &[&str]) -> Result<()> {
        self.dispatch(
            selector,
            "change",
            event_with_target([(
                "selected",
                Value::list(values.iter().map(|v| Value::text(*v))),
            )]),
        )
    }

    pub fn attach_files(&self, selector: &str, names: &[&str]) -> Result<()> {
        self.dispatch(
            selector,
            "change",
            event_with_target([(
                "files",
                Value::list(names.iter().map(|n| Value::text(*n))),
            )]),
        )
    }

    pub fn submit(&self, selector: &str) -> Result<()> {
        self.dispatch(
            selector,
            "submit",
            Value::object([("type", Value::text("submit"))]),
        )
    }

    fn dispatch(&self, selector: &str, event: &str, payload: Value) -> Result<()> {
        let element = self.find(selector).ok_or_else(|| {
            WeftError::eval(format!("no rendered element matches '{selector}'"))
        })?;
        let handler = element.handler(event).ok_or_else(|| {
            WeftError::eval(format!("'{selector}' has no {event} handler"))
        })?;
        handler(payload)?;
        self.flush();
        Ok(())
    }

    /// The microtask flush: rerender while any namespace is dirty, then run
    /// the outbound URL synchronizer once if the URL namespace changed.
    pub fn flush(&self) {
        let mut url_changed = false;
        let mut guard = 0;
        while self.runtime.store.is_dirty() {
            let dirty = self.runtime.store.take_dirty();
            url_changed |= dirty.contains(URL);
            self.rerender();
            guard += 1;
            if guard > 64 {
                tracing::warn!("render loop did not settle after 64 passes");
                break;
            }
        }
        if url_changed {
            self.sync_url_outbound();
        }
    }

    /// One full logical rerender of every mounted root, plus
    /// clear-on-unmount reconciliation against the previous pass.
    fn rerender(&self) {
        let mut pass = RenderPass::new(&self.runtime);
        for root in &self.roots {
            render_root(&mut pass, root);
        }
        let now = pass.clear_on_unmount;
        let previous = std::mem::replace(&mut *self.clear_flagged.borrow_mut(), now.clone());
        for sid in previous.difference(&now) {
            self.runtime.clear_local(sid);
        }
    }

    /// Filters the URL namespace through the mounted annotations and
    /// replaces the fragment if the serialized form differs.
    fn sync_url_outbound(&self) {
        let outputs: Vec<VNode> = self.roots.iter().map(|root| root.output()).collect();
        let annotations = collect_annotations(&outputs);
        let namespace = self.runtime.store.namespace(URL);
        let next = serialize_fragment(&namespace, &annotations);
        let mut current = self.fragment.borrow_mut();
        if *current != next {
            *current = next;
        }
    }
}

fn event_with_target(
    fields: impl IntoIterator<Item = (&'static str, Value)>,
) -> Value {
    Value::object([("target", Value::object(fields))])
}

fn normalize_fragment(fragment: &str) -> String {
    if fragment.is_empty() || fragment.starts_with('#') {
        fragment.to_string()
    } else {
        format!("#{fragment}")
    }
}

/// Minimal selector support: `tag`, `#id`, `tag#id`, and `[attr=value]`
/// filters, e.g. `input[name=note]`.
struct Selector {
    tag: Option<String>,
    id: Option<String>,
    attrs: Vec<(String, String)>,
}

impl Selector {
    fn parse(selector: &str) -> Selector {
        let mut tag = None;
        let mut id = None;
        let mut attrs = Vec::new();
        let mut rest = selector.trim();

        let tag_end = rest
            .find(|c| c == '#' || c == '[')
            .unwrap_or(rest.len());
        if tag_end > 0 {
            tag = Some(rest[..tag_end].to_ascii_lowercase());
        }
        rest = &rest[tag_end..];

        if let Some(after) = rest.strip_prefix('#') {
            let id_end = after.find('[').unwrap_or(after.len());
            id = Some(after[..id_end].to_string());
            rest = &after[id_end..];
        }

        while let Some(after) = rest.strip_prefix('[') {
            let Some(close) = after.find(']') else {
                break;
            };
            let body = &after[..close];
            let (name, value) = body.split_once('=').unwrap_or((body, ""));
            attrs.push((
                name.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ));
            rest = &after[close + 1..];
        }

        Selector { tag, id, attrs }
    }

    fn matches(&self, element: &VElement) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.prop_text("id").as_deref() != Some(id) {
                return false;
            }
        }
        for (name, value) in &self.attrs {
            match element.prop_text(name) {
                Some(actual) if actual == *value => {}
                Some(_) if value.is_empty() => {}
                _ => return false,
            }
        }
        true
    }
}
