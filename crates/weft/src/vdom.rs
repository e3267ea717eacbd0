//! Virtual-DOM output of the renderer.
//!
//! Nodes carry the SID they were rendered under, evaluated properties, and
//! wired event handlers. Iterations and expanded components yield fragments
//! so they never introduce wrapper elements of their own.

use crate::error::Result;
use crate::sid::Sid;
use crate::value::Value;
use indexmap::IndexMap;
use std::rc::Rc;

pub type EventHandler = Rc<dyn Fn(Value) -> Result<()>>;

#[derive(Clone)]
pub enum VNode {
    Element(VElement),
    Text(String),
    Fragment(Vec<VNode>),
}

#[derive(Clone)]
pub struct VElement {
    pub tag: String,
    pub sid: Sid,
    pub props: IndexMap<String, Value>,
    /// Event name (without the `on` prefix) to wired handler.
    pub events: Vec<(String, EventHandler)>,
    pub children: Vec<VNode>,
}

impl VElement {
    pub fn new(tag: impl Into<String>, sid: Sid) -> Self {
        Self {
            tag: tag.into(),
            sid,
            props: IndexMap::new(),
            events: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    pub fn prop_text(&self, name: &str) -> Option<String> {
        self.props.get(name).map(Value::to_text)
    }

    pub fn handler(&self, event: &str) -> Option<EventHandler> {
        self.events
            .iter()
            .find(|(name, _)| name == event)
            .map(|(_, handler)| handler.clone())
    }
}

impl VNode {
    pub fn element(self) -> Option<VElement> {
        match self {
            VNode::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Depth-first walk over every element in the tree.
    pub fn visit_elements<'a>(&'a self, visit: &mut impl FnMut(&'a VElement)) {
        match self {
            VNode::Element(element) => {
                visit(element);
                for child in &element.children {
                    child.visit_elements(visit);
                }
            }
            VNode::Fragment(children) => {
                for child in children {
                    child.visit_elements(visit);
                }
            }
            VNode::Text(_) => {}
        }
    }

    /// Concatenated text content, the way assertions read it.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            VNode::Text(text) => out.push_str(text),
            VNode::Element(element) => {
                for child in &element.children {
                    child.collect_text(out);
                }
            }
            VNode::Fragment(children) => {
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            VNode::Text(text) => out.push_str(&escape_text(text)),
            VNode::Fragment(children) => {
                for child in children {
                    child.write_html(out);
                }
            }
            VNode::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.props {
                    match value {
                        Value::Null | Value::Bool(false) => {}
                        Value::Bool(true) => {
                            out.push(' ');
                            out.push_str(name);
                        }
                        other => {
                            out.push(' ');
                            out.push_str(name);
                            out.push_str("=\"");
                            out.push_str(&escape_attr(&other.to_text()));
                            out.push('"');
                        }
                    }
                }
                out.push('>');
                if is_void(&element.tag) {
                    return;
                }
                for child in &element.children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

/// The error-indicator node a failed component subtree is replaced with.
pub fn error_node(sid: Sid, message: &str) -> VNode {
    let mut element = VElement::new("w-error", sid);
    element
        .props
        .insert("message".to_string(), Value::text(message));
    element.children.push(VNode::Text(format!("[Error: {message}]")));
    VNode::Element(element)
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "param" | "source" | "track" | "wbr"
    )
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sid::root_sid;

    #[test]
    fn html_rendering_escapes_and_handles_booleans() {
        let mut input = VElement::new("input", root_sid("t"));
        input
            .props
            .insert("value".to_string(), Value::text("a<b\"c"));
        input.props.insert("checked".to_string(), Value::Bool(true));
        input
            .props
            .insert("disabled".to_string(), Value::Bool(false));
        let html = VNode::Element(input).to_html();
        assert_eq!(html, "<input value=\"a&lt;b&quot;c\" checked>");
    }

    #[test]
    fn fragments_flatten_into_parent_markup() {
        let node = VNode::Fragment(vec![
            VNode::Text("a".into()),
            VNode::Fragment(vec![VNode::Text("b".into())]),
        ]);
        assert_eq!(node.to_html(), "ab");
        assert_eq!(node.text_content(), "ab");
    }
}
