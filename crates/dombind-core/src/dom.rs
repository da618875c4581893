//! In-memory document tree
//!
//! An arena of element and text nodes that stands in for a browser DOM.
//! Markup is parsed with `scraper` (html5ever) and copied into the arena.
//!
//! Node handles are generational indices into the arena. Freed slots are
//! reused, and the generation bump on free keeps a stale handle from
//! aliasing whatever node later takes its slot.
//!
//! Fragments are parsed in the context of the element they will be inserted
//! into, so table rows and cells survive insertion into a table.

use std::collections::BTreeMap;

use html5ever::tendril::TendrilSink;
use html5ever::{LocalName, Namespace, ParseOpts, QualName};
use scraper::{ElementRef, Html};
use serde_json::Value;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Attribute holding a node's reference
pub const REF_ATTR: &str = "ref";

/// Elements serialized without a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text children are written without escaping
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Properties that exist as present/absent attributes
const BOOLEAN_PROPERTIES: &[&str] = &[
    "autofocus",
    "checked",
    "disabled",
    "hidden",
    "multiple",
    "open",
    "readonly",
    "required",
    "selected",
];

/// Handle to a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

/// An element: tag name plus attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attrs: BTreeMap<String, String>,
}

impl Element {
    /// Create an element with no attributes
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
        }
    }

    fn from_source(source: &scraper::node::Element) -> Self {
        let mut element = Self::new(source.name());
        for (name, value) in source.attrs() {
            element.attrs.insert(name.to_string(), value.to_string());
        }
        element
    }

    /// Lowercase tag name
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Attributes in name order
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The node's reference, if it has one
    pub fn reference(&self) -> Option<&str> {
        self.attr(REF_ATTR)
    }

    /// Lowercased `type` of an `input` element (`text` when absent)
    pub fn input_type(&self) -> Option<String> {
        (self.tag == "input").then(|| self.attr("type").unwrap_or("text").to_ascii_lowercase())
    }
}

/// Payload of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(Element),
    Text(String),
}

#[derive(Debug)]
struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    slot: Option<Slot>,
}

/// A document tree rooted at an `<html>` element
#[derive(Debug)]
pub struct Document {
    entries: Vec<Entry>,
    free: Vec<usize>,
    root: NodeId,
    live: usize,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document holding only an empty `<html>` root
    pub fn new() -> Self {
        let mut doc = Self::empty();
        doc.root = doc.alloc(NodeData::Element(Element::new("html")));
        doc
    }

    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            live: 0,
        }
    }

    /// Parse a complete HTML document
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let source = parsed.root_element();

        let mut doc = Self::empty();
        doc.root = doc.alloc(NodeData::Element(Element::from_source(source.value())));
        for child in doc.import(source) {
            doc.append_child(doc.root, child);
        }
        doc
    }

    /// Parse markup into new, detached nodes
    ///
    /// The markup is parsed as the content of `context`, the element the
    /// nodes are meant for. The root, a text node or a dead handle parse as
    /// `<body>` content. Returns the top-level nodes in document order. They belong
    /// to no parent until passed to [`Document::append_child`].
    pub fn parse_fragment(&mut self, context: NodeId, markup: &str) -> Vec<NodeId> {
        // Content of the root parses like content of <body>
        let tag = match self.element(context).map(Element::tag) {
            Some("html") | None => "body",
            Some(tag) => tag,
        };
        let context_name = QualName::new(
            None,
            Namespace::from(HTML_NAMESPACE),
            LocalName::from(tag),
        );
        let parsed: Html = html5ever::driver::parse_fragment(
            Html::new_fragment(),
            ParseOpts::default(),
            context_name,
            Vec::new(),
        )
        .one(markup);
        self.import(parsed.root_element())
    }

    fn import(&mut self, source: ElementRef<'_>) -> Vec<NodeId> {
        let mut created = Vec::new();
        for child in source.children() {
            if let Some(element) = ElementRef::wrap(child) {
                let id = self.alloc(NodeData::Element(Element::from_source(element.value())));
                for nested in self.import(element) {
                    self.append_child(id, nested);
                }
                created.push(id);
            } else if let Some(text) = child.value().as_text() {
                created.push(self.alloc(NodeData::Text(text.text.to_string())));
            }
        }
        created
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let slot = Slot {
            data,
            parent: None,
            children: Vec::new(),
        };
        self.live += 1;

        match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.slot = Some(slot);
                NodeId {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    slot: Some(slot),
                });
                NodeId {
                    index: self.entries.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.entries
            .get(id.index)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.slot.as_ref())
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.entries
            .get_mut(id.index)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.slot.as_mut())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Session identifier: the `id` attribute of the root element
    pub fn session_id(&self) -> Option<&str> {
        self.element(self.root).and_then(|el| el.attr("id"))
    }

    /// Number of live nodes, attached or not
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Whether the handle still names a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.slot(id).map(|slot| &slot.data)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.data(id) {
            Some(NodeData::Element(element)) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.slot_mut(id).map(|slot| &mut slot.data) {
            Some(NodeData::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.attr(name))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(element) = self.element_mut(id) {
            element.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(element) = self.element_mut(id) {
            element.attrs.remove(name);
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|slot| slot.children.as_slice()).unwrap_or(&[])
    }

    /// The node and all of its descendants, in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// The node followed by its ancestors up to the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.contains(id).then_some(id);
        while let Some(node) = current {
            out.push(node);
            current = self.parent(node);
        }
        out
    }

    /// Append `child` as the last child of `parent`, detaching it first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.contains(parent) || !self.contains(child) || parent == child {
            return;
        }
        self.detach(child);
        if let Some(slot) = self.slot_mut(child) {
            slot.parent = Some(parent);
        }
        if let Some(slot) = self.slot_mut(parent) {
            slot.children.push(child);
        }
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(slot) = self.slot_mut(parent) {
            slot.children.retain(|&c| c != id);
        }
        if let Some(slot) = self.slot_mut(id) {
            slot.parent = None;
        }
    }

    /// Remove a node and its subtree
    ///
    /// Returns false for the root or a dead handle.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.contains(id) {
            return false;
        }
        self.detach(id);
        self.free_subtree(id);
        true
    }

    /// Remove every child of a node
    pub fn clear_children(&mut self, id: NodeId) {
        let children = match self.slot_mut(id) {
            Some(slot) => std::mem::take(&mut slot.children),
            None => return,
        };
        for child in children {
            self.free_subtree(child);
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(entry) = self
                .entries
                .get_mut(next.index)
                .filter(|entry| entry.generation == next.generation)
            else {
                continue;
            };
            if let Some(slot) = entry.slot.take() {
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(next.index);
                self.live -= 1;
                stack.extend(slot.children);
            }
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|node| match self.data(node) {
                Some(NodeData::Text(text)) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Set the node's first text child, appending one if it has none
    ///
    /// Element children and attributes are left alone.
    pub fn set_first_text(&mut self, id: NodeId, value: &str) {
        if !self.contains(id) {
            return;
        }
        let existing = self
            .children(id)
            .iter()
            .copied()
            .find(|&child| matches!(self.data(child), Some(NodeData::Text(_))));

        match existing {
            Some(text_id) => {
                if let Some(slot) = self.slot_mut(text_id) {
                    slot.data = NodeData::Text(value.to_string());
                }
            }
            None => {
                let text_id = self.alloc(NodeData::Text(value.to_string()));
                self.append_child(id, text_id);
            }
        }
    }

    /// Set a property the way a DOM element would reflect it
    ///
    /// Boolean properties are present exactly when `value` is truthy.
    /// Other properties take strings verbatim, numbers and booleans as text,
    /// and are removed by `null`.
    pub fn set_property(&mut self, id: NodeId, name: &str, value: &Value) {
        let Some(element) = self.element_mut(id) else {
            return;
        };

        if BOOLEAN_PROPERTIES.contains(&name) {
            if is_truthy(value) {
                element.attrs.insert(name.to_string(), name.to_string());
            } else {
                element.attrs.remove(name);
            }
            return;
        }

        let text = match value {
            Value::Null => {
                element.attrs.remove(name);
                return;
            }
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        element.attrs.insert(name.to_string(), text);
    }

    /// Current value of a form control, as `.val()` would report it
    pub fn form_value(&self, id: NodeId) -> String {
        let Some(element) = self.element(id) else {
            return String::new();
        };

        match element.tag() {
            "textarea" => self.text_content(id),
            "select" => {
                if let Some(value) = element.attr("value") {
                    return value.to_string();
                }
                let options: Vec<NodeId> = self
                    .descendants(id)
                    .into_iter()
                    .filter(|&n| self.element(n).is_some_and(|el| el.tag() == "option"))
                    .collect();
                let chosen = options
                    .iter()
                    .copied()
                    .find(|&n| self.element(n).is_some_and(|el| el.has_attr("selected")))
                    .or_else(|| options.first().copied());
                chosen.map(|n| self.option_value(n)).unwrap_or_default()
            }
            _ => element.attr("value").unwrap_or_default().to_string(),
        }
    }

    fn option_value(&self, id: NodeId) -> String {
        match self.attr(id, "value") {
            Some(value) => value.to_string(),
            None => self.text_content(id).trim().to_string(),
        }
    }

    /// Serialized markup of the node's children
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        let raw = self
            .element(id)
            .is_some_and(|el| RAW_TEXT_ELEMENTS.contains(&el.tag()));
        for &child in self.children(id) {
            self.write_node(child, raw, &mut out);
        }
        out
    }

    /// Serialized markup of the node itself
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, false, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, raw_text: bool, out: &mut String) {
        match self.data(id) {
            Some(NodeData::Text(text)) if raw_text => out.push_str(text),
            Some(NodeData::Text(text)) => escape_into(text, false, out),
            Some(NodeData::Element(element)) => {
                out.push('<');
                out.push_str(element.tag());
                for (name, value) in element.attrs() {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&element.tag()) {
                    return;
                }
                out.push_str(&self.inner_html(id));
                out.push_str("</");
                out.push_str(element.tag());
                out.push('>');
            }
            None => {}
        }
    }
}

/// JavaScript-style truthiness of a JSON value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(doc: &Document) -> NodeId {
        doc.children(doc.root())
            .iter()
            .copied()
            .find(|&n| doc.element(n).is_some_and(|el| el.tag() == "body"))
            .unwrap()
    }

    #[test]
    fn test_parse_document_session_id() {
        let doc = Document::parse(r#"<html id="s-42"><body><p ref="a">hi</p></body></html>"#);
        assert_eq!(doc.session_id(), Some("s-42"));
        assert_eq!(doc.inner_html(body(&doc)), r#"<p ref="a">hi</p>"#);
    }

    #[test]
    fn test_parse_fragment_is_detached() {
        let mut doc = Document::new();
        let before = doc.len();
        let root = doc.root();
        let nodes = doc.parse_fragment(root, "<li>one</li><li>two</li>");

        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|&n| doc.parent(n).is_none()));
        // two elements, two text nodes
        assert_eq!(doc.len(), before + 4);
    }

    #[test]
    fn test_remove_frees_subtree() {
        let mut doc = Document::parse("<div><ul><li>a</li><li>b</li></ul></div>");
        let body = body(&doc);
        let div = doc.children(body)[0];
        let ul = doc.children(div)[0];
        let li = doc.children(ul)[0];
        let before = doc.len();

        assert!(doc.remove(ul));
        assert!(!doc.contains(ul));
        assert!(!doc.contains(li));
        assert_eq!(doc.len(), before - 5);
        assert!(doc.children(div).is_empty());
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut doc = Document::new();
        assert!(!doc.remove(doc.root()));
        assert!(doc.contains(doc.root()));
    }

    #[test]
    fn test_freed_handles_stay_dead() {
        let mut doc = Document::new();
        let root = doc.root();
        let first = doc.parse_fragment(root, "<b>x</b>")[0];
        doc.append_child(root, first);
        doc.remove(first);

        let second = doc.parse_fragment(root, "<b>y</b>")[0];
        assert_ne!(first, second);
        assert!(!doc.contains(first));
        assert!(doc.contains(second));
        assert_eq!(doc.attr(first, "ref"), None);
    }

    #[test]
    fn test_slots_are_reused() {
        let mut doc = Document::new();
        let root = doc.root();

        for _ in 0..100 {
            doc.clear_children(root);
            for node in doc.parse_fragment(root, "<p>a</p><p>b</p>") {
                doc.append_child(root, node);
            }
        }
        // root + two paragraphs + two text nodes
        assert_eq!(doc.len(), 5);
        assert!(doc.entries.len() <= 9);
    }

    #[test]
    fn test_fragment_in_table_context() {
        let mut doc = Document::parse("<table><tbody></tbody></table>");
        let table = doc.children(body(&doc))[0];
        let tbody = doc.children(table)[0];

        let rows = doc.parse_fragment(tbody, r#"<tr ref="row"><td>1</td></tr>"#);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            doc.outer_html(rows[0]),
            r#"<tr ref="row"><td>1</td></tr>"#
        );

        let cells = doc.parse_fragment(rows[0], "<td>a</td><td>b</td>");
        assert_eq!(cells.len(), 2);
    }

    #[test]
    fn test_set_first_text_keeps_elements() {
        let mut doc = Document::parse("<p>old<b>bold</b></p>");
        let p = doc.children(body(&doc))[0];

        doc.set_first_text(p, "new");
        assert_eq!(doc.inner_html(p), "new<b>bold</b>");
    }

    #[test]
    fn test_set_first_text_creates_text_node() {
        let mut doc = Document::parse(r#"<span class="x"></span>"#);
        let span = doc.children(body(&doc))[0];

        doc.set_first_text(span, "created");
        assert_eq!(doc.outer_html(span), r#"<span class="x">created</span>"#);
    }

    #[test]
    fn test_boolean_property() {
        let mut doc = Document::parse(r#"<input type="checkbox">"#);
        let input = doc.children(body(&doc))[0];

        doc.set_property(input, "checked", &json!("checked"));
        assert_eq!(doc.attr(input, "checked"), Some("checked"));

        doc.set_property(input, "checked", &json!(""));
        assert_eq!(doc.attr(input, "checked"), None);

        doc.set_property(input, "disabled", &json!(true));
        assert!(doc.element(input).unwrap().has_attr("disabled"));
    }

    #[test]
    fn test_plain_property_values() {
        let mut doc = Document::parse("<div></div>");
        let div = doc.children(body(&doc))[0];

        doc.set_property(div, "title", &json!("hello"));
        doc.set_property(div, "tabindex", &json!(3));
        assert_eq!(doc.attr(div, "title"), Some("hello"));
        assert_eq!(doc.attr(div, "tabindex"), Some("3"));

        doc.set_property(div, "title", &Value::Null);
        assert_eq!(doc.attr(div, "title"), None);
    }

    #[test]
    fn test_select_form_value() {
        let mut doc = Document::parse(
            r#"<select><option value="a">A</option><option value="b" selected>B</option></select>"#,
        );
        let select = doc.children(body(&doc))[0];
        assert_eq!(doc.form_value(select), "b");

        doc.set_attr(select, "value", "a");
        assert_eq!(doc.form_value(select), "a");
    }

    #[test]
    fn test_textarea_form_value() {
        let doc = Document::parse("<textarea>some notes</textarea>");
        let area = doc.children(body(&doc))[0];
        assert_eq!(doc.form_value(area), "some notes");
    }

    #[test]
    fn test_escaping() {
        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.parse_fragment(root, "<div></div>")[0];
        doc.set_attr(div, "title", "a \"quoted\" & <b>");
        doc.set_first_text(div, "1 < 2 & 3");

        assert_eq!(
            doc.outer_html(div),
            r#"<div title="a &quot;quoted&quot; &amp; <b>">1 &lt; 2 &amp; 3</div>"#
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!("checked")));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!("false")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&Value::Null));
    }
}
