//! The node arena. Nodes are never freed while the document lives;
//! detached nodes simply lose their parent.

use kstring::KString;
use thiserror::Error;

use crate::{html_escape_into,
            meta::has_closing_tag,
            node::{next_document_id, DocumentId, Element, Node, NodeId},
            parse::parse_fragment,
            query::Selector};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("node {0:?} already has a parent")]
    AlreadyAttached(NodeId),
    #[error("appending {child:?} to {parent:?} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
    #[error("invalid markup: {0}")]
    Syntax(String),
}

#[derive(Debug, Clone)]
struct Slot {
    node: Node,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    slots: Vec<Slot>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document consisting of an empty `body` element.
    pub fn new() -> Self {
        let id = next_document_id();
        let root = NodeId { document: id, index: 0 };
        Document {
            id,
            slots: vec![Slot { node: Node::Element(Element::new("body")), parent: None }],
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Parse `html` and return a document with the result as the
    /// content of its root.
    pub fn parse(html: &str) -> Result<Self, DomError> {
        let mut doc = Document::new();
        doc.set_inner_html(doc.root, html)?;
        Ok(doc)
    }

    fn index(&self, id: NodeId) -> usize {
        if id.document == self.id {
            id.index as usize
        } else {
            panic!("NodeId from another document used: expected {:?}, got {:?}",
                   self.id, id.document);
        }
    }

    fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[self.index(id)]
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        let i = self.index(id);
        &mut self.slots[i]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.slot(id).node
    }

    pub fn element(&self, id: NodeId) -> Result<&Element, DomError> {
        self.node(id).as_element().ok_or(DomError::NotAnElement(id))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Element, DomError> {
        self.slot_mut(id).node.as_element_mut().ok_or(DomError::NotAnElement(id))
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId { document: self.id, index: self.slots.len() as u32 };
        self.slots.push(Slot { node, parent: None });
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(Node::Element(Element::new(tag)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(Node::Text(KString::from_ref(text)))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(Node::Comment(KString::from_ref(text)))
    }

    /// Adds an already built `Element` (with no children). Used by the
    /// fragment parser.
    pub(crate) fn create_from_element(&mut self, element: Element) -> NodeId {
        self.alloc(Node::Element(element))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.node(id) {
            Node::Element(e) => &e.children,
            _ => &[],
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).as_element().map(|e| e.tag_name())
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true
            }
            cur = self.parent(c);
        }
        false
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.element(parent)?;
        if self.parent(child).is_some() {
            return Err(DomError::AlreadyAttached(child))
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::Cycle { parent, child })
        }
        self.element_mut(parent)?.children.push(child);
        self.slot_mut(child).parent = Some(parent);
        Ok(())
    }

    /// Detach `id` from its parent, if any.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.slot_mut(id).parent.take() {
            if let Some(e) = self.slot_mut(parent).node.as_element_mut() {
                e.children.retain(|c| *c != id);
            }
        }
    }

    pub fn clear_children(&mut self, id: NodeId) -> Result<(), DomError> {
        let children = std::mem::take(&mut self.element_mut(id)?.children);
        for c in children {
            self.slot_mut(c).parent = None;
        }
        Ok(())
    }

    /// All nodes below `id` in document order, not including `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        out
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id).as_element()?.attribute(name)
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.element_mut(id)?.set_attribute(name, value);
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<bool, DomError> {
        Ok(self.element_mut(id)?.remove_attribute(name))
    }

    /// Set one property in the `style` attribute, keeping the others.
    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str)
                     -> Result<(), DomError> {
        let old = self.element(id)?.attribute("style").unwrap_or("");
        let mut decls: Vec<String> = old.split(';')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .filter(|d| match d.split_once(':') {
                Some((p, _)) => !p.trim().eq_ignore_ascii_case(property),
                None => true,
            })
            .map(String::from)
            .collect();
        decls.push(format!("{property}: {value}"));
        let style = decls.join("; ");
        self.set_attribute(id, "style", &style)
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.node(id) {
            Node::Element(e) => for c in &e.children {
                self.collect_text(*c, out);
            },
            Node::Text(t) => out.push_str(t),
            Node::Comment(_) => (),
        }
    }

    /// Replace the content of element `id` with a single text node
    /// (or nothing, if `text` is empty).
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        self.clear_children(id)?;
        if !text.is_empty() {
            let t = self.create_text(text);
            self.append_child(id, t)?;
        }
        Ok(())
    }

    /// Parse `html` and append the resulting nodes to `id`. Returns
    /// the newly appended top-level nodes.
    pub fn append_html(&mut self, id: NodeId, html: &str) -> Result<Vec<NodeId>, DomError> {
        self.element(id)?;
        let nodes = parse_fragment(self, html)?;
        for n in &nodes {
            self.append_child(id, *n)?;
        }
        Ok(nodes)
    }

    /// Replace the content of element `id` with the parsed `html`.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) -> Result<Vec<NodeId>, DomError> {
        self.element(id)?;
        // parse first, so that a syntax error leaves the content alone
        let nodes = parse_fragment(self, html)?;
        self.clear_children(id)?;
        for n in &nodes {
            self.append_child(id, *n)?;
        }
        Ok(nodes)
    }

    pub fn print_html(&self, id: NodeId, out: &mut String) {
        match self.node(id) {
            Node::Element(e) => {
                out.push('<');
                out.push_str(&e.tag);
                for (k, v) in &e.attrs {
                    out.push(' ');
                    out.push_str(k); // XX no escape ever needed?
                    out.push_str("=\"");
                    html_escape_into(out, v);
                    out.push('"');
                }
                out.push('>');
                for c in &e.children {
                    self.print_html(*c, out);
                }
                if has_closing_tag(&e.tag) {
                    out.push_str("</");
                    out.push_str(&e.tag);
                    out.push('>');
                }
            }
            Node::Text(t) => html_escape_into(out, t),
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
        }
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.print_html(id, &mut out);
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for c in self.children(id) {
            self.print_html(*c, &mut out);
        }
        out
    }

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        match self.node(id).as_element() {
            Some(e) => selector.matches_element(e),
            None => false,
        }
    }

    /// Elements below `scope` (excluding `scope` itself) matching
    /// `selector`, in document order.
    pub fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope).into_iter()
            .filter(|n| self.matches(*n, selector))
            .collect()
    }

    pub fn query_first(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope).into_iter()
            .find(|n| self.matches(*n, selector))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_build_and_print() -> Result<(), DomError> {
        let mut doc = Document::new();
        let ul = doc.create_element("UL");
        let li = doc.create_element("li");
        doc.set_attribute(li, "title", "a \"quoted\" <title>")?;
        let t = doc.create_text("Tom & Jerry");
        doc.append_child(li, t)?;
        doc.append_child(ul, li)?;
        let img = doc.create_element("img");
        doc.append_child(li, img)?;
        doc.append_child(doc.root(), ul)?;
        assert_eq!(doc.inner_html(doc.root()),
                   "<ul><li title=\"a &quot;quoted&quot; &lt;title&gt;\">\
                    Tom &amp; Jerry<img></li></ul>");
        assert_eq!(doc.text_content(ul), "Tom & Jerry");
        assert_eq!(doc.parent(li), Some(ul));
        Ok(())
    }

    #[test]
    fn t_append_errors() {
        let mut doc = Document::new();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        let t = doc.create_text("x");
        assert_eq!(doc.append_child(t, a), Err(DomError::NotAnElement(t)));
        doc.append_child(a, b).unwrap();
        assert_eq!(doc.append_child(doc.root(), b), Err(DomError::AlreadyAttached(b)));
        assert_eq!(doc.append_child(b, a), Err(DomError::Cycle { parent: b, child: a }));
        assert_eq!(doc.append_child(a, a), Err(DomError::Cycle { parent: a, child: a }));
        doc.detach(b);
        assert!(doc.children(a).is_empty());
        doc.append_child(doc.root(), b).unwrap();
    }

    #[test]
    #[should_panic(expected = "another document")]
    fn t_foreign_id_panics() {
        let mut d1 = Document::new();
        let d2 = Document::new();
        let n = d1.create_element("p");
        d2.node(n);
    }

    #[test]
    fn t_inner_html_roundtrip_and_query() -> Result<(), DomError> {
        let mut doc = Document::new();
        let root = doc.root();
        doc.set_inner_html(root, "<ul class=\"users\"><li data-ammo-id=\"name\" \
                                  data-ammo-id-value=\"cartman\">Cartman</li>\
                                  <li data-ammo-id=\"name\" data-ammo-id-value=\"kyle\">\
                                  Kyle</li></ul>")?;
        let items = doc.query_all(root, &Selector::parse("[data-ammo-id=name]").unwrap());
        assert_eq!(items.len(), 2);
        assert_eq!(doc.text_content(items[1]), "Kyle");
        let ul = doc.query_first(root, &Selector::parse("ul.users").unwrap()).unwrap();
        assert!(doc.query_all(ul, &Selector::tag("ul")).is_empty());
        doc.set_text_content(items[0], "Eric")?;
        assert_eq!(doc.inner_html(items[0]), "Eric");
        doc.set_inner_html(root, "")?;
        assert_eq!(doc.inner_html(root), "");
        assert_eq!(doc.parent(ul), None);
        Ok(())
    }

    #[test]
    fn t_set_inner_html_error_keeps_content() -> Result<(), DomError> {
        let mut doc = Document::parse("<p>keep</p>")?;
        let root = doc.root();
        assert!(matches!(doc.set_inner_html(root, "<p class=\"x"), Err(DomError::Syntax(_))));
        assert_eq!(doc.inner_html(root), "<p>keep</p>");
        Ok(())
    }

    #[test]
    fn t_set_style() -> Result<(), DomError> {
        let mut doc = Document::new();
        let d = doc.create_element("div");
        doc.set_attribute(d, "style", "color: red; display:block")?;
        doc.set_style(d, "display", "none")?;
        assert_eq!(doc.attribute(d, "style"), Some("color: red; display: none"));
        doc.set_style(d, "opacity", "0.5")?;
        assert_eq!(doc.attribute(d, "style"),
                   Some("color: red; display: none; opacity: 0.5"));
        Ok(())
    }
}
