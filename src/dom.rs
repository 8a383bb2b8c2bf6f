//! What templates need from a DOM.

use std::fmt::Debug;

use ammo_dom::{Document, DomError, NodeId, Selector};

pub trait DomEngine {
    type Node: Copy + Eq + Debug;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Where identity lookups start.
    fn root(&self) -> Self::Node;

    /// Replace all content of `container` with the parsed `html`.
    fn replace_content(&mut self, container: Self::Node, html: &str)
                       -> Result<(), Self::Error>;

    /// Elements below `scope` (not `scope` itself) matching
    /// `selector`, in document order.
    fn query_all(&self, scope: Self::Node, selector: &Selector) -> Vec<Self::Node>;

    fn matches(&self, node: Self::Node, selector: &Selector) -> bool;

    fn attribute(&self, node: Self::Node, name: &str) -> Option<String>;

    fn set_attribute(&mut self, node: Self::Node, name: &str, value: &str)
                     -> Result<(), Self::Error>;

    fn set_text_content(&mut self, node: Self::Node, text: &str) -> Result<(), Self::Error>;
}

impl DomEngine for Document {
    type Node = NodeId;
    type Error = DomError;

    fn root(&self) -> NodeId {
        Document::root(self)
    }

    fn replace_content(&mut self, container: NodeId, html: &str) -> Result<(), DomError> {
        self.set_inner_html(container, html)?;
        Ok(())
    }

    fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        Document::query_all(self, scope, selector)
    }

    fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        Document::matches(self, node, selector)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        Document::attribute(self, node, name).map(String::from)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        Document::set_attribute(self, node, name, value)
    }

    fn set_text_content(&mut self, node: NodeId, text: &str) -> Result<(), DomError> {
        Document::set_text_content(self, node, text)
    }
}
