use std::sync::Mutex;

use kstring::KString;
use lazy_static::lazy_static;

/// Identifies a `Document`, so that a `NodeId` from one document is
/// caught when used with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u32);

lazy_static!{
    static ref NEXT_DOCUMENT_ID: Mutex<u32> = Mutex::new(0);
}

pub(crate) fn next_document_id() -> DocumentId {
    // replace with atomic inc?
    let mut guard = NEXT_DOCUMENT_ID.lock().unwrap_or_else(|e| e.into_inner());
    let id = *guard;
    *guard = id.wrapping_add(1);
    DocumentId(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) document: DocumentId,
    pub(crate) index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Always lower case.
    pub(crate) tag: KString,
    /// Names always lower case, in insertion order, no duplicates.
    pub(crate) attrs: Vec<(KString, KString)>,
    pub(crate) children: Vec<NodeId>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Element {
            tag: KString::from_string(tag.to_ascii_lowercase()),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn tag_name(&self) -> &str {
        &self.tag
    }

    pub fn attributes(&self) -> &[(KString, KString)] {
        &self.attrs
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn set_attribute(&mut self, name: &str, value: &str) {
        let value = KString::from_ref(value);
        if let Some(slot) = self.attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            slot.1 = value;
        } else {
            self.attrs.push((KString::from_string(name.to_ascii_lowercase()), value));
        }
    }

    pub(crate) fn remove_attribute(&mut self, name: &str) -> bool {
        let len = self.attrs.len();
        self.attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.attrs.len() != len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(KString),
    Comment(KString),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        self.as_element().is_some()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_element_attributes() {
        let mut e = Element::new("LI");
        assert_eq!(e.tag_name(), "li");
        e.set_attribute("Class", "user");
        e.set_attribute("data-x", "1");
        e.set_attribute("class", "admin");
        assert_eq!(e.attribute("CLASS"), Some("admin"));
        let names: Vec<&str> = e.attributes().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["class", "data-x"]);
        assert!(e.remove_attribute("data-X"));
        assert!(!e.remove_attribute("data-x"));
    }

    #[test]
    fn t_document_ids_differ() {
        assert_ne!(next_document_id(), next_document_id());
    }
}
