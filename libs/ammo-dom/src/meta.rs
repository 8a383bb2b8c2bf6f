//! What we need to know about HTML element names to build and print
//! a tree: which ones never get a closing tag.

use std::collections::HashSet;

use lazy_static::lazy_static;

// https://html.spec.whatwg.org/multipage/syntax.html#void-elements
const VOID_ELEMENT_NAMES: &[&str] = &[
    "area",
    "base",
    "br",
    "col",
    "embed",
    "hr",
    "img",
    "input",
    "link",
    "meta",
    "param", // obsolete, still seen in the wild
    "source",
    "track",
    "wbr",
];

lazy_static!{
    static ref VOID_ELEMENTS: HashSet<&'static str> =
        VOID_ELEMENT_NAMES.iter().copied().collect();
}

/// True if elements with this (lower-case) tag name have no content
/// and no closing tag.
pub fn is_void_element(tag_name: &str) -> bool {
    VOID_ELEMENTS.contains(tag_name)
}

pub fn has_closing_tag(tag_name: &str) -> bool {
    ! is_void_element(tag_name)
}
