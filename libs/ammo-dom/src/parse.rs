//! Building nodes from markup, tolerant the way browsers are for
//! the common cases: stray end tags are dropped, unclosed elements
//! are closed at the end of input or by an enclosing end tag.
//! Tokenizing (and character reference decoding) is html5gum's.

use std::borrow::Cow;

use html5gum::{Token, Tokenizer};
use tracing::{debug, warn};

use crate::{document::{Document, DomError},
            meta::is_void_element,
            node::{Element, NodeId}};

fn string(s: &[u8]) -> Cow<str> {
    String::from_utf8_lossy(s)
}

fn add(doc: &mut Document, open: &[(NodeId, String)], top: &mut Vec<NodeId>, n: NodeId)
       -> Result<(), DomError> {
    match open.last() {
        Some((parent, _)) => doc.append_child(*parent, n),
        None => {
            top.push(n);
            Ok(())
        }
    }
}

/// Parse `html` into new, detached nodes of `doc`; returns the
/// top-level ones in order. A tag cut off by the end of input is an
/// error, other tokenizer complaints are only logged.
pub fn parse_fragment(doc: &mut Document, html: &str) -> Result<Vec<NodeId>, DomError> {
    // Tokenize everything first so that an error does not leave
    // half-built nodes reachable.
    let mut tokens = Vec::new();
    for token in Tokenizer::new(html).infallible() {
        match token {
            Token::Error(html5gum::Error::EofInTag) =>
                return Err(DomError::Syntax("tag cut off by end of input".into())),
            Token::Error(e) => warn!("tolerating markup error {e:?}"),
            t => tokens.push(t),
        }
    }

    let mut top: Vec<NodeId> = Vec::new();
    // (node, lower-case tag name)
    let mut open: Vec<(NodeId, String)> = Vec::new();
    // html5gum may hand out text in several pieces
    let mut text = String::new();

    for token in tokens {
        if let Token::String(s) = &token {
            text.push_str(&string(s));
            continue
        }
        if !text.is_empty() {
            let n = doc.create_text(&text);
            add(doc, &open, &mut top, n)?;
            text.clear();
        }
        match token {
            Token::StartTag(tag) => {
                let mut element = Element::new(&string(&tag.name));
                // XX html5gum keeps attributes sorted by name, not in
                // source order
                for (name, value) in &tag.attributes {
                    element.set_attribute(&string(name), &string(value));
                }
                let name = element.tag_name().to_string();
                let n = doc.create_from_element(element);
                add(doc, &open, &mut top, n)?;
                if !(tag.self_closing || is_void_element(&name)) {
                    open.push((n, name));
                }
            }
            Token::EndTag(tag) => {
                let name = string(&tag.name).to_ascii_lowercase();
                match open.iter().rposition(|(_, t)| *t == name) {
                    Some(i) => open.truncate(i),
                    None => debug!("ignoring stray end tag </{name}>"),
                }
            }
            Token::Comment(s) => {
                let n = doc.create_comment(&string(&s));
                add(doc, &open, &mut top, n)?;
            }
            _ => (),
        }
    }
    if !text.is_empty() {
        let n = doc.create_text(&text);
        add(doc, &open, &mut top, n)?;
    }
    Ok(top)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_parse_fragment() -> Result<(), DomError> {
        let mut doc = Document::new();
        let nodes = parse_fragment(
            &mut doc,
            "<!DOCTYPE html>text <LI Class=user title='a &amp; b'>x<br>y<img/></li><!--c-->")?;
        assert_eq!(nodes.len(), 3);
        assert_eq!(doc.tag_name(nodes[1]), Some("li"));
        assert_eq!(doc.attribute(nodes[1], "class"), Some("user"));
        assert_eq!(doc.attribute(nodes[1], "title"), Some("a & b"));
        assert_eq!(doc.children(nodes[1]).len(), 4);
        assert_eq!(doc.outer_html(nodes[2]), "<!--c-->");
        Ok(())
    }

    #[test]
    fn t_named_entities() -> Result<(), DomError> {
        let mut doc = Document::new();
        let nodes = parse_fragment(&mut doc, "<p title=\"&copy; 2024\">caf&eacute; &amp; more</p>")?;
        assert_eq!(doc.text_content(nodes[0]), "café & more");
        assert_eq!(doc.attribute(nodes[0], "title"), Some("© 2024"));
        assert_eq!(doc.outer_html(nodes[0]), "<p title=\"© 2024\">café &amp; more</p>");
        Ok(())
    }

    #[test]
    fn t_tolerance() -> Result<(), DomError> {
        let mut doc = Document::new();
        let nodes = parse_fragment(&mut doc, "</p><div><span>a</div>b<p>open")?;
        assert_eq!(nodes.len(), 3);
        let mut s = String::new();
        for n in nodes {
            doc.print_html(n, &mut s);
        }
        assert_eq!(s, "<div><span>a</span></div>b<p>open</p>");
        Ok(())
    }

    #[test]
    fn t_duplicate_attribute() -> Result<(), DomError> {
        let mut doc = Document::new();
        let nodes = parse_fragment(&mut doc, "<p id=a ID=b disabled>")?;
        assert_eq!(doc.attribute(nodes[0], "id"), Some("a"));
        assert_eq!(doc.attribute(nodes[0], "disabled"), Some(""));
        Ok(())
    }

    #[test]
    fn t_cut_off_tag() {
        let mut doc = Document::new();
        assert!(matches!(parse_fragment(&mut doc, "<p>a</p><p class=\"x"),
                         Err(DomError::Syntax(_))));
    }
}
