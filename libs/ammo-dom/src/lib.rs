//! In-memory HTML document, with runtime typing and attribute
//! queries. Enough of a DOM for the ammo template engine to render
//! into and to look up marked elements in.

pub mod meta;
pub mod tokenize;
pub mod node;
pub mod document;
pub mod parse;
pub mod query;

use std::borrow::Cow;

pub use document::{Document, DomError};
pub use node::{Node, NodeId, Element};
pub use query::{Selector, AttrSelector, AttrMatch, SelectorError};
pub use tokenize::{Tokenizer, Token, TokenizeError};

/// Append `s` to `out`, escaped for use in both text and (double or
/// single quoted) attribute value positions.
pub fn html_escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

pub fn html_escape(s: &str) -> Cow<str> {
    if s.contains(|c| matches!(c, '&' | '<' | '>' | '"' | '\'')) {
        let mut out = String::with_capacity(s.len() + 8);
        html_escape_into(&mut out, s);
        Cow::Owned(out)
    } else {
        Cow::Borrowed(s)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_html_escape() {
        assert_eq!(html_escape("plain"), "plain");
        assert!(matches!(html_escape("plain"), Cow::Borrowed(_)));
        assert_eq!(html_escape("<a href=\"x\">Tom & 'Jerry'</a>"),
                   "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;");
    }
}
