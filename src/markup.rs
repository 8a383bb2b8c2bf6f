//! Parsing of template markup.
//!
//! A template is HTML with two additions: exactly one identity
//! marker, a bare attribute `key:<field>` (or `(key:<field>)`) naming
//! the record field that identifies a rendered item, and observer
//! placeholders `{{field}}` in text or attribute values. Parsing
//! yields a tree of the markup with placeholders split out as
//! `Segment::Observer`, plus the flat list of observers in source
//! order.

use ammo_dom::{meta::is_void_element,
               tokenize::{Attribute, Token, TokenizeError, Tokenizer}};
use kstring::KString;

pub const OBSERVER_START: &str = "{{";
pub const OBSERVER_END: &str = "}}";
pub const IDENTITY_PREFIX: &str = "key:";

crate::def_boxed_thiserror!(MalformedTemplateError, pub enum MalformedTemplateErrorKind {
    #[error("template has no identity marker (an attribute like `key:id`)")]
    MissingIdentity,
    #[error("template has more than one identity marker: `key:{first}` at byte \
             {first_offset} and `key:{second}` at byte {second_offset}")]
    AmbiguousIdentity {
        first: String,
        first_offset: usize,
        second: String,
        second_offset: usize,
    },
    #[error("end tag </{tag}> at byte {offset} has no matching start tag")]
    StrayEndTag { tag: String, offset: usize },
    #[error("element <{tag}> opened at byte {offset} is not closed")]
    UnclosedElement { tag: String, offset: usize },
    #[error("{0}")]
    Syntax(#[from] TokenizeError),
});

/// One bound field occurrence in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverDescriptor {
    pub name: KString,
    pub is_attribute: bool,
    /// Lower case, `Some` iff `is_attribute`.
    pub attribute_name: Option<KString>,
    /// Byte offset of the opening `{{`.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Markup as written in the template (entities not decoded).
    Literal(String),
    Observer(KString),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TAttr {
    /// Where the identity marker stood; replaced by the identity
    /// marker attributes when compiling.
    IdentityMarker,
    Plain {
        /// As written.
        name: KString,
        value: Option<Vec<Segment>>,
        quote: Option<char>,
    },
}

impl TAttr {
    /// Observer names bound in this attribute's value, in order,
    /// possibly repeated.
    pub fn observers(&self) -> impl Iterator<Item = &str> {
        let segments: &[Segment] = match self {
            TAttr::Plain { value: Some(v), .. } => v,
            _ => &[],
        };
        segments.iter().filter_map(|s| match s {
            Segment::Observer(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TElement {
    /// As written.
    pub tag: KString,
    pub attrs: Vec<TAttr>,
    pub self_closing: bool,
    pub children: Vec<TNode>,
}

impl TElement {
    pub fn is_void(&self) -> bool {
        is_void_element(&self.tag.to_ascii_lowercase())
    }

    /// The observer name if the element's entire content is one
    /// placeholder (whitespace around it aside).
    pub fn sole_observer(&self) -> Option<&str> {
        match self.children.as_slice() {
            [TNode::Text(segments)] => {
                let mut observers = segments.iter().filter(|s| match s {
                    Segment::Literal(l) => !l.trim().is_empty(),
                    Segment::Observer(_) => true,
                });
                match (observers.next(), observers.next()) {
                    (Some(Segment::Observer(name)), None) => Some(name.as_str()),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TNode {
    Element(TElement),
    Text(Vec<Segment>),
    Comment(String),
    /// `<!DOCTYPE ...>` and the like, content without the brackets.
    Declaration(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTemplate {
    pub identity_field: KString,
    pub observers: Vec<ObserverDescriptor>,
    pub nodes: Vec<TNode>,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '$'
}

/// Whether `s` can name an observer or identity field.
pub(crate) fn is_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_name_char)
}

/// The field name if `attname` is an identity marker.
pub fn identity_marker(attname: &str) -> Option<&str> {
    let inner = attname.strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(attname);
    let field = inner.strip_prefix(IDENTITY_PREFIX)?;
    if is_name(field) {
        Some(field)
    } else {
        None
    }
}

/// Split `text` (found at byte `offset` of the markup) into literal
/// and observer segments, recording a descriptor for every observer.
fn scan_segments(
    text: &str,
    offset: usize,
    attribute_name: Option<&str>,
    observers: &mut Vec<ObserverDescriptor>,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;
    while let Some(start) = text[pos..].find(OBSERVER_START).map(|i| pos + i) {
        let inner_start = start + OBSERVER_START.len();
        let end = match text[inner_start..].find(OBSERVER_END) {
            Some(i) => inner_start + i,
            // unterminated: literal
            None => break,
        };
        let name = text[inner_start..end].trim();
        if !is_name(name) {
            pos = inner_start;
            continue
        }
        if literal_start < start {
            segments.push(Segment::Literal(text[literal_start..start].into()));
        }
        let name = KString::from_ref(name);
        observers.push(ObserverDescriptor {
            name: name.clone(),
            is_attribute: attribute_name.is_some(),
            attribute_name: attribute_name.map(|a| KString::from_string(a.to_ascii_lowercase())),
            position: offset + start,
        });
        segments.push(Segment::Observer(name));
        pos = end + OBSERVER_END.len();
        literal_start = pos;
    }
    if literal_start < text.len() {
        segments.push(Segment::Literal(text[literal_start..].into()));
    }
    segments
}

struct OpenElement {
    element: TElement,
    offset: usize,
}

struct Builder {
    nodes: Vec<TNode>,
    open: Vec<OpenElement>,
    observers: Vec<ObserverDescriptor>,
    // (field, byte offset)
    identities: Vec<(String, usize)>,
}

impl Builder {
    fn add(&mut self, node: TNode) {
        match self.open.last_mut() {
            Some(o) => o.element.children.push(node),
            None => self.nodes.push(node),
        }
    }

    fn attribute(&mut self, a: &Attribute) -> TAttr {
        if a.value.is_none() {
            if let Some(field) = identity_marker(a.name) {
                self.identities.push((field.into(), a.offset));
                return TAttr::IdentityMarker
            }
        }
        TAttr::Plain {
            name: KString::from_ref(a.name),
            value: a.value.map(
                |v| scan_segments(v.text, v.offset, Some(a.name), &mut self.observers)),
            quote: a.value.and_then(|v| v.quote),
        }
    }

    fn token(&mut self, token: Token) -> Result<(), MalformedTemplateError> {
        match token {
            Token::StartTag { name, attributes, self_closing, offset } => {
                let attrs = attributes.iter().map(|a| self.attribute(a)).collect();
                let element = TElement {
                    tag: KString::from_ref(name),
                    attrs,
                    self_closing,
                    children: Vec::new(),
                };
                if self_closing || element.is_void() {
                    self.add(TNode::Element(element));
                } else {
                    self.open.push(OpenElement { element, offset });
                }
            }
            Token::EndTag { name, offset } => {
                let matches = |o: &OpenElement| o.element.tag.eq_ignore_ascii_case(name);
                match self.open.last() {
                    Some(top) if matches(top) => {
                        if let Some(done) = self.open.pop() {
                            self.add(TNode::Element(done.element));
                        }
                    }
                    Some(top) if self.open.iter().any(matches) => {
                        return Err(MalformedTemplateErrorKind::UnclosedElement {
                            tag: top.element.tag.to_string(),
                            offset: top.offset,
                        }.into())
                    }
                    _ => return Err(MalformedTemplateErrorKind::StrayEndTag {
                        tag: name.into(),
                        offset,
                    }.into())
                }
            }
            Token::Text { text, offset } => {
                let segments = scan_segments(text, offset, None, &mut self.observers);
                self.add(TNode::Text(segments));
            }
            Token::Comment { text, .. } => self.add(TNode::Comment(text.into())),
            Token::Declaration { text, .. } => self.add(TNode::Declaration(text.into())),
        }
        Ok(())
    }
}

pub fn parse(markup: &str) -> Result<ParsedTemplate, MalformedTemplateError> {
    let mut builder = Builder {
        nodes: Vec::new(),
        open: Vec::new(),
        observers: Vec::new(),
        identities: Vec::new(),
    };
    for token in Tokenizer::new(markup) {
        builder.token(token?)?;
    }
    if let Some(top) = builder.open.last() {
        return Err(MalformedTemplateErrorKind::UnclosedElement {
            tag: top.element.tag.to_string(),
            offset: top.offset,
        }.into())
    }
    let identity_field = match builder.identities.as_slice() {
        [] => return Err(MalformedTemplateErrorKind::MissingIdentity.into()),
        [(field, _)] => KString::from_ref(field),
        [(first, first_offset), (second, second_offset), ..] =>
            return Err(MalformedTemplateErrorKind::AmbiguousIdentity {
                first: first.clone(),
                first_offset: *first_offset,
                second: second.clone(),
                second_offset: *second_offset,
            }.into()),
    };
    Ok(ParsedTemplate {
        identity_field,
        observers: builder.observers,
        nodes: builder.nodes,
    })
}
