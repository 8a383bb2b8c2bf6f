//! Attribute selectors, a small subset of CSS selectors:
//! `tag.class#id[attr][attr="v"][attr~="word"][attr^="prefix"]`,
//! all parts optional, no combinators.

use kstring::KString;
use thiserror::Error;

use crate::node::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrMatch {
    Exists,
    Equals(KString),
    /// Value, split at whitespace, contains the word.
    HasWord(KString),
    StartsWith(KString),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    /// Lower case.
    pub name: KString,
    pub matcher: AttrMatch,
}

impl AttrSelector {
    pub fn matches(&self, element: &Element) -> bool {
        match element.attribute(&self.name) {
            None => false,
            Some(value) => match &self.matcher {
                AttrMatch::Exists => true,
                AttrMatch::Equals(v) => value == v.as_str(),
                AttrMatch::HasWord(w) => value.split_ascii_whitespace().any(|t| t == w.as_str()),
                AttrMatch::StartsWith(p) => value.starts_with(p.as_str()),
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    /// Lower case.
    pub tag: Option<KString>,
    pub attrs: Vec<AttrSelector>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected {found:?} at byte {offset} in selector {selector:?}")]
    Unexpected { selector: String, offset: usize, found: char },
    #[error("selector {0:?} ends prematurely")]
    Premature(String),
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == '@' || c == ':'
}

fn ident_at<'s>(s: &'s str, chars: &[(usize, char)], i: &mut usize) -> &'s str {
    let start = chars.get(*i).map(|(o, _)| *o).unwrap_or(s.len());
    while *i < chars.len() && is_ident_char(chars[*i].1) {
        *i += 1;
    }
    let end = chars.get(*i).map(|(o, _)| *o).unwrap_or(s.len());
    &s[start..end]
}

impl Selector {
    /// Matches every element.
    pub fn any() -> Self {
        Selector::default()
    }

    pub fn tag(tag: &str) -> Self {
        Selector {
            tag: Some(KString::from_string(tag.to_ascii_lowercase())),
            attrs: Vec::new(),
        }
    }

    fn with(mut self, name: &str, matcher: AttrMatch) -> Self {
        self.attrs.push(AttrSelector {
            name: KString::from_string(name.to_ascii_lowercase()),
            matcher
        });
        self
    }

    pub fn with_attr(self, name: &str) -> Self {
        self.with(name, AttrMatch::Exists)
    }

    pub fn with_attr_eq(self, name: &str, value: &str) -> Self {
        self.with(name, AttrMatch::Equals(KString::from_ref(value)))
    }

    pub fn with_attr_word(self, name: &str, word: &str) -> Self {
        self.with(name, AttrMatch::HasWord(KString::from_ref(word)))
    }

    pub fn with_attr_prefix(self, name: &str, prefix: &str) -> Self {
        self.with(name, AttrMatch::StartsWith(KString::from_ref(prefix)))
    }

    pub fn with_class(self, class: &str) -> Self {
        self.with_attr_word("class", class)
    }

    pub fn matches_element(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if element.tag_name() != tag.as_str() {
                return false
            }
        }
        self.attrs.iter().all(|a| a.matches(element))
    }

    pub fn parse(selector: &str) -> Result<Selector, SelectorError> {
        let s = selector.trim();
        if s.is_empty() {
            return Err(SelectorError::Empty)
        }
        let unexpected = |offset: usize, found: char| SelectorError::Unexpected {
            selector: selector.into(), offset, found
        };
        let premature = || SelectorError::Premature(selector.into());

        let chars: Vec<(usize, char)> = s.char_indices().collect();
        let mut i = 0;
        let ident = |i: &mut usize| ident_at(s, &chars, i);

        let mut sel = Selector::any();
        if chars[0].1 == '*' {
            i += 1;
        } else {
            let t = ident(&mut i);
            if !t.is_empty() {
                sel = Selector::tag(t);
            }
        }
        while i < chars.len() {
            let (offset, c) = chars[i];
            i += 1;
            match c {
                '.' | '#' => {
                    let name = ident(&mut i);
                    if name.is_empty() {
                        return Err(match chars.get(i) {
                            Some((o, c)) => unexpected(*o, *c),
                            None => premature()
                        })
                    }
                    sel = if c == '.' {
                        sel.with_class(name)
                    } else {
                        sel.with_attr_eq("id", name)
                    };
                }
                '[' => {
                    let name = ident(&mut i);
                    if name.is_empty() {
                        return Err(match chars.get(i) {
                            Some((o, c)) => unexpected(*o, *c),
                            None => premature()
                        })
                    }
                    let (o, c) = *chars.get(i).ok_or_else(premature)?;
                    i += 1;
                    let op = match c {
                        ']' => {
                            sel = sel.with_attr(name);
                            continue
                        }
                        '=' => "=",
                        '~' | '^' => {
                            let (o2, c2) = *chars.get(i).ok_or_else(premature)?;
                            if c2 != '=' {
                                return Err(unexpected(o2, c2))
                            }
                            i += 1;
                            if c == '~' { "~=" } else { "^=" }
                        }
                        _ => return Err(unexpected(o, c))
                    };
                    let value: String = match chars.get(i) {
                        Some((_, q @ ('"' | '\''))) => {
                            let q = *q;
                            i += 1;
                            let mut v = String::new();
                            loop {
                                let (_, c) = *chars.get(i).ok_or_else(premature)?;
                                i += 1;
                                if c == q {
                                    break
                                }
                                v.push(c);
                            }
                            v
                        }
                        Some(_) => ident(&mut i).to_string(),
                        None => return Err(premature()),
                    };
                    let (o, c) = *chars.get(i).ok_or_else(premature)?;
                    if c != ']' {
                        return Err(unexpected(o, c))
                    }
                    i += 1;
                    sel = match op {
                        "=" => sel.with_attr_eq(name, &value),
                        "~=" => sel.with_attr_word(name, &value),
                        _ => sel.with_attr_prefix(name, &value),
                    };
                }
                _ => return Err(unexpected(offset, c))
            }
        }
        Ok(sel)
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, attrs: &[(&str, &str)]) -> Element {
        let mut e = Element::new(tag);
        for (k, v) in attrs {
            e.set_attribute(k, v);
        }
        e
    }

    #[test]
    fn t_parse() {
        let s = Selector::parse("li.user[data-ammo-id=\"name\"]").unwrap();
        assert_eq!(s, Selector::tag("li")
                   .with_class("user")
                   .with_attr_eq("data-ammo-id", "name"));
        let s: Selector = "[data-ammo-observer~='thumbnail@src'][title]".parse().unwrap();
        assert_eq!(s, Selector::any()
                   .with_attr_word("data-ammo-observer", "thumbnail@src")
                   .with_attr("title"));
        assert_eq!(Selector::parse("*#main").unwrap(),
                   Selector::any().with_attr_eq("id", "main"));
        assert_eq!(Selector::parse("[x^=ab]").unwrap(),
                   Selector::any().with_attr_prefix("x", "ab"));
    }

    #[test]
    fn t_parse_errors() {
        assert_eq!(Selector::parse("  "), Err(SelectorError::Empty));
        assert!(matches!(Selector::parse("li > a"),
                         Err(SelectorError::Unexpected { found: ' ', .. })));
        assert!(matches!(Selector::parse("[x=\"y"), Err(SelectorError::Premature(_))));
        assert!(matches!(Selector::parse("[x|=y]"),
                         Err(SelectorError::Unexpected { found: '|', .. })));
    }

    #[test]
    fn t_matches() {
        let e = element("li", &[("class", "user  admin"),
                                ("data-ammo-observer", "name thumbnail@src")]);
        assert!(Selector::tag("LI").matches_element(&e));
        assert!(Selector::any().with_class("admin").matches_element(&e));
        assert!(!Selector::any().with_class("adm").matches_element(&e));
        assert!(Selector::any().with_attr_word("data-ammo-observer", "thumbnail@src")
                .matches_element(&e));
        assert!(!Selector::any().with_attr_word("data-ammo-observer", "thumbnail")
                .matches_element(&e));
        assert!(!Selector::tag("ul").with_class("user").matches_element(&e));
    }
}
