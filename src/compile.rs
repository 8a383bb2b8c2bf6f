//! Turning a parsed template plus records into markup, with the
//! marker attributes that later updates look elements up by.

use ammo_dom::html_escape_into;
use itertools::Itertools;

use crate::{markup::{ParsedTemplate, Segment, TAttr, TElement, TNode},
            record::{field_text, Record}};

pub const ATTR_ID: &str = "data-ammo-id";
pub const ATTR_ID_VALUE: &str = "data-ammo-id-value";
pub const ATTR_OBSERVER: &str = "data-ammo-observer";

/// The marker token for an attribute binding.
pub fn attribute_token(observer: &str, attribute: &str) -> String {
    format!("{observer}@{}", attribute.to_ascii_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFragment {
    pub html: String,
    /// Lower-cased identity value of every record, in order.
    pub identities: Vec<String>,
}

struct RecordWriter<'t> {
    template: &'t ParsedTemplate,
    record: &'t Record,
    identity: &'t str,
    out: String,
}

impl<'t> RecordWriter<'t> {
    fn value(&mut self, observer: &str) {
        // Inserted verbatim: record values are trusted markup.
        self.out.push_str(&field_text(self.record, observer));
    }

    fn segments(&mut self, segments: &[Segment]) {
        for s in segments {
            match s {
                Segment::Literal(l) => self.out.push_str(l),
                Segment::Observer(name) => self.value(name),
            }
        }
    }

    fn attribute(&mut self, attr: &TAttr) {
        match attr {
            TAttr::IdentityMarker => {
                self.out.push(' ');
                self.out.push_str(ATTR_ID);
                self.out.push_str("=\"");
                html_escape_into(&mut self.out, &self.template.identity_field);
                self.out.push_str("\" ");
                self.out.push_str(ATTR_ID_VALUE);
                self.out.push_str("=\"");
                html_escape_into(&mut self.out, self.identity);
                self.out.push('"');
            }
            TAttr::Plain { name, value, quote } => {
                self.out.push(' ');
                self.out.push_str(name);
                if let Some(value) = value {
                    let q = quote.unwrap_or('"');
                    self.out.push('=');
                    self.out.push(q);
                    self.segments(value);
                    self.out.push(q);
                }
            }
        }
    }

    fn element(&mut self, e: &TElement) {
        let sole = e.sole_observer();
        let mut tokens: Vec<String> = Vec::new();
        if let Some(name) = sole {
            tokens.push(name.into());
        }
        for a in &e.attrs {
            if let TAttr::Plain { name: attname, .. } = a {
                for o in a.observers() {
                    let t = attribute_token(o, attname);
                    if !tokens.contains(&t) {
                        tokens.push(t);
                    }
                }
            }
        }

        self.out.push('<');
        self.out.push_str(&e.tag);
        for a in &e.attrs {
            self.attribute(a);
        }
        if !tokens.is_empty() {
            self.out.push(' ');
            self.out.push_str(ATTR_OBSERVER);
            self.out.push_str("=\"");
            self.out.push_str(&tokens.iter().join(" "));
            self.out.push('"');
        }
        if e.self_closing {
            self.out.push_str("/>");
            return
        }
        self.out.push('>');
        match sole {
            Some(name) => self.value(name),
            None => self.nodes(&e.children),
        }
        if !e.is_void() {
            self.out.push_str("</");
            self.out.push_str(&e.tag);
            self.out.push('>');
        }
    }

    fn nodes(&mut self, nodes: &[TNode]) {
        for n in nodes {
            match n {
                TNode::Element(e) => self.element(e),
                TNode::Text(segments) => for s in segments {
                    match s {
                        Segment::Literal(l) => self.out.push_str(l),
                        Segment::Observer(name) => {
                            self.out.push_str("<span ");
                            self.out.push_str(ATTR_OBSERVER);
                            self.out.push_str("=\"");
                            self.out.push_str(name);
                            self.out.push_str("\">");
                            self.value(name);
                            self.out.push_str("</span>");
                        }
                    }
                },
                TNode::Comment(c) => {
                    self.out.push_str("<!--");
                    self.out.push_str(c);
                    self.out.push_str("-->");
                }
                TNode::Declaration(d) => {
                    self.out.push_str("<!");
                    self.out.push_str(d);
                    self.out.push('>');
                }
            }
        }
    }
}

/// One fragment per record, in input order, concatenated.
pub fn compile(template: &ParsedTemplate, records: &[Record]) -> CompiledFragment {
    let mut html = String::new();
    let mut identities = Vec::with_capacity(records.len());
    for record in records {
        let identity = field_text(record, &template.identity_field).to_lowercase();
        let mut w = RecordWriter {
            template,
            record,
            identity: &identity,
            out: std::mem::take(&mut html),
        };
        w.nodes(&template.nodes);
        html = w.out;
        identities.push(identity);
    }
    CompiledFragment { html, identities }
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    use crate::{markup::parse, record::records_of};

    fn records(v: serde_json::Value) -> Vec<Record> {
        records_of(v.as_array().unwrap())
    }

    #[test]
    fn t_compile_users() -> Result<()> {
        let t = parse("<li class=\"user\" (key:name)>\n  \
                       <img class=\"user-image\" src=\"{{thumbnail}}\" alt=\"user-image\">\n  \
                       <span class=\"user-name\">{{name}}</span>\n</li>")?;
        let c = compile(&t, &records(json!([
            {"name": "Cartman", "thumbnail": "img/cartman.png"},
            {"name": "Kyle", "thumbnail": "img/kyle.png"},
        ])));
        assert_eq!(c.identities, ["cartman", "kyle"]);
        assert_eq!(c.html,
                   "<li class=\"user\" data-ammo-id=\"name\" data-ammo-id-value=\"cartman\">\n  \
                    <img class=\"user-image\" src=\"img/cartman.png\" alt=\"user-image\" \
                    data-ammo-observer=\"thumbnail@src\">\n  \
                    <span class=\"user-name\" data-ammo-observer=\"name\">Cartman</span>\n</li>\
                    <li class=\"user\" data-ammo-id=\"name\" data-ammo-id-value=\"kyle\">\n  \
                    <img class=\"user-image\" src=\"img/kyle.png\" alt=\"user-image\" \
                    data-ammo-observer=\"thumbnail@src\">\n  \
                    <span class=\"user-name\" data-ammo-observer=\"name\">Kyle</span>\n</li>");
        Ok(())
    }

    #[test]
    fn t_mixed_text_and_missing_fields() -> Result<()> {
        let t = parse("<p key:id>Hello {{name}}, age {{age}}</p>")?;
        let c = compile(&t, &records(json!([{"id": 7, "name": "Stan"}])));
        assert_eq!(c.html,
                   "<p data-ammo-id=\"id\" data-ammo-id-value=\"7\">Hello \
                    <span data-ammo-observer=\"name\">Stan</span>, age \
                    <span data-ammo-observer=\"age\">undefined</span></p>");
        Ok(())
    }

    #[test]
    fn t_attribute_bindings() -> Result<()> {
        let t = parse("<a key:id HREF='/u/{{id}}' title=\"{{name}} ({{id}})\" data-x={{id}} />")?;
        let c = compile(&t, &records(json!([{"id": "A1", "name": "Wendy"}])));
        assert_eq!(c.html,
                   "<a data-ammo-id=\"id\" data-ammo-id-value=\"a1\" HREF='/u/A1' \
                    title=\"Wendy (A1)\" data-x=\"A1\" \
                    data-ammo-observer=\"id@href name@title id@title id@data-x\"/>");
        Ok(())
    }

    #[test]
    fn t_missing_identity_field_and_verbatim_values() -> Result<()> {
        let t = parse("<b key:id>{{html}}</b>")?;
        let c = compile(&t, &records(json!([{"html": "<i>x</i> & y"}])));
        assert_eq!(c.identities, ["undefined"]);
        assert_eq!(c.html, "<b data-ammo-id=\"id\" data-ammo-id-value=\"undefined\" \
                            data-ammo-observer=\"html\"><i>x</i> & y</b>");
        assert_eq!(compile(&t, &[]).html, "");
        Ok(())
    }
}
