//! A compiled template: render it into a container, then update
//! single bound values in place, addressed by item identity and
//! observer name.

use std::collections::HashMap;

use ammo_dom::Selector;
use kstring::KString;
use serde_json::Value;
use tracing::debug;

use crate::{compile::{compile, CompiledFragment, ATTR_ID, ATTR_ID_VALUE, ATTR_OBSERVER},
            dom::DomEngine,
            markup::{is_name, parse, MalformedTemplateError, ObserverDescriptor, ParsedTemplate,
                     Segment, TAttr, TNode},
            record::{field_text, Record}};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome<N> {
    /// The elements that were changed.
    Applied { nodes: Vec<N> },
    NoSuchIdentity,
    NoSuchObserver,
}

impl<N> UpdateOutcome<N> {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    parsed: ParsedTemplate,
    compiled: CompiledFragment,
    /// Field values per identity value, as last rendered or updated;
    /// attribute values are re-rendered from these.
    values: HashMap<String, Record>,
    /// (observer, lower-case attribute name) -> the value templates
    /// of the attributes binding it, in document order.
    attribute_templates: HashMap<(KString, KString), Vec<Vec<Segment>>>,
}

fn collect_attribute_templates(
    nodes: &[TNode],
    out: &mut HashMap<(KString, KString), Vec<Vec<Segment>>>,
) {
    for n in nodes {
        if let TNode::Element(e) = n {
            for a in &e.attrs {
                if let TAttr::Plain { name, value: Some(segments), .. } = a {
                    let attname = KString::from_string(name.to_ascii_lowercase());
                    let mut seen: Vec<&str> = Vec::new();
                    for o in a.observers() {
                        if seen.contains(&o) {
                            continue
                        }
                        seen.push(o);
                        out.entry((KString::from_ref(o), attname.clone()))
                            .or_default()
                            .push(segments.clone());
                    }
                }
            }
            collect_attribute_templates(&e.children, out);
        }
    }
}

/// Parse `markup` and compile it against `records`.
pub fn template(markup: &str, records: &[Record]) -> Result<Template, MalformedTemplateError> {
    Template::new(markup, records)
}

impl Template {
    pub fn new(markup: &str, records: &[Record]) -> Result<Self, MalformedTemplateError> {
        let parsed = parse(markup)?;
        let compiled = compile(&parsed, records);
        let mut values = HashMap::new();
        for (record, identity) in records.iter().zip(&compiled.identities) {
            // a later record with the same identity wins, as in lookups
            values.insert(identity.clone(), record.clone());
        }
        let mut attribute_templates = HashMap::new();
        collect_attribute_templates(&parsed.nodes, &mut attribute_templates);
        Ok(Template { parsed, compiled, values, attribute_templates })
    }

    pub fn html(&self) -> &str {
        &self.compiled.html
    }

    pub fn identities(&self) -> &[String] {
        &self.compiled.identities
    }

    pub fn identity_field(&self) -> &str {
        &self.parsed.identity_field
    }

    pub fn observers(&self) -> &[ObserverDescriptor] {
        &self.parsed.observers
    }

    pub fn compiled(&self) -> &CompiledFragment {
        &self.compiled
    }

    /// Replace the content of `container` with the compiled markup.
    pub fn render<D: DomEngine>(&self, dom: &mut D, container: D::Node) -> Result<(), D::Error> {
        dom.replace_content(container, &self.compiled.html)
    }

    /// `render`, then call `then` right after mounting.
    pub fn render_then<D: DomEngine>(
        &self,
        dom: &mut D,
        container: D::Node,
        then: impl FnOnce(&mut D),
    ) -> Result<(), D::Error> {
        self.render(dom, container)?;
        then(dom);
        Ok(())
    }

    /// The element carrying the identity marker for `identity`; the
    /// last one in document order if there are several.
    pub fn find_identity<D: DomEngine>(&self, dom: &D, identity: &str) -> Option<D::Node> {
        let selector = Selector::any()
            .with_attr_eq(ATTR_ID, &self.parsed.identity_field)
            .with_attr_eq(ATTR_ID_VALUE, &identity.to_lowercase());
        dom.query_all(dom.root(), &selector).pop()
    }

    /// `node` and its descendants matching `selector`.
    fn inclusive_query<D: DomEngine>(dom: &D, node: D::Node, selector: &Selector)
                                     -> Vec<D::Node> {
        let mut nodes = Vec::new();
        if dom.matches(node, selector) {
            nodes.push(node);
        }
        nodes.extend(dom.query_all(node, selector));
        nodes
    }

    fn remember(&mut self, identity: &str, observer: &str, value: &str) {
        self.values.entry(identity.to_lowercase())
            .or_default()
            .insert(observer.into(), Value::String(value.into()));
    }

    /// Overwrite the text of every element bound to `observer` as
    /// text, within the item with the given identity.
    pub fn update_value<D: DomEngine>(
        &mut self,
        dom: &mut D,
        identity: &str,
        observer: &str,
        value: &str,
    ) -> Result<UpdateOutcome<D::Node>, D::Error> {
        let root = match self.find_identity(dom, identity) {
            Some(n) => n,
            None => {
                debug!("update_value: no item with {}={identity:?}", self.identity_field());
                return Ok(UpdateOutcome::NoSuchIdentity)
            }
        };
        // `name@attr` marker tokens are attribute bindings, never text
        if !is_name(observer) {
            debug!("update_value: {observer:?} is not an observer name");
            return Ok(UpdateOutcome::NoSuchObserver)
        }
        let selector = Selector::any().with_attr_word(ATTR_OBSERVER, observer);
        let nodes = Self::inclusive_query(dom, root, &selector);
        if nodes.is_empty() {
            debug!("update_value: item {identity:?} has no text observer {observer:?}");
            return Ok(UpdateOutcome::NoSuchObserver)
        }
        for n in &nodes {
            dom.set_text_content(*n, value)?;
        }
        self.remember(identity, observer, value);
        Ok(UpdateOutcome::Applied { nodes })
    }

    /// Set `observer` to `value` and re-render every attribute bound
    /// to it, within the item with the given identity. Literal text
    /// and other observers in those attributes keep their values.
    pub fn update_attribute<D: DomEngine>(
        &mut self,
        dom: &mut D,
        identity: &str,
        observer: &str,
        value: &str,
    ) -> Result<UpdateOutcome<D::Node>, D::Error> {
        let root = match self.find_identity(dom, identity) {
            Some(n) => n,
            None => {
                debug!("update_attribute: no item with {}={identity:?}",
                       self.identity_field());
                return Ok(UpdateOutcome::NoSuchIdentity)
            }
        };

        if !is_name(observer) {
            debug!("update_attribute: {observer:?} is not an observer name");
            return Ok(UpdateOutcome::NoSuchObserver)
        }

        // (node, attribute, index among the nodes binding that attribute)
        let mut targets: Vec<(D::Node, KString, usize)> = Vec::new();
        let prefix = format!("{observer}@");
        let marked = Self::inclusive_query(dom, root, &Selector::any().with_attr(ATTR_OBSERVER));
        let mut counts: HashMap<KString, usize> = HashMap::new();
        for n in marked {
            let tokens = dom.attribute(n, ATTR_OBSERVER).unwrap_or_default();
            for t in tokens.split_ascii_whitespace() {
                if let Some(attname) = t.strip_prefix(&prefix) {
                    let attname = KString::from_ref(attname);
                    let count = counts.entry(attname.clone()).or_insert(0);
                    targets.push((n, attname, *count));
                    *count += 1;
                }
            }
        }
        if targets.is_empty() {
            debug!("update_attribute: item {identity:?} has no attribute observer {observer:?}");
            return Ok(UpdateOutcome::NoSuchObserver)
        }

        self.remember(identity, observer, value);
        let record = self.values.get(&identity.to_lowercase()).cloned().unwrap_or_default();
        let mut nodes: Vec<D::Node> = Vec::new();
        for (n, attname, i) in targets {
            let key = (KString::from_ref(observer), attname.clone());
            let rendered = match self.attribute_templates.get(&key)
                .and_then(|ts| ts.get(i).or_else(|| ts.last()))
            {
                Some(segments) => segments.iter()
                    .map(|s| match s {
                        Segment::Literal(l) => l.clone(),
                        Segment::Observer(o) => field_text(&record, o).into_owned(),
                    })
                    .collect::<String>(),
                // marker without a template (added by hand?): plain value
                None => value.to_string(),
            };
            dom.set_attribute(n, &attname, &rendered)?;
            if !nodes.contains(&n) {
                nodes.push(n);
            }
        }
        Ok(UpdateOutcome::Applied { nodes })
    }

    /// The identity marker pair `(field, value)` of `node`, if it
    /// carries one.
    pub fn identity_of<D: DomEngine>(dom: &D, node: D::Node) -> Option<(String, String)> {
        Some((dom.attribute(node, ATTR_ID)?, dom.attribute(node, ATTR_ID_VALUE)?))
    }
}
