use std::collections::HashMap;
use std::ops::Index;

/// Name of the synthetic root element owning the whole tree.
pub const DOCUMENT_NAME: &str = "[document]";

/// Handle to an element inside a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, PartialEq, Eq)]
pub struct Element {
    /// Tag name, folded to lower-case by the tokenizer.
    pub name: String,
    pub attributes: HashMap<String, String>,
    /// Character data seen directly inside this element, concatenated raw.
    pub text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Element {
    fn new(name: String, attributes: HashMap<String, String>, parent: Option<NodeId>) -> Self {
        Self {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
            parent,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn has_attr(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// An element tree built from one page. The arena owns every [`Element`];
/// parent/child links are [`NodeId`] handles, so the tree cannot form cycles.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Element>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Element::new(DOCUMENT_NAME.to_string(), HashMap::new(), None)],
        }
    }

    /// Parses markup into a tree, recovering from malformed nesting.
    pub fn parse(input: &str) -> Self {
        super::parsing::parse(input)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub(crate) fn append_element(
        &mut self,
        parent: NodeId,
        name: String,
        attributes: Vec<(String, String)>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        // Collecting into the map keeps the last value of a repeated key.
        self.nodes
            .push(Element::new(name, attributes.into_iter().collect(), Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub(crate) fn append_text(&mut self, id: NodeId, data: &str) {
        self.nodes[id.0].text.push_str(data);
    }

    /// Iterates the strict descendants of `scope` in document order
    /// (pre-order, `scope` itself excluded).
    pub fn descendants(&self, scope: NodeId) -> Descendants<'_> {
        let mut stack = self[scope].children.clone();
        stack.reverse();
        Descendants { doc: self, stack }
    }

    /// First element in document order matching `query`, excluding the root.
    pub fn find(&self, query: &Query) -> Option<NodeId> {
        self.find_within(self.root(), query)
    }

    /// First matching strict descendant of `scope`.
    pub fn find_within(&self, scope: NodeId, query: &Query) -> Option<NodeId> {
        self.descendants(scope).find(|&id| query.matches(&self[id]))
    }

    /// Every matching element, in document order.
    pub fn find_all(&self, query: &Query) -> Vec<NodeId> {
        self.descendants(self.root())
            .filter(|&id| query.matches(&self[id]))
            .collect()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeId> for Document {
    type Output = Element;

    fn index(&self, id: NodeId) -> &Element {
        &self.nodes[id.0]
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.doc[id].children.iter().rev().copied());
        Some(id)
    }
}

/// Predicate on a single attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrMatch {
    /// Key present with any value.
    Exists,
    /// Key present with exactly this value.
    Equals(String),
}

/// Compound element predicate: an optional name filter plus a conjunction of
/// attribute predicates. No disjunction or substring matching at this layer;
/// checks needing those read the raw attribute value themselves.
#[derive(Debug, Clone, Default)]
pub struct Query {
    names: Option<Vec<String>>,
    attrs: Vec<(String, AttrMatch)>,
}

impl Query {
    /// Matches any element name.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn tag(name: &str) -> Self {
        Self {
            names: Some(vec![name.to_string()]),
            attrs: Vec::new(),
        }
    }

    /// Matches if the element's name is any of `names`.
    pub fn tags(names: &[&str]) -> Self {
        Self {
            names: Some(names.iter().map(|n| n.to_string()).collect()),
            attrs: Vec::new(),
        }
    }

    pub fn attr(mut self, key: &str, value: &str) -> Self {
        self.attrs
            .push((key.to_string(), AttrMatch::Equals(value.to_string())));
        self
    }

    pub fn attr_present(mut self, key: &str) -> Self {
        self.attrs.push((key.to_string(), AttrMatch::Exists));
        self
    }

    pub fn matches(&self, element: &Element) -> bool {
        if let Some(names) = &self.names {
            if !names.iter().any(|n| n == &element.name) {
                return false;
            }
        }
        self.attrs.iter().all(|(key, pred)| match pred {
            AttrMatch::Exists => element.has_attr(key),
            AttrMatch::Equals(value) => element.attr(key) == Some(value.as_str()),
        })
    }
}

#[cfg(test)]
#[test]
fn test_document_order() {
    let doc = Document::parse("<div><p>a</p><span><p>b</p></span></div><p>c</p>");
    let names: Vec<&str> = doc
        .descendants(doc.root())
        .map(|id| doc[id].name.as_str())
        .collect();
    assert_eq!(names, vec!["div", "p", "span", "p", "p"]);
    let ps = doc.find_all(&Query::tag("p"));
    let texts: Vec<&str> = ps.iter().map(|&id| doc[id].text.as_str()).collect();
    assert_eq!(texts, vec!["a", "b", "c"]);
}

#[cfg(test)]
#[test]
fn test_find_filters() {
    let doc = Document::parse(
        r#"<link rel="alternate" hreflang="en" href="/en"/>
           <link rel="stylesheet" href="main.css"/>
           <meta itemscope itemtype="https://schema.org/Article"/>"#,
    );
    assert!(doc
        .find(&Query::tag("link").attr("rel", "stylesheet"))
        .is_some());
    assert!(doc
        .find(&Query::tag("link").attr("rel", "alternate").attr_present("hreflang"))
        .is_some());
    assert!(doc.find(&Query::any().attr_present("itemscope")).is_some());
    assert!(doc.find(&Query::tag("link").attr("rel", "canonical")).is_none());
    // Conjunction: both predicates must hold on the same element.
    assert!(doc
        .find(&Query::tag("link").attr("rel", "stylesheet").attr_present("hreflang"))
        .is_none());
}

#[cfg(test)]
#[test]
fn test_find_within_excludes_scope() {
    let doc = Document::parse("<video title=\"t\"><track kind=\"captions\"/></video>");
    let video = doc.find(&Query::tag("video")).unwrap();
    assert!(doc
        .find_within(video, &Query::tag("track").attr("kind", "captions"))
        .is_some());
    assert!(doc.find_within(video, &Query::tag("video")).is_none());
}
