//! Owned XML element trees for outbound stanzas.

use fedlink_session::XmlSerialize;
use quick_xml::escape::escape;

/// Child node of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element.
    Element(Element),
    /// Character data (unescaped; escaping happens on serialization).
    Text(String),
}

/// An owned XML element: name, attributes in insertion order, children.
///
/// Built with a chaining API and serialized compactly, without any
/// indentation, for the session's structured-document send path.
///
/// ```
/// use fedlink_stream::Element;
///
/// let iq = Element::new("iq")
///     .attr("type", "result")
///     .attr("id", "42")
///     .child(Element::new("query").attr("xmlns", "jabber:iq:version"));
/// assert_eq!(
///     String::from_utf8(iq.serialize()).unwrap(),
///     "<iq type='result' id='42'><query xmlns='jabber:iq:version'/></iq>"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Create an element with the given tag name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Append an attribute. Attributes serialize in insertion order.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Append a child element.
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Append character data.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value by name, when present.
    pub fn attr_value(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Serialize the tree as compact XML text.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();
        self.write_into(&mut out);
        out.into_bytes()
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("='");
            out.push_str(&escape(value.as_str()));
            out.push('\'');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(child) => child.write_into(out),
                Node::Text(text) => out.push_str(&escape(text.as_str())),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl XmlSerialize for Element {
    fn write_xml(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.serialize());
    }
}
