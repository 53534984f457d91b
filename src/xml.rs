// Namespace-aware element tree on top of quick-xml events
use crate::{qname::QName, Error, Result};
use ahash::AHashMap;
use compact_str::CompactString;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Write as _;
use std::sync::Arc;
use url::Url;

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const LINK_NS: &str = "http://www.xbrl.org/2003/linkbase";
pub const XBRLI_NS: &str = "http://www.xbrl.org/2003/instance";
pub const XBRLDI_NS: &str = "http://xbrl.org/2006/xbrldi";
pub const XBRLDT_NS: &str = "http://xbrl.org/2005/xbrldt";

/// In-scope prefix bindings of an element. The empty prefix is the default namespace.
pub type Scope = Arc<AHashMap<CompactString, CompactString>>;

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Element {
    name: QName,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
    scope: Scope,
    declared: Vec<(CompactString, CompactString)>,
    offset: u64,
}

#[derive(Debug)]
pub struct XmlDocument {
    pub uri: Url,
    pub root: Element,
}

impl XmlDocument {
    pub fn parse(uri: &Url, data: &[u8]) -> Result<Self> {
        let root = parse_tree(uri.as_str(), data)?;
        Ok(Self {
            uri: uri.clone(),
            root,
        })
    }

    /// `"<uri>@<offset>"` for diagnostics.
    pub fn location(&self, element: &Element) -> String {
        format!("{}@{}", self.uri, element.offset)
    }
}

impl Element {
    #[inline]
    pub fn name(&self) -> &QName {
        &self.name
    }

    #[inline]
    pub fn local_name(&self) -> &str {
        self.name.local_name()
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        self.name.namespace()
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Namespace declarations made on this element itself.
    pub fn declarations(&self) -> &[(CompactString, CompactString)] {
        &self.declared
    }

    pub fn lookup_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.scope.get(prefix).map(|ns| ns.as_str())
    }

    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.name.namespace() == namespace && self.name.local_name() == local_name
    }

    pub fn local_name_eq_ci(&self, name: &str) -> bool {
        self.local_name().eq_ignore_ascii_case(name)
    }

    pub fn local_name_ends_with_ci(&self, suffix: &str) -> bool {
        let local = self.local_name();
        local.len() >= suffix.len()
            && local[local.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Unqualified attribute by local name.
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace().is_empty() && a.name.local_name() == local_name)
            .map(|a| a.value.as_str())
    }

    pub fn attr_ns(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace() == namespace && a.name.local_name() == local_name)
            .map(|a| a.value.as_str())
    }

    #[inline]
    pub fn xlink(&self, local_name: &str) -> Option<&str> {
        self.attr_ns(XLINK_NS, local_name)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&Element> {
        self.children().find(|c| c.is(namespace, local_name))
    }

    /// First child whose local name matches, ignoring namespace and ASCII case.
    pub fn child_ci(&self, local_name: &str) -> Option<&Element> {
        self.children().find(|c| c.local_name_eq_ci(local_name))
    }

    pub fn children_ci<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children().filter(move |c| c.local_name_eq_ci(local_name))
    }

    /// Depth-first, document order, including `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Concatenated text of this element and all its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    pub fn trimmed_text(&self) -> String {
        self.text().trim().to_string()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.descendants().find(|e| e.attr("id") == Some(id))
    }

    /// Resolves an XPointer child sequence (1-based element positions).
    pub fn child_sequence(&self, steps: &[usize]) -> Option<&Element> {
        let mut current = self;
        for &step in steps {
            current = current.children().nth(step.checked_sub(1)?)?;
        }
        Some(current)
    }

    /// Serializes the content of this element, without its own tags.
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(&quick_xml::escape::escape(t.as_str())),
                Node::Element(e) => e.write_xml(&mut out),
            }
        }
        out
    }

    /// Serializes this subtree back to XML text.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    /// Prefix-independent serialization: Clark-named tags and attributes,
    /// attributes sorted, no namespace declarations. Equal for subtrees that
    /// differ only in the prefixes they bind.
    pub fn canonical_xml(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        let tag = self.name.clark();
        let _ = write!(out, "<{}", tag);
        let mut attributes: Vec<(String, &str)> = self
            .attributes
            .iter()
            .map(|a| (a.name.clark(), a.value.as_str()))
            .collect();
        attributes.sort();
        for (name, value) in attributes {
            let _ = write!(out, " {}=\"{}\"", name, quick_xml::escape::escape(value));
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(&quick_xml::escape::escape(t.as_str())),
                Node::Element(e) => e.write_canonical(out),
            }
        }
        let _ = write!(out, "</{}>", tag);
    }

    fn write_xml(&self, out: &mut String) {
        let tag = self.name.to_string();
        let tag = if self.name.prefix().is_none() {
            self.local_name().to_string()
        } else {
            tag
        };
        let _ = write!(out, "<{}", tag);
        for (prefix, uri) in &self.declared {
            let escaped = quick_xml::escape::escape(uri.as_str());
            if prefix.is_empty() {
                let _ = write!(out, " xmlns=\"{}\"", escaped);
            } else {
                let _ = write!(out, " xmlns:{}=\"{}\"", prefix, escaped);
            }
        }
        for attr in &self.attributes {
            let name = match attr.name.prefix() {
                Some(p) => format!("{}:{}", p, attr.name.local_name()),
                None => attr.name.local_name().to_string(),
            };
            let _ = write!(
                out,
                " {}=\"{}\"",
                name,
                quick_xml::escape::escape(attr.value.as_str())
            );
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(&quick_xml::escape::escape(t.as_str())),
                Node::Element(e) => e.write_xml(out),
            }
        }
        let _ = write!(out, "</{}>", tag);
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        let start = self.stack.len();
        self.stack.extend(next.children());
        self.stack[start..].reverse();
        Some(next)
    }
}

/// Reads only the root start tag and returns its qualified name.
pub fn sniff_root(data: &[u8]) -> Option<QName> {
    let mut reader = Reader::from_reader(strip_bom(data));
    let empty: Scope = Arc::new(AHashMap::new());
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let offset = reader.buffer_position() as u64;
                return start_element("", &e, &empty, offset)
                    .ok()
                    .map(|el| el.name);
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

fn parse_tree(uri: &str, data: &[u8]) -> Result<Element> {
    let mut reader = Reader::from_reader(strip_bom(data));
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let empty: Scope = Arc::new(AHashMap::new());

    loop {
        let offset = reader.buffer_position() as u64;
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let scope = stack.last().map(|p| &p.scope).unwrap_or(&empty);
                let element = start_element(uri, &e, scope, offset)?;
                stack.push(element);
            }
            Ok(Event::Empty(e)) => {
                let scope = stack.last().map(|p| &p.scope).unwrap_or(&empty);
                let element = start_element(uri, &e, scope, offset)?;
                attach(&mut stack, &mut root, element, uri)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::xml(uri, "unexpected closing tag"))?;
                attach(&mut stack, &mut root, element, uri)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(parent) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| Error::xml(uri, e))?;
                    parent.children.push(Node::Text(text.into_owned()));
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    parent.children.push(Node::Text(text));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::xml(
                    uri,
                    format!("{} at byte {}", e, reader.buffer_position()),
                ))
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::xml(
            uri,
            format!("unclosed element <{}>", open.name.local_name()),
        ));
    }
    root.ok_or_else(|| Error::xml(uri, "document has no root element"))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    uri: &str,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::xml(uri, "multiple root elements")),
    }
    Ok(())
}

fn start_element(uri: &str, e: &BytesStart<'_>, parent: &Scope, offset: u64) -> Result<Element> {
    let mut declared = Vec::new();
    let mut raw_attrs = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::xml(uri, err))?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|err| Error::xml(uri, err))?;
        let value = attr
            .unescape_value()
            .map_err(|err| Error::xml(uri, err))?
            .into_owned();

        if key == "xmlns" {
            declared.push((CompactString::new(""), CompactString::from(value)));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declared.push((CompactString::from(prefix), CompactString::from(value)));
        } else {
            raw_attrs.push((key.to_string(), value));
        }
    }

    let scope = if declared.is_empty() {
        parent.clone()
    } else {
        let mut map = (**parent).clone();
        for (prefix, ns) in &declared {
            map.insert(prefix.clone(), ns.clone());
        }
        Arc::new(map)
    };

    let tag = std::str::from_utf8(e.name().as_ref())
        .map_err(|err| Error::xml(uri, err))?
        .to_string();
    let name = resolve_name(uri, &tag, &scope, true)?;

    let mut attributes = Vec::with_capacity(raw_attrs.len());
    for (key, value) in raw_attrs {
        attributes.push(Attribute {
            name: resolve_name(uri, &key, &scope, false)?,
            value,
        });
    }

    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        scope,
        declared,
        offset,
    })
}

/// Element names take the default namespace; unprefixed attributes do not.
fn resolve_name(uri: &str, raw: &str, scope: &Scope, use_default: bool) -> Result<QName> {
    match raw.split_once(':') {
        Some(("xml", local)) => Ok(QName::new(XML_NS, local, Some("xml"))),
        Some((prefix, local)) => {
            let ns = scope
                .get(prefix)
                .ok_or_else(|| Error::xml(uri, format!("unbound prefix '{}'", prefix)))?;
            Ok(QName::new(ns.clone(), local, Some(prefix)))
        }
        None if use_default => {
            let ns = scope.get("").cloned().unwrap_or_default();
            Ok(QName::new(ns, raw, None))
        }
        None => Ok(QName::new("", raw, None)),
    }
}
