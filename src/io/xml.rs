//! A small namespace-resolved element tree, built with [`quick_xml::NsReader`].
//!
//! The metadata we need from FluoView XML documents is addressed by short,
//! prefix-qualified paths like `commonframe:imageDefinition/base:width`, so the
//! documents are read into a tree once and queried with a [`NamespaceMap`] that
//! binds the prefixes used in those paths.
use std::str::FromStr;

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::error::{MetadataError, Result};

pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Prefix bindings used to resolve query paths, independent of whatever prefixes
/// the document itself declares.
#[derive(Debug, Clone, Default)]
pub struct NamespaceMap {
    prefixes: IndexMap<String, String>,
}

impl NamespaceMap {
    pub fn new() -> Self {
        let mut this = Self::default();
        this.prefixes.insert("xsi".into(), XSI_NAMESPACE.into());
        this
    }

    pub fn with<P: Into<String>, U: Into<String>>(mut self, prefix: P, uri: U) -> Self {
        self.prefixes.insert(prefix.into(), uri.into());
        self
    }

    /// Split `prefix:local` into a namespace URI and local name. Unprefixed names
    /// resolve to no namespace, unknown prefixes to `None`.
    fn resolve<'a>(&'a self, qualified: &'a str) -> Option<(Option<&'a str>, &'a str)> {
        match qualified.split_once(':') {
            Some((prefix, local)) => self
                .prefixes
                .get(prefix)
                .map(|uri| (Some(uri.as_str()), local)),
            None => Some((None, qualified)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

fn xml_error(source_name: &str, err: impl std::fmt::Display) -> MetadataError {
    MetadataError::malformed(source_name, format!("XML error: {err}"))
}

fn namespace_of(resolved: ResolveResult, source_name: &str) -> Result<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(String::from_utf8_lossy(ns.into_inner()).into_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(MetadataError::malformed(
            source_name,
            format!("unbound namespace prefix {:?}", String::from_utf8_lossy(&prefix)),
        )),
    }
}

fn build_element(
    reader: &NsReader<&[u8]>,
    namespace: Option<String>,
    start: &BytesStart,
    source_name: &str,
) -> Result<XmlElement> {
    let mut element = XmlElement {
        namespace,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| xml_error(source_name, e))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let value = attr
            .unescape_value()
            .map_err(|e| xml_error(source_name, e))?;
        element.attributes.push(XmlAttribute {
            namespace: namespace_of(resolved, source_name)?,
            name: String::from_utf8_lossy(local.as_ref()).into_owned(),
            value: value.into_owned(),
        });
    }
    Ok(element)
}

/// Parse a complete document and return its root element
pub fn parse_document(text: &str, source_name: &str) -> Result<XmlElement> {
    let mut reader = NsReader::from_str(text);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| xml_error(source_name, e))?;
        let namespace = namespace_of(resolved, source_name)?;
        match event {
            Event::Start(start) => {
                let element = build_element(&reader, namespace, &start, source_name)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = build_element(&reader, namespace, &start, source_name)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    xml_error(source_name, "unbalanced end tag")
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    let t = t
                        .unescape()
                        .map_err(|e| xml_error(source_name, e))?;
                    current.text.push_str(&t);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(MetadataError::malformed(
            source_name,
            format!("document ended inside <{}>", stack[stack.len() - 1].name),
        ));
    }
    root.ok_or_else(|| MetadataError::malformed(source_name, "document has no root element"))
}

impl XmlElement {
    /// Whether this element has the qualified name `name`, e.g. `matl:properties`
    pub fn is(&self, name: &str, namespaces: &NamespaceMap) -> bool {
        match namespaces.resolve(name) {
            Some((ns, local)) => self.namespace.as_deref() == ns && self.name == local,
            None => false,
        }
    }

    /// Iterate over the direct children with the qualified name `name`
    pub fn find_all<'a, 'q>(
        &'a self,
        name: &'q str,
        namespaces: &'q NamespaceMap,
    ) -> impl Iterator<Item = &'a XmlElement> + 'q
    where
        'a: 'q,
    {
        self.children.iter().filter(move |c| c.is(name, namespaces))
    }

    /// Find the first element matching a `/`-separated path of qualified names
    pub fn find(&self, path: &str, namespaces: &NamespaceMap) -> Option<&XmlElement> {
        let mut current = self;
        for step in path.split('/') {
            current = current.children.iter().find(|c| c.is(step, namespaces))?;
        }
        Some(current)
    }

    pub fn attribute(&self, name: &str, namespaces: &NamespaceMap) -> Option<&str> {
        let (ns, local) = namespaces.resolve(name)?;
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == ns && a.name == local)
            .map(|a| a.value.as_str())
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    pub fn require(
        &self,
        path: &str,
        namespaces: &NamespaceMap,
        source_name: &str,
    ) -> Result<&XmlElement> {
        self.find(path, namespaces).ok_or_else(|| {
            MetadataError::malformed(source_name, format!("<{}> has no {path}", self.name))
        })
    }

    pub fn require_text(
        &self,
        path: &str,
        namespaces: &NamespaceMap,
        source_name: &str,
    ) -> Result<&str> {
        self.require(path, namespaces, source_name).map(|e| e.text())
    }

    pub fn require_attribute(
        &self,
        name: &str,
        namespaces: &NamespaceMap,
        source_name: &str,
    ) -> Result<&str> {
        self.attribute(name, namespaces).ok_or_else(|| {
            MetadataError::malformed(
                source_name,
                format!("<{}> has no attribute {name}", self.name),
            )
        })
    }

    /// Parse the text of the element at `path` into a `T`
    pub fn require_value<T: FromStr>(
        &self,
        path: &str,
        namespaces: &NamespaceMap,
        source_name: &str,
    ) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let text = self.require_text(path, namespaces, source_name)?;
        text.parse().map_err(|e| {
            MetadataError::malformed(source_name, format!("invalid value {text:?} for {path}: {e}"))
        })
    }
}
