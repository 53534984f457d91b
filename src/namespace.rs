// Prefix bindings accumulated across every loaded document
use crate::{qname::QName, xml::Scope, Error, Result};
use ahash::AHashMap;
use compact_str::CompactString;

#[derive(Debug, Default, Clone)]
pub struct NamespaceRepository {
    // last write wins per prefix
    current: AHashMap<CompactString, CompactString>,
    // every distinct (prefix, uri) pair, first-seen order
    bindings: Vec<(CompactString, CompactString)>,
    preferred_prefix: AHashMap<CompactString, CompactString>,
}

impl NamespaceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, prefix: &str, uri: &str) {
        let prefix = CompactString::from(prefix);
        let uri = CompactString::from(uri);
        if !self
            .bindings
            .iter()
            .any(|(p, u)| *p == prefix && *u == uri)
        {
            self.bindings.push((prefix.clone(), uri.clone()));
        }
        if !prefix.is_empty() {
            self.preferred_prefix
                .entry(uri.clone())
                .or_insert_with(|| prefix.clone());
        }
        self.current.insert(prefix, uri);
    }

    pub fn register_scope(&mut self, declarations: &[(CompactString, CompactString)]) {
        for (prefix, uri) in declarations {
            self.register(prefix, uri);
        }
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.current.get(prefix).map(|u| u.as_str())
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.preferred_prefix.get(uri).map(|p| p.as_str())
    }

    pub fn bindings(&self) -> &[(CompactString, CompactString)] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Resolves `prefix:local`, `local` or `{ns}local`.
    ///
    /// The element's own scope wins over the accumulated table; a prefix
    /// redefined in another document never shadows a local declaration.
    pub fn resolve(&self, name: &str, local_scope: Option<&Scope>) -> Result<QName> {
        let name = name.trim();
        if name.starts_with('{') {
            let qname = QName::from_clark(name)
                .ok_or_else(|| Error::Characteristic(format!("malformed Clark name '{}'", name)))?;
            return Ok(match self.prefix_for(qname.namespace()) {
                Some(prefix) => {
                    let prefix = prefix.to_string();
                    qname.with_prefix(&prefix)
                }
                None => qname,
            });
        }

        let (prefix, local) = match name.split_once(':') {
            Some((p, l)) => (p, l),
            None => ("", name),
        };
        if local.is_empty() || local.contains(':') {
            return Err(Error::Characteristic(format!("malformed QName '{}'", name)));
        }

        // An element scope is complete: no default namespace there means none.
        let bound = match local_scope {
            Some(scope) if prefix.is_empty() => scope.get(prefix).map(|u| u.as_str()),
            Some(scope) => scope
                .get(prefix)
                .map(|u| u.as_str())
                .or_else(|| self.namespace(prefix)),
            None => self.namespace(prefix),
        };
        match bound.filter(|ns| !ns.is_empty()) {
            Some(ns) => Ok(QName::new(ns, local, Some(prefix))),
            None if prefix.is_empty() => Ok(QName::new("", local, None)),
            None => Err(Error::Characteristic(format!(
                "unbound prefix '{}' in '{}'",
                prefix, name
            ))),
        }
    }
}
