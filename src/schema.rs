// Schema and linkbase document loading for XBRL
use crate::namespace::NamespaceRepository;
use crate::qname::QName;
use crate::repository::{ErrorRepository, ParseError, ParseErrorKind};
use crate::resource::{document_uri, is_remote, FileRepository};
use crate::xml::{Element, XmlDocument, LINK_NS, XBRLI_NS, XLINK_NS, XSD_NS};
use crate::{Error, Result};
use ahash::{AHashMap, AHashSet};
use compact_str::CompactString;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReportElementKind {
    Concept,
    Abstract,
    Hypercube,
    Dimension,
    /// Declared without a substitution group (typed-dimension domains and the like).
    Element,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportElement {
    pub name: QName,
    pub id: Option<CompactString>,
    pub kind: ReportElementKind,
    pub data_type: Option<CompactString>,
    pub substitution_group: Option<CompactString>,
    pub period_type: Option<CompactString>,
    pub balance: Option<CompactString>,
    pub abstract_element: bool,
    pub nillable: bool,
}

/// Which remote documents discovery may fetch.
#[derive(Debug, Clone, Copy)]
pub struct RemotePolicy {
    pub follow_remote: bool,
    pub skip_without_cache: bool,
}

struct LoadedDocument {
    doc: Arc<XmlDocument>,
    // id -> child sequence from the root
    ids: AHashMap<CompactString, Vec<usize>>,
}

/// Every parsed document of the filing, memoized by absolute URI.
#[derive(Default)]
pub struct SchemaRepository {
    documents: Vec<LoadedDocument>,
    index: AHashMap<String, usize>,
    failed: AHashSet<String>,
    report_elements: Vec<ReportElement>,
    by_name: AHashMap<QName, usize>,
    by_id: AHashMap<(String, CompactString), usize>,
    role_types: Vec<(CompactString, Option<String>)>,
    arcrole_types: Vec<CompactString>,
}

impl SchemaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `uri` at most once; later calls return the memoized tree.
    pub fn load(&mut self, files: &FileRepository, uri: &Url) -> Result<Arc<XmlDocument>> {
        let uri = document_uri(uri);
        let key = uri.as_str().to_string();
        if let Some(&i) = self.index.get(&key) {
            return Ok(self.documents[i].doc.clone());
        }
        if self.failed.contains(&key) {
            return Err(Error::ResourceNotFound(key));
        }

        let parsed = files
            .read(&uri)
            .and_then(|bytes| XmlDocument::parse(&uri, &bytes));
        let doc = match parsed {
            Ok(doc) => Arc::new(doc),
            Err(e) => {
                self.failed.insert(key);
                return Err(e);
            }
        };
        tracing::debug!(uri = %uri, root = doc.root.local_name(), "Parsed document");

        if doc.root.is(XSD_NS, "schema") {
            self.index_schema(&doc);
        }
        let ids = index_ids(&doc.root);
        self.index.insert(key, self.documents.len());
        self.documents.push(LoadedDocument {
            doc: doc.clone(),
            ids,
        });
        Ok(doc)
    }

    /// Breadth-first discovery from `seeds`. Each document is visited once,
    /// so circular imports terminate. Failures are recorded, never raised.
    pub fn discover(
        &mut self,
        files: &FileRepository,
        seeds: Vec<Url>,
        policy: RemotePolicy,
        namespaces: &mut NamespaceRepository,
        errors: &mut ErrorRepository,
    ) {
        let mut queue: VecDeque<Url> = seeds.into();
        let mut visited: AHashSet<String> = AHashSet::new();

        while let Some(uri) = queue.pop_front() {
            let uri = document_uri(&uri);
            if !visited.insert(uri.as_str().to_string()) {
                continue;
            }
            if is_remote(&uri)
                && (!policy.follow_remote || (policy.skip_without_cache && !files.has_cache()))
            {
                tracing::debug!(uri = %uri, "Skipping remote document");
                continue;
            }

            let doc = match self.load(files, &uri) {
                Ok(doc) => doc,
                Err(e) => {
                    errors.record(ParseError::from_error(&e).at(uri.as_str()));
                    continue;
                }
            };
            register_namespaces(&doc, namespaces);

            for (href, element) in references(&doc.root) {
                match files.resolve(&doc.uri, href) {
                    Ok(target) => queue.push_back(target),
                    Err(e) => errors.record(
                        ParseError::new(ParseErrorKind::ReferenceResolution, e.to_string())
                            .at(doc.location(element))
                            .related(href),
                    ),
                }
            }
        }
        tracing::info!(documents = self.documents.len(), "Schema discovery complete");
    }

    fn index_schema(&mut self, doc: &XmlDocument) {
        let root = &doc.root;
        let target_ns = root.attr("targetNamespace").unwrap_or("");
        let prefix = root
            .scope()
            .iter()
            .filter(|(p, ns)| !p.is_empty() && ns.as_str() == target_ns)
            .map(|(p, _)| p.as_str())
            .min();

        for element in root.children() {
            if element.is(XSD_NS, "element") {
                if let Some(name) = element.attr("name") {
                    let report_element = parse_report_element(element, target_ns, prefix, name);
                    self.insert_report_element(doc.uri.as_str(), report_element);
                }
            }
        }

        for role_type in root
            .descendants()
            .filter(|e| e.is(LINK_NS, "roleType"))
        {
            if let Some(uri) = role_type.attr("roleURI") {
                let definition = role_type
                    .child(LINK_NS, "definition")
                    .map(|d| d.trimmed_text());
                if !self.role_types.iter().any(|(r, _)| *r == uri) {
                    self.role_types.push((CompactString::from(uri), definition));
                }
            }
        }
        for arcrole_type in root
            .descendants()
            .filter(|e| e.is(LINK_NS, "arcroleType"))
        {
            if let Some(uri) = arcrole_type.attr("arcroleURI") {
                if !self.arcrole_types.iter().any(|a| *a == uri) {
                    self.arcrole_types.push(CompactString::from(uri));
                }
            }
        }
    }

    fn insert_report_element(&mut self, doc_uri: &str, element: ReportElement) {
        let slot = match self.by_name.get(&element.name) {
            Some(&slot) => slot,
            None => {
                self.report_elements.push(element.clone());
                self.by_name
                    .insert(element.name.clone(), self.report_elements.len() - 1);
                self.report_elements.len() - 1
            }
        };
        if let Some(id) = &element.id {
            self.by_id.insert((doc_uri.to_string(), id.clone()), slot);
        }
    }

    pub fn get_schema(&self, uri: &Url) -> Option<&Arc<XmlDocument>> {
        self.index
            .get(document_uri(uri).as_str())
            .map(|&i| &self.documents[i].doc)
    }

    pub fn get_all_schemas(&self) -> impl Iterator<Item = &Arc<XmlDocument>> {
        self.documents.iter().map(|d| &d.doc)
    }

    pub fn get_schema_names(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.doc.uri.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn report_elements(&self) -> &[ReportElement] {
        &self.report_elements
    }

    pub fn report_element(&self, name: &QName) -> Option<&ReportElement> {
        self.by_name.get(name).map(|&i| &self.report_elements[i])
    }

    pub fn report_element_by_id(&self, doc_uri: &Url, id: &str) -> Option<&ReportElement> {
        self.by_id
            .get(&(document_uri(doc_uri).as_str().to_string(), CompactString::from(id)))
            .map(|&i| &self.report_elements[i])
    }

    pub fn role_types(&self) -> &[(CompactString, Option<String>)] {
        &self.role_types
    }

    pub fn role_definitions(&self) -> AHashMap<CompactString, String> {
        self.role_types
            .iter()
            .filter_map(|(uri, def)| def.clone().map(|d| (uri.clone(), d)))
            .collect()
    }

    pub fn arcrole_types(&self) -> &[CompactString] {
        &self.arcrole_types
    }

    /// The document and element an href with an XPointer fragment points at.
    pub fn element_at(&self, uri: &Url) -> Option<(&Arc<XmlDocument>, &Element)> {
        let &i = self.index.get(document_uri(uri).as_str())?;
        let loaded = &self.documents[i];
        let fragment = uri.fragment()?;
        let element = match parse_pointer(fragment)? {
            Pointer::Id(id, steps) => {
                let path = loaded.ids.get(id)?;
                loaded.doc.root.child_sequence(path)?.child_sequence(&steps)?
            }
            Pointer::Root(steps) => {
                // the first step addresses the document element itself
                let (first, rest) = steps.split_first()?;
                if *first != 1 {
                    return None;
                }
                loaded.doc.root.child_sequence(rest)?
            }
        };
        Some((&loaded.doc, element))
    }
}

fn parse_report_element(
    element: &Element,
    target_ns: &str,
    prefix: Option<&str>,
    name: &str,
) -> ReportElement {
    let substitution_group = element.attr("substitutionGroup").map(CompactString::from);
    let abstract_element = matches!(element.attr("abstract"), Some("true") | Some("1"));
    let group_local = substitution_group
        .as_deref()
        .map(|g| g.rsplit(':').next().unwrap_or(g));
    let kind = match group_local {
        Some("hypercubeItem") => ReportElementKind::Hypercube,
        Some("dimensionItem") => ReportElementKind::Dimension,
        Some(_) if abstract_element => ReportElementKind::Abstract,
        Some(_) => ReportElementKind::Concept,
        None => ReportElementKind::Element,
    };

    ReportElement {
        name: QName::new(target_ns, name, prefix),
        id: element.attr("id").map(CompactString::from),
        kind,
        data_type: element.attr("type").map(CompactString::from),
        substitution_group,
        period_type: element
            .attr_ns(XBRLI_NS, "periodType")
            .map(CompactString::from),
        balance: element.attr_ns(XBRLI_NS, "balance").map(CompactString::from),
        abstract_element,
        nillable: matches!(element.attr("nillable"), Some("true") | Some("1")),
    }
}

/// Registers every namespace declaration in the document.
pub fn register_namespaces(doc: &XmlDocument, namespaces: &mut NamespaceRepository) {
    for element in doc.root.descendants() {
        namespaces.register_scope(element.declarations());
    }
}

/// DTS references made by a document: imports, includes, schema and linkbase
/// refs, role/arcrole refs and locator targets.
fn references(root: &Element) -> Vec<(&str, &Element)> {
    let mut refs = Vec::new();
    for element in root.descendants() {
        let href = if element.local_name_eq_ci("import") || element.local_name_eq_ci("include") {
            if element.namespace() == XSD_NS {
                element.attr("schemaLocation")
            } else {
                None
            }
        } else if element.local_name_eq_ci("schemaRef")
            || element.local_name_eq_ci("linkbaseRef")
            || element.local_name_eq_ci("roleRef")
            || element.local_name_eq_ci("arcroleRef")
            || element.attr_ns(XLINK_NS, "type") == Some("locator")
        {
            element.xlink("href")
        } else {
            None
        };
        if let Some(href) = href {
            let doc_part = href.split('#').next().unwrap_or("");
            if !doc_part.trim().is_empty() {
                refs.push((href, element));
            }
        }
    }
    refs
}

fn index_ids(root: &Element) -> AHashMap<CompactString, Vec<usize>> {
    fn walk(element: &Element, path: &mut Vec<usize>, out: &mut AHashMap<CompactString, Vec<usize>>) {
        if let Some(id) = element.attr("id") {
            out.entry(CompactString::from(id))
                .or_insert_with(|| path.clone());
        }
        for (i, child) in element.children().enumerate() {
            path.push(i + 1);
            walk(child, path, out);
            path.pop();
        }
    }
    let mut out = AHashMap::new();
    walk(root, &mut Vec::new(), &mut out);
    out
}

#[derive(Debug, PartialEq)]
enum Pointer<'a> {
    Id(&'a str, Vec<usize>),
    Root(Vec<usize>),
}

/// Shorthand ids, `element(id)`, `element(id/2/3)`, `element(/1/2)` and
/// `xpointer(id('x'))`.
fn parse_pointer(fragment: &str) -> Option<Pointer<'_>> {
    let fragment = fragment.trim();
    if let Some(inner) = fragment
        .strip_prefix("element(")
        .and_then(|f| f.split_once(')').map(|(inner, _)| inner))
    {
        let mut parts = inner.split('/');
        let head = parts.next()?;
        let steps = parts
            .map(|s| s.parse::<usize>().ok())
            .collect::<Option<Vec<_>>>()?;
        return if head.is_empty() {
            Some(Pointer::Root(steps))
        } else {
            Some(Pointer::Id(head, steps))
        };
    }
    if let Some(inner) = fragment
        .strip_prefix("xpointer(id(")
        .and_then(|f| f.strip_suffix("))"))
    {
        let id = inner.trim_matches(|c| c == '\'' || c == '"');
        return (!id.is_empty()).then_some(Pointer::Id(id, Vec::new()));
    }
    (!fragment.is_empty() && !fragment.contains('(')).then_some(Pointer::Id(fragment, Vec::new()))
}
