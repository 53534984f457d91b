// Linkbase processing for XBRL: extended links -> networks and resources
use crate::model::{LinkKind, Network, NetworkId, NetworkNode, NodeId, Relationship, Resource, ResourceContent};
use crate::namespace::NamespaceRepository;
use crate::qname::QName;
use crate::repository::{ErrorRepository, NetworkRepository, ParseError, ParseErrorKind};
use crate::schema::SchemaRepository;
use crate::xml::{Element, XmlDocument, XBRLDT_NS, XBRLI_NS, XML_NS, XSD_NS};
use crate::{Error, Result};
use ahash::{AHashMap, AHashSet};
use compact_str::CompactString;

pub const STANDARD_LINK_ROLE: &str = "http://www.xbrl.org/2003/role/link";
pub const STANDARD_LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/label";
pub const CONCEPT_LABEL_ARCROLE: &str = "http://www.xbrl.org/2003/arcrole/concept-label";
pub const FACT_FOOTNOTE_ARCROLE: &str = "http://www.xbrl.org/2003/arcrole/fact-footnote";

/// What a locator or resource stands for inside one extended link.
#[derive(Debug, Clone)]
enum Endpoint {
    Element(QName),
    Resource { key: String, resource: Resource },
    Fact(CompactString),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeKey {
    Element(QName),
    Resource(String),
    Fact(CompactString),
}

impl Endpoint {
    fn key(&self) -> NodeKey {
        match self {
            Endpoint::Element(q) => NodeKey::Element(q.clone()),
            Endpoint::Resource { key, .. } => NodeKey::Resource(key.clone()),
            Endpoint::Fact(id) => NodeKey::Fact(id.clone()),
        }
    }

    fn to_node(&self) -> NetworkNode {
        match self {
            Endpoint::Element(q) => NetworkNode::ReportElement(q.clone()),
            Endpoint::Resource { resource, .. } => NetworkNode::Resource(resource.clone()),
            Endpoint::Fact(id) => NetworkNode::Fact(id.clone()),
        }
    }
}

#[derive(Debug)]
struct Prohibition {
    network: NetworkId,
    from: NodeId,
    to: NodeId,
    priority: i32,
}

struct ArcAttributes {
    order: f64,
    weight: Option<f64>,
    priority: i32,
    prohibited: bool,
    preferred_label: Option<CompactString>,
    target_role: Option<CompactString>,
}

impl ArcAttributes {
    fn parse(arc: &Element) -> std::result::Result<Self, String> {
        fn number<T: std::str::FromStr>(arc: &Element, name: &str) -> std::result::Result<Option<T>, String> {
            match arc.attr(name) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| format!("invalid {} '{}'", name, raw)),
                None => Ok(None),
            }
        }

        Ok(Self {
            order: number(arc, "order")?.unwrap_or(1.0),
            weight: number(arc, "weight")?,
            priority: number(arc, "priority")?.unwrap_or(0),
            prohibited: arc.attr("use") == Some("prohibited"),
            preferred_label: arc.attr("preferredLabel").map(CompactString::from),
            target_role: arc.attr_ns(XBRLDT_NS, "targetRole").map(CompactString::from),
        })
    }
}

/// Builds networks from every extended link in the loaded documents.
/// Extended links sharing (kind, role, arcrole) merge into one network.
pub struct LinkbaseProcessor<'a> {
    schemas: &'a SchemaRepository,
    namespaces: &'a NamespaceRepository,
    nodes: AHashMap<(NetworkId, NodeKey), NodeId>,
    prohibitions: Vec<Prohibition>,
    links: usize,
    arcs: usize,
}

impl<'a> LinkbaseProcessor<'a> {
    pub fn new(schemas: &'a SchemaRepository, namespaces: &'a NamespaceRepository) -> Self {
        Self {
            schemas,
            namespaces,
            nodes: AHashMap::new(),
            prohibitions: Vec::new(),
            links: 0,
            arcs: 0,
        }
    }

    /// Walks linkbase roots, linkbases embedded in schema appinfo and instance
    /// footnote links alike: anything typed `xlink:type="extended"`.
    pub fn process_document(
        &mut self,
        doc: &XmlDocument,
        networks: &mut NetworkRepository,
        errors: &mut ErrorRepository,
    ) {
        for link in doc.root.descendants() {
            if link.xlink("type") == Some("extended") {
                self.process_extended_link(doc, link, networks, errors);
            }
        }
    }

    fn process_extended_link(
        &mut self,
        doc: &XmlDocument,
        link: &Element,
        networks: &mut NetworkRepository,
        errors: &mut ErrorRepository,
    ) {
        self.links += 1;
        let kind = LinkKind::from_link_name(link.local_name());
        let role = link.xlink("role").unwrap_or(STANDARD_LINK_ROLE);

        let mut endpoints: AHashMap<&str, Vec<Endpoint>> = AHashMap::new();
        let mut labels: AHashSet<&str> = AHashSet::new();

        for child in link.children() {
            let xlink_type = child.xlink("type");
            if xlink_type != Some("locator") && xlink_type != Some("resource") {
                continue;
            }
            let Some(label) = child.xlink("label") else {
                errors.record(
                    ParseError::new(ParseErrorKind::NetworkResolution, "missing xlink:label")
                        .at(doc.location(child)),
                );
                continue;
            };
            labels.insert(label);

            if xlink_type == Some("locator") {
                match self.resolve_locator(doc, child) {
                    Ok(endpoint) => endpoints.entry(label).or_default().push(endpoint),
                    Err(e) => errors.record(
                        ParseError::from_error(&e)
                            .at(doc.location(child))
                            .related(child.xlink("href").unwrap_or("")),
                    ),
                }
            } else if let Some(resource) = parse_resource(child) {
                endpoints.entry(label).or_default().push(Endpoint::Resource {
                    key: doc.location(child),
                    resource,
                });
            } else {
                tracing::debug!(element = %child.name(), "Skipping unsupported resource");
            }
        }

        for arc in link.children().filter(|c| c.xlink("type") == Some("arc")) {
            let location = || doc.location(arc);
            let (Some(from), Some(to), Some(arcrole)) =
                (arc.xlink("from"), arc.xlink("to"), arc.xlink("arcrole"))
            else {
                errors.record(
                    ParseError::new(
                        ParseErrorKind::NetworkResolution,
                        "arc needs xlink:from, xlink:to and xlink:arcrole",
                    )
                    .at(location()),
                );
                continue;
            };

            let attributes = match ArcAttributes::parse(arc) {
                Ok(a) => a,
                Err(message) => {
                    errors.record(ParseError::new(ParseErrorKind::Xml, message).at(location()));
                    continue;
                }
            };

            // Labels whose locators failed were already reported.
            for label in [from, to] {
                if !labels.contains(label) {
                    errors.record(
                        ParseError::new(
                            ParseErrorKind::NetworkResolution,
                            format!("arc references undefined label '{}'", label),
                        )
                        .at(location()),
                    );
                }
            }
            let (Some(sources), Some(targets)) = (endpoints.get(from), endpoints.get(to)) else {
                continue;
            };

            let network = networks.get_or_create(&kind, role, arcrole);
            for source in sources {
                for target in targets {
                    let (Some(from), Some(to)) = (
                        self.intern(networks, network, source),
                        self.intern(networks, network, target),
                    ) else {
                        continue;
                    };
                    if attributes.prohibited {
                        self.prohibitions.push(Prohibition {
                            network,
                            from,
                            to,
                            priority: attributes.priority,
                        });
                    } else if let Some(n) = networks.get_mut(network) {
                        n.push_relationship(Relationship {
                            from,
                            to,
                            order: attributes.order,
                            weight: attributes.weight,
                            priority: attributes.priority,
                            preferred_label: attributes.preferred_label.clone(),
                            target_role: attributes.target_role.clone(),
                        });
                        self.arcs += 1;
                    }
                }
            }
        }
    }

    fn intern(&mut self, networks: &mut NetworkRepository, network: NetworkId, endpoint: &Endpoint) -> Option<NodeId> {
        let key = (network, endpoint.key());
        if let Some(id) = self.nodes.get(&key) {
            return Some(*id);
        }
        let id = networks.get_mut(network)?.push_node(endpoint.to_node());
        self.nodes.insert(key, id);
        Some(id)
    }

    fn resolve_locator(&self, doc: &XmlDocument, locator: &Element) -> Result<Endpoint> {
        let href = locator
            .xlink("href")
            .ok_or_else(|| Error::NetworkResolution("locator without xlink:href".to_string()))?;
        let target = doc.uri.join(href.trim())?;

        if let Some((target_doc, element)) = self.schemas.element_at(&target) {
            return self.classify(target_doc, element).ok_or_else(|| {
                Error::NetworkResolution(format!(
                    "{} is not a report element, resource or fact",
                    target
                ))
            });
        }

        // Unloaded taxonomy documents (remote ones skipped without a cache):
        // fall back to the `prefix_localName` id convention.
        if self.schemas.get_schema(&target).is_none() {
            if let Some(qname) = target.fragment().and_then(|id| self.guess_from_id(id)) {
                return Ok(Endpoint::Element(qname));
            }
        }
        Err(Error::NetworkResolution(format!(
            "unresolved locator target {}",
            target
        )))
    }

    fn classify(&self, doc: &XmlDocument, element: &Element) -> Option<Endpoint> {
        if element.is(XSD_NS, "element") {
            if let Some(found) = element
                .attr("id")
                .and_then(|id| self.schemas.report_element_by_id(&doc.uri, id))
            {
                return Some(Endpoint::Element(found.name.clone()));
            }
            let namespace = doc.root.attr("targetNamespace").unwrap_or("");
            return element
                .attr("name")
                .map(|name| Endpoint::Element(QName::new(namespace, name, None)));
        }
        if element.xlink("type") == Some("resource") {
            return parse_resource(element).map(|resource| Endpoint::Resource {
                key: doc.location(element),
                resource,
            });
        }
        if doc.root.is(XBRLI_NS, "xbrl") && !std::ptr::eq(element, &doc.root) {
            return element.attr("id").map(|id| Endpoint::Fact(CompactString::from(id)));
        }
        None
    }

    fn guess_from_id(&self, id: &str) -> Option<QName> {
        if id.contains('(') {
            return None;
        }
        let (prefix, local) = id.split_once('_')?;
        let namespace = self.namespaces.namespace(prefix)?;
        Some(QName::new(namespace, local, Some(prefix)))
    }

    /// Applies prohibitions across all processed documents and builds the
    /// child indexes. Must run once, after the last document.
    pub fn finish(self, networks: &mut NetworkRepository) {
        for p in &self.prohibitions {
            if let Some(network) = networks.get_mut(p.network) {
                network.retain_relationships(|r| {
                    !(r.from == p.from && r.to == p.to && r.priority <= p.priority)
                });
            }
        }
        for network in networks.iter_mut() {
            network.index();
        }
        tracing::info!(
            links = self.links,
            relationships = self.arcs,
            prohibitions = self.prohibitions.len(),
            networks = networks.len(),
            "Network pass complete"
        );
    }
}

/// Label, reference and footnote resources. Other resource types yield `None`.
pub fn parse_resource(element: &Element) -> Option<Resource> {
    let label = CompactString::from(element.xlink("label").unwrap_or(""));
    let role = element.xlink("role").map(CompactString::from);
    let title = element.xlink("title").map(str::to_string);
    let lang = element.attr_ns(XML_NS, "lang").map(CompactString::from);

    if element.local_name_eq_ci("label") {
        Some(Resource::Label {
            label,
            role,
            lang,
            title,
            text: element.trimmed_text(),
        })
    } else if element.local_name_eq_ci("footnote") {
        Some(Resource::Footnote {
            label,
            role,
            lang,
            title,
            text: element.trimmed_text(),
        })
    } else if element.local_name_eq_ci("reference") {
        let parts = element
            .children()
            .map(|part| (CompactString::from(part.local_name()), part.trimmed_text()))
            .collect();
        Some(Resource::Reference {
            label,
            role,
            title,
            parts,
        })
    } else {
        None
    }
}

fn resources_from(network: &Network, node: NodeId) -> impl Iterator<Item = &Resource> {
    network
        .children(node)
        .filter_map(move |rel| match network.node(rel.to) {
            Some(NetworkNode::Resource(r)) => Some(r),
            _ => None,
        })
}

/// Every label resource attached to `concept`, in network then arc order.
pub fn concept_labels<'a>(networks: &'a NetworkRepository, concept: &QName) -> Vec<&'a Resource> {
    networks
        .of_kind(&LinkKind::Label)
        .filter(|n| n.arcrole() == CONCEPT_LABEL_ARCROLE)
        .filter_map(|n| n.find_element(concept).map(|id| (n, id)))
        .flat_map(|(n, id)| resources_from(n, id))
        .filter(|r| matches!(r, Resource::Label { .. }))
        .collect()
}

/// Footnotes attached to the fact with `fact_id`.
pub fn fact_footnotes<'a>(networks: &'a NetworkRepository, fact_id: &str) -> Vec<&'a Resource> {
    networks
        .of_kind(&LinkKind::Footnote)
        .filter(|n| n.arcrole() == FACT_FOOTNOTE_ARCROLE)
        .filter_map(|n| {
            n.nodes()
                .iter()
                .position(|node| matches!(node, NetworkNode::Fact(id) if *id == fact_id))
                .map(|i| (n, NodeId(i as u32)))
        })
        .flat_map(|(n, id)| resources_from(n, id))
        .filter(|r| matches!(r, Resource::Footnote { .. }))
        .collect()
}

/// Picks a label: exact role and language, then any role in that language,
/// then the first one. A missing role means the standard label role.
pub fn select_label<'a>(labels: &[&'a Resource], role: Option<&str>, lang: Option<&str>) -> Option<&'a str> {
    let role = role.unwrap_or(STANDARD_LABEL_ROLE);
    let lang_matches = |r: &Resource| match lang {
        Some(lang) => r.lang().is_some_and(|l| l.eq_ignore_ascii_case(lang)),
        None => true,
    };

    labels
        .iter()
        .copied()
        .find(|l| l.role().unwrap_or(STANDARD_LABEL_ROLE) == role && lang_matches(l))
        .or_else(|| labels.iter().copied().find(|l| lang_matches(l)))
        .or_else(|| labels.first().copied())
        .and_then(|r| match r.content() {
            ResourceContent::Text(text) => Some(text),
            ResourceContent::Parts(_) => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::resolve_source;
    use crate::resource::FileRepository;
    use crate::schema::RemotePolicy;
    use url::Url;

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
    xmlns:xbrli="http://www.xbrl.org/2003/instance" xmlns:ex="urn:ex" targetNamespace="urn:ex">
  <xs:element id="ex_Assets" name="Assets" substitutionGroup="xbrli:item" xbrli:periodType="instant"/>
  <xs:element id="ex_Cash" name="Cash" substitutionGroup="xbrli:item" xbrli:periodType="instant"/>
  <xs:element id="ex_Receivables" name="Receivables" substitutionGroup="xbrli:item" xbrli:periodType="instant"/>
  <xs:element id="ex_Inventory" name="Inventory" substitutionGroup="xbrli:item" xbrli:periodType="instant"/>
</xs:schema>"#;

    const LINKBASE: &str = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:presentationLink xlink:type="extended" xlink:role="http://ex/role/bs">
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Assets" xlink:label="assets"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#element(/1/2)" xlink:label="cash"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#element(ex_Receivables)" xlink:label="recv"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Inventory" xlink:label="inv"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Missing" xlink:label="missing"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child" xlink:from="assets" xlink:to="inv"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child" xlink:from="assets" xlink:to="cash"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child" xlink:from="assets" xlink:to="recv" order="0.5"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child" xlink:from="assets" xlink:to="missing"/>
  </link:presentationLink>
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Assets" xlink:label="assets"/>
    <link:label xlink:type="resource" xlink:label="lab" xml:lang="en">Assets</link:label>
    <link:label xlink:type="resource" xlink:label="lab" xml:lang="en" xlink:role="http://www.xbrl.org/2003/role/terseLabel">Total</link:label>
    <link:label xlink:type="resource" xlink:label="lab" xml:lang="de">Vermoegen</link:label>
    <link:labelArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/concept-label" xlink:from="assets" xlink:to="lab"/>
  </link:labelLink>
  <link:calculationLink xlink:type="extended" xlink:role="http://ex/role/bs">
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Assets" xlink:label="assets"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Cash" xlink:label="cash"/>
    <link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item" xlink:from="assets" xlink:to="cash" weight="1.0"/>
    <link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item" xlink:from="assets" xlink:to="cash" use="prohibited" priority="1"/>
  </link:calculationLink>
</link:linkbase>"#;

    fn load() -> (SchemaRepository, NamespaceRepository, NetworkRepository, ErrorRepository) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ex.xsd"), SCHEMA).unwrap();
        std::fs::write(dir.path().join("ex_pre.xml"), LINKBASE).unwrap();
        let files = FileRepository::new(resolve_source(dir.path().to_str().unwrap()).unwrap(), None);
        let base = Url::from_directory_path(std::fs::canonicalize(dir.path()).unwrap()).unwrap();

        let mut schemas = SchemaRepository::new();
        let mut namespaces = NamespaceRepository::new();
        let mut errors = ErrorRepository::default();
        let policy = RemotePolicy {
            follow_remote: true,
            skip_without_cache: true,
        };
        schemas.discover(
            &files,
            vec![base.join("ex_pre.xml").unwrap()],
            policy,
            &mut namespaces,
            &mut errors,
        );

        let mut networks = NetworkRepository::default();
        let mut processor = LinkbaseProcessor::new(&schemas, &namespaces);
        for doc in schemas.get_all_schemas() {
            processor.process_document(doc, &mut networks, &mut errors);
        }
        processor.finish(&mut networks);
        (schemas, namespaces, networks, errors)
    }

    fn ex(local: &str) -> QName {
        QName::new("urn:ex", local, None)
    }

    #[test]
    fn builds_ordered_presentation_network() {
        let (_, _, networks, errors) = load();
        let network = networks
            .find(
                &LinkKind::Presentation,
                "http://ex/role/bs",
                "http://www.xbrl.org/2003/arcrole/parent-child",
            )
            .unwrap();

        let root = network.find_element(&ex("Assets")).unwrap();
        assert_eq!(network.roots(), vec![root]);
        let children: Vec<&NetworkNode> = network
            .children(root)
            .map(|r| network.node(r.to).unwrap())
            .collect();
        assert_eq!(
            children,
            vec![
                &NetworkNode::ReportElement(ex("Receivables")),
                &NetworkNode::ReportElement(ex("Inventory")),
                &NetworkNode::ReportElement(ex("Cash")),
            ]
        );

        // the dangling locator is reported once and its arc dropped
        let dangling: Vec<_> = errors.of_kind(ParseErrorKind::NetworkResolution).collect();
        assert_eq!(dangling.len(), 1);
        assert_eq!(network.relationships().len(), 3);
    }

    #[test]
    fn prohibited_arc_removes_relationship() {
        let (_, _, networks, _) = load();
        let calc = networks
            .find(
                &LinkKind::Calculation,
                "http://ex/role/bs",
                "http://www.xbrl.org/2003/arcrole/summation-item",
            )
            .unwrap();
        assert!(calc.relationships().is_empty());
    }

    #[test]
    fn label_fallbacks() {
        let (_, _, networks, _) = load();
        let labels = concept_labels(&networks, &ex("Assets"));
        assert_eq!(labels.len(), 3);
        assert_eq!(select_label(&labels, None, Some("en")), Some("Assets"));
        assert_eq!(
            select_label(&labels, Some("http://www.xbrl.org/2003/role/terseLabel"), Some("en")),
            Some("Total")
        );
        assert_eq!(
            select_label(&labels, Some("http://www.xbrl.org/2003/role/terseLabel"), Some("de")),
            Some("Vermoegen")
        );
        assert_eq!(select_label(&labels, None, Some("fr")), Some("Assets"));
        assert!(concept_labels(&networks, &ex("Cash")).is_empty());
    }

    #[test]
    fn remote_locators_fall_back_to_id_convention() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("lab.xml"),
            r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink" xmlns:us-gaap="http://fasb.org/us-gaap/2023">
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="https://xbrl.fasb.org/us-gaap-2023.xsd#us-gaap_Assets" xlink:label="a"/>
    <link:label xlink:type="resource" xlink:label="l" xml:lang="en">Assets</link:label>
    <link:labelArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/concept-label" xlink:from="a" xlink:to="l"/>
  </link:labelLink>
</link:linkbase>"#,
        )
        .unwrap();
        let files = FileRepository::new(resolve_source(dir.path().to_str().unwrap()).unwrap(), None);
        let uri = Url::from_file_path(std::fs::canonicalize(dir.path().join("lab.xml")).unwrap()).unwrap();

        let mut schemas = SchemaRepository::new();
        let mut namespaces = NamespaceRepository::new();
        let mut errors = ErrorRepository::default();
        schemas.discover(
            &files,
            vec![uri],
            RemotePolicy {
                follow_remote: true,
                skip_without_cache: true,
            },
            &mut namespaces,
            &mut errors,
        );
        assert!(errors.is_empty());

        let mut networks = NetworkRepository::default();
        let mut processor = LinkbaseProcessor::new(&schemas, &namespaces);
        for doc in schemas.get_all_schemas() {
            processor.process_document(doc, &mut networks, &mut errors);
        }
        processor.finish(&mut networks);

        let assets = QName::new("http://fasb.org/us-gaap/2023", "Assets", None);
        let labels = concept_labels(&networks, &assets);
        assert_eq!(select_label(&labels, None, None), Some("Assets"));
    }
}
