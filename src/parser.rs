// Filing parser: staged load of instance, taxonomy, contexts, networks and facts
use crate::cache::TaxonomyCache;
use crate::characteristic::{parse_context, parse_unit};
use crate::filing::Filing;
use crate::linkbase::LinkbaseProcessor;
use crate::model::{Accuracy, Context, Fact, FactFlags};
use crate::namespace::NamespaceRepository;
use crate::path::{resolve_source, Strategy};
use crate::qname::QName;
use crate::repository::{
    ComponentRepository, ContextRepository, ErrorRepository, FactRepository, NetworkRepository,
    ParseError, ParseErrorKind, UnitRepository,
};
use crate::resource::FileRepository;
use crate::schema::{register_namespaces, RemotePolicy, SchemaRepository};
use crate::xml::{sniff_root, Element, XmlDocument, LINK_NS, XBRLI_NS, XSI_NS};
use crate::{Error, Result};
use ahash::AHashSet;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Build networks from linkbases and footnote links.
    pub load_linkbases: bool,
    /// Fetch `http(s)` taxonomy documents through the cache.
    pub follow_remote: bool,
    /// With no cache injected, skip remote documents instead of reporting them.
    pub skip_remote_without_cache: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            load_linkbases: true,
            follow_remote: true,
            skip_remote_without_cache: true,
        }
    }
}

impl ParserConfig {
    fn remote_policy(&self) -> RemotePolicy {
        RemotePolicy {
            follow_remote: self.follow_remote,
            skip_without_cache: self.skip_remote_without_cache,
        }
    }
}

#[derive(Clone, Default)]
pub struct Parser {
    config: ParserConfig,
    cache: Option<Arc<dyn TaxonomyCache>>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn TaxonomyCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_linkbases(mut self, load: bool) -> Self {
        self.config.load_linkbases = load;
        self
    }

    pub fn with_remote(mut self, follow: bool) -> Self {
        self.config.follow_remote = follow;
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Filing> {
        self.parse_path(&path.as_ref().to_string_lossy())
    }

    /// Loads a filing from a file, folder or zip archive path (or `file:` URI).
    ///
    /// Only an unusable path, a missing or unparsable instance and an
    /// unloadable root schema fail the load; everything else is recorded in
    /// [`Filing::errors`].
    pub fn parse_path(&self, location: &str) -> Result<Filing> {
        let start = Instant::now();

        // Resolve
        let source = resolve_source(location)?;
        let strategy = source.strategy();
        let files = FileRepository::new(source, self.cache.clone());
        let instance_uri = find_instance(&files, strategy)?
            .ok_or_else(|| Error::MissingInstance(location.to_string()))?;
        tracing::info!(instance = %instance_uri, ?strategy, "Loading filing");

        // Schema load
        let mut load = Load {
            config: &self.config,
            namespaces: NamespaceRepository::new(),
            schemas: SchemaRepository::new(),
            contexts: ContextRepository::default(),
            units: UnitRepository::default(),
            facts: FactRepository::default(),
            networks: NetworkRepository::default(),
            errors: ErrorRepository::default(),
            invalid_contexts: AHashSet::new(),
            invalid_units: AHashSet::new(),
        };
        let instance = load.schemas.load(&files, &instance_uri)?;
        register_namespaces(&instance, &mut load.namespaces);
        load.load_root_schema(&files, &instance)?;
        load.schemas.discover(
            &files,
            vec![instance_uri.clone()],
            self.config.remote_policy(),
            &mut load.namespaces,
            &mut load.errors,
        );

        load.characteristic_pass(&instance);
        load.network_pass();
        load.fact_pass(&instance);

        // Finalize; the archive handle is released with `files`.
        drop(files);
        let filing = load.finish(instance_uri, strategy);
        tracing::info!(
            facts = filing.facts().len(),
            errors = filing.errors().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Filing loaded"
        );
        Ok(filing)
    }
}

/// First member that looks like an instance document, in sorted order.
fn find_instance(files: &FileRepository, strategy: Strategy) -> Result<Option<Url>> {
    let members = files.members()?;
    Ok(members.into_iter().find(|uri| {
        let path = uri.path().to_ascii_lowercase();
        if strategy != Strategy::SingleFile && !(path.ends_with(".xml") || path.ends_with(".xbrl")) {
            return false;
        }
        match files.read(uri) {
            Ok(bytes) => sniff_root(&bytes).is_some_and(|root| root == QName::new(XBRLI_NS, "xbrl", None)),
            Err(e) => {
                tracing::debug!(uri = %uri, error = %e, "Skipping unreadable member");
                false
            }
        }
    }))
}

struct Load<'a> {
    config: &'a ParserConfig,
    namespaces: NamespaceRepository,
    schemas: SchemaRepository,
    contexts: ContextRepository,
    units: UnitRepository,
    facts: FactRepository,
    networks: NetworkRepository,
    errors: ErrorRepository,
    // ids of <context> and <unit> elements that failed to parse
    invalid_contexts: AHashSet<CompactString>,
    invalid_units: AHashSet<CompactString>,
}

impl Load<'_> {
    fn load_root_schema(&mut self, files: &FileRepository, instance: &XmlDocument) -> Result<()> {
        let schema_ref = instance
            .root
            .children()
            .find(|e| e.is(LINK_NS, "schemaRef"))
            .ok_or_else(|| Error::MissingSchema(format!("{} has no schemaRef", instance.uri)))?;
        let href = schema_ref
            .xlink("href")
            .ok_or_else(|| Error::MissingSchema(format!("schemaRef without href in {}", instance.uri)))?;
        let uri = files
            .resolve(&instance.uri, href)
            .map_err(|e| Error::MissingSchema(format!("{}: {}", href, e)))?;
        self.schemas
            .load(files, &uri)
            .map_err(|e| Error::MissingSchema(format!("{}: {}", uri, e)))?;
        Ok(())
    }

    fn characteristic_pass(&mut self, instance: &XmlDocument) {
        for element in instance.root.children() {
            if element.is(XBRLI_NS, "context") {
                self.context(instance, element);
            } else if element.is(XBRLI_NS, "unit") {
                self.unit(instance, element);
            }
        }
        tracing::debug!(
            contexts = self.contexts.len(),
            units = self.units.len(),
            "Characteristic pass complete"
        );
    }

    fn context(&mut self, instance: &XmlDocument, element: &Element) {
        let Some(id) = element.attr("id") else {
            self.errors.record(
                ParseError::new(ParseErrorKind::Characteristic, "context without id")
                    .at(instance.location(element)),
            );
            return;
        };
        if self.contexts.by_source_id(id).is_some() || self.invalid_contexts.contains(id) {
            self.duplicate_id(instance, element, "context", id);
            return;
        }
        match parse_context(element, &self.namespaces) {
            Ok(parsed) => {
                for warning in &parsed.warnings {
                    self.errors.record(
                        ParseError::from_error(warning)
                            .at(instance.location(element))
                            .related(id),
                    );
                }
                self.contexts.insert(id, Context::new(parsed.characteristics));
            }
            Err(e) => {
                self.errors.record(
                    ParseError::from_error(&e)
                        .at(instance.location(element))
                        .related(id),
                );
                self.invalid_contexts.insert(CompactString::from(id));
            }
        }
    }

    fn unit(&mut self, instance: &XmlDocument, element: &Element) {
        let Some(id) = element.attr("id") else {
            self.errors.record(
                ParseError::new(ParseErrorKind::Characteristic, "unit without id")
                    .at(instance.location(element)),
            );
            return;
        };
        if self.units.by_source_id(id).is_some() || self.invalid_units.contains(id) {
            self.duplicate_id(instance, element, "unit", id);
            return;
        }
        match parse_unit(element, &self.namespaces) {
            Ok(unit) => {
                self.units.insert(id, unit);
            }
            Err(e) => {
                self.errors.record(
                    ParseError::from_error(&e)
                        .at(instance.location(element))
                        .related(id),
                );
                self.invalid_units.insert(CompactString::from(id));
            }
        }
    }

    /// The first definition of an id stays bound; later ones are reported.
    fn duplicate_id(&mut self, instance: &XmlDocument, element: &Element, what: &str, id: &str) {
        self.errors.record(
            ParseError::new(
                ParseErrorKind::Characteristic,
                format!("duplicate {} id '{}', keeping the first definition", what, id),
            )
            .at(instance.location(element))
            .related(id),
        );
    }

    fn network_pass(&mut self) {
        if !self.config.load_linkbases {
            tracing::debug!("Network pass disabled");
            return;
        }
        let mut processor = LinkbaseProcessor::new(&self.schemas, &self.namespaces);
        for doc in self.schemas.get_all_schemas() {
            processor.process_document(doc, &mut self.networks, &mut self.errors);
        }
        processor.finish(&mut self.networks);
    }

    fn fact_pass(&mut self, instance: &XmlDocument) {
        for element in instance.root.children() {
            self.item_or_tuple(instance, element, FactFlags::empty());
        }
        tracing::debug!(facts = self.facts.len(), "Fact pass complete");
    }

    fn item_or_tuple(&mut self, instance: &XmlDocument, element: &Element, inherited: FactFlags) {
        if matches!(element.namespace(), XBRLI_NS | LINK_NS) {
            return;
        }
        if element.attr("contextRef").is_some() {
            if let Some(fact) = self.fact(instance, element, inherited) {
                self.facts.push(fact);
            }
        } else if element.children().next().is_some() {
            for child in element.children() {
                self.item_or_tuple(instance, child, inherited | FactFlags::IN_TUPLE);
            }
        } else {
            tracing::debug!(element = %element.name(), "Ignoring element without contextRef");
        }
    }

    fn fact(&mut self, instance: &XmlDocument, element: &Element, inherited: FactFlags) -> Option<Fact> {
        let location = || instance.location(element);
        let context_ref = element.attr("contextRef").unwrap_or("").trim();
        let Some(context) = self.contexts.by_source_id(context_ref) else {
            let message = if self.invalid_contexts.contains(context_ref) {
                format!("fact {} references invalid context '{}'", element.name(), context_ref)
            } else {
                format!("fact {} references unknown context '{}'", element.name(), context_ref)
            };
            self.errors.record(
                ParseError::new(ParseErrorKind::ReferenceResolution, message)
                    .at(location())
                    .related(context_ref),
            );
            return None;
        };

        let unit = match element.attr("unitRef").map(str::trim) {
            Some(unit_ref) => match self.units.by_source_id(unit_ref) {
                Some(id) => Some(id),
                None => {
                    self.errors.record(
                        ParseError::new(
                            ParseErrorKind::ReferenceResolution,
                            format!("fact {} references unknown unit '{}'", element.name(), unit_ref),
                        )
                        .at(location())
                        .related(unit_ref),
                    );
                    return None;
                }
            },
            None => None,
        };

        let mut flags = inherited;
        let nil = matches!(element.attr_ns(XSI_NS, "nil").map(str::trim), Some("true") | Some("1"));
        if nil {
            flags |= FactFlags::NIL;
        }
        let decimals = self.accuracy(instance, element, "decimals");
        if decimals.is_some() {
            flags |= FactFlags::HAS_DECIMALS;
        }
        let precision = self.accuracy(instance, element, "precision");
        if precision.is_some() {
            flags |= FactFlags::HAS_PRECISION;
        }

        let value = if nil {
            None
        } else {
            Some(fact_value(element, unit.is_some()))
        };

        Some(Fact {
            id: element.attr("id").map(CompactString::from),
            concept: element.name().clone(),
            context,
            unit,
            value,
            decimals,
            precision,
            flags,
        })
    }

    fn accuracy(&mut self, instance: &XmlDocument, element: &Element, name: &str) -> Option<Accuracy> {
        let raw = element.attr(name)?;
        let parsed = Accuracy::parse(raw);
        if parsed.is_none() {
            self.errors.record(
                ParseError::new(
                    ParseErrorKind::Xml,
                    format!("invalid {} '{}' on {}", name, raw, element.name()),
                )
                .at(instance.location(element)),
            );
        }
        parsed
    }

    fn finish(self, instance_uri: Url, strategy: Strategy) -> Filing {
        let components = ComponentRepository::build(&self.networks, &self.schemas.role_definitions());
        Filing {
            instance_uri,
            strategy,
            namespaces: self.namespaces,
            schemas: self.schemas,
            contexts: self.contexts,
            units: self.units,
            facts: self.facts,
            networks: self.networks,
            components,
            errors: self.errors,
        }
    }
}

/// Numeric values are trimmed and fractions become `numerator/denominator`;
/// other values keep their content, markup included.
fn fact_value(element: &Element, numeric: bool) -> String {
    if let (Some(numerator), Some(denominator)) =
        (element.child_ci("numerator"), element.child_ci("denominator"))
    {
        return format!("{}/{}", numerator.trimmed_text(), denominator.trimmed_text());
    }
    if numeric {
        element.trimmed_text()
    } else if element.children().next().is_some() {
        element.inner_xml()
    } else {
        element.text()
    }
}
