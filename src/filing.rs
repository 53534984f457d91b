// The loaded filing: read-only view over every repository
use crate::linkbase::{concept_labels, fact_footnotes, select_label};
use crate::model::*;
use crate::namespace::NamespaceRepository;
use crate::path::Strategy;
use crate::qname::QName;
use crate::repository::{
    ComponentRepository, ContextRepository, ErrorRepository, FactRepository, NetworkRepository,
    UnitRepository,
};
use crate::schema::{ReportElement, SchemaRepository};
use url::Url;

/// One instance document resolved together with its taxonomy. Immutable once
/// returned by [`crate::Parser::parse_path`].
pub struct Filing {
    pub(crate) instance_uri: Url,
    pub(crate) strategy: Strategy,
    pub(crate) namespaces: NamespaceRepository,
    pub(crate) schemas: SchemaRepository,
    pub(crate) contexts: ContextRepository,
    pub(crate) units: UnitRepository,
    pub(crate) facts: FactRepository,
    pub(crate) networks: NetworkRepository,
    pub(crate) components: ComponentRepository,
    pub(crate) errors: ErrorRepository,
}

impl Filing {
    pub fn instance_uri(&self) -> &Url {
        &self.instance_uri
    }

    /// How the filing was packaged.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    // Facts

    /// Facts in instance document order.
    pub fn facts(&self) -> &[Fact] {
        self.facts.as_slice()
    }

    pub fn fact_by_id(&self, id: &str) -> Option<&Fact> {
        self.facts.by_id(id)
    }

    pub fn facts_by_concept<'a>(&'a self, concept: &'a QName) -> impl Iterator<Item = &'a Fact> + 'a {
        self.facts.by_concept(concept)
    }

    /// The full aspect set of a fact: its concept, its context's
    /// characteristics and its unit, ordered by aspect.
    pub fn fact_characteristics(&self, fact: &Fact) -> Vec<Characteristic> {
        let mut all = vec![Characteristic::Concept(fact.concept.clone())];
        if let Some(context) = self.contexts.get(fact.context) {
            all.extend(context.characteristics().iter().cloned());
        }
        if let Some(unit) = fact.unit.and_then(|id| self.units.get(id)) {
            all.push(Characteristic::Unit(unit.clone()));
        }
        Context::new(all).characteristics().to_vec()
    }

    /// Facts carrying exactly this characteristic.
    pub fn facts_with(&self, characteristic: &Characteristic) -> Vec<&Fact> {
        self.facts
            .iter()
            .filter(|fact| match characteristic {
                Characteristic::Concept(concept) => fact.concept == *concept,
                Characteristic::Unit(unit) => {
                    fact.unit.and_then(|id| self.units.get(id)) == Some(unit)
                }
                other => self
                    .contexts
                    .get(fact.context)
                    .and_then(|c| c.get(&other.aspect()))
                    == Some(other),
            })
            .collect()
    }

    pub fn footnotes(&self, fact: &Fact) -> Vec<&Resource> {
        match &fact.id {
            Some(id) => fact_footnotes(&self.networks, id),
            None => Vec::new(),
        }
    }

    // Contexts and units

    pub fn contexts(&self) -> impl Iterator<Item = (ContextId, &Context)> {
        self.contexts.iter()
    }

    pub fn context(&self, id: ContextId) -> Option<&Context> {
        self.contexts.get(id)
    }

    /// The context a source `<context id>` collapsed into.
    pub fn context_by_source_id(&self, source_id: &str) -> Option<ContextId> {
        self.contexts.by_source_id(source_id)
    }

    pub fn contexts_with_aspect(&self, aspect: &Aspect) -> Vec<(ContextId, &Context)> {
        self.contexts
            .iter()
            .filter(|(_, c)| c.has_aspect(aspect))
            .collect()
    }

    /// Distinct values taken along one aspect, in first-seen order.
    pub fn characteristics(&self, aspect: &Aspect) -> Vec<Characteristic> {
        let mut seen: Vec<Characteristic> = Vec::new();
        let mut push = |c: Characteristic| {
            if !seen.contains(&c) {
                seen.push(c);
            }
        };
        match aspect {
            Aspect::Concept => self
                .facts
                .iter()
                .for_each(|f| push(Characteristic::Concept(f.concept.clone()))),
            Aspect::Unit => self
                .units
                .iter()
                .for_each(|(_, u)| push(Characteristic::Unit(u.clone()))),
            _ => self
                .contexts
                .iter()
                .filter_map(|(_, c)| c.get(aspect))
                .for_each(|c| push(c.clone())),
        }
        seen
    }

    pub fn units(&self) -> impl Iterator<Item = (UnitId, &Unit)> {
        self.units.iter()
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id)
    }

    // Networks and components

    pub fn networks(&self) -> impl Iterator<Item = (NetworkId, &Network)> {
        self.networks.iter()
    }

    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.networks.get(id)
    }

    pub fn find_network(&self, kind: &LinkKind, role: &str, arcrole: &str) -> Option<&Network> {
        self.networks.find(kind, role, arcrole)
    }

    pub fn components(&self) -> std::slice::Iter<'_, Component> {
        self.components.iter()
    }

    pub fn component(&self, role: &str) -> Option<&Component> {
        self.components.get(role)
    }

    /// Label text for a concept. Falls back to any role in `lang`, then to any label.
    pub fn label(&self, concept: &QName, role: Option<&str>, lang: Option<&str>) -> Option<&str> {
        select_label(&concept_labels(&self.networks, concept), role, lang)
    }

    // Taxonomy

    pub fn report_elements(&self) -> &[ReportElement] {
        self.schemas.report_elements()
    }

    pub fn report_element(&self, name: &QName) -> Option<&ReportElement> {
        self.schemas.report_element(name)
    }

    pub fn namespaces(&self) -> &NamespaceRepository {
        &self.namespaces
    }

    pub fn schemas(&self) -> &SchemaRepository {
        &self.schemas
    }

    // Diagnostics

    pub fn errors(&self) -> &ErrorRepository {
        &self.errors
    }

    pub fn stats(&self) -> FilingStats {
        FilingStats {
            documents: self.schemas.len(),
            facts: self.facts.len(),
            contexts: self.contexts.len(),
            units: self.units.len(),
            networks: self.networks.len(),
            components: self.components.len(),
            report_elements: self.schemas.report_elements().len(),
            errors: self.errors.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FilingStats {
    pub documents: usize,
    pub facts: usize,
    pub contexts: usize,
    pub units: usize,
    pub networks: usize,
    pub components: usize,
    pub report_elements: usize,
    pub errors: usize,
}
