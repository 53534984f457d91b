// Arena-style repositories populated by the load stages
use crate::model::*;
use crate::qname::QName;
use crate::Error;
use ahash::AHashMap;
use compact_str::CompactString;
use serde::Serialize;
use std::fmt;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParseErrorKind {
    ResourceNotFound,
    Xml,
    Characteristic,
    NetworkResolution,
    ReferenceResolution,
}

/// A non-fatal diagnostic recorded during a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub location: Option<String>,
    pub related: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            related: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn related(mut self, related: impl Into<String>) -> Self {
        self.related = Some(related.into());
        self
    }

    pub fn from_error(error: &Error) -> Self {
        let kind = match error {
            Error::Xml { .. } => ParseErrorKind::Xml,
            Error::Characteristic(_) => ParseErrorKind::Characteristic,
            Error::NetworkResolution(_) => ParseErrorKind::NetworkResolution,
            Error::ReferenceResolution(_) | Error::Url(_) => ParseErrorKind::ReferenceResolution,
            Error::ResourceNotFound(_)
            | Error::Io(_)
            | Error::Archive(_)
            | Error::UnsupportedPath(_)
            | Error::MissingInstance(_)
            | Error::MissingSchema(_) => ParseErrorKind::ResourceNotFound,
        };
        Self::new(kind, error.to_string())
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(related) = &self.related {
            write!(f, " ({})", related)?;
        }
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ErrorRepository {
    errors: Vec<ParseError>,
}

impl ErrorRepository {
    pub fn record(&mut self, error: ParseError) {
        tracing::warn!(
            kind = ?error.kind,
            location = error.location.as_deref().unwrap_or(""),
            related = error.related.as_deref().unwrap_or(""),
            "{}",
            error.message
        );
        self.errors.push(error);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParseError> {
        self.errors.iter()
    }

    pub fn of_kind(&self, kind: ParseErrorKind) -> impl Iterator<Item = &ParseError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

// ============================================================================
// Contexts and units (content-addressed)
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct ContextRepository {
    contexts: Vec<Context>,
    by_content: AHashMap<Context, ContextId>,
    by_source: AHashMap<CompactString, ContextId>,
    sources: Vec<Vec<CompactString>>,
}

impl ContextRepository {
    /// Structurally identical contexts collapse to one id.
    pub fn insert(&mut self, source_id: &str, context: Context) -> ContextId {
        let id = match self.by_content.get(&context) {
            Some(id) => *id,
            None => {
                let id = ContextId(self.contexts.len() as u32);
                self.by_content.insert(context.clone(), id);
                self.contexts.push(context);
                self.sources.push(Vec::new());
                id
            }
        };
        self.by_source.insert(CompactString::from(source_id), id);
        self.sources[id.0 as usize].push(CompactString::from(source_id));
        id
    }

    pub fn get(&self, id: ContextId) -> Option<&Context> {
        self.contexts.get(id.0 as usize)
    }

    pub fn by_source_id(&self, source_id: &str) -> Option<ContextId> {
        self.by_source.get(source_id).copied()
    }

    /// Every source `id` attribute that mapped to this context.
    pub fn source_ids(&self, id: ContextId) -> &[CompactString] {
        self.sources
            .get(id.0 as usize)
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContextId, &Context)> {
        self.contexts
            .iter()
            .enumerate()
            .map(|(i, c)| (ContextId(i as u32), c))
    }

    pub fn with_aspect<'a>(
        &'a self,
        aspect: &'a Aspect,
    ) -> impl Iterator<Item = (ContextId, &'a Context)> + 'a {
        self.iter().filter(move |(_, c)| c.has_aspect(aspect))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct UnitRepository {
    units: Vec<Unit>,
    by_content: AHashMap<Unit, UnitId>,
    by_source: AHashMap<CompactString, UnitId>,
}

impl UnitRepository {
    pub fn insert(&mut self, source_id: &str, unit: Unit) -> UnitId {
        let id = match self.by_content.get(&unit) {
            Some(id) => *id,
            None => {
                let id = UnitId(self.units.len() as u32);
                self.by_content.insert(unit.clone(), id);
                self.units.push(unit);
                id
            }
        };
        self.by_source.insert(CompactString::from(source_id), id);
        id
    }

    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id.0 as usize)
    }

    pub fn by_source_id(&self, source_id: &str) -> Option<UnitId> {
        self.by_source.get(source_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &Unit)> {
        self.units
            .iter()
            .enumerate()
            .map(|(i, u)| (UnitId(i as u32), u))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

// ============================================================================
// Facts
// ============================================================================

/// Facts in instance document order. Never deduplicated.
#[derive(Debug, Default, Clone)]
pub struct FactRepository {
    facts: Vec<Fact>,
}

impl FactRepository {
    pub fn push(&mut self, fact: Fact) {
        self.facts.push(fact);
    }

    pub fn as_slice(&self) -> &[Fact] {
        &self.facts
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fact> {
        self.facts.iter()
    }

    pub fn by_concept<'a>(&'a self, concept: &'a QName) -> impl Iterator<Item = &'a Fact> + 'a {
        self.facts.iter().filter(move |f| &f.concept == concept)
    }

    pub fn by_id(&self, id: &str) -> Option<&Fact> {
        self.facts.iter().find(|f| f.id.as_deref() == Some(id))
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

// ============================================================================
// Networks and components
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NetworkKey {
    kind: LinkKind,
    role: CompactString,
    arcrole: CompactString,
}

#[derive(Debug, Default, Clone)]
pub struct NetworkRepository {
    networks: Vec<Network>,
    index: AHashMap<NetworkKey, NetworkId>,
}

impl NetworkRepository {
    pub(crate) fn get_or_create(&mut self, kind: &LinkKind, role: &str, arcrole: &str) -> NetworkId {
        let key = NetworkKey {
            kind: kind.clone(),
            role: CompactString::from(role),
            arcrole: CompactString::from(arcrole),
        };
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = NetworkId(self.networks.len() as u32);
        self.networks.push(Network::new(kind.clone(), role, arcrole));
        self.index.insert(key, id);
        id
    }

    pub(crate) fn get_mut(&mut self, id: NetworkId) -> Option<&mut Network> {
        self.networks.get_mut(id.0 as usize)
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Network> {
        self.networks.iter_mut()
    }

    pub fn get(&self, id: NetworkId) -> Option<&Network> {
        self.networks.get(id.0 as usize)
    }

    pub fn find(&self, kind: &LinkKind, role: &str, arcrole: &str) -> Option<&Network> {
        let key = NetworkKey {
            kind: kind.clone(),
            role: CompactString::from(role),
            arcrole: CompactString::from(arcrole),
        };
        self.index.get(&key).and_then(|id| self.get(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NetworkId, &Network)> {
        self.networks
            .iter()
            .enumerate()
            .map(|(i, n)| (NetworkId(i as u32), n))
    }

    pub fn of_kind(&self, kind: &LinkKind) -> impl Iterator<Item = &Network> + '_ {
        let kind = kind.clone();
        self.networks.iter().filter(move |n| *n.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ComponentRepository {
    components: Vec<Component>,
    by_role: AHashMap<CompactString, usize>,
}

impl ComponentRepository {
    /// Groups structural networks by role, in first-seen order.
    pub fn build(
        networks: &NetworkRepository,
        definitions: &AHashMap<CompactString, String>,
    ) -> Self {
        let mut repo = Self::default();
        for (id, network) in networks.iter() {
            if !network.kind().is_structural() || network.relationships().is_empty() {
                continue;
            }
            let role = CompactString::from(network.role());
            let slot = match repo.by_role.get(&role) {
                Some(slot) => *slot,
                None => {
                    repo.components.push(Component {
                        role: role.clone(),
                        definition: definitions.get(&role).cloned(),
                        networks: Vec::new(),
                    });
                    repo.by_role.insert(role, repo.components.len() - 1);
                    repo.components.len() - 1
                }
            };
            repo.components[slot].networks.push(id);
        }
        repo
    }

    pub fn get(&self, role: &str) -> Option<&Component> {
        self.by_role.get(role).map(|i| &self.components[*i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Component> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_context(identifier: &str) -> Context {
        Context::new(vec![
            Characteristic::Entity(Entity {
                scheme: "http://www.sec.gov/CIK".into(),
                identifier: identifier.into(),
            }),
            Characteristic::Period(Period::Forever),
        ])
    }

    #[test]
    fn identical_contexts_share_an_id() {
        let mut repo = ContextRepository::default();
        let a = repo.insert("c1", entity_context("0001"));
        let b = repo.insert("c2", entity_context("0001"));
        let c = repo.insert("c3", entity_context("0002"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.by_source_id("c2"), Some(a));
        assert_eq!(repo.source_ids(a), &["c1", "c2"]);
        assert_eq!(repo.with_aspect(&Aspect::Entity).count(), 2);
        assert_eq!(repo.with_aspect(&Aspect::Unit).count(), 0);
    }

    #[test]
    fn components_group_structural_networks_by_role() {
        let mut networks = NetworkRepository::default();
        let role = "http://example.com/role/BalanceSheet";
        for kind in [LinkKind::Presentation, LinkKind::Calculation, LinkKind::Label] {
            let id = networks.get_or_create(&kind, role, "urn:arcrole");
            let network = networks.get_mut(id).unwrap();
            let a = network.push_node(NetworkNode::Fact("f1".into()));
            let b = network.push_node(NetworkNode::Fact("f2".into()));
            network.push_relationship(Relationship {
                from: a,
                to: b,
                order: 1.0,
                weight: None,
                priority: 0,
                preferred_label: None,
                target_role: None,
            });
        }
        // same key resolves to the same network
        let again = networks.get_or_create(&LinkKind::Presentation, role, "urn:arcrole");
        assert_eq!(again, NetworkId(0));

        let mut definitions = AHashMap::new();
        definitions.insert(CompactString::from(role), "Balance Sheet".to_string());
        let components = ComponentRepository::build(&networks, &definitions);
        assert_eq!(components.len(), 1);
        let component = components.get(role).unwrap();
        assert_eq!(component.networks, vec![NetworkId(0), NetworkId(1)]);
        assert_eq!(component.definition.as_deref(), Some("Balance Sheet"));
    }

    #[test]
    fn error_display() {
        let error = ParseError::from_error(&Error::ReferenceResolution("contextRef 'x'".into()))
            .at("file:///i.xml@10")
            .related("fact-1");
        assert_eq!(error.kind, ParseErrorKind::ReferenceResolution);
        assert_eq!(
            error.to_string(),
            "[ReferenceResolution] Reference resolution error: contextRef 'x' (fact-1) at file:///i.xml@10"
        );
    }
}
