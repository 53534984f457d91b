use crate::qname::QName;
use bitflags::bitflags;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use compact_str::CompactString;
use serde::Serialize;
use std::fmt;

// ============================================================================
// Aspects and characteristics
// ============================================================================

/// One axis of a fact's context. Core aspects are fixed; every dimension is
/// its own aspect, identified by the dimension's QName.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Aspect {
    Concept,
    Entity,
    Period,
    Unit,
    Dimension(QName),
}

impl Aspect {
    pub fn is_core(&self) -> bool {
        !matches!(self, Aspect::Dimension(_))
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aspect::Concept => f.write_str("concept"),
            Aspect::Entity => f.write_str("entity"),
            Aspect::Period => f.write_str("period"),
            Aspect::Unit => f.write_str("unit"),
            Aspect::Dimension(q) => write!(f, "{}", q),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Entity {
    pub scheme: CompactString,
    pub identifier: CompactString,
}

/// A date as written in the instance: either a plain date or a date-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum XbrlDate {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl XbrlDate {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Some(XbrlDate::Date(date));
        }
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
            return Some(XbrlDate::DateTime(dt.naive_utc()));
        }
        let text = text.strip_suffix('Z').unwrap_or(text);
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(XbrlDate::DateTime)
    }

    /// As a period start: a plain date means midnight at the start of that day.
    pub fn as_start(&self) -> NaiveDateTime {
        match self {
            XbrlDate::Date(d) => d.and_time(NaiveTime::MIN),
            XbrlDate::DateTime(dt) => *dt,
        }
    }

    /// As an instant or period end: a plain date means the end of that day.
    /// `None` when the following midnight is past the last representable date.
    pub fn as_end(&self) -> Option<NaiveDateTime> {
        match self {
            XbrlDate::Date(d) => d
                .and_time(NaiveTime::MIN)
                .checked_add_signed(Duration::days(1)),
            XbrlDate::DateTime(dt) => Some(*dt),
        }
    }
}

impl fmt::Display for XbrlDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XbrlDate::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            XbrlDate::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Period {
    Instant(XbrlDate),
    Duration { start: XbrlDate, end: XbrlDate },
    Forever,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Instant(d) => write!(f, "instant {}", d),
            Period::Duration { start, end } => write!(f, "duration {} / {}", start, end),
            Period::Forever => f.write_str("forever"),
        }
    }
}

/// Measures are kept sorted so equal units compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Unit {
    Simple(Vec<QName>),
    Divide {
        numerator: Vec<QName>,
        denominator: Vec<QName>,
    },
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(measures: &[QName]) -> String {
            measures
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join("*")
        }
        match self {
            Unit::Simple(m) => f.write_str(&join(m)),
            Unit::Divide {
                numerator,
                denominator,
            } => write!(f, "{}/{}", join(numerator), join(denominator)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Characteristic {
    Concept(QName),
    Entity(Entity),
    Period(Period),
    Unit(Unit),
    ExplicitDimension { dimension: QName, member: QName },
    /// The typed value is kept as serialized XML; its schema is filing-defined.
    TypedDimension { dimension: QName, value: String },
}

impl Characteristic {
    pub fn aspect(&self) -> Aspect {
        match self {
            Characteristic::Concept(_) => Aspect::Concept,
            Characteristic::Entity(_) => Aspect::Entity,
            Characteristic::Period(_) => Aspect::Period,
            Characteristic::Unit(_) => Aspect::Unit,
            Characteristic::ExplicitDimension { dimension, .. }
            | Characteristic::TypedDimension { dimension, .. } => {
                Aspect::Dimension(dimension.clone())
            }
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Characteristic::Concept(q) => write!(f, "concept={}", q),
            Characteristic::Entity(e) => write!(f, "entity={} ({})", e.identifier, e.scheme),
            Characteristic::Period(p) => write!(f, "period={}", p),
            Characteristic::Unit(u) => write!(f, "unit={}", u),
            Characteristic::ExplicitDimension { dimension, member } => {
                write!(f, "{}={}", dimension, member)
            }
            Characteristic::TypedDimension { dimension, value } => {
                write!(f, "{}={}", dimension, value)
            }
        }
    }
}

// ============================================================================
// Contexts and facts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitId(pub u32);

/// At most one characteristic per aspect, ordered by aspect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Context {
    characteristics: Vec<Characteristic>,
}

impl Context {
    /// Later characteristics replace earlier ones for the same aspect.
    pub fn new(characteristics: Vec<Characteristic>) -> Self {
        let mut sorted: Vec<Characteristic> = Vec::with_capacity(characteristics.len());
        for c in characteristics {
            let aspect = c.aspect();
            match sorted.binary_search_by(|x| x.aspect().cmp(&aspect)) {
                Ok(i) => sorted[i] = c,
                Err(i) => sorted.insert(i, c),
            }
        }
        Self {
            characteristics: sorted,
        }
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    pub fn get(&self, aspect: &Aspect) -> Option<&Characteristic> {
        self.characteristics
            .binary_search_by(|c| c.aspect().cmp(aspect))
            .ok()
            .map(|i| &self.characteristics[i])
    }

    pub fn has_aspect(&self, aspect: &Aspect) -> bool {
        self.get(aspect).is_some()
    }

    pub fn entity(&self) -> Option<&Entity> {
        match self.get(&Aspect::Entity)? {
            Characteristic::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn period(&self) -> Option<&Period> {
        match self.get(&Aspect::Period)? {
            Characteristic::Period(p) => Some(p),
            _ => None,
        }
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Characteristic> {
        self.characteristics
            .iter()
            .filter(|c| !c.aspect().is_core())
    }

    pub fn len(&self) -> usize {
        self.characteristics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characteristics.is_empty()
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct FactFlags: u8 {
        const NIL = 0b0000_0001;
        const HAS_DECIMALS = 0b0000_0010;
        const HAS_PRECISION = 0b0000_0100;
        const IN_TUPLE = 0b0000_1000;
    }
}

/// `decimals` / `precision` attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Accuracy {
    Infinite,
    Finite(i32),
}

impl Accuracy {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "INF" {
            Some(Accuracy::Infinite)
        } else {
            text.parse().ok().map(Accuracy::Finite)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fact {
    pub id: Option<CompactString>,
    pub concept: QName,
    pub context: ContextId,
    pub unit: Option<UnitId>,
    /// `None` for nil facts.
    pub value: Option<String>,
    pub decimals: Option<Accuracy>,
    pub precision: Option<Accuracy>,
    pub flags: FactFlags,
}

impl Fact {
    #[inline]
    pub fn is_nil(&self) -> bool {
        self.flags.contains(FactFlags::NIL)
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.unit.is_some()
    }

    pub fn numeric_value(&self) -> Option<f64> {
        if !self.is_numeric() {
            return None;
        }
        let value = self.value.as_deref()?.trim();
        // Handle parentheses for negative numbers
        if let Some(inner) = value.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
            return inner.trim().parse::<f64>().ok().map(|v| -v);
        }
        value.parse().ok()
    }
}

// ============================================================================
// Networks, resources and components
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NetworkId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum LinkKind {
    Presentation,
    Calculation,
    Definition,
    Label,
    Reference,
    Footnote,
    Generic(CompactString),
}

impl LinkKind {
    /// Classifies an extended link by its local name.
    pub fn from_link_name(local_name: &str) -> Self {
        let lower = local_name.to_ascii_lowercase();
        match lower.as_str() {
            "presentationlink" => LinkKind::Presentation,
            "calculationlink" => LinkKind::Calculation,
            "definitionlink" => LinkKind::Definition,
            "labellink" => LinkKind::Label,
            "referencelink" => LinkKind::Reference,
            "footnotelink" => LinkKind::Footnote,
            _ => LinkKind::Generic(CompactString::from(local_name)),
        }
    }

    /// Kinds that make up a report component.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            LinkKind::Presentation | LinkKind::Calculation | LinkKind::Definition
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Resource {
    Label {
        label: CompactString,
        role: Option<CompactString>,
        lang: Option<CompactString>,
        title: Option<String>,
        text: String,
    },
    Reference {
        label: CompactString,
        role: Option<CompactString>,
        title: Option<String>,
        parts: Vec<(CompactString, String)>,
    },
    Footnote {
        label: CompactString,
        role: Option<CompactString>,
        lang: Option<CompactString>,
        title: Option<String>,
        text: String,
    },
}

/// What a resource carries: text for labels and footnotes, named parts for references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceContent<'a> {
    Text(&'a str),
    Parts(&'a [(CompactString, String)]),
}

impl Resource {
    pub fn label(&self) -> &str {
        match self {
            Resource::Label { label, .. }
            | Resource::Reference { label, .. }
            | Resource::Footnote { label, .. } => label.as_str(),
        }
    }

    pub fn role(&self) -> Option<&str> {
        match self {
            Resource::Label { role, .. }
            | Resource::Reference { role, .. }
            | Resource::Footnote { role, .. } => role.as_deref(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Resource::Label { title, .. }
            | Resource::Reference { title, .. }
            | Resource::Footnote { title, .. } => title.as_deref(),
        }
    }

    pub fn lang(&self) -> Option<&str> {
        match self {
            Resource::Label { lang, .. } | Resource::Footnote { lang, .. } => lang.as_deref(),
            Resource::Reference { .. } => None,
        }
    }

    pub fn content(&self) -> ResourceContent<'_> {
        match self {
            Resource::Label { text, .. } | Resource::Footnote { text, .. } => {
                ResourceContent::Text(text)
            }
            Resource::Reference { parts, .. } => ResourceContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NetworkNode {
    ReportElement(QName),
    Resource(Resource),
    /// A fact in the instance, by its `id`.
    Fact(CompactString),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub from: NodeId,
    pub to: NodeId,
    pub order: f64,
    pub weight: Option<f64>,
    pub priority: i32,
    pub preferred_label: Option<CompactString>,
    pub target_role: Option<CompactString>,
}

/// One (link kind, role, arcrole) relationship graph. Storage only: cycles
/// are kept as-is and nothing here walks the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Network {
    kind: LinkKind,
    role: CompactString,
    arcrole: CompactString,
    nodes: Vec<NetworkNode>,
    relationships: Vec<Relationship>,
    #[serde(skip)]
    outgoing: Vec<Vec<usize>>,
    #[serde(skip)]
    has_incoming: Vec<bool>,
}

impl Network {
    pub(crate) fn new(kind: LinkKind, role: &str, arcrole: &str) -> Self {
        Self {
            kind,
            role: CompactString::from(role),
            arcrole: CompactString::from(arcrole),
            nodes: Vec::new(),
            relationships: Vec::new(),
            outgoing: Vec::new(),
            has_incoming: Vec::new(),
        }
    }

    pub(crate) fn push_node(&mut self, node: NetworkNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() as u32 - 1)
    }

    pub(crate) fn push_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    pub(crate) fn retain_relationships<F>(&mut self, keep: F)
    where
        F: FnMut(&Relationship) -> bool,
    {
        self.relationships.retain(keep);
    }

    /// Builds the per-node child index: by `order`, then document order.
    pub(crate) fn index(&mut self) {
        self.outgoing = vec![Vec::new(); self.nodes.len()];
        self.has_incoming = vec![false; self.nodes.len()];
        for (i, rel) in self.relationships.iter().enumerate() {
            self.outgoing[rel.from.0 as usize].push(i);
            self.has_incoming[rel.to.0 as usize] = true;
        }
        let relationships = &self.relationships;
        for children in &mut self.outgoing {
            children.sort_by(|a, b| relationships[*a].order.total_cmp(&relationships[*b].order));
        }
    }

    pub fn kind(&self) -> &LinkKind {
        &self.kind
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn arcrole(&self) -> &str {
        &self.arcrole
    }

    pub fn nodes(&self) -> &[NetworkNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&NetworkNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn find_element(&self, concept: &QName) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| matches!(n, NetworkNode::ReportElement(q) if q == concept))
            .map(|i| NodeId(i as u32))
    }

    pub fn children(&self, node: NodeId) -> impl Iterator<Item = &Relationship> {
        self.outgoing
            .get(node.0 as usize)
            .into_iter()
            .flatten()
            .map(move |&i| &self.relationships[i])
    }

    /// Nodes with outgoing but no incoming relationships.
    pub fn roots(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&i| {
                !self.has_incoming.get(i).copied().unwrap_or(false)
                    && self.outgoing.get(i).is_some_and(|o| !o.is_empty())
            })
            .map(|i| NodeId(i as u32))
            .collect()
    }
}

/// A report section: every structural network sharing one role URI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub role: CompactString,
    pub definition: Option<String>,
    pub networks: Vec<NetworkId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(name: &str, member: &str) -> Characteristic {
        Characteristic::ExplicitDimension {
            dimension: QName::new("urn:ex", name, Some("ex")),
            member: QName::new("urn:ex", member, Some("ex")),
        }
    }

    #[test]
    fn context_equality_ignores_order() {
        let period = Characteristic::Period(Period::Instant(XbrlDate::parse("2023-12-31").unwrap()));
        let a = Context::new(vec![period.clone(), dim("AxisA", "M1"), dim("AxisB", "M2")]);
        let b = Context::new(vec![dim("AxisB", "M2"), dim("AxisA", "M1"), period]);
        assert_eq!(a, b);
        assert_eq!(a.dimensions().count(), 2);
    }

    #[test]
    fn context_keeps_one_characteristic_per_aspect() {
        let ctx = Context::new(vec![dim("Axis", "First"), dim("Axis", "Second")]);
        assert_eq!(ctx.len(), 1);
        let aspect = Aspect::Dimension(QName::new("urn:ex", "Axis", None));
        assert_eq!(ctx.get(&aspect), Some(&dim("Axis", "Second")));
    }

    #[test]
    fn date_bounds() {
        let d = XbrlDate::parse("2023-12-31").unwrap();
        assert_eq!(d.as_end(), Some(XbrlDate::parse("2024-01-01").unwrap().as_start()));
        let dt = XbrlDate::parse("2023-12-31T10:00:00Z").unwrap();
        assert_eq!(Some(dt.as_start()), dt.as_end());
        assert_eq!(XbrlDate::Date(NaiveDate::MAX).as_end(), None);
        assert!(XbrlDate::parse("31/12/2023").is_none());
    }

    #[test]
    fn numeric_values() {
        let mut fact = Fact {
            id: None,
            concept: QName::new("urn:ex", "Assets", None),
            context: ContextId(0),
            unit: Some(UnitId(0)),
            value: Some("(1500)".to_string()),
            decimals: Accuracy::parse("INF"),
            precision: None,
            flags: FactFlags::HAS_DECIMALS,
        };
        assert_eq!(fact.numeric_value(), Some(-1500.0));
        fact.unit = None;
        assert_eq!(fact.numeric_value(), None);
        assert_eq!(Accuracy::parse("-3"), Some(Accuracy::Finite(-3)));
        assert_eq!(Accuracy::parse("many"), None);
    }

    #[test]
    fn link_kinds() {
        assert_eq!(LinkKind::from_link_name("presentationLink"), LinkKind::Presentation);
        assert_eq!(LinkKind::from_link_name("CalculationLink"), LinkKind::Calculation);
        assert!(matches!(LinkKind::from_link_name("gen:link"), LinkKind::Generic(_)));
        assert!(!LinkKind::Label.is_structural());
    }
}
