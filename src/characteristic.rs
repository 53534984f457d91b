// Context and unit subtrees -> typed characteristics
use crate::model::{Characteristic, Entity, Period, Unit, XbrlDate};
use crate::namespace::NamespaceRepository;
use crate::qname::QName;
use crate::xml::Element;
use crate::{Error, Result};
use compact_str::CompactString;

fn fail(element: &Element, message: impl std::fmt::Display) -> Error {
    Error::Characteristic(format!(
        "<{}> at byte {}: {}",
        element.name(),
        element.offset(),
        message
    ))
}

/// A parsed `<context>`: its characteristics plus non-fatal diagnostics
/// (dimensions given more than once).
#[derive(Debug)]
pub struct ParsedContext {
    pub characteristics: Vec<Characteristic>,
    pub warnings: Vec<Error>,
}

pub fn parse_context(element: &Element, namespaces: &NamespaceRepository) -> Result<ParsedContext> {
    let mut entity = None;
    let mut period = None;
    let mut dimensions = Vec::new();

    for child in element.children() {
        if child.local_name_eq_ci("entity") {
            if entity.is_some() {
                return Err(fail(child, "more than one entity"));
            }
            let (e, segment) = parse_entity(child)?;
            entity = Some(e);
            if let Some(segment) = segment {
                dimensions.extend(parse_dimensions(segment, namespaces)?);
            }
        } else if child.local_name_eq_ci("period") {
            if period.is_some() {
                return Err(fail(child, "more than one period"));
            }
            period = Some(parse_period(child)?);
        } else if child.local_name_eq_ci("scenario") {
            dimensions.extend(parse_dimensions(child, namespaces)?);
        } else {
            return Err(fail(child, "unexpected element in context"));
        }
    }

    let entity = entity.ok_or_else(|| fail(element, "missing entity"))?;
    let period = period.ok_or_else(|| fail(element, "missing period"))?;

    let mut warnings = Vec::new();
    for (i, dim) in dimensions.iter().enumerate() {
        let aspect = dim.aspect();
        if dimensions[i + 1..].iter().any(|later| later.aspect() == aspect) {
            warnings.push(Error::Characteristic(format!(
                "context '{}': dimension {} given more than once, dropping {}",
                element.attr("id").unwrap_or(""),
                aspect,
                dim
            )));
        }
    }

    let mut characteristics = Vec::with_capacity(dimensions.len() + 2);
    characteristics.push(entity);
    characteristics.push(period);
    characteristics.extend(dimensions);
    Ok(ParsedContext {
        characteristics,
        warnings,
    })
}

/// Returns the entity characteristic and the segment, if any.
pub fn parse_entity(element: &Element) -> Result<(Characteristic, Option<&Element>)> {
    let mut identifier = None;
    let mut segment = None;
    for child in element.children() {
        if child.local_name_eq_ci("identifier") && identifier.is_none() {
            identifier = Some(child);
        } else if child.local_name_eq_ci("segment") && segment.is_none() {
            segment = Some(child);
        } else {
            return Err(fail(child, "unexpected element in entity"));
        }
    }
    let identifier = identifier.ok_or_else(|| fail(element, "missing identifier"))?;
    let scheme = identifier
        .attr("scheme")
        .ok_or_else(|| fail(identifier, "missing scheme"))?;
    let value = identifier.trimmed_text();
    if value.is_empty() {
        return Err(fail(identifier, "empty identifier"));
    }
    Ok((
        Characteristic::Entity(Entity {
            scheme: CompactString::from(scheme.trim()),
            identifier: CompactString::from(value),
        }),
        segment,
    ))
}

pub fn parse_period(element: &Element) -> Result<Characteristic> {
    let children: Vec<&Element> = element.children().collect();
    let date = |e: &Element| {
        XbrlDate::parse(&e.text()).ok_or_else(|| fail(e, format!("invalid date '{}'", e.trimmed_text())))
    };

    let period = match children.as_slice() {
        [only] if only.local_name_eq_ci("instant") => Period::Instant(date(only)?),
        [only] if only.local_name_eq_ci("forever") => Period::Forever,
        [a, b] => {
            let (start, end) = if a.local_name_eq_ci("startDate") && b.local_name_eq_ci("endDate") {
                (a, b)
            } else if a.local_name_eq_ci("endDate") && b.local_name_eq_ci("startDate") {
                (b, a)
            } else {
                return Err(fail(element, "expected startDate and endDate"));
            };
            let (start_date, end_date) = (date(start)?, date(end)?);
            let reversed = match (start_date, end_date) {
                (XbrlDate::Date(s), XbrlDate::Date(e)) => s > e,
                (s, e) => {
                    let end_at = e
                        .as_end()
                        .ok_or_else(|| fail(end, format!("end {} is out of range", e)))?;
                    s.as_start() > end_at
                }
            };
            if reversed {
                return Err(fail(
                    element,
                    format!("start {} is after end {}", start_date, end_date),
                ));
            }
            Period::Duration {
                start: start_date,
                end: end_date,
            }
        }
        _ => return Err(fail(element, "expected instant, startDate/endDate or forever")),
    };
    Ok(Characteristic::Period(period))
}

pub fn parse_unit(element: &Element, namespaces: &NamespaceRepository) -> Result<Unit> {
    let children: Vec<&Element> = element.children().collect();
    let unit = match children.as_slice() {
        [divide] if divide.local_name_eq_ci("divide") => {
            let numerator = divide
                .child_ci("unitNumerator")
                .ok_or_else(|| fail(divide, "missing unitNumerator"))?;
            let denominator = divide
                .child_ci("unitDenominator")
                .ok_or_else(|| fail(divide, "missing unitDenominator"))?;
            if divide.children().count() != 2 {
                return Err(fail(divide, "unexpected element in divide"));
            }
            Unit::Divide {
                numerator: parse_measures(numerator, namespaces)?,
                denominator: parse_measures(denominator, namespaces)?,
            }
        }
        [] => return Err(fail(element, "unit has no measure")),
        _ => Unit::Simple(parse_measures(element, namespaces)?),
    };
    Ok(unit)
}

fn parse_measures(element: &Element, namespaces: &NamespaceRepository) -> Result<Vec<QName>> {
    let mut measures = Vec::new();
    for child in element.children() {
        if !child.local_name_eq_ci("measure") {
            return Err(fail(child, "expected measure"));
        }
        let qname = namespaces
            .resolve(&child.text(), Some(child.scope()))
            .map_err(|e| fail(child, e))?;
        measures.push(qname);
    }
    if measures.is_empty() {
        return Err(fail(element, "no measure"));
    }
    measures.sort();
    Ok(measures)
}

/// Dimension members in a segment or scenario. Other content is not dimensional
/// and is skipped.
fn parse_dimensions(element: &Element, namespaces: &NamespaceRepository) -> Result<Vec<Characteristic>> {
    let mut out = Vec::new();
    for child in element.children() {
        if child.local_name_eq_ci("explicitMember") {
            out.push(parse_explicit_member(child, namespaces)?);
        } else if child.local_name_eq_ci("typedMember") {
            out.push(parse_typed_member(child, namespaces)?);
        }
    }
    Ok(out)
}

fn dimension_name(element: &Element, namespaces: &NamespaceRepository) -> Result<QName> {
    let raw = element
        .attr("dimension")
        .ok_or_else(|| fail(element, "missing dimension attribute"))?;
    namespaces
        .resolve(raw, Some(element.scope()))
        .map_err(|e| fail(element, e))
}

pub fn parse_explicit_member(element: &Element, namespaces: &NamespaceRepository) -> Result<Characteristic> {
    let dimension = dimension_name(element, namespaces)?;
    if element.children().next().is_some() {
        return Err(fail(element, "explicit member must contain only a QName"));
    }
    let member = namespaces
        .resolve(&element.text(), Some(element.scope()))
        .map_err(|e| fail(element, e))?;
    Ok(Characteristic::ExplicitDimension { dimension, member })
}

/// The typed value is kept as the child element in canonical form, so the
/// same value written under different prefixes compares equal.
pub fn parse_typed_member(element: &Element, namespaces: &NamespaceRepository) -> Result<Characteristic> {
    let dimension = dimension_name(element, namespaces)?;
    let mut children = element.children();
    let value = match (children.next(), children.next()) {
        (Some(value), None) => value.canonical_xml(),
        _ => return Err(fail(element, "typed member must contain exactly one element")),
    };
    Ok(Characteristic::TypedDimension { dimension, value })
}
