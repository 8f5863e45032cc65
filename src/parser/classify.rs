//! Classification of raw document content into supported categories.
//!
//! Nothing here fails: anything outside the allow-lists is counted by its
//! type name and left out of the parsed data.

use std::collections::{BTreeMap, HashMap};

use crate::domain::{
    ImportPreview, ParsedData, ParsedElement, ParsedRelationship, RelationshipKind,
    SupportedCounts, UnsupportedCounts,
};

use super::archimate::{RawElement, RawModel, RawRelationship};

/// Supported element categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementCategory {
    Capability,
    Component,
    ValueStream,
}

impl ElementCategory {
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "Capability" => Some(Self::Capability),
            "ApplicationComponent" | "ApplicationService" => Some(Self::Component),
            "ValueStream" => Some(Self::ValueStream),
            _ => None,
        }
    }
}

/// The structural role a relationship plays, decided by kind and endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipRole {
    /// Capability parent (source) to child (target)
    ParentChild,
    /// Component realizing a capability
    Realization,
    /// Triggering/serving between two components
    ComponentRelation,
    /// Capability linked to a value stream
    CapabilityMapping,
}

/// Decide the role of a relationship, or `None` if the endpoint pair is not
/// allowed for its kind.
pub fn relationship_role(
    kind: RelationshipKind,
    source: ElementCategory,
    target: ElementCategory,
) -> Option<RelationshipRole> {
    use ElementCategory::{Capability, Component, ValueStream};
    use RelationshipKind as K;

    match (kind, source, target) {
        (K::Aggregation | K::Composition, Capability, Capability) => {
            Some(RelationshipRole::ParentChild)
        }
        (K::Realization, Component, Capability) => Some(RelationshipRole::Realization),
        (K::Triggering | K::Serving, Component, Component) => {
            Some(RelationshipRole::ComponentRelation)
        }
        (
            K::Realization | K::Association | K::Triggering | K::Serving,
            Capability,
            ValueStream,
        ) => Some(RelationshipRole::CapabilityMapping),
        _ => None,
    }
}

/// Output of a successful parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    pub parsed_data: ParsedData,
    pub preview: ImportPreview,
}

fn type_label(type_name: &str) -> String {
    if type_name.is_empty() {
        "Unknown".to_string()
    } else {
        type_name.to_string()
    }
}

fn parsed_element(raw: &RawElement) -> ParsedElement {
    ParsedElement::new(&raw.identifier, &raw.name).with_description(&raw.documentation)
}

fn parsed_relationship(raw: &RawRelationship, kind: RelationshipKind) -> ParsedRelationship {
    ParsedRelationship {
        source_id: raw.identifier.clone(),
        kind,
        source_ref: raw.source.clone(),
        target_ref: raw.target.clone(),
        name: raw.name.clone(),
        documentation: raw.documentation.clone(),
    }
}

/// Classify a raw model into parsed data plus its preview
pub fn classify(model: &RawModel) -> ParseResult {
    let mut data = ParsedData::default();
    let mut unsupported_elements: BTreeMap<String, usize> = BTreeMap::new();
    let mut unsupported_relationships: BTreeMap<String, usize> = BTreeMap::new();
    let mut categories: HashMap<&str, ElementCategory> = HashMap::new();

    for raw in &model.elements {
        match ElementCategory::from_type_name(&raw.type_name) {
            Some(category) => {
                categories.entry(raw.identifier.as_str()).or_insert(category);
                let element = parsed_element(raw);
                match category {
                    ElementCategory::Capability => data.capabilities.push(element),
                    ElementCategory::Component => data.components.push(element),
                    ElementCategory::ValueStream => data.value_streams.push(element),
                }
            }
            None => {
                *unsupported_elements
                    .entry(type_label(&raw.type_name))
                    .or_default() += 1;
            }
        }
    }

    for raw in &model.relationships {
        let supported = RelationshipKind::from_type_name(&raw.type_name).filter(|kind| {
            match (
                categories.get(raw.source.as_str()),
                categories.get(raw.target.as_str()),
            ) {
                (Some(source), Some(target)) => {
                    relationship_role(*kind, *source, *target).is_some()
                }
                _ => false,
            }
        });

        match supported {
            Some(kind) => data.relationships.push(parsed_relationship(raw, kind)),
            None => {
                *unsupported_relationships
                    .entry(type_label(&raw.type_name))
                    .or_default() += 1;
            }
        }
    }

    assign_parents(&mut data);

    let preview = ImportPreview {
        supported: supported_counts(&data, &categories),
        unsupported: UnsupportedCounts {
            elements: unsupported_elements,
            relationships: unsupported_relationships,
        },
    };

    ParseResult {
        parsed_data: data,
        preview,
    }
}

/// Record each capability's parent; the first parent/child link wins
fn assign_parents(data: &mut ParsedData) {
    let mut parents: HashMap<String, String> = HashMap::new();
    for rel in data.relationships.iter().filter(|r| r.kind.is_parent_child()) {
        parents
            .entry(rel.target_ref.clone())
            .or_insert_with(|| rel.source_ref.clone());
    }

    for capability in &mut data.capabilities {
        capability.parent_id = parents.get(&capability.source_id).cloned();
    }
}

/// Count supported content, splitting relationships by structural role
fn supported_counts(data: &ParsedData, categories: &HashMap<&str, ElementCategory>) -> SupportedCounts {
    let mut counts = SupportedCounts {
        capabilities: data.capabilities.len(),
        components: data.components.len(),
        value_streams: data.value_streams.len(),
        ..Default::default()
    };

    for rel in &data.relationships {
        let role = match (
            categories.get(rel.source_ref.as_str()),
            categories.get(rel.target_ref.as_str()),
        ) {
            (Some(source), Some(target)) => relationship_role(rel.kind, *source, *target),
            _ => None,
        };

        match role {
            Some(RelationshipRole::ParentChild) => counts.parent_child_relationships += 1,
            Some(RelationshipRole::Realization) => counts.realizations += 1,
            Some(RelationshipRole::ComponentRelation) => counts.component_relationships += 1,
            Some(RelationshipRole::CapabilityMapping) => {
                counts.capability_to_value_stream_mappings += 1
            }
            None => {}
        }
    }

    counts
}
