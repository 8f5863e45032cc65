//! Streaming reader for the ArchiMate Open Exchange XML format.
//!
//! Produces raw, unclassified elements and relationships. Sections other
//! than `<elements>` and `<relationships>` are skipped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ParseError;

/// An `<element>` as written in the document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawElement {
    pub identifier: String,
    pub type_name: String,
    pub name: String,
    pub documentation: String,
}

/// A `<relationship>` as written in the document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRelationship {
    pub identifier: String,
    pub type_name: String,
    pub source: String,
    pub target: String,
    pub name: String,
    pub documentation: String,
}

#[derive(Debug, Default)]
pub struct RawModel {
    pub elements: Vec<RawElement>,
    pub relationships: Vec<RawRelationship>,
}

/// Where a text node should go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    ElementName,
    ElementDocumentation,
    RelationshipName,
    RelationshipDocumentation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Elements,
    Relationships,
}

fn attribute(start: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>, ParseError> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Malformed(e.to_string()))?;
        if attr.key.local_name().as_ref() == local {
            let value = attr
                .unescape_value()
                .map_err(|e| ParseError::Malformed(e.to_string()))?;
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}

fn element_from(start: &BytesStart<'_>) -> Result<RawElement, ParseError> {
    Ok(RawElement {
        identifier: attribute(start, b"identifier")?.unwrap_or_default(),
        type_name: attribute(start, b"type")?.unwrap_or_default(),
        ..Default::default()
    })
}

fn relationship_from(start: &BytesStart<'_>) -> Result<RawRelationship, ParseError> {
    Ok(RawRelationship {
        identifier: attribute(start, b"identifier")?.unwrap_or_default(),
        type_name: attribute(start, b"type")?.unwrap_or_default(),
        source: attribute(start, b"source")?.unwrap_or_default(),
        target: attribute(start, b"target")?.unwrap_or_default(),
        ..Default::default()
    })
}

/// Read a whole document into raw elements and relationships
pub fn read_model(xml: &str) -> Result<RawModel, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut model = RawModel::default();
    let mut saw_model_root = false;
    let mut depth = 0usize;
    let mut section = Section::Outside;
    let mut element: Option<RawElement> = None;
    let mut relationship: Option<RawRelationship> = None;
    let mut text_target: Option<TextTarget> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ParseError::Malformed(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(start) => {
                depth += 1;
                let local = start.local_name();
                match (depth, local.as_ref()) {
                    (1, b"model") => saw_model_root = true,
                    (1, other) => {
                        return Err(ParseError::MissingModel(
                            String::from_utf8_lossy(other).into_owned(),
                        ))
                    }
                    (2, b"elements") => section = Section::Elements,
                    (2, b"relationships") => section = Section::Relationships,
                    (3, b"element") if section == Section::Elements => {
                        element = Some(element_from(&start)?);
                    }
                    (3, b"relationship") if section == Section::Relationships => {
                        relationship = Some(relationship_from(&start)?);
                    }
                    (4, b"name") if element.is_some() => {
                        text_target = Some(TextTarget::ElementName);
                    }
                    (4, b"documentation") if element.is_some() => {
                        text_target = Some(TextTarget::ElementDocumentation);
                    }
                    (4, b"name") if relationship.is_some() => {
                        text_target = Some(TextTarget::RelationshipName);
                    }
                    (4, b"documentation") if relationship.is_some() => {
                        text_target = Some(TextTarget::RelationshipDocumentation);
                    }
                    _ => {}
                }
            }
            Event::Empty(start) => {
                let local = start.local_name();
                match (depth + 1, local.as_ref()) {
                    (1, b"model") => saw_model_root = true,
                    (1, other) => {
                        return Err(ParseError::MissingModel(
                            String::from_utf8_lossy(other).into_owned(),
                        ))
                    }
                    (3, b"element") if section == Section::Elements => {
                        model.elements.push(element_from(&start)?);
                    }
                    (3, b"relationship") if section == Section::Relationships => {
                        model.relationships.push(relationship_from(&start)?);
                    }
                    _ => {}
                }
            }
            Event::Text(text) => {
                if let Some(target) = text_target {
                    let value = text
                        .unescape()
                        .map_err(|e| ParseError::Malformed(e.to_string()))?;
                    fill_text(target, value.trim(), &mut element, &mut relationship);
                }
            }
            Event::CData(data) => {
                if let Some(target) = text_target {
                    let value = String::from_utf8_lossy(&data).into_owned();
                    fill_text(target, value.trim(), &mut element, &mut relationship);
                }
            }
            Event::End(end) => {
                let local = end.local_name();
                match (depth, local.as_ref()) {
                    (2, b"elements") | (2, b"relationships") => section = Section::Outside,
                    (3, b"element") => {
                        if let Some(done) = element.take() {
                            model.elements.push(done);
                        }
                    }
                    (3, b"relationship") => {
                        if let Some(done) = relationship.take() {
                            model.relationships.push(done);
                        }
                    }
                    (4, _) => text_target = None,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_model_root {
        return Err(ParseError::MissingModel("<empty document>".to_string()));
    }

    Ok(model)
}

/// Keep only the first name/documentation (documents may carry one per language)
fn fill_text(
    target: TextTarget,
    value: &str,
    element: &mut Option<RawElement>,
    relationship: &mut Option<RawRelationship>,
) {
    let slot = match target {
        TextTarget::ElementName => element.as_mut().map(|e| &mut e.name),
        TextTarget::ElementDocumentation => element.as_mut().map(|e| &mut e.documentation),
        TextTarget::RelationshipName => relationship.as_mut().map(|r| &mut r.name),
        TextTarget::RelationshipDocumentation => {
            relationship.as_mut().map(|r| &mut r.documentation)
        }
    };

    if let Some(slot) = slot {
        if slot.is_empty() {
            *slot = value.to_string();
        }
    }
}
