//! Value types shared by the parser, the import session and the saga.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::session::SessionError;

/// Deepest capability level the importer will label.
///
/// Anything at or below this depth is created as `L4`.
pub const MAX_CAPABILITY_LEVEL: usize = 4;

/// An element (capability, component or value stream) as read from the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedElement {
    /// Identifier inside the interchange document
    pub source_id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Source ID of the parent capability (capabilities only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl ParsedElement {
    pub fn new(source_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            name: name.into(),
            description: String::new(),
            parent_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Relationship types that survive classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Aggregation,
    Composition,
    Realization,
    Association,
    Triggering,
    Serving,
}

impl RelationshipKind {
    /// Map an interchange `xsi:type` to a supported kind
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "Aggregation" => Some(Self::Aggregation),
            "Composition" => Some(Self::Composition),
            "Realization" => Some(Self::Realization),
            "Association" => Some(Self::Association),
            "Triggering" => Some(Self::Triggering),
            "Serving" => Some(Self::Serving),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Aggregation => "Aggregation",
            Self::Composition => "Composition",
            Self::Realization => "Realization",
            Self::Association => "Association",
            Self::Triggering => "Triggering",
            Self::Serving => "Serving",
        }
    }

    /// Whether this kind expresses a capability parent/child link
    pub fn is_parent_child(&self) -> bool {
        matches!(self, Self::Aggregation | Self::Composition)
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A classified relationship; endpoints are source IDs of parsed elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRelationship {
    pub source_id: String,

    #[serde(rename = "type")]
    pub kind: RelationshipKind,

    pub source_ref: String,

    pub target_ref: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub documentation: String,
}

impl ParsedRelationship {
    pub fn new(
        source_id: impl Into<String>,
        kind: RelationshipKind,
        source_ref: impl Into<String>,
        target_ref: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            source_ref: source_ref.into(),
            target_ref: target_ref.into(),
            name: String::new(),
            documentation: String::new(),
        }
    }

    /// Free-text notes handed to the gateways: "name - documentation"
    pub fn notes(&self) -> String {
        compose_notes(&self.name, &self.documentation)
    }
}

/// Join a name and documentation the way downstream notes expect.
pub fn compose_notes(name: &str, documentation: &str) -> String {
    let name = name.trim();
    let documentation = documentation.trim();

    match (name.is_empty(), documentation.is_empty()) {
        (false, false) => format!("{} - {}", name, documentation),
        (false, true) => name.to_string(),
        (true, false) => documentation.to_string(),
        (true, true) => String::new(),
    }
}

/// Classified content of a document. Immutable once attached to a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedData {
    #[serde(default)]
    pub capabilities: Vec<ParsedElement>,

    #[serde(default)]
    pub components: Vec<ParsedElement>,

    #[serde(default)]
    pub value_streams: Vec<ParsedElement>,

    #[serde(default)]
    pub relationships: Vec<ParsedRelationship>,
}

/// Counts of what will be imported
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedCounts {
    pub capabilities: usize,
    pub components: usize,
    pub value_streams: usize,
    pub parent_child_relationships: usize,
    /// Realizations from a component to a capability
    pub realizations: usize,
    /// Triggering/serving links between two components
    pub component_relationships: usize,
    /// Any allowed link from a capability to a value stream
    pub capability_to_value_stream_mappings: usize,
}

/// Counts of what will be ignored, keyed by the document's type name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedCounts {
    pub elements: BTreeMap<String, usize>,
    pub relationships: BTreeMap<String, usize>,
}

/// Summary computed once at parse time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPreview {
    pub supported: SupportedCounts,
    pub unsupported: UnsupportedCounts,
}

/// Recognized interchange formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    #[serde(rename = "archimate-openexchange")]
    ArchimateOpenExchange,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArchimateOpenExchange => "archimate-openexchange",
        }
    }
}

impl FromStr for SourceFormat {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "archimate-openexchange" => Ok(Self::ArchimateOpenExchange),
            other => Err(SessionError::UnsupportedSourceFormat(other.to_string())),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed sequence of saga phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    CreatingComponents,
    CreatingCapabilities,
    AssigningCapabilityMetadata,
    CreatingValueStreams,
    CreatingRealizations,
    CreatingComponentRelations,
    AssigningCapabilityDomains,
    MappingCapabilitiesToStages,
}

impl ImportPhase {
    pub const ALL: [ImportPhase; 8] = [
        Self::CreatingComponents,
        Self::CreatingCapabilities,
        Self::AssigningCapabilityMetadata,
        Self::CreatingValueStreams,
        Self::CreatingRealizations,
        Self::CreatingComponentRelations,
        Self::AssigningCapabilityDomains,
        Self::MappingCapabilitiesToStages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatingComponents => "creating_components",
            Self::CreatingCapabilities => "creating_capabilities",
            Self::AssigningCapabilityMetadata => "assigning_capability_metadata",
            Self::CreatingValueStreams => "creating_value_streams",
            Self::CreatingRealizations => "creating_realizations",
            Self::CreatingComponentRelations => "creating_component_relations",
            Self::AssigningCapabilityDomains => "assigning_capability_domains",
            Self::MappingCapabilitiesToStages => "mapping_capabilities_to_stages",
        }
    }
}

impl FromStr for ImportPhase {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| SessionError::UnknownPhase(s.to_string()))
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a running import, replaced wholesale after each phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProgressRecord")]
pub struct ImportProgress {
    phase: ImportPhase,
    total_items: usize,
    completed_items: usize,
}

#[derive(Deserialize)]
struct ProgressRecord {
    phase: ImportPhase,
    total_items: usize,
    completed_items: usize,
}

impl TryFrom<ProgressRecord> for ImportProgress {
    type Error = SessionError;

    fn try_from(record: ProgressRecord) -> Result<Self, Self::Error> {
        Self::new(record.phase, record.total_items, record.completed_items)
    }
}

impl ImportProgress {
    /// Build a progress value; `completed` may not exceed `total`.
    pub fn new(phase: ImportPhase, total: usize, completed: usize) -> Result<Self, SessionError> {
        if completed > total {
            return Err(SessionError::InvalidProgress { total, completed });
        }

        Ok(Self {
            phase,
            total_items: total,
            completed_items: completed,
        })
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn completed_items(&self) -> usize {
        self.completed_items
    }
}

/// What happened to an item that did not import cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    /// The item was not created
    Skipped,

    /// The item exists but a dependent sub-step failed
    Warning,
}

/// An item-level failure recorded during orchestration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportError {
    pub source_element: String,
    pub source_name: String,
    pub message: String,
    pub action: ErrorAction,
}

impl ImportError {
    pub fn skipped(
        source_element: impl Into<String>,
        source_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_element: source_element.into(),
            source_name: source_name.into(),
            message: message.into(),
            action: ErrorAction::Skipped,
        }
    }

    pub fn warning(
        source_element: impl Into<String>,
        source_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_element: source_element.into(),
            source_name: source_name.into(),
            message: message.into(),
            action: ErrorAction::Warning,
        }
    }
}

/// Outcome of a finished import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub components_created: usize,
    pub capabilities_created: usize,
    pub capability_metadata_updated: usize,
    pub value_streams_created: usize,
    pub realizations_created: usize,
    pub component_relations_created: usize,
    pub domain_assignments: usize,
    pub capability_mappings: usize,
    #[serde(default)]
    pub errors: Vec<ImportError>,
}

impl ImportResult {
    pub fn skipped_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.action == ErrorAction::Skipped)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.action == ErrorAction::Warning)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_notes() {
        assert_eq!(compose_notes("Sales", "Handles orders"), "Sales - Handles orders");
        assert_eq!(compose_notes("Sales", ""), "Sales");
        assert_eq!(compose_notes("", "Handles orders"), "Handles orders");
        assert_eq!(compose_notes("  ", " "), "");
    }

    #[test]
    fn test_progress_rejects_completed_over_total() {
        assert!(ImportProgress::new(ImportPhase::CreatingComponents, 3, 3).is_ok());

        let err = ImportProgress::new(ImportPhase::CreatingComponents, 2, 3).unwrap_err();
        assert!(matches!(err, SessionError::InvalidProgress { total: 2, completed: 3 }));
    }

    #[test]
    fn test_progress_deserialization_enforces_bound() {
        let json = r#"{"phase":"creating_components","total_items":1,"completed_items":5}"#;
        assert!(serde_json::from_str::<ImportProgress>(json).is_err());
    }

    #[test]
    fn test_phase_names_parse() {
        for phase in ImportPhase::ALL {
            assert_eq!(phase.as_str().parse::<ImportPhase>().unwrap(), phase);
        }
        assert!("reticulating_splines".parse::<ImportPhase>().is_err());
    }

    #[test]
    fn test_source_format_parse() {
        assert_eq!(
            "archimate-openexchange".parse::<SourceFormat>().unwrap(),
            SourceFormat::ArchimateOpenExchange
        );
        assert!(matches!(
            "visio".parse::<SourceFormat>(),
            Err(SessionError::UnsupportedSourceFormat(_))
        ));
    }

    #[test]
    fn test_result_error_counts() {
        let result = ImportResult {
            errors: vec![
                ImportError::skipped("id-1", "A", "boom"),
                ImportError::warning("id-2", "B", "stage failed"),
                ImportError::skipped("id-3", "C", "boom"),
            ],
            ..Default::default()
        };

        assert_eq!(result.skipped_count(), 2);
        assert_eq!(result.warning_count(), 1);
    }
}
