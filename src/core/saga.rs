//! The import saga: eight ordered, best-effort creation phases.
//!
//! Every phase always runs. A failing item becomes an `ImportError` and the
//! phase moves on. Relationships are routed to phases by which ID maps their
//! endpoints resolve in, never by type alone.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    CapabilityGateway, ComponentGateway, ComponentRelationType, NewCapability, ValueStreamGateway,
    DEFAULT_CAPABILITY_STATUS, DEFAULT_REALIZATION_LEVEL, DEFAULT_STAGE_NAME,
};
use crate::domain::{
    ImportError, ImportPhase, ImportResult, ParsedData, ParsedElement, ParsedRelationship,
    RelationshipKind, MAX_CAPABILITY_LEVEL,
};

/// Run-level saga failures (item failures are never errors)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    #[error("import cancelled")]
    Cancelled,
}

const UNREACHABLE_CAPABILITY: &str = "Capability is not reachable from a root capability";

/// Session settings the saga needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportContext {
    pub business_domain_id: Option<Uuid>,
    pub capability_ea_owner: Option<String>,
}

/// Receives progress after each phase
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, phase: ImportPhase, total: usize, completed: usize);
}

/// Reporter that drops progress
pub struct NoProgress;

#[async_trait]
impl ProgressReporter for NoProgress {
    async fn report(&self, _phase: ImportPhase, _total: usize, _completed: usize) {}
}

/// What one phase did
#[derive(Debug, Default)]
struct PhaseReport {
    total: usize,
    processed: usize,
    created: usize,
    errors: Vec<ImportError>,
}

impl PhaseReport {
    fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    fn succeeded(&mut self) {
        self.processed += 1;
        self.created += 1;
    }

    fn failed(&mut self, error: ImportError) {
        self.processed += 1;
        self.errors.push(error);
    }
}

/// A capability created in phase 2
#[derive(Debug, Clone)]
struct CreatedCapability {
    source_id: String,
    name: String,
    id: Uuid,
}

/// ID maps built up during one run. Append-only; never shared across runs.
#[derive(Debug, Default)]
struct SagaRun {
    component_ids: HashMap<String, Uuid>,
    capability_ids: HashMap<String, Uuid>,
    created_capabilities: Vec<CreatedCapability>,
    value_stream_ids: HashMap<String, Uuid>,
    stage_ids: HashMap<String, Uuid>,
    parent_of: HashMap<String, String>,
}

/// Hierarchy depth of each capability, 1 for roots.
///
/// Capabilities that cannot be reached from a root (members of a parent
/// cycle and their descendants) are absent from the map.
pub fn capability_levels(
    capabilities: &[ParsedElement],
    parent_of: &HashMap<String, String>,
) -> HashMap<String, usize> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

    for capability in capabilities {
        match parent_of.get(&capability.source_id) {
            Some(parent) => children
                .entry(parent.as_str())
                .or_default()
                .push(capability.source_id.as_str()),
            None => queue.push_back((capability.source_id.as_str(), 1)),
        }
    }

    let mut levels = HashMap::new();
    while let Some((id, level)) = queue.pop_front() {
        if levels.contains_key(id) {
            continue;
        }
        levels.insert(id.to_string(), level);

        if let Some(kids) = children.get(id) {
            for child in kids {
                queue.push_back((child, level + 1));
            }
        }
    }

    levels
}

/// Level label, capped at the deepest supported level
pub fn level_label(level: usize) -> String {
    format!("L{}", level.clamp(1, MAX_CAPABILITY_LEVEL))
}

/// Child -> parent for parent/child links between two capabilities
pub fn parent_map(data: &ParsedData) -> HashMap<String, String> {
    let capability_ids: HashSet<&str> = data
        .capabilities
        .iter()
        .map(|c| c.source_id.as_str())
        .collect();

    let mut parents = HashMap::new();
    for rel in data.relationships.iter().filter(|r| r.kind.is_parent_child()) {
        if capability_ids.contains(rel.source_ref.as_str())
            && capability_ids.contains(rel.target_ref.as_str())
        {
            parents
                .entry(rel.target_ref.clone())
                .or_insert_with(|| rel.source_ref.clone());
        }
    }
    parents
}

fn relationship_label(rel: &ParsedRelationship) -> String {
    if rel.name.trim().is_empty() {
        rel.kind.type_name().to_string()
    } else {
        rel.name.clone()
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), SagaError> {
    if cancel.is_cancelled() {
        return Err(SagaError::Cancelled);
    }
    Ok(())
}

/// Orchestrates creation of parsed data through the gateways
#[derive(Clone)]
pub struct ImportSaga {
    components: Arc<dyn ComponentGateway>,
    capabilities: Arc<dyn CapabilityGateway>,
    value_streams: Arc<dyn ValueStreamGateway>,
}

impl ImportSaga {
    pub fn new(
        components: Arc<dyn ComponentGateway>,
        capabilities: Arc<dyn CapabilityGateway>,
        value_streams: Arc<dyn ValueStreamGateway>,
    ) -> Self {
        Self {
            components,
            capabilities,
            value_streams,
        }
    }

    /// Run all phases in order and collect the result.
    ///
    /// Returns `Err` only when `cancel` fires; cancellation is checked
    /// between items and between phases.
    #[instrument(skip_all, fields(
        capabilities = data.capabilities.len(),
        components = data.components.len(),
        value_streams = data.value_streams.len(),
    ))]
    pub async fn execute(
        &self,
        data: &ParsedData,
        context: &ImportContext,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ImportResult, SagaError> {
        let mut run = SagaRun {
            parent_of: parent_map(data),
            ..Default::default()
        };
        let mut result = ImportResult::default();

        for phase in ImportPhase::ALL {
            checkpoint(cancel)?;

            let report = match phase {
                ImportPhase::CreatingComponents => {
                    self.create_components(data, &mut run, cancel).await?
                }
                ImportPhase::CreatingCapabilities => {
                    self.create_capabilities(data, &mut run, cancel).await?
                }
                ImportPhase::AssigningCapabilityMetadata => {
                    self.assign_metadata(context, &run, cancel).await?
                }
                ImportPhase::CreatingValueStreams => {
                    self.create_value_streams(data, &mut run, cancel).await?
                }
                ImportPhase::CreatingRealizations => {
                    self.create_realizations(data, &run, cancel).await?
                }
                ImportPhase::CreatingComponentRelations => {
                    self.create_component_relations(data, &run, cancel).await?
                }
                ImportPhase::AssigningCapabilityDomains => {
                    self.assign_domains(context, &run, cancel).await?
                }
                ImportPhase::MappingCapabilitiesToStages => {
                    self.map_capabilities_to_stages(data, &run, cancel).await?
                }
            };

            info!(
                phase = %phase,
                total = report.total,
                created = report.created,
                errors = report.errors.len(),
                "Phase finished"
            );

            match phase {
                ImportPhase::CreatingComponents => result.components_created = report.created,
                ImportPhase::CreatingCapabilities => result.capabilities_created = report.created,
                ImportPhase::AssigningCapabilityMetadata => {
                    result.capability_metadata_updated = report.created
                }
                ImportPhase::CreatingValueStreams => result.value_streams_created = report.created,
                ImportPhase::CreatingRealizations => result.realizations_created = report.created,
                ImportPhase::CreatingComponentRelations => {
                    result.component_relations_created = report.created
                }
                ImportPhase::AssigningCapabilityDomains => result.domain_assignments = report.created,
                ImportPhase::MappingCapabilitiesToStages => {
                    result.capability_mappings = report.created
                }
            }
            result.errors.extend(report.errors);

            progress.report(phase, report.total, report.processed).await;
        }

        Ok(result)
    }

    async fn create_components(
        &self,
        data: &ParsedData,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<PhaseReport, SagaError> {
        let mut report = PhaseReport::with_total(data.components.len());

        for component in &data.components {
            checkpoint(cancel)?;

            match self
                .components
                .create_component(&component.name, &component.description)
                .await
            {
                Ok(id) => {
                    run.component_ids.insert(component.source_id.clone(), id);
                    report.succeeded();
                }
                Err(e) => {
                    warn!(source_id = %component.source_id, error = %e, "Component not created");
                    report.failed(ImportError::skipped(
                        &component.source_id,
                        &component.name,
                        format!("Failed to create component: {:#}", e),
                    ));
                }
            }
        }

        Ok(report)
    }

    async fn create_capabilities(
        &self,
        data: &ParsedData,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<PhaseReport, SagaError> {
        let mut report = PhaseReport::with_total(data.capabilities.len());
        let levels = capability_levels(&data.capabilities, &run.parent_of);
        let deepest = levels.values().copied().max().unwrap_or(0);

        for level in 1..=deepest {
            for capability in data
                .capabilities
                .iter()
                .filter(|c| levels.get(&c.source_id) == Some(&level))
            {
                checkpoint(cancel)?;
                self.create_capability(capability, level, run, &mut report)
                    .await;
            }
        }

        for capability in data
            .capabilities
            .iter()
            .filter(|c| !levels.contains_key(&c.source_id))
        {
            warn!(
                source_id = %capability.source_id,
                "Capability is not reachable from a root capability"
            );
            report.failed(ImportError::skipped(
                &capability.source_id,
                &capability.name,
                UNREACHABLE_CAPABILITY,
            ));
        }

        Ok(report)
    }

    async fn create_capability(
        &self,
        capability: &ParsedElement,
        level: usize,
        run: &mut SagaRun,
        report: &mut PhaseReport,
    ) {
        let parent_source = run.parent_of.get(&capability.source_id);
        let parent_id = parent_source.and_then(|p| run.capability_ids.get(p)).copied();

        let request = NewCapability {
            name: capability.name.clone(),
            description: capability.description.clone(),
            parent_id,
            level: level_label(level),
        };

        match self.capabilities.create_capability(&request).await {
            Ok(id) => {
                debug!(source_id = %capability.source_id, level = %request.level, "Capability created");
                run.capability_ids.insert(capability.source_id.clone(), id);
                run.created_capabilities.push(CreatedCapability {
                    source_id: capability.source_id.clone(),
                    name: capability.name.clone(),
                    id,
                });
                report.succeeded();

                if parent_source.is_some() && parent_id.is_none() {
                    report.errors.push(ImportError::warning(
                        &capability.source_id,
                        &capability.name,
                        "Parent capability was not created; imported without a parent",
                    ));
                }
            }
            Err(e) => {
                warn!(source_id = %capability.source_id, error = %e, "Capability not created");
                report.failed(ImportError::skipped(
                    &capability.source_id,
                    &capability.name,
                    format!("Failed to create capability: {:#}", e),
                ));
            }
        }
    }

    async fn assign_metadata(
        &self,
        context: &ImportContext,
        run: &SagaRun,
        cancel: &CancellationToken,
    ) -> Result<PhaseReport, SagaError> {
        let owner = match context.capability_ea_owner.as_deref() {
            Some(owner) if !run.created_capabilities.is_empty() => owner,
            _ => {
                debug!("No EA owner or no capabilities, skipping metadata");
                return Ok(PhaseReport::default());
            }
        };

        let mut report = PhaseReport::with_total(run.created_capabilities.len());
        for capability in &run.created_capabilities {
            checkpoint(cancel)?;

            match self
                .capabilities
                .update_metadata(capability.id, owner, DEFAULT_CAPABILITY_STATUS)
                .await
            {
                Ok(()) => report.succeeded(),
                Err(e) => {
                    warn!(source_id = %capability.source_id, error = %e, "Capability metadata not set");
                    report.failed(ImportError::warning(
                        &capability.source_id,
                        &capability.name,
                        format!("Capability created but metadata update failed: {:#}", e),
                    ));
                }
            }
        }

        Ok(report)
    }

    async fn create_value_streams(
        &self,
        data: &ParsedData,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<PhaseReport, SagaError> {
        let mut report = PhaseReport::with_total(data.value_streams.len());

        for value_stream in &data.value_streams {
            checkpoint(cancel)?;

            let value_stream_id = match self
                .value_streams
                .create_value_stream(&value_stream.name, &value_stream.description)
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    warn!(source_id = %value_stream.source_id, error = %e, "Value stream not created");
                    report.failed(ImportError::skipped(
                        &value_stream.source_id,
                        &value_stream.name,
                        format!("Failed to create value stream: {:#}", e),
                    ));
                    continue;
                }
            };
            run.value_stream_ids
                .insert(value_stream.source_id.clone(), value_stream_id);

            match self
                .value_streams
                .add_stage(value_stream_id, DEFAULT_STAGE_NAME, "")
                .await
            {
                Ok(stage_id) => {
                    run.stage_ids.insert(value_stream.source_id.clone(), stage_id);
                    report.succeeded();
                }
                Err(e) => {
                    warn!(source_id = %value_stream.source_id, error = %e, "Default stage not created");
                    report.failed(ImportError::warning(
                        &value_stream.source_id,
                        &value_stream.name,
                        format!("Value stream created but default stage failed: {:#}", e),
                    ));
                }
            }
        }

        Ok(report)
    }

    async fn create_realizations(
        &self,
        data: &ParsedData,
        run: &SagaRun,
        cancel: &CancellationToken,
    ) -> Result<PhaseReport, SagaError> {
        let candidates: Vec<(&ParsedRelationship, Uuid, Uuid)> = data
            .relationships
            .iter()
            .filter(|rel| rel.kind == RelationshipKind::Realization)
            .filter_map(|rel| {
                let component = run.component_ids.get(&rel.source_ref)?;
                let capability = run.capability_ids.get(&rel.target_ref)?;
                Some((rel, *component, *capability))
            })
            .collect();

        let mut report = PhaseReport::with_total(candidates.len());
        for (rel, component_id, capability_id) in candidates {
            checkpoint(cancel)?;

            match self
                .capabilities
                .link_to_component(capability_id, component_id, DEFAULT_REALIZATION_LEVEL, &rel.notes())
                .await
            {
                Ok(_) => report.succeeded(),
                Err(e) => {
                    warn!(source_id = %rel.source_id, error = %e, "Realization not created");
                    report.failed(ImportError::skipped(
                        &rel.source_id,
                        relationship_label(rel),
                        format!("Failed to create realization: {:#}", e),
                    ));
                }
            }
        }

        Ok(report)
    }

    async fn create_component_relations(
        &self,
        data: &ParsedData,
        run: &SagaRun,
        cancel: &CancellationToken,
    ) -> Result<PhaseReport, SagaError> {
        let candidates: Vec<(&ParsedRelationship, ComponentRelationType, Uuid, Uuid)> = data
            .relationships
            .iter()
            .filter_map(|rel| {
                let relation_type = match rel.kind {
                    RelationshipKind::Triggering => ComponentRelationType::Triggers,
                    RelationshipKind::Serving => ComponentRelationType::Serves,
                    _ => return None,
                };
                let source = run.component_ids.get(&rel.source_ref)?;
                let target = run.component_ids.get(&rel.target_ref)?;
                Some((rel, relation_type, *source, *target))
            })
            .collect();

        let mut report = PhaseReport::with_total(candidates.len());
        for (rel, relation_type, source_id, target_id) in candidates {
            checkpoint(cancel)?;

            match self
                .components
                .create_relation(source_id, target_id, relation_type, &rel.name, &rel.notes())
                .await
            {
                Ok(_) => report.succeeded(),
                Err(e) => {
                    warn!(source_id = %rel.source_id, error = %e, "Component relation not created");
                    report.failed(ImportError::skipped(
                        &rel.source_id,
                        relationship_label(rel),
                        format!("Failed to create component relation: {:#}", e),
                    ));
                }
            }
        }

        Ok(report)
    }

    async fn assign_domains(
        &self,
        context: &ImportContext,
        run: &SagaRun,
        cancel: &CancellationToken,
    ) -> Result<PhaseReport, SagaError> {
        let Some(domain_id) = context.business_domain_id else {
            debug!("No business domain, skipping domain assignment");
            return Ok(PhaseReport::default());
        };

        let roots: Vec<&CreatedCapability> = run
            .created_capabilities
            .iter()
            .filter(|c| !run.parent_of.contains_key(&c.source_id))
            .collect();

        let mut report = PhaseReport::with_total(roots.len());
        for capability in roots {
            checkpoint(cancel)?;

            match self
                .capabilities
                .assign_to_domain(capability.id, domain_id)
                .await
            {
                Ok(()) => report.succeeded(),
                Err(e) => {
                    warn!(source_id = %capability.source_id, error = %e, "Domain assignment failed");
                    report.failed(ImportError::warning(
                        &capability.source_id,
                        &capability.name,
                        format!("Capability created but domain assignment failed: {:#}", e),
                    ));
                }
            }
        }

        Ok(report)
    }

    async fn map_capabilities_to_stages(
        &self,
        data: &ParsedData,
        run: &SagaRun,
        cancel: &CancellationToken,
    ) -> Result<PhaseReport, SagaError> {
        if run.value_stream_ids.is_empty() {
            debug!("No value streams created, skipping stage mapping");
            return Ok(PhaseReport::default());
        }

        let candidates: Vec<(&ParsedRelationship, Uuid, Uuid, Uuid)> = data
            .relationships
            .iter()
            .filter(|rel| {
                matches!(
                    rel.kind,
                    RelationshipKind::Association
                        | RelationshipKind::Serving
                        | RelationshipKind::Triggering
                        | RelationshipKind::Realization
                )
            })
            .filter_map(|rel| {
                let capability = run.capability_ids.get(&rel.source_ref)?;
                let value_stream = run.value_stream_ids.get(&rel.target_ref)?;
                let stage = run.stage_ids.get(&rel.target_ref)?;
                Some((rel, *value_stream, *stage, *capability))
            })
            .collect();

        let mut report = PhaseReport::with_total(candidates.len());
        for (rel, value_stream_id, stage_id, capability_id) in candidates {
            checkpoint(cancel)?;

            match self
                .value_streams
                .map_capability_to_stage(value_stream_id, stage_id, capability_id, &rel.notes())
                .await
            {
                Ok(()) => report.succeeded(),
                Err(e) => {
                    warn!(source_id = %rel.source_id, error = %e, "Capability not mapped to stage");
                    report.failed(ImportError::skipped(
                        &rel.source_id,
                        relationship_label(rel),
                        format!("Failed to map capability to stage: {:#}", e),
                    ));
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(depth: usize) -> (Vec<ParsedElement>, HashMap<String, String>) {
        let capabilities: Vec<ParsedElement> = (1..=depth)
            .map(|i| ParsedElement::new(format!("c{}", i), format!("Cap {}", i)))
            .collect();
        let parents = (2..=depth)
            .map(|i| (format!("c{}", i), format!("c{}", i - 1)))
            .collect();
        (capabilities, parents)
    }

    #[test]
    fn test_levels_increase_by_generation() {
        let (capabilities, parents) = chain(6);
        let levels = capability_levels(&capabilities, &parents);

        for i in 1..=6 {
            assert_eq!(levels[&format!("c{}", i)], i);
        }
    }

    #[test]
    fn test_level_label_caps_at_max() {
        let labels: Vec<String> = (1..=6).map(level_label).collect();
        assert_eq!(labels, vec!["L1", "L2", "L3", "L4", "L4", "L4"]);
    }

    #[test]
    fn test_cycle_is_unreachable() {
        let capabilities = vec![
            ParsedElement::new("root", "Root"),
            ParsedElement::new("a", "A"),
            ParsedElement::new("b", "B"),
        ];
        let parents: HashMap<String, String> = [
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "a".to_string()),
        ]
        .into_iter()
        .collect();

        let levels = capability_levels(&capabilities, &parents);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels["root"], 1);
    }

    #[test]
    fn test_parent_map_ignores_non_capability_endpoints() {
        let data = ParsedData {
            capabilities: vec![ParsedElement::new("a", "A"), ParsedElement::new("b", "B")],
            components: vec![ParsedElement::new("x", "X")],
            relationships: vec![
                ParsedRelationship::new("r1", RelationshipKind::Composition, "a", "b"),
                ParsedRelationship::new("r2", RelationshipKind::Composition, "x", "a"),
            ],
            ..Default::default()
        };

        let parents = parent_map(&data);
        assert_eq!(parents.len(), 1);
        assert_eq!(parents["b"], "a");
    }
}
