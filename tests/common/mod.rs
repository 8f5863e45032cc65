//! Shared test fixtures: a scripted in-memory gateway and document builders.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use ea_import::adapters::{
    CapabilityGateway, ComponentGateway, ComponentRelationType, NewCapability, ValueStreamGateway,
};
use ea_import::core::ImportSaga;

/// One gateway call that succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Component { id: Uuid, name: String },
    Relation { source: Uuid, target: Uuid, relation_type: ComponentRelationType },
    Capability { id: Uuid, name: String, parent: Option<Uuid>, level: String },
    Metadata { capability: Uuid, owner: String, status: String },
    Realization { capability: Uuid, component: Uuid, level: String, notes: String },
    Domain { capability: Uuid, domain: Uuid },
    ValueStream { id: Uuid, name: String },
    Stage { id: Uuid, value_stream: Uuid, name: String },
    Mapping { value_stream: Uuid, stage: Uuid, capability: Uuid },
}

/// What every gateway call does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Normal,
    Panic,
    /// Never returns
    Hang,
    /// Sleeps before answering
    Slow(Duration),
}

/// In-memory gateway whose failures are scripted per name or per call kind
#[derive(Default)]
pub struct ScriptedGateway {
    pub behavior: Behavior,
    pub fail_names: HashSet<String>,
    pub fail_stages: bool,
    pub fail_metadata: bool,
    pub fail_domains: bool,
    pub calls: Mutex<Vec<Call>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            fail_names: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn capability_id(&self, name: &str) -> Option<Uuid> {
        self.calls().into_iter().find_map(|c| match c {
            Call::Capability { id, name: n, .. } if n == name => Some(id),
            _ => None,
        })
    }

    pub fn component_id(&self, name: &str) -> Option<Uuid> {
        self.calls().into_iter().find_map(|c| match c {
            Call::Component { id, name: n } if n == name => Some(id),
            _ => None,
        })
    }

    pub fn capabilities(&self) -> Vec<(String, Option<Uuid>, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Capability { name, parent, level, .. } => Some((name, parent, level)),
                _ => None,
            })
            .collect()
    }

    async fn enter(&self, name: &str) -> Result<()> {
        match self.behavior {
            Behavior::Normal => {}
            Behavior::Panic => panic!("scripted gateway panic on {}", name),
            Behavior::Hang => std::future::pending::<()>().await,
            Behavior::Slow(delay) => tokio::time::sleep(delay).await,
        }

        if self.fail_names.contains(name) {
            bail!("scripted failure for {}", name);
        }
        Ok(())
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn saga(self: &Arc<Self>) -> ImportSaga {
        ImportSaga::new(self.clone(), self.clone(), self.clone())
    }
}

#[async_trait]
impl ComponentGateway for ScriptedGateway {
    async fn create_component(&self, name: &str, _description: &str) -> Result<Uuid> {
        self.enter(name).await?;
        let id = Uuid::new_v4();
        self.record(Call::Component { id, name: name.to_string() });
        Ok(id)
    }

    async fn create_relation(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relation_type: ComponentRelationType,
        name: &str,
        _notes: &str,
    ) -> Result<Uuid> {
        self.enter(name).await?;
        self.record(Call::Relation {
            source: source_id,
            target: target_id,
            relation_type,
        });
        Ok(Uuid::new_v4())
    }
}

#[async_trait]
impl CapabilityGateway for ScriptedGateway {
    async fn create_capability(&self, capability: &NewCapability) -> Result<Uuid> {
        self.enter(&capability.name).await?;
        let id = Uuid::new_v4();
        self.record(Call::Capability {
            id,
            name: capability.name.clone(),
            parent: capability.parent_id,
            level: capability.level.clone(),
        });
        Ok(id)
    }

    async fn update_metadata(&self, capability_id: Uuid, ea_owner: &str, status: &str) -> Result<()> {
        self.enter("").await?;
        if self.fail_metadata {
            bail!("scripted metadata failure");
        }
        self.record(Call::Metadata {
            capability: capability_id,
            owner: ea_owner.to_string(),
            status: status.to_string(),
        });
        Ok(())
    }

    async fn link_to_component(
        &self,
        capability_id: Uuid,
        component_id: Uuid,
        realization_level: &str,
        notes: &str,
    ) -> Result<Uuid> {
        self.enter(notes).await?;
        self.record(Call::Realization {
            capability: capability_id,
            component: component_id,
            level: realization_level.to_string(),
            notes: notes.to_string(),
        });
        Ok(Uuid::new_v4())
    }

    async fn assign_to_domain(&self, capability_id: Uuid, business_domain_id: Uuid) -> Result<()> {
        self.enter("").await?;
        if self.fail_domains {
            bail!("scripted domain failure");
        }
        self.record(Call::Domain {
            capability: capability_id,
            domain: business_domain_id,
        });
        Ok(())
    }
}

#[async_trait]
impl ValueStreamGateway for ScriptedGateway {
    async fn create_value_stream(&self, name: &str, _description: &str) -> Result<Uuid> {
        self.enter(name).await?;
        let id = Uuid::new_v4();
        self.record(Call::ValueStream { id, name: name.to_string() });
        Ok(id)
    }

    async fn add_stage(&self, value_stream_id: Uuid, name: &str, _description: &str) -> Result<Uuid> {
        self.enter(name).await?;
        if self.fail_stages {
            bail!("scripted stage failure");
        }
        let id = Uuid::new_v4();
        self.record(Call::Stage {
            id,
            value_stream: value_stream_id,
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn map_capability_to_stage(
        &self,
        value_stream_id: Uuid,
        stage_id: Uuid,
        capability_id: Uuid,
        notes: &str,
    ) -> Result<()> {
        self.enter(notes).await?;
        self.record(Call::Mapping {
            value_stream: value_stream_id,
            stage: stage_id,
            capability: capability_id,
        });
        Ok(())
    }
}

/// Build an Open Exchange document.
///
/// Elements are `(id, type, name)`; relationships are
/// `(id, type, source, target)`.
pub fn document(elements: &[(&str, &str, &str)], relationships: &[(&str, &str, &str, &str)]) -> String {
    let named: Vec<(&str, &str, &str, &str, &str)> = relationships
        .iter()
        .map(|(id, type_name, source, target)| (*id, *type_name, *source, *target, ""))
        .collect();
    named_document(elements, &named)
}

/// Like [`document`], with relationships as `(id, type, source, target, name)`.
///
/// An empty name leaves the `<name>` child out.
pub fn named_document(
    elements: &[(&str, &str, &str)],
    relationships: &[(&str, &str, &str, &str, &str)],
) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<model xmlns="http://www.opengroup.org/xsd/archimate/3.0/"
       xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
       identifier="model">
  <name xml:lang="en">Test model</name>
  <elements>
"#,
    );

    for (id, type_name, name) in elements {
        xml.push_str(&format!(
            "    <element identifier=\"{}\" xsi:type=\"{}\"><name xml:lang=\"en\">{}</name></element>\n",
            id, type_name, name
        ));
    }
    xml.push_str("  </elements>\n  <relationships>\n");

    for (id, type_name, source, target, name) in relationships {
        let open = format!(
            "    <relationship identifier=\"{}\" source=\"{}\" target=\"{}\" xsi:type=\"{}\"",
            id, source, target, type_name
        );
        if name.is_empty() {
            xml.push_str(&format!("{}/>\n", open));
        } else {
            xml.push_str(&format!(
                "{}><name xml:lang=\"en\">{}</name></relationship>\n",
                open, name
            ));
        }
    }
    xml.push_str("  </relationships>\n</model>\n");

    xml
}

/// A document touching every phase of an import
pub fn full_document() -> String {
    document(
        &[
            ("cap-root", "Capability", "Customer Management"),
            ("cap-child", "Capability", "Customer Onboarding"),
            ("app-crm", "ApplicationComponent", "CRM"),
            ("app-billing", "ApplicationComponent", "Billing"),
            ("vs-1", "ValueStream", "Acquire Customer"),
            ("node-1", "Node", "Server"),
        ],
        &[
            ("rel-parent", "Composition", "cap-root", "cap-child"),
            ("rel-real", "Realization", "app-crm", "cap-child"),
            ("rel-trig", "Triggering", "app-crm", "app-billing"),
            ("rel-map", "Association", "cap-root", "vs-1"),
            ("rel-assign", "Assignment", "node-1", "app-crm"),
        ],
    )
}
