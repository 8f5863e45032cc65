//! File-backed gateway used by the CLI.
//!
//! Every created object is appended as one JSON line to a ledger file, so
//! an import can be run end to end and inspected without a target system.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CapabilityGateway, ComponentGateway, ComponentRelationType, NewCapability, ValueStreamGateway};

/// One line of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub entry: LedgerEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    Component {
        name: String,
        description: String,
    },
    ComponentRelation {
        source_id: Uuid,
        target_id: Uuid,
        relation_type: ComponentRelationType,
        name: String,
        notes: String,
    },
    Capability {
        name: String,
        description: String,
        parent_id: Option<Uuid>,
        level: String,
    },
    CapabilityMetadata {
        capability_id: Uuid,
        ea_owner: String,
        status: String,
    },
    Realization {
        capability_id: Uuid,
        component_id: Uuid,
        realization_level: String,
        notes: String,
    },
    DomainAssignment {
        capability_id: Uuid,
        business_domain_id: Uuid,
    },
    ValueStream {
        name: String,
        description: String,
    },
    Stage {
        value_stream_id: Uuid,
        name: String,
        description: String,
    },
    StageMapping {
        value_stream_id: Uuid,
        stage_id: Uuid,
        capability_id: Uuid,
        notes: String,
    },
}

/// Gateway that writes created objects to a JSONL ledger
pub struct LedgerGateway {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LedgerGateway {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create ledger directory: {}", parent.display()))?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn record(&self, entry: LedgerEntry) -> Result<Uuid> {
        let record = LedgerRecord {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            entry,
        };
        let json = serde_json::to_string(&record).context("Failed to serialize ledger record")?;

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open ledger: {}", self.path.display()))?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write ledger record")?;
        file.flush().await.context("Failed to flush ledger")?;

        Ok(record.id)
    }

    /// Read every record back, in write order
    pub async fn records(&self) -> Result<Vec<LedgerRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read ledger: {}", self.path.display()))?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .with_context(|| format!("Failed to parse ledger record: {}", line))
            })
            .collect()
    }
}

#[async_trait]
impl ComponentGateway for LedgerGateway {
    async fn create_component(&self, name: &str, description: &str) -> Result<Uuid> {
        if name.trim().is_empty() {
            anyhow::bail!("Component name cannot be empty");
        }

        self.record(LedgerEntry::Component {
            name: name.to_string(),
            description: description.to_string(),
        })
        .await
    }

    async fn create_relation(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relation_type: ComponentRelationType,
        name: &str,
        notes: &str,
    ) -> Result<Uuid> {
        self.record(LedgerEntry::ComponentRelation {
            source_id,
            target_id,
            relation_type,
            name: name.to_string(),
            notes: notes.to_string(),
        })
        .await
    }
}

#[async_trait]
impl CapabilityGateway for LedgerGateway {
    async fn create_capability(&self, capability: &NewCapability) -> Result<Uuid> {
        if capability.name.trim().is_empty() {
            anyhow::bail!("Capability name cannot be empty");
        }

        self.record(LedgerEntry::Capability {
            name: capability.name.clone(),
            description: capability.description.clone(),
            parent_id: capability.parent_id,
            level: capability.level.clone(),
        })
        .await
    }

    async fn update_metadata(&self, capability_id: Uuid, ea_owner: &str, status: &str) -> Result<()> {
        self.record(LedgerEntry::CapabilityMetadata {
            capability_id,
            ea_owner: ea_owner.to_string(),
            status: status.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn link_to_component(
        &self,
        capability_id: Uuid,
        component_id: Uuid,
        realization_level: &str,
        notes: &str,
    ) -> Result<Uuid> {
        self.record(LedgerEntry::Realization {
            capability_id,
            component_id,
            realization_level: realization_level.to_string(),
            notes: notes.to_string(),
        })
        .await
    }

    async fn assign_to_domain(&self, capability_id: Uuid, business_domain_id: Uuid) -> Result<()> {
        self.record(LedgerEntry::DomainAssignment {
            capability_id,
            business_domain_id,
        })
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl ValueStreamGateway for LedgerGateway {
    async fn create_value_stream(&self, name: &str, description: &str) -> Result<Uuid> {
        if name.trim().is_empty() {
            anyhow::bail!("Value stream name cannot be empty");
        }

        self.record(LedgerEntry::ValueStream {
            name: name.to_string(),
            description: description.to_string(),
        })
        .await
    }

    async fn add_stage(&self, value_stream_id: Uuid, name: &str, description: &str) -> Result<Uuid> {
        self.record(LedgerEntry::Stage {
            value_stream_id,
            name: name.to_string(),
            description: description.to_string(),
        })
        .await
    }

    async fn map_capability_to_stage(
        &self,
        value_stream_id: Uuid,
        stage_id: Uuid,
        capability_id: Uuid,
        notes: &str,
    ) -> Result<()> {
        self.record(LedgerEntry::StageMapping {
            value_stream_id,
            stage_id,
            capability_id,
            notes: notes.to_string(),
        })
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_records_in_order() {
        let temp = TempDir::new().unwrap();
        let ledger = LedgerGateway::open(temp.path().join("out").join("ledger.jsonl"))
            .await
            .unwrap();

        let component = ledger.create_component("CRM", "").await.unwrap();
        let capability = ledger
            .create_capability(&NewCapability {
                name: "Sales".to_string(),
                description: String::new(),
                parent_id: None,
                level: "L1".to_string(),
            })
            .await
            .unwrap();
        ledger
            .link_to_component(capability, component, "Full", "")
            .await
            .unwrap();

        let records = ledger.records().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, component);
        assert!(matches!(records[1].entry, LedgerEntry::Capability { .. }));
        assert!(matches!(
            records[2].entry,
            LedgerEntry::Realization { capability_id, .. } if capability_id == capability
        ));
    }

    #[tokio::test]
    async fn test_blank_names_rejected() {
        let temp = TempDir::new().unwrap();
        let ledger = LedgerGateway::open(temp.path().join("ledger.jsonl"))
            .await
            .unwrap();

        assert!(ledger.create_component("  ", "").await.is_err());
        assert!(ledger.create_value_stream("", "").await.is_err());
        assert!(ledger.records().await.unwrap().is_empty());
    }
}
