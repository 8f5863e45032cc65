//! Gateways to the systems that own the created objects.
//!
//! The saga only ever talks to these traits. Every call may fail on its
//! own; a failure is local to the item being imported.

pub mod ledger;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use ledger::LedgerGateway;

/// Status applied to every imported capability when metadata is set
pub const DEFAULT_CAPABILITY_STATUS: &str = "Active";

/// Realization level used for component-to-capability links
pub const DEFAULT_REALIZATION_LEVEL: &str = "Full";

/// Name of the stage created with each value stream
pub const DEFAULT_STAGE_NAME: &str = "Default Stage";

/// Direction-carrying relation types between two components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentRelationType {
    Triggers,
    Serves,
}

impl ComponentRelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triggers => "Triggers",
            Self::Serves => "Serves",
        }
    }
}

/// A capability to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCapability {
    pub name: String,
    pub description: String,
    pub parent_id: Option<Uuid>,
    /// "L1".."L4"
    pub level: String,
}

#[async_trait]
pub trait ComponentGateway: Send + Sync {
    async fn create_component(&self, name: &str, description: &str) -> Result<Uuid>;

    async fn create_relation(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relation_type: ComponentRelationType,
        name: &str,
        notes: &str,
    ) -> Result<Uuid>;
}

#[async_trait]
pub trait CapabilityGateway: Send + Sync {
    async fn create_capability(&self, capability: &NewCapability) -> Result<Uuid>;

    async fn update_metadata(&self, capability_id: Uuid, ea_owner: &str, status: &str) -> Result<()>;

    async fn link_to_component(
        &self,
        capability_id: Uuid,
        component_id: Uuid,
        realization_level: &str,
        notes: &str,
    ) -> Result<Uuid>;

    async fn assign_to_domain(&self, capability_id: Uuid, business_domain_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait ValueStreamGateway: Send + Sync {
    async fn create_value_stream(&self, name: &str, description: &str) -> Result<Uuid>;

    async fn add_stage(&self, value_stream_id: Uuid, name: &str, description: &str) -> Result<Uuid>;

    async fn map_capability_to_stage(
        &self,
        value_stream_id: Uuid,
        stage_id: Uuid,
        capability_id: Uuid,
        notes: &str,
    ) -> Result<()>;
}
