//! Spoke registry (P): named, tenant-scoped partitions of the entity graph
//! (spec §2). Every entity belongs to exactly one spoke; a `default` spoke
//! always exists and cannot be deleted. A spoke may be "centered" on one
//! entity (spec invariant 4) — typically the subject of a single-person
//! research spoke — whose record gets merge protection the resolver and
//! merge engine both consult.
//!
//! Grounded on the teacher's `PatternBuilder` validation style
//! (`aetherlight-core/src/pattern.rs`) applied to a much smaller struct.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::template::NecessityTier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spoke {
    pub spoke_id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// The entity this spoke is centered on, if any (spec invariant 4).
    /// Its `name`/`summary` are protected during merges and any cluster
    /// matching it always routes to Q2_ENRICH regardless of data novelty.
    #[serde(default)]
    pub centered_entity_id: Option<String>,
    #[serde(default)]
    pub centered_entity_name: Option<String>,
    /// Where the spoke itself came from (e.g. "manual", an import job id).
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Per-field necessity-tier overrides consulted by the gap analyzer
    /// (spec §3/§4.8 step 4) — a tenant may need `ssn` to be EXPECTED rather
    /// than BLOCKING for this spoke, for instance.
    #[serde(default)]
    pub tier_adjustments: HashMap<String, NecessityTier>,
    /// The default spoke cannot be renamed or deleted (spec §2 invariant).
    pub is_default: bool,
}

fn default_source() -> String {
    "manual".to_string()
}

pub const DEFAULT_SPOKE_ID: &str = "default";

impl Spoke {
    pub fn default_spoke() -> Self {
        let now = Utc::now();
        Spoke {
            spoke_id: DEFAULT_SPOKE_ID.to_string(),
            display_name: "Default".to_string(),
            description: None,
            centered_entity_id: None,
            centered_entity_name: None,
            source: default_source(),
            external_id: None,
            created_at: now,
            updated_at: now,
            tier_adjustments: HashMap::new(),
            is_default: true,
        }
    }

    pub fn new(spoke_id: impl Into<String>, display_name: impl Into<String>) -> Result<Self> {
        let spoke_id = spoke_id.into();
        if spoke_id.trim().is_empty() {
            return Err(Error::Validation("spoke_id must not be empty".to_string()));
        }
        if spoke_id == DEFAULT_SPOKE_ID {
            return Err(Error::Validation(
                "spoke_id 'default' is reserved".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Spoke {
            spoke_id,
            display_name: display_name.into(),
            description: None,
            centered_entity_id: None,
            centered_entity_name: None,
            source: default_source(),
            external_id: None,
            created_at: now,
            updated_at: now,
            tier_adjustments: HashMap::new(),
            is_default: false,
        })
    }

    pub fn rename(&mut self, display_name: impl Into<String>) -> Result<()> {
        if self.is_default {
            return Err(Error::InvalidAction(
                "the default spoke cannot be renamed".to_string(),
            ));
        }
        self.display_name = display_name.into();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Center this spoke on `entity_id`/`entity_name` (spec invariant 4).
    /// A spoke may only ever be centered on one entity at a time; calling
    /// this again replaces the prior centered entity rather than stacking.
    pub fn center_on(&mut self, entity_id: impl Into<String>, entity_name: impl Into<String>) {
        self.centered_entity_id = Some(entity_id.into());
        self.centered_entity_name = Some(entity_name.into());
        self.updated_at = Utc::now();
    }

    /// Resolve the effective necessity tier for `field_id`: this spoke's
    /// override if one exists, else `default_tier`.
    pub fn effective_tier(&self, field_id: &str, default_tier: NecessityTier) -> NecessityTier {
        self.tier_adjustments.get(field_id).copied().unwrap_or(default_tier)
    }
}
