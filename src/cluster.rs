//! Signal cluster data model (spec §2/§3) and the `ConflictRecord` type
//! raised during resolution (spec §3 "Conflict record", §4.5.2).
//!
//! Grounded on the teacher's immutable `Pattern` (`aetherlight-core/src/pattern.rs`):
//! plain data struct, `Serialize`/`Deserialize` derive, and a companion
//! builder for the staging engine to populate field-by-field rather than via
//! a sprawling constructor.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{ConflictResolution, ConflictTypeKind, EntityType};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    Unresolved,
    Provisional,
    Confirmed,
}

/// Resolution quadrant assigned by the resolver (spec §4.5.1 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quadrant {
    Q1Create,
    Q2Enrich,
    Q3Consolidate,
    Q4Confirm,
}

impl Quadrant {
    pub fn label(&self) -> &'static str {
        match self {
            Quadrant::Q1Create => "Q1_CREATE",
            Quadrant::Q2Enrich => "Q2_ENRICH",
            Quadrant::Q3Consolidate => "Q3_CONSOLIDATE",
            Quadrant::Q4Confirm => "Q4_CONFIRM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchZone {
    HighConfidenceMatch,
    AmbiguousMatch,
    NoMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSource {
    pub source_type: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub extracted_at: DateTime<Utc>,
    pub weight: f64,
}

/// One raw staged signal value before resolution has promoted it to an
/// attribute confidence (spec §2 "signals").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedSignal {
    pub value: serde_json::Value,
    #[serde(default)]
    pub captured_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalCluster {
    pub cluster_id: String,
    pub entity_type: EntityType,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub state: ClusterState,
    pub source: ClusterSource,

    /// Raw staged key -> signal, as received.
    pub signals: HashMap<String, StagedSignal>,
    /// Signals that survived per-attribute confidence computation, keyed the
    /// same way, populated by the resolver (spec §4.2).
    #[serde(default)]
    pub confident_signals: HashMap<String, f64>,

    #[serde(default)]
    pub quadrant: Option<Quadrant>,
    #[serde(default)]
    pub match_zone: Option<MatchZone>,
    #[serde(default)]
    pub data_novelty: Option<f64>,
    #[serde(default)]
    pub association_score: Option<f64>,

    #[serde(default)]
    pub candidate_entity_id: Option<String>,
    #[serde(default)]
    pub candidate_entity_name: Option<String>,

    /// Scratch entity-shaped payload for a not-yet-persisted Q1 candidate
    /// (spec §2 `_entity_data`); never written to the entity store directly.
    #[serde(default)]
    pub _entity_data: Option<serde_json::Value>,
    /// Set once a human has confirmed an IDENTITY conflict should be
    /// overridden (spec §4.6 `confirm_merge`).
    #[serde(default)]
    pub _identity_confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterBuilder {
    cluster_id: Option<String>,
    entity_type: Option<EntityType>,
    source: Option<ClusterSource>,
    signals: HashMap<String, StagedSignal>,
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self {
            cluster_id: None,
            entity_type: None,
            source: None,
            signals: HashMap::new(),
        }
    }
}

impl SignalCluster {
    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::default()
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self.state, ClusterState::Unresolved)
    }
}

impl ClusterBuilder {
    pub fn cluster_id(mut self, id: impl Into<String>) -> Self {
        self.cluster_id = Some(id.into());
        self
    }
    pub fn entity_type(mut self, t: EntityType) -> Self {
        self.entity_type = Some(t);
        self
    }
    pub fn source(mut self, source: ClusterSource) -> Self {
        self.source = Some(source);
        self
    }
    pub fn signal(mut self, key: impl Into<String>, signal: StagedSignal) -> Self {
        self.signals.insert(key.into(), signal);
        self
    }
    pub fn signals(mut self, signals: HashMap<String, StagedSignal>) -> Self {
        self.signals = signals;
        self
    }

    pub fn build(self) -> Result<SignalCluster> {
        let cluster_id = self
            .cluster_id
            .ok_or_else(|| Error::Validation("cluster_id is required".to_string()))?;
        let entity_type = self
            .entity_type
            .ok_or_else(|| Error::Validation("entity_type is required".to_string()))?;
        let source = self
            .source
            .ok_or_else(|| Error::Validation("source is required".to_string()))?;
        if self.signals.is_empty() {
            return Err(Error::Validation(
                "a signal cluster needs at least one signal".to_string(),
            ));
        }
        Ok(SignalCluster {
            cluster_id,
            entity_type,
            created_at: Utc::now(),
            resolved_at: None,
            state: ClusterState::Unresolved,
            source,
            signals: self.signals,
            confident_signals: HashMap::new(),
            quadrant: None,
            match_zone: None,
            data_novelty: None,
            association_score: None,
            candidate_entity_id: None,
            candidate_entity_name: None,
            _entity_data: None,
            _identity_confirmed: false,
        })
    }
}

/// A detected disagreement between an incoming signal and an existing
/// attribute (spec §3 "Conflict record").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictRecord {
    pub conflict_id: String,
    pub entity_id: String,
    pub attribute: String,
    pub value_a: serde_json::Value,
    pub source_a: String,
    #[serde(default)]
    pub date_a: Option<DateTime<Utc>>,
    pub value_b: serde_json::Value,
    pub source_b: String,
    #[serde(default)]
    pub date_b: Option<DateTime<Utc>>,
    pub conflict_type: ConflictTypeKind,
    pub auto_resolved: bool,
    #[serde(default)]
    pub resolution: Option<ConflictResolution>,
    pub detected_at: DateTime<Utc>,
}

/// Generate a cluster id of the form `SIG-<12 lowercase hex chars>`
/// (spec §2). Collision avoidance is the caller's responsibility (the
/// store re-rolls on a path clash, see `store::EntityStore::put_cluster`).
pub fn generate_cluster_id() -> String {
    let bytes: [u8; 6] = rand::random();
    format!("SIG-{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> ClusterSource {
        ClusterSource {
            source_type: "linkedin_api".into(),
            url: None,
            description: None,
            extracted_at: Utc::now(),
            weight: 0.9,
        }
    }

    #[test]
    fn builder_requires_signals() {
        let result = SignalCluster::builder()
            .cluster_id("SIG-abc123abc123")
            .entity_type(EntityType::Person)
            .source(source())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_produces_unresolved_cluster() {
        let cluster = SignalCluster::builder()
            .cluster_id("SIG-abc123abc123")
            .entity_type(EntityType::Person)
            .source(source())
            .signal(
                "full_name",
                StagedSignal {
                    value: serde_json::json!("Zenobia Quark"),
                    captured_date: None,
                },
            )
            .build()
            .unwrap();
        assert_eq!(cluster.state, ClusterState::Unresolved);
        assert!(!cluster.is_resolved());
    }

    #[test]
    fn generated_cluster_id_has_expected_shape() {
        let id = generate_cluster_id();
        assert!(id.starts_with("SIG-"));
        assert_eq!(id.len(), "SIG-".len() + 12);
    }
}
