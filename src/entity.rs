//! Canonical entity data model (spec §3). Entities are self-contained
//! documents; dynamic/optional interface payloads use `serde_json::Value`
//! escape hatches per spec §9 ("carrying escape hatches... for forward
//! compatible extensions").
//!
//! Grounded on the teacher's `Pattern`/`PatternBuilder`
//! (`aetherlight-core/src/pattern.rs`): private fields behind a validating
//! builder, public read accessors, `Serialize`/`Deserialize` for on-disk
//! round-tripping, and a `#[serde(default)]`-tolerant shape for legacy
//! records per spec §9 ("Parsing must tolerate missing legacy fields").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Business,
    Institution,
}

impl EntityType {
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityType::Person => "ENT",
            EntityType::Business => "BIZ",
            EntityType::Institution => "INST",
        }
    }
}

/// Facts layer: where a fact originates and how it may be argued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FactsLayer {
    Objective = 1,
    Group = 2,
    Personal = 3,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityName {
    // Person fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred: Option<String>,
    // Business fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl EntityName {
    /// Union of every populated name field (spec §4.1 `getAllNames`).
    pub fn all_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for candidate in [&self.full, &self.preferred, &self.legal, &self.common] {
            if let Some(n) = candidate {
                if !n.trim().is_empty() {
                    names.push(n.clone());
                }
            }
        }
        names.extend(self.aliases.iter().cloned());
        let mut seen = std::collections::HashSet::new();
        names.retain(|n| seen.insert(n.to_lowercase()));
        names
    }

    /// The name used as the "primary" display/rarity-classification name.
    pub fn primary(&self) -> Option<&str> {
        self.full
            .as_deref()
            .or(self.common.as_deref())
            .or(self.preferred.as_deref())
            .or(self.legal.as_deref())
            .or_else(|| self.aliases.first().map(String::as_str))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub value: String,
    pub confidence: f64,
    pub facts_layer: FactsLayer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeDecay {
    pub stability: String,
    #[serde(default)]
    pub captured_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_interval_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub attribute_id: String,
    pub key: String,
    pub value: serde_json::Value,
    pub confidence: f64,
    pub confidence_label: String,
    pub time_decay: TimeDecay,
    pub source_attribution: String,
    /// Confidence prior to corroboration; never rewritten except by a new
    /// stage-1 compute (spec invariant 2).
    pub _base_confidence: f64,
    pub _source_clusters: Vec<String>,
}

impl Attribute {
    pub fn captured_date(&self) -> Option<DateTime<Utc>> {
        self.time_decay.captured_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_type: String,
    /// Counterpart entity by display name; resolved to an id later by an
    /// out-of-scope pass (spec §9 "Cyclic references").
    pub target_name: String,
    #[serde(default)]
    pub entity_id_ref: Option<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
    pub confidence: f64,
    pub time_decay: TimeDecay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub observation_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub truth_level: String,
    pub facts_layer: FactsLayer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocumentRef {
    pub source: String,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub cluster_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeHistoryEntry {
    pub merged_at: DateTime<Utc>,
    pub cluster_id: String,
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceChain {
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub source_documents: Vec<SourceDocumentRef>,
    #[serde(default)]
    pub merge_history: Vec<MergeHistoryEntry>,
}

/// One of the conflict kinds spec §3/§4.5.2 describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConflictTypeKind {
    Factual,
    Temporal,
    Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictWinner {
    A,
    B,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictResolution {
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: String,
    pub winner: ConflictWinner,
    pub winning_value: serde_json::Value,
    pub reason: String,
}

/// Re-exported here (also used by `crate::error::Error::ConflictBlocked`);
/// the canonical definition lives in `cluster` to avoid a cycle with
/// `error`, see `cluster::ConflictRecord`.
pub use crate::cluster::ConflictRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub name: EntityName,
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub observations: Vec<Observation>,
    pub provenance_chain: ProvenanceChain,
    /// Profile mode payload (spec §3 "career_lite"). Experience entries are
    /// `{title, organization, ...}` maps kept dynamic per spec §9.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub career_lite: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_attributes: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_dimensions: Option<serde_json::Value>,
    #[serde(default = "default_spoke_id")]
    pub spoke_id: String,
    pub source: String,
    #[serde(default)]
    pub source_ref: Option<String>,
    #[serde(default)]
    pub conflicts: Vec<ConflictRecord>,
    #[serde(default)]
    pub resolved_conflicts: Vec<ConflictRecord>,
}

pub fn default_spoke_id() -> String {
    "default".to_string()
}

impl Entity {
    pub fn all_names(&self) -> Vec<String> {
        self.name.all_names()
    }

    pub fn find_attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.key == key)
    }

    pub fn find_attribute_mut(&mut self, key: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.key == key)
    }

    /// Mean attribute confidence, or `None` if there are no attributes yet.
    pub fn confidence(&self) -> Option<f64> {
        if self.attributes.is_empty() {
            return None;
        }
        crate::confidence::entity_confidence(
            &self.attributes.iter().map(|a| a.confidence).collect::<Vec<_>>(),
        )
    }

    /// Append a new observation, deduplicating by lowercased text
    /// (spec invariant 5).
    pub fn push_observation_dedup(&mut self, mut observation: Observation) -> bool {
        let lowered = observation.text.trim().to_lowercase();
        if self
            .observations
            .iter()
            .any(|o| o.text.trim().to_lowercase() == lowered)
        {
            return false;
        }
        observation.observation_id = self.next_observation_id();
        self.observations.push(observation);
        true
    }

    /// Deterministic observation id of form `OBS-<entity_id>-<YYYYMMDDHHMMSS>-<seq>`
    /// (spec invariant 5). Dense and monotonic within the same second.
    fn next_observation_id(&self) -> String {
        let now = Utc::now();
        let stamp = now.format("%Y%m%d%H%M%S").to_string();
        let prefix = format!("OBS-{}-{}-", self.entity_id, stamp);
        let mut seq = 1u32;
        loop {
            let candidate = format!("{}{:03}", prefix, seq);
            if !self.observations.iter().any(|o| o.observation_id == candidate) {
                return candidate;
            }
            seq += 1;
        }
    }
}

pub struct EntityBuilder {
    entity_id: Option<String>,
    entity_type: Option<EntityType>,
    name: EntityName,
    source: Option<String>,
    spoke_id: String,
    created_by: String,
}

impl Default for EntityBuilder {
    fn default() -> Self {
        Self {
            entity_id: None,
            entity_type: None,
            name: EntityName::default(),
            source: None,
            spoke_id: default_spoke_id(),
            created_by: "system".to_string(),
        }
    }
}

impl Entity {
    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
    }
}

impl EntityBuilder {
    pub fn entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }
    pub fn entity_type(mut self, t: EntityType) -> Self {
        self.entity_type = Some(t);
        self
    }
    pub fn name(mut self, name: EntityName) -> Self {
        self.name = name;
        self
    }
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
    pub fn spoke_id(mut self, spoke_id: impl Into<String>) -> Self {
        self.spoke_id = spoke_id.into();
        self
    }
    pub fn created_by(mut self, by: impl Into<String>) -> Self {
        self.created_by = by.into();
        self
    }

    pub fn build(self) -> Result<Entity> {
        let entity_id = self
            .entity_id
            .ok_or_else(|| Error::Validation("entity_id is required".to_string()))?;
        let entity_type = self
            .entity_type
            .ok_or_else(|| Error::Validation("entity_type is required".to_string()))?;
        if self.name.all_names().is_empty() {
            return Err(Error::Validation(
                "entity must have at least one name".to_string(),
            ));
        }
        let source = self
            .source
            .ok_or_else(|| Error::Validation("source is required".to_string()))?;
        let now = Utc::now();
        Ok(Entity {
            entity_id,
            entity_type,
            name: self.name,
            summary: None,
            attributes: Vec::new(),
            relationships: Vec::new(),
            observations: Vec::new(),
            provenance_chain: ProvenanceChain {
                created_at: now,
                created_by: self.created_by,
                source_documents: Vec::new(),
                merge_history: Vec::new(),
            },
            career_lite: None,
            structured_attributes: None,
            org_dimensions: None,
            spoke_id: self.spoke_id,
            source,
            source_ref: None,
            conflicts: Vec::new(),
            resolved_conflicts: Vec::new(),
        })
    }
}
