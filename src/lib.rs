//! Multi-tenant knowledge-graph provisioner: a signal staging and
//! resolution engine, a confidence model, and a gap-analysis engine sharing
//! one file-backed entity/cluster/spoke store.
//!
//! The modules mirror the pipeline a signal travels through:
//! `staging` -> `resolver` (`association` + `merge` + `decompose`) ->
//! `store`, with `confidence`/`similarity`/`config` as the shared scoring
//! primitives and `gap_analysis`/`template` as the read-side completeness
//! pass. See `DESIGN.md` for what each module is grounded on.

pub mod association;
pub mod cluster;
pub mod confidence;
pub mod config;
pub mod decompose;
pub mod entity;
pub mod error;
pub mod gap_analysis;
pub mod merge;
pub mod resolver;
pub mod similarity;
pub mod spoke;
pub mod staging;
pub mod store;
pub mod template;

pub use config::ScoringConfig;
pub use entity::Entity;
pub use error::{Error, Result};
pub use store::EntityStore;

use std::path::Path;

use tracing::info;

use cluster::{ConflictRecord, SignalCluster};
use entity::EntityType;
use gap_analysis::GapScorecard;
use resolver::{ResolutionAction, ResolutionOutcome};
use std::collections::HashMap;

/// Top-level facade wiring a `ScoringConfig` to one tenant's `EntityStore`.
/// Most callers only need this; the individual modules stay public for
/// fine-grained use (tests, custom pipelines, tooling).
pub struct Provisioner {
    pub store: EntityStore,
    pub config: ScoringConfig,
}

impl Provisioner {
    pub fn open(root: impl AsRef<Path>, config: ScoringConfig) -> Result<Self> {
        Ok(Provisioner {
            store: EntityStore::open(root.as_ref())?,
            config,
        })
    }

    pub fn stage(
        &self,
        entity_type: EntityType,
        source_type: impl Into<String>,
        url: Option<String>,
        description: Option<String>,
        signals: HashMap<String, cluster::StagedSignal>,
    ) -> Result<SignalCluster> {
        staging::stage_signal_cluster(&self.store, entity_type, source_type, url, description, signals)
    }

    /// Resolve a staged cluster and, if it landed as `Q1_CREATE`, materialize
    /// the new entity in the same call (the resolver alone can't: only the
    /// caller can decide whether auto-creation is desired for this tenant).
    pub fn resolve(&mut self, cluster_id: &str) -> Result<ResolutionOutcome> {
        let outcome = resolver::resolve_cluster(&self.config, &self.store, cluster_id)?;
        if matches!(outcome.action, ResolutionAction::CreateNew) {
            let mut cluster = self.store.get_cluster(cluster_id)?;
            if !cluster.confident_signals.is_empty() {
                let entity = resolver::create_entity_from_cluster(&self.config, &mut self.store, &mut cluster)?;
                info!(entity_id = %entity.entity_id, cluster_id, "created entity from cluster");
            }
        }
        Ok(outcome)
    }

    /// Re-attempt a merge the resolver previously held for an IDENTITY
    /// conflict, now that a human has confirmed the candidate is correct.
    pub fn confirm_merge(&mut self, cluster_id: &str) -> Result<Vec<ConflictRecord>> {
        let mut cluster = self.store.get_cluster(cluster_id)?;
        let Some(candidate_id) = cluster.candidate_entity_id.clone() else {
            return Err(Error::InvalidAction(
                "cluster has no candidate entity to confirm a merge against".to_string(),
            ));
        };
        cluster._identity_confirmed = true;
        let mut entity = self.store.get_entity(&candidate_id)?;
        let conflicts = merge::merge_cluster_into_entity(&self.config, &mut entity, &mut cluster)?;
        self.store.put_entity(&entity)?;
        self.store.put_cluster(&cluster)?;
        Ok(conflicts)
    }

    /// Score every entity in `spoke_id` against `template` (spec §4.8
    /// `analyzeGaps(spoke_id, template_type, tier_adjustments?)`). Per-field
    /// necessity-tier overrides live on the spoke itself (`spoke.tier_adjustments`)
    /// rather than as a separate parameter, since a spoke's overrides are a
    /// persistent tenant setting, not a one-off call argument.
    pub fn analyze_gaps(&self, spoke_id: &str, template: &template::Template) -> Result<GapScorecard> {
        let spoke = self.store.get_spoke(spoke_id)?;
        let entities: Vec<_> = self
            .store
            .list_entities()?
            .into_iter()
            .filter(|e| e.spoke_id == spoke_id)
            .collect();
        Ok(gap_analysis::analyze_gaps(&spoke, template, &entities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster::StagedSignal;
    use tempfile::tempdir;

    #[test]
    fn end_to_end_create_then_enrich() {
        let dir = tempdir().unwrap();
        let mut provisioner = Provisioner::open(dir.path(), ScoringConfig::default()).unwrap();

        let mut signals = HashMap::new();
        signals.insert(
            "full_name".to_string(),
            StagedSignal {
                value: serde_json::json!("Zenobia Quark"),
                captured_date: None,
            },
        );
        let cluster = provisioner
            .stage(EntityType::Person, "file_upload", None, None, signals)
            .unwrap();
        let outcome = provisioner.resolve(&cluster.cluster_id).unwrap();
        assert!(matches!(outcome.action, ResolutionAction::CreateNew));

        let entities = provisioner.store.list_entities().unwrap();
        assert_eq!(entities.len(), 1);

        let template = template::TemplateRegistry::default_intake_template();
        let scorecard = provisioner.analyze_gaps(&entities[0].spoke_id, &template).unwrap();
        assert!(scorecard.missing_documents.contains(&"government_id".to_string()));
        assert_eq!(scorecard.entity_count, 1);
    }
}
