//! Staging engine (ST): turns a raw incoming payload into a persisted,
//! unresolved `SignalCluster` (spec §4.2 "Staging").
//!
//! Grounded on the teacher's `PatternBuilder` entry point
//! (`aetherlight-core/src/pattern.rs` `Pattern::builder()`): validate, stamp
//! identifiers, persist — staging never scores or mutates an entity, it only
//! records what arrived.

use std::collections::HashMap;

use chrono::Utc;

use crate::cluster::{generate_cluster_id, ClusterSource, SignalCluster, StagedSignal};
use crate::entity::EntityType;
use crate::error::Result;
use crate::store::EntityStore;

/// Stage one signal cluster: allocate a `SIG-` id, attach the source
/// metadata, and write it to the store in the `Unresolved` state. Does not
/// score or resolve it — call `resolver::resolve_cluster` next.
pub fn stage_signal_cluster(
    store: &EntityStore,
    entity_type: EntityType,
    source_type: impl Into<String>,
    url: Option<String>,
    description: Option<String>,
    signals: HashMap<String, StagedSignal>,
) -> Result<SignalCluster> {
    let source_type = source_type.into();
    let weight = crate::config::ScoringConfig::default().source_weight(&source_type);
    let cluster = SignalCluster::builder()
        .cluster_id(generate_cluster_id())
        .entity_type(entity_type)
        .source(ClusterSource {
            source_type,
            url,
            description,
            extracted_at: Utc::now(),
            weight,
        })
        .signals(signals)
        .build()?;
    store.put_cluster(&cluster)?;
    Ok(cluster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn staged_cluster_is_persisted_unresolved() {
        let dir = tempdir().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        let mut signals = HashMap::new();
        signals.insert(
            "full_name".to_string(),
            StagedSignal {
                value: serde_json::json!("Zenobia Quark"),
                captured_date: None,
            },
        );
        let cluster = stage_signal_cluster(
            &store,
            EntityType::Person,
            "file_upload",
            None,
            None,
            signals,
        )
        .unwrap();
        let loaded = store.get_cluster(&cluster.cluster_id).unwrap();
        assert!(!loaded.is_resolved());
        assert_eq!(loaded.source.source_type, "file_upload");
    }
}
