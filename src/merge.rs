//! Merge engine: applies a resolved signal cluster's confident signals onto
//! a candidate entity (spec §4.6). Conflict detection happens first;
//! unresolved IDENTITY conflicts block the merge entirely unless the caller
//! has set `_identity_confirmed` via `confirm_merge`.
//!
//! Grounded on the teacher's `PatternMatcher::find_matches`
//! (`aetherlight-core/src/matching.rs`) for the "score everything, then act
//! on the decision" shape, generalized from read-only matching to a
//! mutating merge step.

use chrono::Utc;
use uuid::Uuid;

use crate::cluster::{ClusterState, ConflictRecord, SignalCluster};
use crate::config::ScoringConfig;
use crate::decompose::{decompose_signal, recorroborate};
use crate::entity::{ConflictResolution, ConflictTypeKind, ConflictWinner, Entity, MergeHistoryEntry};
use crate::error::{Error, Result};

/// Attribute keys whose value identifies *who* the entity is rather than a
/// fact that can peacefully change over time (spec §4.5.2 "IDENTITY
/// conflicts block"). A mismatch here means the cluster might not even be
/// about this entity.
pub const IDENTITY_KEYS: &[&str] = &[
    "linkedin_handle",
    "x_handle",
    "instagram_handle",
    "email",
    "legal_name",
];

/// Classify what kind of conflict a key/value mismatch represents.
pub fn classify_conflict(key: &str) -> ConflictTypeKind {
    if IDENTITY_KEYS.contains(&key) {
        ConflictTypeKind::Identity
    } else if crate::config::VOLATILE_KEYS.contains(&key) {
        ConflictTypeKind::Temporal
    } else {
        ConflictTypeKind::Factual
    }
}

/// Compare the cluster's confident signals against the candidate entity's
/// current attributes and return one `ConflictRecord` per disagreement.
/// TEMPORAL conflicts are pre-resolved in place (newer value wins); FACTUAL
/// and IDENTITY conflicts are left unresolved for `resolve_conflict`.
pub fn detect_conflicts(entity: &Entity, cluster: &SignalCluster) -> Vec<ConflictRecord> {
    let mut conflicts = Vec::new();
    for key in cluster.confident_signals.keys() {
        let Some(existing) = entity.find_attribute(key) else {
            continue;
        };
        let Some(signal) = cluster.signals.get(key) else {
            continue;
        };
        if signal.value == existing.value {
            continue;
        }
        let conflict_type = classify_conflict(key);
        let mut record = ConflictRecord {
            conflict_id: format!("CONF-{}", Uuid::new_v4().simple()),
            entity_id: entity.entity_id.clone(),
            attribute: key.clone(),
            value_a: existing.value.clone(),
            source_a: existing.source_attribution.clone(),
            date_a: existing.time_decay.captured_date,
            value_b: signal.value.clone(),
            source_b: cluster.source.source_type.clone(),
            date_b: signal.captured_date,
            conflict_type,
            auto_resolved: false,
            resolution: None,
            detected_at: Utc::now(),
        };
        if conflict_type == ConflictTypeKind::Temporal {
            auto_resolve_temporal(&mut record);
        }
        conflicts.push(record);
    }
    conflicts
}

/// Newer `captured_date` wins for a TEMPORAL conflict; a missing date on
/// either side leaves the incoming (B) value as the winner, since it is at
/// least as recent as the staging event itself.
fn auto_resolve_temporal(record: &mut ConflictRecord) {
    let winner = match (record.date_a, record.date_b) {
        (Some(a), Some(b)) if a >= b => ConflictWinner::A,
        _ => ConflictWinner::B,
    };
    let winning_value = match winner {
        ConflictWinner::A => record.value_a.clone(),
        _ => record.value_b.clone(),
    };
    record.resolution = Some(ConflictResolution {
        resolved_at: Utc::now(),
        resolved_by: "system:temporal_auto_resolve".to_string(),
        winner,
        winning_value,
        reason: "newer capture date supersedes the older value".to_string(),
    });
    record.auto_resolved = true;
}

/// Manually resolve a pending (non-auto-resolved) conflict, e.g. after a
/// human picks a winner in the review UI.
pub fn resolve_conflict(
    record: &mut ConflictRecord,
    winner: ConflictWinner,
    resolved_by: impl Into<String>,
) {
    let winning_value = match winner {
        ConflictWinner::A => record.value_a.clone(),
        ConflictWinner::B => record.value_b.clone(),
        ConflictWinner::Both => record.value_b.clone(),
    };
    record.resolution = Some(ConflictResolution {
        resolved_at: Utc::now(),
        resolved_by: resolved_by.into(),
        winner,
        winning_value,
        reason: "manually resolved".to_string(),
    });
}

/// Apply `cluster`'s confident signals onto `entity` in place. Detects
/// conflicts first; if any IDENTITY conflict remains unresolved and the
/// cluster has not been `_identity_confirmed`, the merge is refused
/// entirely and the entity is left untouched.
pub fn merge_cluster_into_entity(
    cfg: &ScoringConfig,
    entity: &mut Entity,
    cluster: &mut SignalCluster,
) -> Result<Vec<ConflictRecord>> {
    let conflicts = detect_conflicts(entity, cluster);
    let blocking: Vec<ConflictRecord> = conflicts
        .iter()
        .filter(|c| c.conflict_type == ConflictTypeKind::Identity && c.resolution.is_none())
        .cloned()
        .collect();
    if !blocking.is_empty() && !cluster._identity_confirmed {
        return Err(Error::ConflictBlocked {
            evidence: blocking
                .iter()
                .map(|c| format!("{}: {:?} vs {:?}", c.attribute, c.value_a, c.value_b))
                .collect(),
            conflicts: blocking,
        });
    }

    let mut changes = Vec::new();
    for key in cluster.confident_signals.keys().cloned().collect::<Vec<_>>() {
        let Some(signal) = cluster.signals.get(&key).cloned() else {
            continue;
        };
        if let Some(existing) = entity.find_attribute_mut(&key) {
            if existing.value == signal.value {
                recorroborate(cfg, existing, &cluster.source, &cluster.cluster_id);
            } else if let Some(conflict) = conflicts.iter().find(|c| c.attribute == key) {
                if let Some(resolution) = &conflict.resolution {
                    existing.value = resolution.winning_value.clone();
                    existing.source_attribution = cluster.source.source_type.clone();
                    existing.time_decay.captured_date = signal.captured_date;
                    recorroborate(cfg, existing, &cluster.source, &cluster.cluster_id);
                    changes.push(format!("{key} auto/manually resolved"));
                }
                // unresolved FACTUAL conflicts are left as-is pending review.
            }
        } else {
            let attr = decompose_signal(
                cfg,
                &key,
                &signal,
                &cluster.source,
                &cluster.cluster_id,
                &[],
            );
            entity.attributes.push(attr);
            changes.push(format!("{key} added"));
        }
    }

    for conflict in &conflicts {
        if conflict.resolution.is_some() {
            entity.resolved_conflicts.push(conflict.clone());
        } else if conflict.conflict_type != ConflictTypeKind::Identity {
            entity.conflicts.push(conflict.clone());
        }
    }

    entity.provenance_chain.merge_history.push(MergeHistoryEntry {
        merged_at: Utc::now(),
        cluster_id: cluster.cluster_id.clone(),
        changes,
    });
    entity
        .provenance_chain
        .source_documents
        .push(crate::entity::SourceDocumentRef {
            source: cluster.source.source_type.clone(),
            added_at: Utc::now(),
            cluster_id: Some(cluster.cluster_id.clone()),
        });

    cluster.state = ClusterState::Confirmed;
    cluster.resolved_at = Some(Utc::now());
    cluster.candidate_entity_id = Some(entity.entity_id.clone());

    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterSource, StagedSignal};
    use crate::entity::{EntityName, EntityType};
    use chrono::Duration;
    use std::collections::HashMap;

    fn base_entity() -> Entity {
        let mut e = Entity::builder()
            .entity_id("ENT-0001")
            .entity_type(EntityType::Person)
            .name(EntityName {
                full: Some("Zenobia Quark".into()),
                ..Default::default()
            })
            .source("manual")
            .build()
            .unwrap();
        e.attributes.push(decompose_signal(
            &ScoringConfig::default(),
            "role",
            &StagedSignal {
                value: serde_json::json!("Engineer"),
                captured_date: Some(Utc::now() - Duration::days(400)),
            },
            &ClusterSource {
                source_type: "linkedin_api".into(),
                url: None,
                description: None,
                extracted_at: Utc::now(),
                weight: 0.9,
            },
            "SIG-aaaaaaaaaaaa",
            &[],
        ));
        e
    }

    fn cluster_with(key: &str, value: serde_json::Value, captured_date: Option<chrono::DateTime<Utc>>) -> SignalCluster {
        let mut signals = HashMap::new();
        signals.insert(
            key.to_string(),
            StagedSignal {
                value: value.clone(),
                captured_date,
            },
        );
        let mut confident = HashMap::new();
        confident.insert(key.to_string(), 0.9);
        let mut cluster = SignalCluster::builder()
            .cluster_id("SIG-bbbbbbbbbbbb")
            .entity_type(EntityType::Person)
            .source(ClusterSource {
                source_type: "linkedin_api".into(),
                url: None,
                description: None,
                extracted_at: Utc::now(),
                weight: 0.9,
            })
            .signals(signals)
            .build()
            .unwrap();
        cluster.confident_signals = confident;
        cluster
    }

    #[test]
    fn new_attribute_is_added_on_merge() {
        let cfg = ScoringConfig::default();
        let mut entity = base_entity();
        let mut cluster = cluster_with("headline", serde_json::json!("Staff Engineer"), None);
        merge_cluster_into_entity(&cfg, &mut entity, &mut cluster).unwrap();
        assert!(entity.find_attribute("headline").is_some());
        assert_eq!(cluster.state, ClusterState::Confirmed);
    }

    #[test]
    fn temporal_conflict_auto_resolves_to_newer_value() {
        let cfg = ScoringConfig::default();
        let mut entity = base_entity();
        let mut cluster = cluster_with("role", serde_json::json!("Staff Engineer"), Some(Utc::now()));
        let conflicts = merge_cluster_into_entity(&cfg, &mut entity, &mut cluster).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].auto_resolved);
        assert_eq!(
            entity.find_attribute("role").unwrap().value,
            serde_json::json!("Staff Engineer")
        );
    }

    #[test]
    fn identity_conflict_blocks_merge_without_confirmation() {
        let cfg = ScoringConfig::default();
        let mut entity = base_entity();
        entity.attributes.push(decompose_signal(
            &cfg,
            "linkedin_handle",
            &StagedSignal {
                value: serde_json::json!("zenobia-q"),
                captured_date: None,
            },
            &ClusterSource {
                source_type: "manual".into(),
                url: None,
                description: None,
                extracted_at: Utc::now(),
                weight: 0.95,
            },
            "SIG-aaaaaaaaaaaa",
            &[],
        ));
        let mut cluster = cluster_with("linkedin_handle", serde_json::json!("zquark"), None);
        let result = merge_cluster_into_entity(&cfg, &mut entity, &mut cluster);
        assert!(matches!(result, Err(Error::ConflictBlocked { .. })));
        assert_eq!(cluster.state, ClusterState::Unresolved);
    }

    #[test]
    fn identity_conflict_proceeds_once_confirmed() {
        let cfg = ScoringConfig::default();
        let mut entity = base_entity();
        entity.attributes.push(decompose_signal(
            &cfg,
            "linkedin_handle",
            &StagedSignal {
                value: serde_json::json!("zenobia-q"),
                captured_date: None,
            },
            &ClusterSource {
                source_type: "manual".into(),
                url: None,
                description: None,
                extracted_at: Utc::now(),
                weight: 0.95,
            },
            "SIG-aaaaaaaaaaaa",
            &[],
        ));
        let mut cluster = cluster_with("linkedin_handle", serde_json::json!("zquark"), None);
        cluster._identity_confirmed = true;
        let result = merge_cluster_into_entity(&cfg, &mut entity, &mut cluster);
        assert!(result.is_ok());
        assert_eq!(cluster.state, ClusterState::Confirmed);
    }
}
