//! Object decomposer: turns one raw staged signal into a persisted
//! `Attribute`, computing its confidence from the cluster's source and the
//! corroborating-cluster count (spec §4.6/§4.7 "decompose the incoming
//! payload into attribute-shaped records before merge").
//!
//! Grounded on the teacher's `PatternBuilder::build` validation step
//! (`aetherlight-core/src/pattern.rs`): one small pure constructor per
//! output record, no hidden global state.

use chrono::Utc;
use uuid::Uuid;

use crate::cluster::{ClusterSource, StagedSignal};
use crate::confidence::{compute_attribute_confidence_for_source, ConfidenceTier};
use crate::config::ScoringConfig;
use crate::entity::{Attribute, TimeDecay};

/// Build a fresh `Attribute` for `key` from one staged signal, given how many
/// distinct clusters have already corroborated this key (0 for a brand-new
/// attribute).
pub fn decompose_signal(
    cfg: &ScoringConfig,
    key: &str,
    signal: &StagedSignal,
    source: &ClusterSource,
    cluster_id: &str,
    prior_source_clusters: &[String],
) -> Attribute {
    let mut source_clusters: Vec<String> = prior_source_clusters.to_vec();
    if !source_clusters.iter().any(|c| c == cluster_id) {
        source_clusters.push(cluster_id.to_string());
    }
    let source_count = source_clusters.len() as u32;
    let now = Utc::now();
    let confidence = compute_attribute_confidence_for_source(
        cfg,
        &source.source_type,
        signal.captured_date,
        key,
        source_count,
        now,
    );
    Attribute {
        attribute_id: format!("ATTR-{}", Uuid::new_v4().simple()),
        key: key.to_string(),
        value: signal.value.clone(),
        confidence,
        confidence_label: ConfidenceTier::from_score(confidence).label().to_string(),
        time_decay: TimeDecay {
            stability: stability_for_key(key).to_string(),
            captured_date: signal.captured_date,
            refresh_interval_days: refresh_interval_for_key(key),
        },
        source_attribution: source.source_type.clone(),
        _base_confidence: confidence,
        _source_clusters: source_clusters,
    }
}

/// Recompute an existing attribute's confidence after a new cluster
/// corroborates it, preserving its id and recorded source-cluster list
/// (spec invariant: `_base_confidence` only changes on a fresh stage-1
/// compute, not on every corroboration event — here that means we recompute
/// the *current* confidence field but leave the attribute's identity intact).
pub fn recorroborate(cfg: &ScoringConfig, attribute: &mut Attribute, source: &ClusterSource, cluster_id: &str) {
    if !attribute._source_clusters.iter().any(|c| c == cluster_id) {
        attribute._source_clusters.push(cluster_id.to_string());
    }
    let source_count = attribute._source_clusters.len() as u32;
    let confidence = compute_attribute_confidence_for_source(
        cfg,
        &source.source_type,
        attribute.time_decay.captured_date,
        &attribute.key,
        source_count,
        Utc::now(),
    );
    attribute.confidence = confidence;
    attribute.confidence_label = ConfidenceTier::from_score(confidence).label().to_string();
}

fn stability_for_key(key: &str) -> &'static str {
    if crate::config::VOLATILE_KEYS.contains(&key) {
        "volatile"
    } else {
        "stable"
    }
}

fn refresh_interval_for_key(key: &str) -> Option<u32> {
    if crate::config::VOLATILE_KEYS.contains(&key) {
        Some(180)
    } else {
        None
    }
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
    fn decomposed_attribute_carries_source_cluster() {
        let cfg = ScoringConfig::default();
        let signal = StagedSignal {
            value: serde_json::json!("Engineer"),
            captured_date: None,
        };
        let attr = decompose_signal(&cfg, "role", &signal, &source(), "SIG-aaaaaaaaaaaa", &[]);
        assert_eq!(attr._source_clusters, vec!["SIG-aaaaaaaaaaaa".to_string()]);
        assert_eq!(attr.key, "role");
        assert!(attr.confidence > 0.0);
    }

    #[test]
    fn volatile_key_marked_volatile_with_refresh_interval() {
        let cfg = ScoringConfig::default();
        let signal = StagedSignal {
            value: serde_json::json!("Engineer"),
            captured_date: None,
        };
        let attr = decompose_signal(&cfg, "role", &signal, &source(), "SIG-aaaaaaaaaaaa", &[]);
        assert_eq!(attr.time_decay.stability, "volatile");
        assert_eq!(attr.time_decay.refresh_interval_days, Some(180));
    }

    #[test]
    fn recorroboration_raises_confidence_for_second_source() {
        let cfg = ScoringConfig::default();
        let signal = StagedSignal {
            value: serde_json::json!("Engineer"),
            captured_date: None,
        };
        let mut attr = decompose_signal(&cfg, "headline", &signal, &source(), "SIG-aaaaaaaaaaaa", &[]);
        let before = attr.confidence;
        recorroborate(&cfg, &mut attr, &source(), "SIG-bbbbbbbbbbbb");
        assert!(attr.confidence >= before);
        assert_eq!(attr._source_clusters.len(), 2);
    }
}
