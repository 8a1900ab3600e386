//! Resolver (R): the orchestration layer that scores a staged cluster
//! against every existing entity of its type, classifies the match zone,
//! derives a resolution quadrant, and dispatches to the merge engine or to
//! entity creation (spec §4.5).
//!
//! Grounded on the teacher's `PatternMatcher::find_matches`
//! (`aetherlight-core/src/matching.rs`): score every candidate, keep the
//! best, then act — generalized from a top-N match list to a single
//! best-candidate decision plus an explicit "no match" branch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::association::{score_association, AssociationFacts};
use crate::cluster::{ClusterState, ConflictRecord, MatchZone, Quadrant, SignalCluster};
use crate::config::ScoringConfig;
use crate::decompose::decompose_signal;
use crate::entity::{Entity, EntityName};
use crate::error::{Error, Result};
use crate::merge::merge_cluster_into_entity;
use crate::store::EntityStore;

/// Signal keys the data-novelty check considers (spec §4.5.1 step 5: handles,
/// titles, organizations, locations, skills, education). Names are excluded —
/// a name match is what got us a candidate in the first place, so it can
/// never itself count as "novel data" about that candidate.
const NOVELTY_SIGNAL_KEYS: &[&str] = &[
    "linkedin_handle",
    "x_handle",
    "instagram_handle",
    "role",
    "current_role",
    "title",
    "company",
    "current_company",
    "organization",
    "location",
    "current_location",
    "skills",
    "education",
];

/// Above this, two signal values are the same fact rather than a genuine
/// change (same Dice bar `similarity::names_likely_match` uses for names).
const DUPLICATE_VALUE_THRESHOLD: f64 = 0.85;

/// Below this, two unresolved clusters' primary names are considered
/// unrelated for the NO_MATCH -> Q3 sibling-overlap scan (spec §4.5.1 step 6).
const SIBLING_NAME_OVERLAP_THRESHOLD: f64 = 0.85;

/// A NO_MATCH cluster needs at least this many existing-entity
/// observation/relationship mentions of its primary name to route to
/// Q3_CONSOLIDATE instead of Q1_CREATE (spec §4.5.1 step 6).
const CONSOLIDATE_MENTION_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResolutionAction {
    /// No existing entity is a plausible match; stage a brand-new one.
    CreateNew,
    /// A confident match with mostly-new data; merge straight in.
    Enrich { candidate_entity_id: String },
    /// A confident match that adds nothing new; just bump corroboration.
    Confirm { candidate_entity_id: String },
    /// Held for human review: either an ambiguous/no-match candidate
    /// (`Some`) or a NO_MATCH cluster that only overlaps with other staged
    /// clusters and has no entity candidate yet (`None`).
    Hold { candidate_entity_id: Option<String> },
    /// Nothing usable in the cluster at all; discard.
    Skip,
}

#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub quadrant: Quadrant,
    pub match_zone: MatchZone,
    pub data_novelty: f64,
    pub association_score: f64,
    pub action: ResolutionAction,
    pub conflicts: Vec<ConflictRecord>,
}

fn cluster_facts(cluster: &SignalCluster) -> AssociationFacts {
    let get_str = |key: &str| {
        cluster
            .signals
            .get(key)
            .and_then(|s| s.value.as_str())
            .map(str::to_string)
    };
    AssociationFacts {
        names: [get_str("full_name"), get_str("name")]
            .into_iter()
            .flatten()
            .collect(),
        linkedin_handle: get_str("linkedin_handle"),
        x_handle: get_str("x_handle"),
        instagram_handle: get_str("instagram_handle"),
        org: get_str("company").or_else(|| get_str("current_company")),
        title: get_str("role").or_else(|| get_str("current_role")),
        location: get_str("location").or_else(|| get_str("current_location")),
        bio: get_str("bio").or_else(|| get_str("x_bio")).or_else(|| get_str("instagram_bio")),
        captured_date: cluster.signals.values().find_map(|s| s.captured_date),
    }
}

fn entity_facts(entity: &Entity) -> AssociationFacts {
    let get = |key: &str| {
        entity
            .find_attribute(key)
            .and_then(|a| a.value.as_str())
            .map(str::to_string)
    };
    AssociationFacts {
        names: entity.all_names(),
        linkedin_handle: get("linkedin_handle"),
        x_handle: get("x_handle"),
        instagram_handle: get("instagram_handle"),
        org: get("company").or_else(|| get("current_company")),
        title: get("role").or_else(|| get("current_role")),
        location: get("location").or_else(|| get("current_location")),
        bio: get("bio").or_else(|| get("x_bio")).or_else(|| get("instagram_bio")),
        captured_date: entity
            .attributes
            .iter()
            .find_map(|a| a.time_decay.captured_date),
    }
}

/// Score `cluster` against every candidate entity of the same type, keeping
/// the single best match. Returns `None` if there are no candidates at all.
pub fn best_candidate<'a>(
    cfg: &ScoringConfig,
    cluster: &SignalCluster,
    candidates: &'a [Entity],
) -> Option<(&'a Entity, f64, HashMap<String, f64>, Vec<String>)> {
    let incoming = cluster_facts(cluster);
    candidates
        .iter()
        .filter(|e| e.entity_type == cluster.entity_type)
        .map(|e| {
            let result = score_association(cfg, &incoming, &entity_facts(e));
            (e, result.score, result.breakdown, result.contradictions)
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

/// Three-zone classification (spec §4.5.1 steps 3-4). `HIGH` is a fixed bar
/// independent of name rarity; `AMBIGUOUS`'s floor *is* the rarity-specific
/// threshold itself (0.30/0.35/0.45), not a constant band subtracted from the
/// high-confidence bar — a "common" or "standard" name needs less evidence to
/// enter review than a "very_common" one, by design.
fn classify_zone(cfg: &ScoringConfig, score: f64, primary_name: Option<&str>) -> MatchZone {
    if score > cfg.high_confidence_threshold {
        return MatchZone::HighConfidenceMatch;
    }
    let rarity_threshold = primary_name
        .map(|n| cfg.classify_name_rarity(n).threshold())
        .unwrap_or(cfg.high_confidence_threshold);
    if score > rarity_threshold {
        MatchZone::AmbiguousMatch
    } else {
        MatchZone::NoMatch
    }
}

/// Data novelty (spec §4.5.1 step 5): per-signal duplicate flags over a fixed
/// key set (handles, titles, orgs, locations, skills, education — names
/// excluded), comparing actual *values* via Dice similarity rather than mere
/// key presence. A changed value on an existing key (e.g. a new job title)
/// counts as new, not duplicate — otherwise a genuine update would get
/// misrouted to Q4_CONFIRM instead of Q2_ENRICH. `1.0` when there is no
/// candidate to compare against at all.
fn data_novelty(cluster: &SignalCluster, candidate: Option<&Entity>) -> f64 {
    let Some(candidate) = candidate else {
        return 1.0;
    };
    let mut new_count = 0usize;
    let mut duplicate_count = 0usize;
    for key in NOVELTY_SIGNAL_KEYS {
        let Some(signal) = cluster.signals.get(*key) else {
            continue;
        };
        let is_duplicate = match candidate.find_attribute(key) {
            None => false,
            Some(existing) => match (signal.value.as_str(), existing.value.as_str()) {
                (Some(a), Some(b)) => crate::similarity::similarity(a, b) > DUPLICATE_VALUE_THRESHOLD,
                _ => signal.value == existing.value,
            },
        };
        if is_duplicate {
            duplicate_count += 1;
        } else {
            new_count += 1;
        }
    }
    let total = new_count + duplicate_count;
    if total == 0 {
        0.0
    } else {
        new_count as f64 / total as f64
    }
}

/// True if the candidate is the spoke's centered/self entity — such a match
/// always routes to Q2_ENRICH regardless of novelty (spec invariant 4),
/// since the centered entity's record may never be left sitting at
/// Q4_CONFIRM just because a scrape happened to report nothing new.
fn is_centered_entity(store: &EntityStore, entity: &Entity) -> bool {
    store
        .get_spoke(&entity.spoke_id)
        .map(|spoke| spoke.centered_entity_id.as_deref() == Some(entity.entity_id.as_str()))
        .unwrap_or(false)
}

/// NO_MATCH -> Q3_CONSOLIDATE split, branch (a): does any *other* unresolved
/// cluster's primary name overlap this cluster's primary name above the Dice
/// bar (spec §4.5.1 step 6)?
fn has_sibling_cluster_overlap(store: &EntityStore, current_cluster_id: &str, primary_name: Option<&str>) -> Result<bool> {
    let Some(name) = primary_name else {
        return Ok(false);
    };
    let siblings = store.list_unresolved_clusters()?;
    Ok(siblings.iter().any(|sibling| {
        sibling.cluster_id != current_cluster_id
            && cluster_facts(sibling)
                .names
                .iter()
                .any(|sibling_name| crate::similarity::similarity(name, sibling_name) > SIBLING_NAME_OVERLAP_THRESHOLD)
    }))
}

/// NO_MATCH -> Q3_CONSOLIDATE split, branch (b): how many times does
/// `primary_name` show up across every candidate's observations and
/// relationships (spec §4.5.1 step 6)?
fn count_entity_mentions(entities: &[Entity], primary_name: &str) -> usize {
    let lowered = primary_name.to_lowercase();
    entities
        .iter()
        .map(|entity| {
            let observation_hits = entity
                .observations
                .iter()
                .filter(|o| o.text.to_lowercase().contains(&lowered))
                .count();
            let relationship_hits = entity
                .relationships
                .iter()
                .filter(|r| r.target_name.to_lowercase().contains(&lowered))
                .count();
            observation_hits + relationship_hits
        })
        .sum()
}

/// Compute per-signal confidence (spec §4.2) and populate
/// `cluster.confident_signals` with the signals whose confidence clears the
/// staging bar. This is the "score first" half of resolution; it mutates
/// only the cluster, never an entity.
pub fn score_cluster(cfg: &ScoringConfig, cluster: &mut SignalCluster) {
    let keys: Vec<String> = cluster.signals.keys().cloned().collect();
    for key in keys {
        let signal = cluster.signals.get(&key).unwrap().clone();
        let confidence = crate::confidence::compute_attribute_confidence_for_source(
            cfg,
            &cluster.source.source_type,
            signal.captured_date,
            &key,
            1,
            chrono::Utc::now(),
        );
        cluster.confident_signals.insert(key, confidence);
    }
    cluster.state = ClusterState::Provisional;
}

/// Run the full resolution decision for `cluster_id`: score against all
/// existing entities of the same type, pick a quadrant, and either merge
/// into the winning candidate or leave the cluster staged for creation
/// (entity creation itself happens in the caller via `decompose_signal` +
/// `store.put_entity`, since only the caller knows the freshly allocated id).
pub fn resolve_cluster(
    cfg: &ScoringConfig,
    store: &EntityStore,
    cluster_id: &str,
) -> Result<ResolutionOutcome> {
    let mut cluster = store.get_cluster(cluster_id)?;
    if cluster.confident_signals.is_empty() {
        score_cluster(cfg, &mut cluster);
    }
    if cluster.confident_signals.is_empty() {
        cluster.state = ClusterState::Confirmed;
        store.put_cluster(&cluster)?;
        return Ok(ResolutionOutcome {
            quadrant: Quadrant::Q1Create,
            match_zone: MatchZone::NoMatch,
            data_novelty: 0.0,
            association_score: 0.0,
            action: ResolutionAction::Skip,
            conflicts: Vec::new(),
        });
    }

    let candidates = store.list_entities_by_type(cluster.entity_type)?;
    let best = best_candidate(cfg, &cluster, &candidates);
    let incoming_facts = cluster_facts(&cluster);
    let primary_name = incoming_facts.names.first().map(String::as_str);

    let (score, candidate_entity) = match &best {
        Some((entity, score, _, _)) => (*score, Some((*entity).clone())),
        None => (0.0, None),
    };
    let zone = classify_zone(cfg, score, primary_name);
    let novelty = data_novelty(&cluster, candidate_entity.as_ref());

    cluster.association_score = Some(score);
    cluster.match_zone = Some(zone);
    cluster.data_novelty = Some(novelty);

    let (quadrant, action) = if matches!(zone, MatchZone::NoMatch) {
        // Spec §4.5.1 step 6: a NO_MATCH cluster still gets a second look
        // before falling all the way to Q1_CREATE — either another staged
        // cluster looks like the same person/org, or an existing entity's
        // record already mentions this name more than once in passing.
        let sibling_overlap = has_sibling_cluster_overlap(store, cluster_id, primary_name)?;
        let mention_count = primary_name.map(|n| count_entity_mentions(&candidates, n)).unwrap_or(0);
        if sibling_overlap || mention_count >= CONSOLIDATE_MENTION_THRESHOLD {
            if let Some(entity) = &candidate_entity {
                cluster.candidate_entity_id = Some(entity.entity_id.clone());
                cluster.candidate_entity_name = entity.name.primary().map(str::to_string);
            }
            (
                Quadrant::Q3Consolidate,
                ResolutionAction::Hold {
                    candidate_entity_id: candidate_entity.as_ref().map(|e| e.entity_id.clone()),
                },
            )
        } else {
            (Quadrant::Q1Create, ResolutionAction::CreateNew)
        }
    } else if let Some(entity) = candidate_entity.clone() {
        cluster.candidate_entity_id = Some(entity.entity_id.clone());
        cluster.candidate_entity_name = entity.name.primary().map(str::to_string);
        // Centered-entity candidates always enrich, regardless of novelty
        // (spec invariant 4) — everyone else goes by the data-novelty ratio.
        if is_centered_entity(store, &entity) || novelty > 0.5 {
            (
                Quadrant::Q2Enrich,
                ResolutionAction::Enrich {
                    candidate_entity_id: entity.entity_id.clone(),
                },
            )
        } else {
            (
                Quadrant::Q4Confirm,
                ResolutionAction::Confirm {
                    candidate_entity_id: entity.entity_id.clone(),
                },
            )
        }
    } else {
        (Quadrant::Q1Create, ResolutionAction::CreateNew)
    };
    cluster.quadrant = Some(quadrant);

    let mut conflicts = Vec::new();
    match &action {
        ResolutionAction::Enrich { candidate_entity_id } | ResolutionAction::Confirm { candidate_entity_id } => {
            let mut entity = store.get_entity(candidate_entity_id)?;
            match merge_cluster_into_entity(cfg, &mut entity, &mut cluster) {
                Ok(found) => {
                    conflicts = found;
                    store.put_entity(&entity)?;
                }
                Err(Error::ConflictBlocked { conflicts: blocking, .. }) => {
                    cluster.state = ClusterState::Provisional;
                    store.put_cluster(&cluster)?;
                    return Ok(ResolutionOutcome {
                        quadrant,
                        match_zone: zone,
                        data_novelty: novelty,
                        association_score: score,
                        action: ResolutionAction::Hold {
                            candidate_entity_id: Some(candidate_entity_id.clone()),
                        },
                        conflicts: blocking,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        ResolutionAction::Hold { .. } | ResolutionAction::CreateNew | ResolutionAction::Skip => {
            cluster.state = ClusterState::Provisional;
        }
    }

    store.put_cluster(&cluster)?;

    Ok(ResolutionOutcome {
        quadrant,
        match_zone: zone,
        data_novelty: novelty,
        association_score: score,
        action,
        conflicts,
    })
}

/// Materialize a brand-new entity from a cluster decided as `Q1_CREATE`
/// (spec §4.5.1 step 6). Allocates the entity id from the store's counters.
pub fn create_entity_from_cluster(
    cfg: &ScoringConfig,
    store: &mut EntityStore,
    cluster: &mut SignalCluster,
) -> Result<Entity> {
    let facts = cluster_facts(cluster);
    let primary_name = facts
        .names
        .first()
        .cloned()
        .ok_or_else(|| Error::Validation("cannot create an entity with no name signal".to_string()))?;
    let entity_id = store.next_entity_id(cluster.entity_type, &primary_name)?;

    let mut entity = Entity::builder()
        .entity_id(entity_id)
        .entity_type(cluster.entity_type)
        .name(EntityName {
            full: Some(primary_name),
            ..Default::default()
        })
        .source(cluster.source.source_type.clone())
        .created_by("resolver")
        .build()?;

    for (key, signal) in cluster.signals.clone() {
        if !cluster.confident_signals.contains_key(&key) {
            continue;
        }
        let attr = decompose_signal(cfg, &key, &signal, &cluster.source, &cluster.cluster_id, &[]);
        entity.attributes.push(attr);
    }
    entity
        .provenance_chain
        .source_documents
        .push(crate::entity::SourceDocumentRef {
            source: cluster.source.source_type.clone(),
            added_at: chrono::Utc::now(),
            cluster_id: Some(cluster.cluster_id.clone()),
        });

    cluster.candidate_entity_id = Some(entity.entity_id.clone());
    cluster.candidate_entity_name = entity.name.primary().map(str::to_string);
    cluster.state = ClusterState::Confirmed;
    cluster.resolved_at = Some(chrono::Utc::now());

    store.put_entity(&entity)?;
    store.put_cluster(cluster)?;
    Ok(entity)
}
