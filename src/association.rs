//! Association scorer (AS): the five-factor weighted similarity between an
//! incoming signal cluster and a candidate entity (spec §4.4).
//!
//! Grounded on the teacher's `PatternMatcher` (`aetherlight-core/src/matching.rs`):
//! a fixed list of named dimensions, each scored independently in `[0,1]`,
//! combined with configured weights into one match score plus a breakdown
//! map the caller can surface for debugging/audit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::similarity::{bag_of_words_jaccard, max_name_similarity, normalize_business_name, similarity, token_overlap_ratio};

/// The subset of a signal cluster's fields the association scorer cares
/// about, pulled out of the raw signal map by the resolver before scoring.
#[derive(Debug, Clone, Default)]
pub struct AssociationFacts {
    pub names: Vec<String>,
    pub linkedin_handle: Option<String>,
    pub x_handle: Option<String>,
    pub instagram_handle: Option<String>,
    pub org: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub captured_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct AssociationResult {
    pub score: f64,
    pub breakdown: HashMap<String, f64>,
    pub contradictions: Vec<String>,
}

fn handles_contradict(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => !x.trim().eq_ignore_ascii_case(y.trim()),
        _ => false,
    }
}

fn handle_factor(incoming: &Option<String>, existing: &Option<String>) -> Option<f64> {
    match (incoming, existing) {
        (Some(x), Some(y)) => Some(if x.trim().eq_ignore_ascii_case(y.trim()) {
            1.0
        } else {
            0.0
        }),
        _ => None,
    }
}

fn org_title_factor(incoming: &AssociationFacts, existing: &AssociationFacts) -> Option<f64> {
    let org_score = match (&incoming.org, &existing.org) {
        (Some(a), Some(b)) => Some(similarity(
            &normalize_business_name(a),
            &normalize_business_name(b),
        )),
        _ => None,
    };
    let title_score = match (&incoming.title, &existing.title) {
        (Some(a), Some(b)) => Some(similarity(a, b)),
        _ => None,
    };
    match (org_score, title_score) {
        (Some(o), Some(t)) => Some((o + t) / 2.0),
        (Some(o), None) => Some(o),
        (None, Some(t)) => Some(t),
        (None, None) => None,
    }
}

/// Score an incoming cluster's facts against a candidate entity's facts,
/// returning the weighted total (clamped to `[0,1]`), the per-factor
/// breakdown, and a list of human-readable contradiction labels (spec §4.4
/// "contradiction penalties").
///
/// DESIGN DECISION: weighted sum against a fixed denominator, not a
/// present-factors average.
/// WHY: the five weights are fixed and sum to 1 by construction
/// (`ScoringConfig::default` / `AssociationWeights::sum`); a factor with no
/// evidence on either side contributes 0 to the sum and is simply absent
/// from the normalizer, never dividing only by the weights that happened to
/// have data. Renormalizing over present factors would let a bare name
/// match (weight 0.40) reach the same score as a name match corroborated by
/// handle/org/location/bio evidence, defeating the whole point of weighting
/// name below the high-confidence bar.
///
/// REASONING CHAIN:
/// 1. A cluster with only a name signal has no handle/org/location/bio to
///    compare, so those four factors are absent from `breakdown`.
/// 2. Dividing `weighted_sum` by `weight_total` (sum of only the weights
///    seen) would let `name_score * 0.40` renormalize up to `name_score`
///    itself once it's the only term — an exact name match alone would then
///    read as a ~1.0 association score.
/// 3. Dividing by the full fixed weight total (1.0) instead means an
///    exact name match alone caps out at 0.40, correctly landing in
///    NO_MATCH/AMBIGUOUS territory rather than HIGH_CONFIDENCE_MATCH.
pub fn score_association(
    cfg: &ScoringConfig,
    incoming: &AssociationFacts,
    existing: &AssociationFacts,
) -> AssociationResult {
    let w = &cfg.association_weights;
    let weight_total = w.sum();
    let mut breakdown = HashMap::new();
    let mut contradictions = Vec::new();
    let mut weighted_sum = 0.0;

    let name_score = max_name_similarity(&incoming.names, &existing.names);
    breakdown.insert("name".to_string(), name_score);
    weighted_sum += name_score * w.name;

    let handle_scores = [
        handle_factor(&incoming.linkedin_handle, &existing.linkedin_handle),
        handle_factor(&incoming.x_handle, &existing.x_handle),
        handle_factor(&incoming.instagram_handle, &existing.instagram_handle),
    ];
    let present_handles: Vec<f64> = handle_scores.into_iter().flatten().collect();
    if !present_handles.is_empty() {
        let handle_score = present_handles.iter().sum::<f64>() / present_handles.len() as f64;
        breakdown.insert("handle".to_string(), handle_score);
        weighted_sum += handle_score * w.handle;
    }

    if let Some(org_title_score) = org_title_factor(incoming, existing) {
        breakdown.insert("org_title".to_string(), org_title_score);
        weighted_sum += org_title_score * w.org_title;
    }

    if let (Some(a), Some(b)) = (&incoming.location, &existing.location) {
        let loc_score = token_overlap_ratio(a, b).max(similarity(a, b));
        breakdown.insert("location".to_string(), loc_score);
        weighted_sum += loc_score * w.location;
    }

    if let (Some(a), Some(b)) = (&incoming.bio, &existing.bio) {
        let bio_score = bag_of_words_jaccard(a, b);
        breakdown.insert("bio".to_string(), bio_score);
        weighted_sum += bio_score * w.bio;
    }

    let mut penalty = 0.0;
    if handles_contradict(&incoming.linkedin_handle, &existing.linkedin_handle) {
        penalty += cfg.penalties.different_linkedin;
        contradictions.push("different_linkedin_handle".to_string());
    }
    if handles_contradict(&incoming.x_handle, &existing.x_handle) {
        penalty += cfg.penalties.different_x_handle;
        contradictions.push("different_x_handle".to_string());
    }
    if handles_contradict(&incoming.instagram_handle, &existing.instagram_handle) {
        penalty += cfg.penalties.different_instagram_handle;
        contradictions.push("different_instagram_handle".to_string());
    }
    if name_score < 0.3 && !incoming.names.is_empty() && !existing.names.is_empty() {
        penalty += cfg.penalties.weak_name_mismatch;
        contradictions.push("weak_name_mismatch".to_string());
    }
    if let (Some(a), Some(b)) = (&incoming.org, &existing.org) {
        let org_sim = similarity(&normalize_business_name(a), &normalize_business_name(b));
        if org_sim < 0.5 {
            penalty += cfg.penalties.company_mismatch;
            contradictions.push("company_mismatch".to_string());
        }
    }
    if let (Some(a), Some(b)) = (&incoming.location, &existing.location) {
        let loc_sim = token_overlap_ratio(a, b).max(similarity(a, b));
        if loc_sim < 0.2 {
            let both_recent = incoming
                .captured_date
                .zip(existing.captured_date)
                .map(|(ci, ce)| (Utc::now() - ci).num_days() < 365 && (Utc::now() - ce).num_days() < 365)
                .unwrap_or(false);
            if both_recent {
                penalty += cfg.penalties.location_mismatch_both_recent;
                contradictions.push("location_mismatch_both_recent".to_string());
            } else {
                penalty += cfg.penalties.location_mismatch_stale;
                contradictions.push("location_mismatch_stale".to_string());
            }
        }
    }

    let base = if weight_total > 0.0 { weighted_sum / weight_total } else { 0.0 };
    let score = (base - penalty).clamp(0.0, 1.0);

    AssociationResult {
        score,
        breakdown,
        contradictions,
    }
}
