//! Scoring configuration: the module-scoped tables from spec §4.3/§4.4 made
//! injectable/overridable per spec §9 ("Global state... must be injectable").
//!
//! Mirrors the teacher's hierarchical `AetherlightConfig`
//! (`aetherlight-core/src/config/loader.rs`) in spirit: a single `Default`-able
//! struct threaded through every scoring call rather than a global singleton.
//! Unlike the teacher's 4-tier file hierarchy (system/team/project/user), a
//! tenant override here is a full `ScoringConfig` value the caller constructs;
//! there is no field-level merge (see DESIGN.md for why).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name-rarity classification used by the resolver's three-zone gate (spec §4.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameRarity {
    VeryCommon,
    Common,
    Standard,
}

impl NameRarity {
    pub fn threshold(&self) -> f64 {
        match self {
            NameRarity::VeryCommon => 0.45,
            NameRarity::Common => 0.35,
            NameRarity::Standard => 0.30,
        }
    }
}

/// Injectable scoring configuration: source weights, recency/corroboration
/// tables, association-factor weights, and name-rarity tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Source-class -> base weight (spec §4.3 table).
    pub source_weights: HashMap<String, f64>,
    /// Default weight for unmapped/unknown source types.
    pub unknown_source_weight: f64,
    /// Association-factor weights (spec §4.4); must sum to 1.0.
    pub association_weights: AssociationWeights,
    /// Exact-lowercase first/last-name tokens classified as very_common.
    pub very_common_names: Vec<String>,
    /// Exact-lowercase first/last-name tokens classified as common.
    pub common_names: Vec<String>,
    /// Per-tenant overrides of rarity classification, keyed by lowercase
    /// primary name. Takes precedence over the built-in tables entirely
    /// (spec §9 Open Question — see DESIGN.md for the precedence decision).
    pub name_rarity_overrides: HashMap<String, NameRarity>,
    /// High-confidence match zone threshold (spec §4.5.1 step 4).
    pub high_confidence_threshold: f64,
    /// Contradiction-penalty magnitudes (spec §4.4).
    pub penalties: ContradictionPenalties,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AssociationWeights {
    pub name: f64,
    pub handle: f64,
    pub org_title: f64,
    pub location: f64,
    pub bio: f64,
}

impl AssociationWeights {
    pub fn sum(&self) -> f64 {
        self.name + self.handle + self.org_title + self.location + self.bio
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContradictionPenalties {
    pub different_linkedin: f64,
    pub different_x_handle: f64,
    pub different_instagram_handle: f64,
    pub weak_name_mismatch: f64,
    pub company_mismatch: f64,
    pub location_mismatch_both_recent: f64,
    pub location_mismatch_stale: f64,
}

/// Recency modifier for volatile attribute keys (spec §4.3).
pub const VOLATILE_KEYS: &[&str] = &[
    "headline",
    "role",
    "current_role",
    "company",
    "current_company",
    "location",
    "current_location",
    "x_bio",
    "instagram_bio",
    "x_followers",
    "instagram_followers",
];

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut source_weights = HashMap::new();
        for key in ["user_input", "manual"] {
            source_weights.insert(key.to_string(), 0.95);
        }
        for key in ["linkedin_api", "proxycurl"] {
            source_weights.insert(key.to_string(), 0.90);
        }
        for key in ["linkedin_pdf", "linkedin"] {
            source_weights.insert(key.to_string(), 0.85);
        }
        for key in ["company_website", "about_page"] {
            source_weights.insert(key.to_string(), 0.80);
        }
        for key in ["file_upload", "file_import", "uploaded_document"] {
            source_weights.insert(key.to_string(), 0.75);
        }
        for key in ["x", "instagram", "social", "social_media"] {
            source_weights.insert(key.to_string(), 0.60);
        }
        for key in ["web", "url_extract", "scraped_web_page", "generic_url"] {
            source_weights.insert(key.to_string(), 0.50);
        }
        for key in ["entity_mention", "mention"] {
            source_weights.insert(key.to_string(), 0.40);
        }
        for key in ["unknown", "unmapped"] {
            source_weights.insert(key.to_string(), 0.40);
        }

        let very_common_names = [
            "james", "john", "robert", "michael", "david", "mary", "patricia",
            "jennifer", "linda", "elizabeth", "smith", "johnson", "williams",
            "brown", "jones", "garcia", "miller", "davis", "cj", "tj",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let common_names = [
            "chris", "sam", "alex", "jordan", "taylor", "morgan", "casey",
            "anderson", "thomas", "jackson", "white", "harris", "martin",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            source_weights,
            unknown_source_weight: 0.40,
            association_weights: AssociationWeights {
                name: 0.40,
                handle: 0.30,
                org_title: 0.15,
                location: 0.10,
                bio: 0.05,
            },
            very_common_names,
            common_names,
            name_rarity_overrides: HashMap::new(),
            high_confidence_threshold: 0.60,
            penalties: ContradictionPenalties {
                different_linkedin: 0.20,
                different_x_handle: 0.20,
                different_instagram_handle: 0.20,
                weak_name_mismatch: 0.15,
                company_mismatch: 0.05,
                location_mismatch_both_recent: 0.15,
                location_mismatch_stale: 0.05,
            },
        }
    }
}

impl ScoringConfig {
    pub fn source_weight(&self, source_type: &str) -> f64 {
        self.source_weights
            .get(source_type)
            .copied()
            .unwrap_or(self.unknown_source_weight)
    }

    /// Classify a primary name's rarity (spec §4.5.1 step 3), consulting the
    /// per-tenant override table first.
    pub fn classify_name_rarity(&self, primary_name: &str) -> NameRarity {
        let lower = primary_name.trim().to_lowercase();
        if let Some(rarity) = self.name_rarity_overrides.get(&lower) {
            return *rarity;
        }
        let tokens: Vec<&str> = lower.split_whitespace().collect();
        if tokens
            .iter()
            .any(|t| self.very_common_names.iter().any(|n| n == t))
        {
            return NameRarity::VeryCommon;
        }
        if tokens
            .iter()
            .any(|t| self.common_names.iter().any(|n| n == t))
        {
            return NameRarity::Common;
        }
        NameRarity::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let cfg = ScoringConfig::default();
        assert!((cfg.association_weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn source_weight_table_lookup() {
        let cfg = ScoringConfig::default();
        assert_eq!(cfg.source_weight("linkedin_api"), 0.90);
        assert_eq!(cfg.source_weight("totally_unknown_thing"), 0.40);
    }

    #[test]
    fn rarity_override_takes_precedence() {
        let mut cfg = ScoringConfig::default();
        cfg.name_rarity_overrides
            .insert("zenobia quark".to_string(), NameRarity::Standard);
        assert_eq!(cfg.classify_name_rarity("Zenobia Quark"), NameRarity::Standard);
    }

    #[test]
    fn very_common_token_detected() {
        let cfg = ScoringConfig::default();
        assert_eq!(cfg.classify_name_rarity("John Appleseed"), NameRarity::VeryCommon);
    }
}
