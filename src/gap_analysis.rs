//! Gap-analysis (completeness) engine (GA): scores every entity in a spoke
//! against a template's expected documents, entity roles, and cross-document
//! rules, and flags what's missing (spec §4.8).
//!
//! Grounded on the teacher's `ConfidenceBreakdown`
//! (`aetherlight-core/src/confidence.rs`): a small report struct that
//! exposes both the aggregate number and the per-dimension detail that
//! explains it, rather than a bare float.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::entity::{Entity, EntityType};
use crate::spoke::Spoke;
use crate::template::{NecessityTier, Template};

const MAX_SNIPPETS_PER_DOCUMENT: usize = 10;
const SNIPPET_MAX_CHARS: usize = 200;

/// Small alias table so a field named `full_name` in a template can be
/// satisfied by an entity attribute keyed `legal_name`, etc. (spec §4.8 step
/// 4 "`FIELD_ALIASES`").
fn field_aliases(field_id: &str) -> &'static [&'static str] {
    match field_id {
        "full_name" => &["full_name", "legal_name", "name"],
        "legal_name" => &["legal_name", "full_name"],
        "ssn" => &["ssn", "social_security_number"],
        "ein" => &["ein", "tax_id", "employer_identification_number"],
        "address" => &["address", "current_location", "location"],
        "dob" => &["dob", "date_of_birth"],
        "phone" => &["phone", "phone_number"],
        "insurance_info" => &["insurance_info", "insurance"],
        _ => &[],
    }
}

fn entity_has_field(entity: &Entity, field_id: &str) -> bool {
    if entity.find_attribute(field_id).is_some() {
        return true;
    }
    for alias in field_aliases(field_id) {
        if entity.find_attribute(alias).is_some() {
            return true;
        }
        if *alias == "full_name" || *alias == "legal_name" || *alias == "name" {
            if entity.all_names().iter().any(|n| !n.trim().is_empty()) {
                return true;
            }
        }
    }
    let needle = field_id.replace('_', " ").to_lowercase();
    entity
        .observations
        .iter()
        .any(|o| o.text.to_lowercase().contains(&needle))
}

/// `organization`/`business`/`institution` are interchangeable role aliases;
/// everything else must match the entity type's serde tag exactly.
fn entity_type_matches_role(entity_type: EntityType, role_type: &str) -> bool {
    let org_aliases = ["organization", "business", "institution"];
    match entity_type {
        EntityType::Person => role_type == "person",
        EntityType::Business | EntityType::Institution => org_aliases.contains(&role_type),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentIndexEntry {
    pub filename: String,
    pub entity_ids: Vec<String>,
    pub snippets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingField {
    pub field_id: String,
    pub document_type: String,
    pub necessity_tier: NecessityTier,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossDocViolation {
    pub rule_id: String,
    pub severity: String,
    pub conflicting_values: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GapScorecard {
    pub spoke_id: String,
    pub template_id: String,

    pub document_score: f64,
    pub filing_readiness: f64,
    pub quality_score: f64,
    pub completeness: f64,
    pub entity_score: f64,
    pub relationship_score: f64,
    pub overall_score: f64,

    pub found_documents: Vec<String>,
    pub missing_documents: Vec<String>,
    pub missing_blocking_fields: Vec<MissingField>,
    pub missing_expected_fields: Vec<MissingField>,
    pub missing_enriching_fields: Vec<MissingField>,
    pub cross_doc_violations: Vec<CrossDocViolation>,

    pub suggestions: Vec<String>,
    pub source_documents: Vec<String>,
    pub entity_count: usize,
    pub tier_adjustments_applied: usize,
}

fn truncate_snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_MAX_CHARS {
        text.to_string()
    } else {
        text.chars().take(SNIPPET_MAX_CHARS).collect()
    }
}

/// Step 1: walk every entity's `source_ref`, `provenance_chain.source_documents`,
/// and `observations` to build a per-filename index of entity ids and up to
/// 10 short text snippets.
fn build_document_index(entities: &[Entity]) -> Vec<DocumentIndexEntry> {
    let mut index: HashMap<String, DocumentIndexEntry> = HashMap::new();

    fn touch(index: &mut HashMap<String, DocumentIndexEntry>, filename: &str, entity_id: &str) {
        index
            .entry(filename.to_string())
            .or_insert_with(|| DocumentIndexEntry {
                filename: filename.to_string(),
                entity_ids: Vec::new(),
                snippets: Vec::new(),
            });
        let entry = index.get_mut(filename).unwrap();
        if !entry.entity_ids.iter().any(|id| id == entity_id) {
            entry.entity_ids.push(entity_id.to_string());
        }
    }

    for entity in entities {
        if let Some(source_ref) = &entity.source_ref {
            touch(&mut index, source_ref, &entity.entity_id);
        }
        for doc in &entity.provenance_chain.source_documents {
            touch(&mut index, &doc.source, &entity.entity_id);
        }
        for observation in &entity.observations {
            touch(&mut index, &observation.source, &entity.entity_id);
            if let Some(entry) = index.get_mut(&observation.source) {
                if entry.snippets.len() < MAX_SNIPPETS_PER_DOCUMENT {
                    entry.snippets.push(truncate_snippet(&observation.text));
                }
            }
        }
    }

    index.into_values().collect()
}

/// Step 2-3: classify each indexed filename against the template's
/// `document_types` by fractional `classification_signals` coverage
/// (deterministic, signal-based only — this crate has no LLM collaborator
/// wired in, so signal-based always wins per spec §4.8 step 2).
fn classify_documents<'a>(
    index: &'a [DocumentIndexEntry],
    template: &'a Template,
) -> HashMap<&'a str, Vec<&'a DocumentIndexEntry>> {
    let mut matches: HashMap<&str, Vec<&DocumentIndexEntry>> = HashMap::new();
    for entry in index {
        let haystack = format!("{} {}", entry.filename, entry.snippets.join(" ")).to_lowercase();
        let mut best: Option<(&str, f64)> = None;
        for doc_type in &template.document_types {
            if doc_type.classification_signals.is_empty() {
                continue;
            }
            let hits = doc_type
                .classification_signals
                .iter()
                .filter(|signal| haystack.contains(&signal.to_lowercase()))
                .count();
            if hits == 0 {
                continue;
            }
            let coverage = hits as f64 / doc_type.classification_signals.len() as f64;
            if best.map(|(_, c)| coverage > c).unwrap_or(true) {
                best = Some((doc_type.type_id.as_str(), coverage));
            }
        }
        if let Some((type_id, _)) = best {
            matches.entry(type_id).or_default().push(entry);
        }
    }
    matches
}

/// Steps 4-9 combined: given the classified documents, score fields,
/// entities, relationships, and cross-document rules, and assemble the
/// scorecard (spec §4.8).
pub fn analyze_gaps(spoke: &Spoke, template: &Template, entities: &[Entity]) -> GapScorecard {
    let index = build_document_index(entities);
    let classified = classify_documents(&index, template);

    let found_documents: Vec<String> = template
        .document_types
        .iter()
        .filter(|d| classified.contains_key(d.type_id.as_str()))
        .map(|d| d.type_id.clone())
        .collect();
    let missing_documents: Vec<String> = template
        .document_types
        .iter()
        .map(|d| d.type_id.clone())
        .filter(|id| !found_documents.contains(id))
        .collect();
    let document_score = if template.document_types.is_empty() {
        1.0
    } else {
        found_documents.len() as f64 / template.document_types.len() as f64
    };

    // Step 4: three-tier field scoring over present documents.
    //
    // DESIGN DECISION: a document type's fields only enter the
    // filing_readiness/quality_score/completeness denominators once that
    // document type has actually been classified as present; a document
    // type with zero matched filenames contributes nothing at all, not a
    // 0-out-of-N penalty.
    // WHY: filing_readiness answers "is what we *have* filing-ready", not
    // "how much of the full template exists" — that second question is
    // document_score's job. Counting an undetected document's fields as
    // missing-blocking would double-penalize the same gap in two different
    // scores and make filing_readiness unreadable on its own.
    // REASONING CHAIN:
    // 1. A spoke with only a passport on file and no tax form yet should
    //    read as "fully ready on what's filed" (filing_readiness 1.0) and
    //    separately as "missing a required document" (document_score < 1.0)
    //    — two distinct facts, not one blended number.
    // 2. If tax_form's `ssn` field counted toward total_blocking before
    //    tax_form was even detected, filing_readiness could never reach 1.0
    //    until every possible document existed, collapsing the distinction
    //    between "this document needs more fields" and "this document
    //    hasn't arrived yet".
    // 3. So the loop below is keyed off `classified.get(doc_type.type_id)`
    //    and `continue`s past any document type with no match at all.
    let mut extracted_blocking = 0usize;
    let mut total_blocking = 0usize;
    let mut extracted_expected = 0usize;
    let mut total_expected = 0usize;
    let mut extracted_all = 0usize;
    let mut total_all = 0usize;
    let mut missing_blocking_fields = Vec::new();
    let mut missing_expected_fields = Vec::new();
    let mut missing_enriching_fields = Vec::new();
    let mut tier_adjustments_applied = 0usize;

    for doc_type in &template.document_types {
        let Some(matched) = classified.get(doc_type.type_id.as_str()) else {
            continue;
        };
        let doc_entities: Vec<&Entity> = entities
            .iter()
            .filter(|e| matched.iter().any(|m| m.entity_ids.contains(&e.entity_id)))
            .collect();
        for field in &doc_type.extraction_spec {
            let effective_tier = spoke.effective_tier(&field.field_id, field.necessity_tier);
            if effective_tier != field.necessity_tier {
                tier_adjustments_applied += 1;
            }
            let present = doc_entities.iter().any(|e| entity_has_field(e, &field.field_id));

            total_all += 1;
            if present {
                extracted_all += 1;
            }
            match effective_tier {
                NecessityTier::Blocking => {
                    total_blocking += 1;
                    if present {
                        extracted_blocking += 1;
                    } else {
                        missing_blocking_fields.push(MissingField {
                            field_id: field.field_id.clone(),
                            document_type: doc_type.type_id.clone(),
                            necessity_tier: effective_tier,
                        });
                    }
                }
                NecessityTier::Expected => {
                    total_expected += 1;
                    if present {
                        extracted_expected += 1;
                    } else {
                        missing_expected_fields.push(MissingField {
                            field_id: field.field_id.clone(),
                            document_type: doc_type.type_id.clone(),
                            necessity_tier: effective_tier,
                        });
                    }
                }
                NecessityTier::Enriching => {
                    if !present {
                        missing_enriching_fields.push(MissingField {
                            field_id: field.field_id.clone(),
                            document_type: doc_type.type_id.clone(),
                            necessity_tier: effective_tier,
                        });
                    }
                }
            }
        }
    }

    let filing_readiness = if total_blocking == 0 {
        1.0
    } else {
        extracted_blocking as f64 / total_blocking as f64
    };
    let quality_denominator = total_blocking + total_expected;
    let quality_score = if quality_denominator == 0 {
        1.0
    } else {
        (extracted_blocking + extracted_expected) as f64 / quality_denominator as f64
    };
    let completeness = if total_all == 0 {
        1.0
    } else {
        extracted_all as f64 / total_all as f64
    };

    // Step 5: entity-role scoring.
    let mut entity_filled = 0usize;
    let mut entity_total = 0usize;
    let mut relationship_hits = 0usize;
    for role in &template.entity_roles {
        let keyword = role.display_name.to_lowercase();
        let candidates: Vec<&Entity> = entities
            .iter()
            .filter(|e| entity_type_matches_role(e.entity_type, &role.entity_type_alias))
            .collect();
        let mentioned = candidates.iter().any(|e| {
            e.observations.iter().any(|o| o.text.to_lowercase().contains(&keyword))
                || e.relationships.iter().any(|r| r.relationship_type.to_lowercase().contains(&keyword))
        });
        if !candidates.is_empty() || mentioned {
            relationship_hits += 1;
        }
        for field_id in &role.required_fields {
            entity_total += 1;
            if candidates.iter().any(|e| entity_has_field(e, field_id)) {
                entity_filled += 1;
            }
        }
    }
    let entity_score = if entity_total == 0 {
        1.0
    } else {
        entity_filled as f64 / entity_total as f64
    };
    let relationship_score = if template.entity_roles.is_empty() {
        1.0
    } else {
        relationship_hits as f64 / template.entity_roles.len() as f64
    };

    // Step 7: cross-document rules.
    let mut cross_doc_violations = Vec::new();
    for rule in &template.cross_doc_rules {
        let mut values: Vec<String> = Vec::new();
        for entity in entities {
            for field_id in &rule.fields {
                if let Some(attr) = entity.find_attribute(field_id) {
                    if let Some(s) = attr.value.as_str() {
                        values.push(s.to_lowercase());
                    }
                }
            }
        }
        match rule.validation {
            crate::template::RuleValidation::Exact => {
                let distinct: HashSet<&String> = values.iter().collect();
                if distinct.len() >= 2 {
                    cross_doc_violations.push(CrossDocViolation {
                        rule_id: rule.rule_id.clone(),
                        severity: rule.severity.clone(),
                        conflicting_values: distinct.into_iter().cloned().collect(),
                    });
                }
            }
            crate::template::RuleValidation::Fuzzy => {
                let mismatched = values
                    .windows(2)
                    .any(|pair| !pair[0].contains(pair[1].as_str()) && !pair[1].contains(pair[0].as_str()));
                if mismatched {
                    cross_doc_violations.push(CrossDocViolation {
                        rule_id: rule.rule_id.clone(),
                        severity: rule.severity.clone(),
                        conflicting_values: values,
                    });
                }
            }
            crate::template::RuleValidation::Comparison => {}
        }
    }

    // Step 8: overall score.
    let overall_score = if !template.document_types.is_empty() {
        0.5 * document_score + 0.5 * quality_score
    } else {
        0.4 * document_score + 0.4 * entity_score + 0.2 * relationship_score
    };
    let round2 = |v: f64| (v * 100.0).round() / 100.0;

    // Step 9: deterministic, capped suggestions.
    let mut suggestions = Vec::new();
    for doc_id in missing_documents.iter().take(5) {
        suggestions.push(format!("Request {doc_id} from client"));
    }
    for field in missing_blocking_fields.iter().chain(missing_expected_fields.iter()).take(5) {
        suggestions.push(format!("Obtain {} for {}", field.field_id, field.document_type));
    }
    for field in missing_blocking_fields.iter().take(3) {
        suggestions.push(format!("Extract {} from {}", field.field_id, field.document_type));
    }
    let missing_roles: Vec<&str> = template
        .entity_roles
        .iter()
        .filter(|role| {
            !entities
                .iter()
                .any(|e| entity_type_matches_role(e.entity_type, &role.entity_type_alias))
        })
        .map(|role| role.display_name.as_str())
        .take(3)
        .collect();
    for role_name in missing_roles {
        suggestions.push(format!("Identify and add {role_name}"));
    }

    let mut source_documents: Vec<String> = index.iter().map(|e| e.filename.clone()).collect();
    source_documents.sort();

    GapScorecard {
        spoke_id: spoke.spoke_id.clone(),
        template_id: template.template_id.clone(),
        document_score: round2(document_score),
        filing_readiness: round2(filing_readiness),
        quality_score: round2(quality_score),
        completeness: round2(completeness),
        entity_score: round2(entity_score),
        relationship_score: round2(relationship_score),
        overall_score: round2(overall_score),
        found_documents,
        missing_documents,
        missing_blocking_fields,
        missing_expected_fields,
        missing_enriching_fields,
        cross_doc_violations,
        suggestions,
        source_documents,
        entity_count: entities.len(),
        tier_adjustments_applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterSource, StagedSignal};
    use crate::config::ScoringConfig;
    use crate::decompose::decompose_signal;
    use crate::entity::{EntityName, Observation, SourceDocumentRef};
    use crate::template::TemplateRegistry;
    use chrono::Utc;

    fn entity_with(entity_id: &str, source_filename: &str, classification_hint: &str, attrs: &[(&str, &str)]) -> Entity {
        let mut e = Entity::builder()
            .entity_id(entity_id)
            .entity_type(EntityType::Person)
            .name(EntityName {
                full: Some("Zenobia Quark".into()),
                ..Default::default()
            })
            .source("manual")
            .build()
            .unwrap();
        e.provenance_chain.source_documents.push(SourceDocumentRef {
            source: source_filename.to_string(),
            added_at: Utc::now(),
            cluster_id: None,
        });
        e.observations.push(Observation {
            observation_id: "OBS-1".into(),
            text: format!("extracted from {source_filename}: {classification_hint}"),
            timestamp: Utc::now(),
            source: source_filename.to_string(),
            truth_level: "verified".into(),
            facts_layer: crate::entity::FactsLayer::Objective,
        });
        for (key, value) in attrs {
            e.attributes.push(decompose_signal(
                &ScoringConfig::default(),
                key,
                &StagedSignal {
                    value: serde_json::json!(value),
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
        }
        e
    }

    #[test]
    fn fully_documented_entity_scores_high() {
        let spoke = Spoke::default_spoke();
        let template = TemplateRegistry::default_intake_template();
        let entities = vec![entity_with(
            "ENT-ZQ-001",
            "passport_scan.pdf",
            "passport driver license",
            &[("full_name", "Zenobia Quark"), ("dob", "1990-01-01")],
        )];
        let scorecard = analyze_gaps(&spoke, &template, &entities);
        assert!(scorecard.found_documents.contains(&"government_id".to_string()));
        // Only government_id's fields count toward filing_readiness — a
        // document that was never classified as present (tax_form here)
        // contributes no blocking-field denominator at all (spec §4.8 step 4
        // scores fields "within present documents" only).
        assert_eq!(scorecard.filing_readiness, 1.0);
    }

    #[test]
    fn missing_blocking_document_lowers_document_score() {
        let spoke = Spoke::default_spoke();
        let template = TemplateRegistry::default_intake_template();
        let entities = vec![entity_with("ENT-ZQ-001", "random_note.txt", "a brief note", &[])];
        let scorecard = analyze_gaps(&spoke, &template, &entities);
        assert!(scorecard.missing_documents.contains(&"government_id".to_string()));
        assert!(scorecard.document_score < 1.0);
    }

    #[test]
    fn tier_adjustment_is_counted_and_changes_classification() {
        let mut spoke = Spoke::default_spoke();
        spoke.tier_adjustments.insert("dob".to_string(), NecessityTier::Enriching);
        let template = TemplateRegistry::default_intake_template();
        let entities = vec![entity_with(
            "ENT-ZQ-001",
            "passport_scan.pdf",
            "passport driver license",
            &[("full_name", "Zenobia Quark")],
        )];
        let scorecard = analyze_gaps(&spoke, &template, &entities);
        assert_eq!(scorecard.tier_adjustments_applied, 1);
        assert!(scorecard.missing_enriching_fields.iter().any(|f| f.field_id == "dob"));
        assert!(!scorecard.missing_blocking_fields.iter().any(|f| f.field_id == "dob"));
    }

    #[test]
    fn cross_doc_rule_flags_disagreeing_names() {
        let spoke = Spoke::default_spoke();
        let template = TemplateRegistry::default_intake_template();
        let entities = vec![
            entity_with(
                "ENT-ZQ-001",
                "passport_scan.pdf",
                "passport driver license",
                &[("full_name", "Zenobia Quark")],
            ),
            entity_with("ENT-ZQ-002", "w9_form.pdf", "w-9 tax form filing", &[("full_name", "Zen Quark")]),
        ];
        let scorecard = analyze_gaps(&spoke, &template, &entities);
        assert!(scorecard.cross_doc_violations.iter().any(|v| v.rule_id == "name_matches_across_documents"));
    }
}
