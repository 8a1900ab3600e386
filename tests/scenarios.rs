//! End-to-end scenarios exercising the full staging -> resolution ->
//! gap-analysis pipeline through the public `Provisioner` facade.

use std::collections::HashMap;

use kg_provisioner::cluster::StagedSignal;
use kg_provisioner::entity::{EntityType, FactsLayer, Observation};
use kg_provisioner::resolver::ResolutionAction;
use kg_provisioner::template::TemplateRegistry;
use kg_provisioner::{Provisioner, ScoringConfig};

use chrono::{Duration, Utc};
use tempfile::tempdir;

fn signal(value: serde_json::Value) -> StagedSignal {
    StagedSignal {
        value,
        captured_date: None,
    }
}

#[test]
fn pure_create_with_no_existing_entities() {
    let dir = tempdir().unwrap();
    let mut provisioner = Provisioner::open(dir.path(), ScoringConfig::default()).unwrap();

    let mut signals = HashMap::new();
    signals.insert("full_name".to_string(), signal(serde_json::json!("Harold Finch")));
    signals.insert("role".to_string(), signal(serde_json::json!("Consultant")));
    let cluster = provisioner
        .stage(EntityType::Person, "manual", None, None, signals)
        .unwrap();

    let outcome = provisioner.resolve(&cluster.cluster_id).unwrap();
    assert!(matches!(outcome.action, ResolutionAction::CreateNew));
    let entities = provisioner.store.list_entities().unwrap();
    assert_eq!(entities.len(), 1);
    // Spec §8 scenario 1: "Harold Finch" -> initials HF, first of that
    // initials pair in this tenant.
    assert_eq!(entities[0].entity_id, "ENT-HF-001");
}

#[test]
fn corroborating_signal_raises_confidence_without_creating_a_duplicate() {
    let dir = tempdir().unwrap();
    let mut provisioner = Provisioner::open(dir.path(), ScoringConfig::default()).unwrap();

    let mut first_signals = HashMap::new();
    first_signals.insert("full_name".to_string(), signal(serde_json::json!("Zenobia Quark")));
    first_signals.insert("headline".to_string(), signal(serde_json::json!("Staff Engineer")));
    let first = provisioner
        .stage(EntityType::Person, "linkedin_api", None, None, first_signals)
        .unwrap();
    provisioner.resolve(&first.cluster_id).unwrap();
    let entity_id = provisioner.store.list_entities().unwrap()[0].entity_id.clone();
    let before = provisioner.store.get_entity(&entity_id).unwrap();
    let before_conf = before.find_attribute("headline").unwrap().confidence;

    let mut second_signals = HashMap::new();
    second_signals.insert("full_name".to_string(), signal(serde_json::json!("Zenobia Quark")));
    second_signals.insert("headline".to_string(), signal(serde_json::json!("Staff Engineer")));
    let second = provisioner
        .stage(EntityType::Person, "linkedin_api", None, None, second_signals)
        .unwrap();
    provisioner.resolve(&second.cluster_id).unwrap();

    assert_eq!(provisioner.store.list_entities().unwrap().len(), 1);
    let after = provisioner.store.get_entity(&entity_id).unwrap();
    let after_conf = after.find_attribute("headline").unwrap().confidence;
    assert!(after_conf >= before_conf);
}

#[test]
fn enrich_with_temporal_conflict_auto_resolves() {
    let dir = tempdir().unwrap();
    let mut provisioner = Provisioner::open(dir.path(), ScoringConfig::default()).unwrap();

    let mut first_signals = HashMap::new();
    first_signals.insert("full_name".to_string(), signal(serde_json::json!("Jonathan Smith")));
    first_signals.insert(
        "role".to_string(),
        StagedSignal {
            value: serde_json::json!("Associate"),
            captured_date: Some(Utc::now() - Duration::days(900)),
        },
    );
    let first = provisioner
        .stage(EntityType::Person, "linkedin_api", None, None, first_signals)
        .unwrap();
    provisioner.resolve(&first.cluster_id).unwrap();
    let entity_id = provisioner.store.list_entities().unwrap()[0].entity_id.clone();

    let mut second_signals = HashMap::new();
    second_signals.insert("full_name".to_string(), signal(serde_json::json!("Jonathan Smith")));
    second_signals.insert(
        "role".to_string(),
        StagedSignal {
            value: serde_json::json!("Principal"),
            captured_date: Some(Utc::now()),
        },
    );
    let second = provisioner
        .stage(EntityType::Person, "linkedin_api", None, None, second_signals)
        .unwrap();
    let outcome = provisioner.resolve(&second.cluster_id).unwrap();
    assert!(matches!(outcome.action, ResolutionAction::Enrich { .. }));

    let updated = provisioner.store.get_entity(&entity_id).unwrap();
    assert_eq!(
        updated.find_attribute("role").unwrap().value,
        serde_json::json!("Principal")
    );
}

#[test]
fn gap_analysis_against_legacy_and_current_templates() {
    let dir = tempdir().unwrap();
    let mut provisioner = Provisioner::open(dir.path(), ScoringConfig::default()).unwrap();

    let mut signals = HashMap::new();
    signals.insert("full_name".to_string(), signal(serde_json::json!("Priya Nair")));
    signals.insert("role".to_string(), signal(serde_json::json!("Director")));
    let cluster = provisioner
        .stage(EntityType::Person, "file_upload", None, None, signals)
        .unwrap();
    provisioner.resolve(&cluster.cluster_id).unwrap();
    let entity_id = provisioner.store.list_entities().unwrap()[0].entity_id.clone();

    // Simulate a scanned document landing on the entity, the way the object
    // decomposer's source-document trail would in a full extraction run.
    let mut entity = provisioner.store.get_entity(&entity_id).unwrap();
    entity.observations.push(Observation {
        observation_id: "OBS-doc-1".to_string(),
        text: "full name on file: Priya Nair".to_string(),
        timestamp: Utc::now(),
        source: "full_name_form.pdf".to_string(),
        truth_level: "verified".to_string(),
        facts_layer: FactsLayer::Objective,
    });
    provisioner.store.put_entity(&entity).unwrap();

    let legacy = kg_provisioner::template::Template::from_raw_json(
        "legacy_person",
        &serde_json::json!(["full_name", "role", "company"]),
    )
    .unwrap();
    let legacy_scorecard = provisioner.analyze_gaps(&entity.spoke_id, &legacy).unwrap();
    assert!(legacy_scorecard.found_documents.contains(&"full_name".to_string()));
    assert!(legacy_scorecard.missing_documents.contains(&"role".to_string()));
    assert!(legacy_scorecard.missing_documents.contains(&"company".to_string()));

    let current = TemplateRegistry::default_intake_template();
    let current_scorecard = provisioner.analyze_gaps(&entity.spoke_id, &current).unwrap();
    assert!(current_scorecard.missing_documents.contains(&"tax_form".to_string()));
    assert_eq!(current_scorecard.entity_count, 1);
}
