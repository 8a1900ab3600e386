//! Template registry (T): normalizes the completeness checklist a
//! gap-analysis run walks, unifying the legacy flat document-list shape with
//! the current document/entity/cross-doc-rule shape onto one normalized
//! `Template` (spec §4.9).
//!
//! Grounded on the teacher's `domain_pattern_library`
//! (`aetherlight-core/src/domain_pattern_library.rs`): a small registry of
//! named, versioned templates loaded once and looked up by name, with a
//! normalization step that upgrades older shapes on read.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How badly a field's absence hurts a filing (spec §3/§4.8 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NecessityTier {
    Blocking,
    Expected,
    Enriching,
}

/// How sensitive a field's value is, independent of how necessary it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sensitivity {
    Critical,
    High,
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleValidation {
    Exact,
    Comparison,
    Fuzzy,
}

/// One field a document is expected to carry once classified (spec §2
/// "extraction_spec").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionField {
    pub field_id: String,
    pub display_name: String,
    pub field_type: String,
    pub sensitivity: Sensitivity,
    pub necessity_tier: NecessityTier,
}

/// One kind of document the gap analyzer looks for (spec §2 "Template").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentType {
    pub type_id: String,
    pub display_name: String,
    pub category: String,
    pub priority: Priority,
    pub classification_signals: Vec<String>,
    pub extraction_spec: Vec<ExtractionField>,
}

/// A role an entity in the spoke is expected to fill (spec §2 "entity_roles").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRole {
    pub role_id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub entity_type_alias: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub min_count: Option<u32>,
    #[serde(default)]
    pub required_fields: Vec<String>,
}

/// A rule checked across every document/entity in scope (spec §2
/// "cross_doc_rules").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossDocRule {
    pub rule_id: String,
    pub description: String,
    pub severity: String,
    pub validation: RuleValidation,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub template_id: String,
    pub version: u32,
    pub display_name: String,
    #[serde(default)]
    pub document_types: Vec<DocumentType>,
    #[serde(default)]
    pub entity_roles: Vec<EntityRole>,
    #[serde(default)]
    pub cross_doc_rules: Vec<CrossDocRule>,
    /// Back-compat: document type ids grouped by category (spec §4.9).
    #[serde(default)]
    pub required_documents: HashMap<String, Vec<String>>,
    /// Back-compat: the flattened list of entity role ids (spec §4.9).
    #[serde(default)]
    pub required_entities: Vec<String>,
}

/// On-disk representation tolerating the legacy flat document-name list
/// (`["government_id", "proof_of_address"]`) alongside the current
/// document/entity-role shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawTemplate {
    Legacy(Vec<String>),
    Current {
        #[serde(default)]
        version: u32,
        #[serde(default)]
        document_types: Vec<DocumentType>,
        #[serde(default)]
        entity_roles: Vec<EntityRole>,
        #[serde(default)]
        cross_doc_rules: Vec<CrossDocRule>,
    },
}

/// Sensitivity inferred for a legacy-wrapped field by name (spec §4.9).
fn sensitivity_for_legacy_field(field_id: &str) -> Sensitivity {
    match field_id {
        "ssn" | "ein" => Sensitivity::Critical,
        "full_name" | "legal_name" | "dob" => Sensitivity::High,
        "address" | "contact" => Sensitivity::Standard,
        _ => Sensitivity::Standard,
    }
}

fn titleize(key: &str) -> String {
    key.split('_')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl Template {
    /// Synthesize a current-shape template from a legacy flat document-name
    /// list: one `DocumentType` per item, each with a single blocking
    /// extraction field named after the item (spec §4.9 "legacy templates
    /// gain synthesized document_types... and synthesized entity_roles").
    fn from_legacy(name: &str, keys: Vec<String>) -> Self {
        let document_types: Vec<DocumentType> = keys
            .iter()
            .map(|key| DocumentType {
                type_id: key.clone(),
                display_name: titleize(key),
                category: "general".to_string(),
                priority: Priority::Medium,
                classification_signals: vec![key.replace('_', " ")],
                extraction_spec: vec![ExtractionField {
                    field_id: key.clone(),
                    display_name: titleize(key),
                    field_type: "text".to_string(),
                    sensitivity: sensitivity_for_legacy_field(key),
                    necessity_tier: NecessityTier::Blocking,
                }],
            })
            .collect();
        Template::normalized(name.to_string(), 1, document_types, Vec::new(), Vec::new())
    }

    fn normalized(
        template_id: String,
        version: u32,
        document_types: Vec<DocumentType>,
        entity_roles: Vec<EntityRole>,
        cross_doc_rules: Vec<CrossDocRule>,
    ) -> Self {
        let mut required_documents: HashMap<String, Vec<String>> = HashMap::new();
        for doc in &document_types {
            required_documents
                .entry(doc.category.clone())
                .or_default()
                .push(doc.type_id.clone());
        }
        let required_entities = entity_roles.iter().map(|r| r.role_id.clone()).collect();
        let display_name = titleize(&template_id);
        Template {
            template_id,
            version,
            display_name,
            document_types,
            entity_roles,
            cross_doc_rules,
            required_documents,
            required_entities,
        }
    }

    pub fn from_raw_json(name: &str, raw: &serde_json::Value) -> Result<Self> {
        let parsed: RawTemplate = serde_json::from_value(raw.clone())
            .map_err(|e| Error::Validation(format!("invalid template '{name}': {e}")))?;
        Ok(match parsed {
            RawTemplate::Legacy(keys) => Template::from_legacy(name, keys),
            RawTemplate::Current {
                version,
                document_types,
                entity_roles,
                cross_doc_rules,
            } => Template::normalized(
                name.to_string(),
                version.max(1),
                document_types,
                entity_roles,
                cross_doc_rules,
            ),
        })
    }

    pub fn find_document_type(&self, type_id: &str) -> Option<&DocumentType> {
        self.document_types.iter().find(|d| d.type_id == type_id)
    }
}

/// In-memory registry of named completeness templates. A `register()` call
/// overwrites any prior registration under the same id — this is how this
/// crate models "a directory of per-template files overrides a flat
/// registration file" (spec §4.9): later registrations win.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.template_id.clone(), template);
    }

    pub fn get(&self, name: &str) -> Result<&Template> {
        self.templates
            .get(name)
            .ok_or_else(|| Error::not_found("template", name))
    }

    /// The built-in "client_intake" template used when no tenant override
    /// exists: a small but real compliance checklist (identity document,
    /// proof of address, tax form) plus one entity role and one cross-doc
    /// rule comparing the legal name across documents.
    pub fn default_intake_template() -> Template {
        let document_types = vec![
            DocumentType {
                type_id: "government_id".to_string(),
                display_name: "Government Id".to_string(),
                category: "identity".to_string(),
                priority: Priority::High,
                classification_signals: vec!["passport".into(), "driver license".into(), "government id".into()],
                extraction_spec: vec![
                    ExtractionField {
                        field_id: "full_name".into(),
                        display_name: "Full Name".into(),
                        field_type: "text".into(),
                        sensitivity: Sensitivity::High,
                        necessity_tier: NecessityTier::Blocking,
                    },
                    ExtractionField {
                        field_id: "dob".into(),
                        display_name: "Date Of Birth".into(),
                        field_type: "date".into(),
                        sensitivity: Sensitivity::High,
                        necessity_tier: NecessityTier::Blocking,
                    },
                ],
            },
            DocumentType {
                type_id: "proof_of_address".to_string(),
                display_name: "Proof Of Address".to_string(),
                category: "identity".to_string(),
                priority: Priority::Medium,
                classification_signals: vec!["utility bill".into(), "proof of address".into(), "lease".into()],
                extraction_spec: vec![ExtractionField {
                    field_id: "address".into(),
                    display_name: "Address".into(),
                    field_type: "text".into(),
                    sensitivity: Sensitivity::Standard,
                    necessity_tier: NecessityTier::Expected,
                }],
            },
            DocumentType {
                type_id: "tax_form".to_string(),
                display_name: "Tax Form".to_string(),
                category: "tax".to_string(),
                priority: Priority::High,
                classification_signals: vec!["w-9".into(), "w9".into(), "tax form".into()],
                extraction_spec: vec![ExtractionField {
                    field_id: "ssn".into(),
                    display_name: "Ssn".into(),
                    field_type: "text".into(),
                    sensitivity: Sensitivity::Critical,
                    necessity_tier: NecessityTier::Blocking,
                }],
            },
        ];
        let entity_roles = vec![EntityRole {
            role_id: "primary_contact".to_string(),
            display_name: "Primary Contact".to_string(),
            entity_type_alias: "person".to_string(),
            optional: false,
            min_count: Some(1),
            required_fields: vec!["full_name".to_string()],
        }];
        let cross_doc_rules = vec![CrossDocRule {
            rule_id: "name_matches_across_documents".to_string(),
            description: "The legal name must agree across identity and tax documents".to_string(),
            severity: "high".to_string(),
            validation: RuleValidation::Exact,
            fields: vec!["full_name".to_string()],
        }];
        Template::normalized("client_intake".to_string(), 1, document_types, entity_roles, cross_doc_rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_list_synthesizes_one_blocking_document_per_item() {
        let raw = serde_json::json!(["ssn", "proof_of_address"]);
        let template = Template::from_raw_json("legacy_intake", &raw).unwrap();
        assert_eq!(template.document_types.len(), 2);
        let ssn_doc = template.find_document_type("ssn").unwrap();
        assert_eq!(ssn_doc.extraction_spec[0].sensitivity, Sensitivity::Critical);
        assert_eq!(ssn_doc.extraction_spec[0].necessity_tier, NecessityTier::Blocking);
    }

    #[test]
    fn current_format_preserves_tiers_and_back_compat_lists() {
        let raw = serde_json::json!({
            "document_types": [{
                "type_id": "w9",
                "display_name": "W-9",
                "category": "tax",
                "priority": "HIGH",
                "classification_signals": ["w-9"],
                "extraction_spec": [{
                    "field_id": "ein",
                    "display_name": "EIN",
                    "field_type": "text",
                    "sensitivity": "CRITICAL",
                    "necessity_tier": "BLOCKING"
                }]
            }],
            "entity_roles": [{
                "role_id": "business",
                "display_name": "Business",
                "type": "business",
                "required_fields": ["legal_name"]
            }]
        });
        let template = Template::from_raw_json("current_intake", &raw).unwrap();
        assert_eq!(template.required_documents.get("tax").unwrap(), &vec!["w9".to_string()]);
        assert_eq!(template.required_entities, vec!["business".to_string()]);
    }

    #[test]
    fn registry_lookup_by_name_and_overwrite_on_reregister() {
        let mut registry = TemplateRegistry::new();
        registry.register(TemplateRegistry::default_intake_template());
        assert!(registry.get("client_intake").is_ok());
        assert!(registry.get("missing").is_err());

        let mut overridden = TemplateRegistry::default_intake_template();
        overridden.display_name = "Overridden".to_string();
        registry.register(overridden);
        assert_eq!(registry.get("client_intake").unwrap().display_name, "Overridden");
    }
}
