//! Domain profile registry.
//!
//! A domain profile carries two things the pipeline consults: column-role
//! overrides for the schema analyzer and sanity rules for the outlier
//! detector. Both are plain data, so new domains can be injected from JSON
//! without touching either step.

use crate::error::{PipelineError, Result};
use crate::types::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The domain used when a dataset declares none, or one the registry lacks.
pub const DEFAULT_DOMAIN: &str = "general";

/// A known column entry: a loosely written role name (`id`, `text`, `categorical`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownColumn {
    pub role: String,
}

impl KnownColumn {
    fn new(role: &str) -> Self {
        Self {
            role: role.to_string(),
        }
    }
}

/// The value check a sanity rule applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SanityCheck {
    /// Any value strictly above `limit` is suspicious.
    Above { limit: f64 },
    /// Any negative value is suspicious.
    Negative,
    /// Any value outside `[min, max]` is suspicious.
    OutsideRange { min: f64, max: f64 },
}

impl SanityCheck {
    /// Whether any of `values` violates the check.
    pub fn violated_by(&self, values: &[f64]) -> bool {
        match *self {
            Self::Above { limit } => values.iter().any(|v| *v > limit),
            Self::Negative => values.iter().any(|v| *v < 0.0),
            Self::OutsideRange { min, max } => values.iter().any(|v| *v < min || *v > max),
        }
    }

    fn describe(&self) -> String {
        match *self {
            Self::Above { limit } => format!("has values > {limit}"),
            Self::Negative => "has impossible negative values".to_string(),
            Self::OutsideRange { min, max } => {
                format!("has values outside the [{min}, {max}] range")
            }
        }
    }
}

/// A check applied to every numeric column whose name contains one of `name_contains`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanityRule {
    pub name_contains: Vec<String>,
    pub check: SanityCheck,
}

impl SanityRule {
    fn new(tokens: &[&str], check: SanityCheck) -> Self {
        Self {
            name_contains: tokens.iter().map(|t| t.to_string()).collect(),
            check,
        }
    }

    /// Case-insensitive substring match on the column name.
    pub fn applies_to(&self, column: &str) -> bool {
        let lower = column.to_lowercase();
        self.name_contains
            .iter()
            .any(|token| lower.contains(token.to_lowercase().as_str()))
    }
}

/// One business domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainProfile {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub known_columns: BTreeMap<String, KnownColumn>,
    #[serde(default)]
    pub sanity_rules: Vec<SanityRule>,
}

impl DomainProfile {
    fn new(display_name: &str, description: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            description: description.to_string(),
            known_columns: BTreeMap::new(),
            sanity_rules: Vec::new(),
        }
    }

    fn with_columns(mut self, columns: &[(&str, &str)]) -> Self {
        for (name, role) in columns {
            self.known_columns
                .insert(name.to_string(), KnownColumn::new(role));
        }
        self
    }

    fn with_rule(mut self, rule: SanityRule) -> Self {
        self.sanity_rules.push(rule);
        self
    }

    /// The pipeline role declared for an exact column name, if any.
    pub fn known_role(&self, column: &str) -> Option<Role> {
        self.known_columns
            .get(column)
            .map(|known| Role::from_alias(&known.role))
    }

    /// Warning texts for every rule `values` violates in `column`.
    pub fn sanity_warnings(&self, column: &str, values: &[f64]) -> Vec<String> {
        self.sanity_rules
            .iter()
            .filter(|rule| rule.applies_to(column) && rule.check.violated_by(values))
            .map(|rule| {
                format!(
                    "{} sanity: '{}' {}.",
                    self.display_name,
                    column,
                    rule.check.describe()
                )
            })
            .collect()
    }
}

/// Read-only mapping from domain name to [`DomainProfile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainRegistry {
    domains: BTreeMap<String, DomainProfile>,
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DomainRegistry {
    /// The domains shipped with the pipeline.
    pub fn builtin() -> Self {
        let mut domains = BTreeMap::new();

        domains.insert(
            "general".to_string(),
            DomainProfile::new("General", "General-purpose tabular datasets"),
        );
        domains.insert(
            "healthcare".to_string(),
            DomainProfile::new("Healthcare", "Clinical, claims, and patient datasets")
                .with_rule(SanityRule::new(&["age"], SanityCheck::Above { limit: 120.0 }))
                .with_rule(SanityRule::new(
                    &["pressure", "weight", "height"],
                    SanityCheck::Negative,
                )),
        );
        domains.insert(
            "finance".to_string(),
            DomainProfile::new("Finance", "Financial, transaction, and risk datasets").with_rule(
                SanityRule::new(&["price", "volume", "amount"], SanityCheck::Negative),
            ),
        );
        domains.insert(
            "education".to_string(),
            DomainProfile::new("Education", "Education and student datasets").with_rule(
                SanityRule::new(
                    &["grade", "score"],
                    SanityCheck::OutsideRange {
                        min: 0.0,
                        max: 100.0,
                    },
                ),
            ),
        );
        domains.insert(
            "ecommerce".to_string(),
            DomainProfile::new("E-Commerce", "Retail and commerce datasets"),
        );
        domains.insert(
            "ai_incidents".to_string(),
            DomainProfile::new(
                "AI Incident Database",
                "Documented AI failures and harms in AIID format",
            )
            .with_columns(&[
                ("incident_id", "id_col"),
                ("title", "text"),
                ("description", "text"),
                ("date", "datetime"),
                ("year", "feature"),
                ("allegeddeployerofaisystem", "categorical"),
                ("allegeddeveloperofaisystem", "categorical"),
                ("allegedharmedornearlyharmedparties", "categorical"),
                // misspelling found in external AIID exports
                ("allegedharmedornearlyharmeddparties", "categorical"),
                ("harm_type", "categorical"),
                ("sector_of_deployment", "categorical"),
                ("technology_purveyor", "categorical"),
                ("ai_system", "categorical"),
            ]),
        );
        domains.insert(
            "other".to_string(),
            DomainProfile::new("Other", "Other domain datasets"),
        );

        Self { domains }
    }

    /// Parse a registry from a JSON object keyed by domain name.
    ///
    /// A `general` entry is added from the built-ins when the document lacks
    /// one, so lookups always have a fallback.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: BTreeMap<String, DomainProfile> = serde_json::from_str(json)?;
        let mut domains: BTreeMap<String, DomainProfile> = parsed
            .into_iter()
            .map(|(name, profile)| (normalize_name(&name), profile))
            .collect();

        if !domains.contains_key(DEFAULT_DOMAIN) {
            let general = Self::builtin()
                .domains
                .remove(DEFAULT_DOMAIN)
                .ok_or_else(|| PipelineError::Internal("built-in general domain missing".into()))?;
            domains.insert(DEFAULT_DOMAIN.to_string(), general);
        }

        Ok(Self { domains })
    }

    /// Resolve a domain name, falling back to `general`.
    pub fn get(&self, domain: &str) -> &DomainProfile {
        self.domains
            .get(&normalize_name(domain))
            .or_else(|| self.domains.get(DEFAULT_DOMAIN))
            .unwrap_or(&*FALLBACK)
    }

    /// Whether the registry knows `domain` without falling back.
    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains_key(&normalize_name(domain))
    }

    /// Names of all registered domains in sorted order.
    pub fn domains(&self) -> Vec<&str> {
        self.domains.keys().map(String::as_str).collect()
    }
}

static FALLBACK: once_cell::sync::Lazy<DomainProfile> =
    once_cell::sync::Lazy::new(|| DomainProfile::new("General", ""));

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_domains() {
        let registry = DomainRegistry::builtin();
        assert_eq!(
            registry.domains(),
            vec![
                "ai_incidents",
                "ecommerce",
                "education",
                "finance",
                "general",
                "healthcare",
                "other"
            ]
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive_with_fallback() {
        let registry = DomainRegistry::builtin();
        assert_eq!(registry.get("  HealthCare ").display_name, "Healthcare");
        assert_eq!(registry.get("astronomy").display_name, "General");
        assert!(!registry.contains("astronomy"));
    }

    #[test]
    fn test_known_roles() {
        let registry = DomainRegistry::builtin();
        let aiid = registry.get("ai_incidents");
        assert_eq!(aiid.known_role("incident_id"), Some(Role::IdCol));
        assert_eq!(aiid.known_role("description"), Some(Role::TextCol));
        assert_eq!(aiid.known_role("date"), Some(Role::DatetimeCol));
        assert_eq!(aiid.known_role("harm_type"), Some(Role::FeatureCol));
        assert_eq!(aiid.known_role("unrelated"), None);
    }

    #[test]
    fn test_healthcare_age_rule() {
        let registry = DomainRegistry::builtin();
        let warnings = registry
            .get("healthcare")
            .sanity_warnings("age", &[25.0, 30.0, 150.0]);
        assert_eq!(
            warnings,
            vec!["Healthcare sanity: 'age' has values > 120.".to_string()]
        );

        let clean = registry
            .get("healthcare")
            .sanity_warnings("age", &[25.0, 30.0, 99.0]);
        assert!(clean.is_empty());
    }

    #[test]
    fn test_rules_match_name_substrings() {
        let registry = DomainRegistry::builtin();
        let finance = registry.get("finance");
        assert_eq!(finance.sanity_warnings("Unit_Price", &[-1.0]).len(), 1);
        assert!(finance.sanity_warnings("quantity", &[-1.0]).is_empty());

        let education = registry.get("education");
        assert_eq!(education.sanity_warnings("exam_score", &[101.0]).len(), 1);
        assert!(education.sanity_warnings("exam_score", &[0.0, 100.0]).is_empty());
    }

    #[test]
    fn test_general_has_no_rules() {
        let registry = DomainRegistry::builtin();
        assert!(registry.get("general").sanity_warnings("age", &[500.0]).is_empty());
    }

    #[test]
    fn test_from_json_adds_general_fallback() {
        let json = r#"{
            "Retail": {
                "display_name": "Retail",
                "known_columns": {"sku": {"role": "id"}},
                "sanity_rules": [
                    {"name_contains": ["stock"], "check": {"kind": "negative"}}
                ]
            }
        }"#;
        let registry = DomainRegistry::from_json(json).unwrap();

        assert_eq!(registry.domains(), vec!["general", "retail"]);
        let retail = registry.get("retail");
        assert_eq!(retail.known_role("sku"), Some(Role::IdCol));
        assert_eq!(
            retail.sanity_warnings("stock_level", &[-3.0]),
            vec!["Retail sanity: 'stock_level' has impossible negative values.".to_string()]
        );
        assert_eq!(registry.get("missing").display_name, "General");
    }

    #[test]
    fn test_from_json_rejects_malformed_input() {
        let result = DomainRegistry::from_json("[1, 2, 3]");
        assert!(matches!(result, Err(PipelineError::Json(_))));
    }
}
