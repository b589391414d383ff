#![forbid(unsafe_code)]

//! CEL rules and their TOML definition format
//!
//! ```toml
//! [rule]
//! id = "pods-have-replicas"
//! name = "Deployments are replicated"
//! error_message = "a deployment runs a single replica"
//! expression = "deployments.items.all(d, d.spec.replicas > 1)"
//!
//! [rule.extensions]
//! severity = "high"
//!
//! [[inputs]]
//! name = "deployments"
//! type = "kubernetes"
//! spec = { group = "apps", version = "v1", resource = "deployments" }
//! ```

use super::{PolicyRule, Rule, RuleMetadata};
use crate::error::RuleError;
use crate::inputs::{Input, InputSpec};
use crate::types::{InputKind, RuleKind};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// TOML structure for rule definitions
#[derive(Debug, Deserialize)]
struct RuleDefinition {
    rule: RuleSection,
    #[serde(default)]
    inputs: Vec<InputDefinition>,
}

#[derive(Debug, Deserialize)]
struct RuleSection {
    id: String,
    #[serde(default = "default_kind")]
    kind: RuleKind,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    error_message: Option<String>,
    /// CEL rules
    #[serde(default)]
    expression: String,
    /// Other rule kinds
    #[serde(default)]
    content: String,
    #[serde(default)]
    extensions: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct InputDefinition {
    name: String,
    #[serde(rename = "type")]
    kind: InputKind,
    #[serde(default)]
    spec: toml::Table,
}

fn default_kind() -> RuleKind {
    RuleKind::Cel
}

impl InputDefinition {
    fn into_input(self, rule_id: &str) -> Result<Input, RuleError> {
        let mut table = self.spec;
        table.insert(
            "type".to_string(),
            toml::Value::String(self.kind.as_str().to_string()),
        );
        let spec: InputSpec = toml::Value::Table(table).try_into().map_err(|e| {
            RuleError::InvalidDefinition(format!(
                "rule '{}': invalid spec for input '{}': {}",
                rule_id, self.name, e
            ))
        })?;
        Ok(Input::new(self.name, spec))
    }
}

impl RuleDefinition {
    fn parse(content: &str) -> Result<Self, RuleError> {
        toml::from_str(content)
            .map_err(|e| RuleError::InvalidDefinition(format!("Failed to parse TOML: {}", e)))
    }

    fn metadata(section: &RuleSection) -> Option<RuleMetadata> {
        if section.name.is_empty() && section.description.is_empty() && section.extensions.is_empty()
        {
            return None;
        }
        Some(RuleMetadata {
            name: section.name.clone(),
            description: section.description.clone(),
            extensions: section.extensions.clone(),
        })
    }

    fn into_rule(self) -> Result<Arc<dyn Rule>, RuleError> {
        let section = self.rule;
        if section.id.trim().is_empty() {
            return Err(RuleError::InvalidDefinition(
                "rule id must not be empty".to_string(),
            ));
        }
        let inputs = self
            .inputs
            .into_iter()
            .map(|input| input.into_input(&section.id))
            .collect::<Result<Vec<_>, _>>()?;
        ensure_unique_inputs(&section.id, &inputs)?;
        let metadata = Self::metadata(&section);

        Ok(match section.kind {
            RuleKind::Cel => Arc::new(CelRule {
                id: section.id,
                inputs,
                metadata,
                expression: section.expression,
                error_message: section.error_message,
            }),
            kind => Arc::new(
                PolicyRule::new(section.id, kind, section.content).with_parts(inputs, metadata),
            ),
        })
    }
}

/// Rejects two inputs sharing a binding name
pub(crate) fn ensure_unique_inputs(rule_id: &str, inputs: &[Input]) -> Result<(), RuleError> {
    let mut seen = HashSet::new();
    for input in inputs {
        if !seen.insert(input.name()) {
            return Err(RuleError::DuplicateInput {
                rule: rule_id.to_string(),
                input: input.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Parses any rule kind from TOML
pub fn rule_from_toml(content: &str) -> Result<Arc<dyn Rule>, RuleError> {
    RuleDefinition::parse(content)?.into_rule()
}

/// A rule whose logic is a CEL boolean expression
#[derive(Debug, Clone, PartialEq)]
pub struct CelRule {
    id: String,
    inputs: Vec<Input>,
    metadata: Option<RuleMetadata>,
    expression: String,
    error_message: Option<String>,
}

impl CelRule {
    /// Creates a rule, rejecting duplicate input names
    ///
    /// An empty expression is accepted here and reported when the rule is
    /// scanned.
    pub fn new(
        id: impl Into<String>,
        expression: impl Into<String>,
        inputs: Vec<Input>,
    ) -> Result<Self, RuleError> {
        let id = id.into();
        ensure_unique_inputs(&id, &inputs)?;
        Ok(Self {
            id,
            inputs,
            metadata: None,
            expression: expression.into(),
            error_message: None,
        })
    }

    pub(crate) fn from_parts(
        id: String,
        inputs: Vec<Input>,
        metadata: Option<RuleMetadata>,
        expression: String,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id,
            inputs,
            metadata,
            expression,
            error_message,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Message reported when the expression evaluates to `false`
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Parse a CEL rule from TOML content
    ///
    /// # Errors
    ///
    /// Returns `RuleError` if the TOML is malformed, an input spec does not
    /// deserialize, two inputs share a name, or the definition is not a CEL
    /// rule.
    pub fn from_toml(content: &str) -> Result<Self, RuleError> {
        let rule = rule_from_toml(content)?;
        rule.as_cel().cloned().ok_or_else(|| {
            RuleError::InvalidDefinition(format!(
                "rule '{}' has kind '{}', expected 'cel'",
                rule.id(),
                rule.kind()
            ))
        })
    }

    /// Load a CEL rule from a TOML file
    pub fn from_path(path: &Path) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }
}

impl Rule for CelRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RuleKind {
        RuleKind::Cel
    }

    fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    fn metadata(&self) -> Option<&RuleMetadata> {
        self.metadata.as_ref()
    }

    fn content(&self) -> &str {
        &self.expression
    }

    fn as_cel(&self) -> Option<&CelRule> {
        Some(self)
    }
}
