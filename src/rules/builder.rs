#![forbid(unsafe_code)]

//! Fluent construction of rules in code

use super::cel_rule::ensure_unique_inputs;
use super::{CelRule, PolicyRule, Rule, RuleMetadata};
use crate::error::RuleError;
use crate::inputs::{FileFormat, Input};
use crate::types::RuleKind;
use std::sync::Arc;

/// Builder for [`CelRule`] and [`PolicyRule`]
///
/// ```
/// use compliance_scanner::rules::RuleBuilder;
/// use compliance_scanner::types::RuleKind;
///
/// let rule = RuleBuilder::new("pods-exist", RuleKind::Cel)
///     .with_kubernetes_input("pods", "", "v1", "pods")
///     .with_cel_expression("size(pods.items) > 0")
///     .build()
///     .unwrap();
/// assert_eq!(rule.inputs().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    id: String,
    kind: RuleKind,
    inputs: Vec<Input>,
    metadata: Option<RuleMetadata>,
    expression: String,
    error_message: Option<String>,
    content: String,
}

impl RuleBuilder {
    pub fn new(id: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            id: id.into(),
            kind,
            inputs: Vec::new(),
            metadata: None,
            expression: String::new(),
            error_message: None,
            content: String::new(),
        }
    }

    pub fn with_input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_kubernetes_input(self, name: &str, group: &str, version: &str, resource: &str) -> Self {
        self.with_input(Input::kubernetes(name, group, version, resource))
    }

    pub fn with_file_input(self, name: &str, path: &str, format: FileFormat) -> Self {
        self.with_input(Input::file(name, path, format))
    }

    fn metadata_mut(&mut self) -> &mut RuleMetadata {
        self.metadata.get_or_insert_with(RuleMetadata::default)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata_mut().name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata_mut().description = description.into();
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata_mut().extensions.insert(key.into(), value.into());
        self
    }

    pub fn with_cel_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Opaque payload for non-CEL kinds
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    fn check(&self) -> Result<(), RuleError> {
        if self.id.trim().is_empty() {
            return Err(RuleError::InvalidDefinition(
                "rule id must not be empty".to_string(),
            ));
        }
        ensure_unique_inputs(&self.id, &self.inputs)
    }

    /// Builds the concrete CEL rule
    ///
    /// # Errors
    ///
    /// `RuleError::InvalidDefinition` when the builder is not for a CEL rule
    /// or the id is empty, `RuleError::DuplicateInput` when two inputs share
    /// a name.
    pub fn build_cel_rule(self) -> Result<CelRule, RuleError> {
        if self.kind != RuleKind::Cel {
            return Err(RuleError::InvalidDefinition(format!(
                "rule '{}' has kind '{}', expected 'cel'",
                self.id, self.kind
            )));
        }
        self.check()?;
        Ok(CelRule::from_parts(
            self.id,
            self.inputs,
            self.metadata,
            self.expression,
            self.error_message,
        ))
    }

    /// Builds a shareable rule of whatever kind the builder was created with
    pub fn build(self) -> Result<Arc<dyn Rule>, RuleError> {
        match self.kind {
            RuleKind::Cel => Ok(Arc::new(self.build_cel_rule()?)),
            RuleKind::Rego | RuleKind::JsonPath | RuleKind::Custom => {
                self.check()?;
                Ok(Arc::new(
                    PolicyRule::new(self.id, self.kind, self.content)
                        .with_parts(self.inputs, self.metadata),
                ))
            }
        }
    }
}
