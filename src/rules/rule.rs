#![forbid(unsafe_code)]

//! Core Rule trait and the non-CEL rule variant

use super::CelRule;
use crate::inputs::Input;
use crate::types::RuleKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Descriptive data attached to a rule and copied into its result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleMetadata {
    pub name: String,
    pub description: String,
    /// Open-ended extension values (severity, benchmark ids, ...)
    pub extensions: BTreeMap<String, serde_json::Value>,
}

/// Trait that all rules implement
///
/// Rules are immutable after construction and shared across scan workers,
/// so the trait is `Send + Sync`. The set of kinds is closed by
/// [`RuleKind`]; callers switch on `kind()` and reach the CEL-specific
/// accessors through [`Rule::as_cel`].
pub trait Rule: Send + Sync + fmt::Debug {
    /// Identifier, unique within a scan
    fn id(&self) -> &str;

    fn kind(&self) -> RuleKind;

    /// Declared inputs in declaration order
    fn inputs(&self) -> &[Input];

    fn metadata(&self) -> Option<&RuleMetadata>;

    /// The kind-specific payload; the expression for CEL rules
    fn content(&self) -> &str;

    /// The CEL view of this rule, if it is one
    fn as_cel(&self) -> Option<&CelRule> {
        None
    }
}

/// A rule in a language the scanner carries but does not evaluate
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRule {
    id: String,
    kind: RuleKind,
    inputs: Vec<Input>,
    metadata: Option<RuleMetadata>,
    content: String,
}

impl PolicyRule {
    pub fn new(id: impl Into<String>, kind: RuleKind, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            inputs: Vec::new(),
            metadata: None,
            content: content.into(),
        }
    }

    pub(crate) fn with_parts(mut self, inputs: Vec<Input>, metadata: Option<RuleMetadata>) -> Self {
        self.inputs = inputs;
        self.metadata = metadata;
        self
    }
}

impl Rule for PolicyRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RuleKind {
        self.kind
    }

    fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    fn metadata(&self) -> Option<&RuleMetadata> {
        self.metadata.as_ref()
    }

    fn content(&self) -> &str {
        &self.content
    }
}
