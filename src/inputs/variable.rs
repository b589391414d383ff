use serde::{Deserialize, Serialize};
use std::fmt;

/// Group/version/kind triple identifying the resource type a variable relates to
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}, Kind={}", self.version, self.kind)
        } else {
            write!(f, "{}/{}, Kind={}", self.group, self.version, self.kind)
        }
    }
}

/// A caller-supplied scalar exposed to expressions next to fetched bindings
pub trait CelVariable: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn namespace(&self) -> &str;
    fn value(&self) -> &str;
    fn group_version_kind(&self) -> &GroupVersionKind;
}

/// Plain owned variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub value: String,
    #[serde(default)]
    pub gvk: GroupVersionKind,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }
}

impl CelVariable for Variable {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn group_version_kind(&self) -> &GroupVersionKind {
        &self.gvk
    }
}
