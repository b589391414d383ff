use super::spec::{FileFormat, FileSpec, InputSpec, KubernetesSpec};
use crate::types::InputKind;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// A named request for resource data
///
/// `name` is the key under which the fetched data is bound into the
/// expression environment. The kind always follows the spec variant.
///
/// Serialized in the same shape rule files use:
/// `{"name": ..., "type": ..., "spec": {...}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "InputRecord")]
pub struct Input {
    name: String,
    spec: InputSpec,
}

#[derive(Deserialize)]
struct InputRecord {
    name: String,
    #[serde(rename = "type")]
    kind: InputKind,
    #[serde(default)]
    spec: serde_json::Map<String, serde_json::Value>,
}

impl TryFrom<InputRecord> for Input {
    type Error = String;

    fn try_from(record: InputRecord) -> Result<Self, Self::Error> {
        let spec = InputSpec::from_fields(record.kind, record.spec)
            .map_err(|e| format!("invalid spec for input '{}': {}", record.name, e))?;
        Ok(Input::new(record.name, spec))
    }
}

impl Serialize for Input {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Input", 3)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("type", &self.kind())?;
        state.serialize_field("spec", &SpecFields(&self.spec))?;
        state.end()
    }
}

/// A spec's own fields, without the variant tag
struct SpecFields<'a>(&'a InputSpec);

impl Serialize for SpecFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            InputSpec::Kubernetes(spec) => spec.serialize(serializer),
            InputSpec::File(spec) => spec.serialize(serializer),
            InputSpec::System(spec) => spec.serialize(serializer),
            InputSpec::Http(spec) => spec.serialize(serializer),
            InputSpec::Database(spec) => spec.serialize(serializer),
        }
    }
}

impl Input {
    pub fn new(name: impl Into<String>, spec: InputSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    /// Cluster resource input, e.g. `Input::kubernetes("pods", "", "v1", "pods")`
    pub fn kubernetes(name: impl Into<String>, group: &str, version: &str, resource: &str) -> Self {
        Self::new(
            name,
            InputSpec::Kubernetes(KubernetesSpec::new(group, version, resource)),
        )
    }

    /// File input relative to the filesystem fetcher's root
    pub fn file(name: impl Into<String>, path: &str, format: FileFormat) -> Self {
        Self::new(name, InputSpec::File(FileSpec::new(path, format)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> InputKind {
        self.spec.kind()
    }

    pub fn spec(&self) -> &InputSpec {
        &self.spec
    }
}
