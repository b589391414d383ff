//! Kind-specific input specifications
//!
//! Every spec owns its required-field set and validates it without touching
//! the outside world.

use crate::error::InputError;
use crate::types::InputKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Specification for an input, one variant per input kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InputSpec {
    Kubernetes(KubernetesSpec),
    File(FileSpec),
    System(SystemSpec),
    Http(HttpSpec),
    Database(DatabaseSpec),
}

impl InputSpec {
    /// The input kind this spec belongs to
    pub fn kind(&self) -> InputKind {
        match self {
            InputSpec::Kubernetes(_) => InputKind::Kubernetes,
            InputSpec::File(_) => InputKind::File,
            InputSpec::System(_) => InputKind::System,
            InputSpec::Http(_) => InputKind::Http,
            InputSpec::Database(_) => InputKind::Database,
        }
    }

    /// Builds the spec for `kind` from its fields, without the `type` tag
    pub fn from_fields(
        kind: InputKind,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, serde_json::Error> {
        let fields = serde_json::Value::Object(fields);
        Ok(match kind {
            InputKind::Kubernetes => InputSpec::Kubernetes(serde_json::from_value(fields)?),
            InputKind::File => InputSpec::File(serde_json::from_value(fields)?),
            InputKind::System => InputSpec::System(serde_json::from_value(fields)?),
            InputKind::Http => InputSpec::Http(serde_json::from_value(fields)?),
            InputKind::Database => InputSpec::Database(serde_json::from_value(fields)?),
        })
    }

    /// Checks that the fields required by this kind are present
    pub fn validate(&self) -> Result<(), InputError> {
        match self {
            InputSpec::Kubernetes(spec) => spec.validate(),
            InputSpec::File(spec) => spec.validate(),
            InputSpec::System(spec) => spec.validate(),
            InputSpec::Http(spec) => spec.validate(),
            InputSpec::Database(spec) => spec.validate(),
        }
    }
}

fn require(kind: InputKind, field: &'static str, value: &str) -> Result<(), InputError> {
    if value.trim().is_empty() {
        return Err(InputError::MissingField { kind, field });
    }
    Ok(())
}

/// A cluster API resource, optionally narrowed to a namespace or a single object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesSpec {
    /// API group; empty for the core group
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `pods`
    pub resource: String,
    pub namespace: String,
    /// Name of a single object; empty selects the whole list
    pub name: String,
}

impl KubernetesSpec {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            ..Self::default()
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        require(InputKind::Kubernetes, "version", &self.version)?;
        require(InputKind::Kubernetes, "resource", &self.resource)
    }
}

/// How file content is decoded before binding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for FileFormat {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "text" => Ok(FileFormat::Text),
            "json" => Ok(FileFormat::Json),
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            other => Err(InputError::InvalidValue {
                field: "format",
                message: format!("unknown file format '{other}'"),
            }),
        }
    }
}

/// A file or directory on the local filesystem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSpec {
    pub path: String,
    pub format: FileFormat,
    /// Read every file under a directory
    pub recursive: bool,
    /// Bind permission metadata alongside the content
    pub check_permissions: bool,
}

impl FileSpec {
    pub fn new(path: &str, format: FileFormat) -> Self {
        Self {
            path: path.to_string(),
            format,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        require(InputKind::File, "path", &self.path)
    }
}

/// A system service, process or command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSpec {
    pub service: String,
    pub process: String,
    pub command: String,
    pub args: Vec<String>,
}

impl SystemSpec {
    pub fn validate(&self) -> Result<(), InputError> {
        if self.service.trim().is_empty()
            && self.process.trim().is_empty()
            && self.command.trim().is_empty()
        {
            return Err(InputError::MissingField {
                kind: InputKind::System,
                field: "service, process or command",
            });
        }
        Ok(())
    }
}

/// An HTTP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSpec {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Default for HttpSpec {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

impl HttpSpec {
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        require(InputKind::Http, "url", &self.url)?;
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(InputError::InvalidValue {
                field: "url",
                message: format!("'{}' is not an http(s) URL", self.url),
            });
        }
        require(InputKind::Http, "method", &self.method)
    }
}

/// A query against a database connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSpec {
    pub connection: String,
    pub query: String,
}

impl DatabaseSpec {
    pub fn validate(&self) -> Result<(), InputError> {
        require(InputKind::Database, "connection", &self.connection)?;
        require(InputKind::Database, "query", &self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubernetes_spec_requires_resource() {
        let spec = KubernetesSpec::new("", "v1", "");
        let err = spec.validate().unwrap_err();
        assert_eq!(
            err,
            InputError::MissingField {
                kind: InputKind::Kubernetes,
                field: "resource"
            }
        );
        assert!(err.to_string().contains("resource"));
    }

    #[test]
    fn test_kubernetes_spec_requires_version() {
        let spec = KubernetesSpec::new("apps", "", "deployments");
        assert!(spec.validate().is_err());
        assert!(KubernetesSpec::new("apps", "v1", "deployments").validate().is_ok());
    }

    #[test]
    fn test_kubernetes_api_version() {
        assert_eq!(KubernetesSpec::new("", "v1", "pods").api_version(), "v1");
        assert_eq!(
            KubernetesSpec::new("apps", "v1", "deployments").api_version(),
            "apps/v1"
        );
    }

    #[test]
    fn test_file_spec_requires_path() {
        assert!(FileSpec::new("", FileFormat::Text).validate().is_err());
        assert!(FileSpec::new("/etc/hosts", FileFormat::Text).validate().is_ok());
    }

    #[test]
    fn test_file_format_from_str() {
        assert_eq!("json".parse::<FileFormat>().unwrap(), FileFormat::Json);
        assert_eq!("YML".parse::<FileFormat>().unwrap(), FileFormat::Yaml);
        assert_eq!("".parse::<FileFormat>().unwrap(), FileFormat::Text);
        assert!("xml".parse::<FileFormat>().is_err());
    }

    #[test]
    fn test_system_spec_needs_a_target() {
        assert!(SystemSpec::default().validate().is_err());
        let spec = SystemSpec {
            service: "sshd".to_string(),
            ..SystemSpec::default()
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_http_spec_validation() {
        assert!(HttpSpec::default().validate().is_err());
        assert!(HttpSpec::get("ftp://example.com").validate().is_err());
        assert!(HttpSpec::get("https://example.com/healthz").validate().is_ok());
    }

    #[test]
    fn test_database_spec_validation() {
        let spec = DatabaseSpec {
            connection: "postgres://localhost/db".to_string(),
            query: String::new(),
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_spec_kind_matches_variant() {
        assert_eq!(
            InputSpec::Http(HttpSpec::get("https://x")).kind(),
            InputKind::Http
        );
        assert_eq!(
            InputSpec::File(FileSpec::default()).kind(),
            InputKind::File
        );
    }

    #[test]
    fn test_spec_deserializes_tagged() {
        let json = r#"{"type": "kubernetes", "version": "v1", "resource": "pods"}"#;
        let spec: InputSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec, InputSpec::Kubernetes(KubernetesSpec::new("", "v1", "pods")));
    }
}
