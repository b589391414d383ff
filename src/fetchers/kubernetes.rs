#![forbid(unsafe_code)]

//! Cluster resource fetcher
//!
//! Resources come either from a live API collaborator ([`ResourceClient`]) or
//! from snapshot files written by an earlier collection run. Snapshot lookup
//! for a namespaced input tries `<dir>/<namespace>/<resource>.<ext>` before
//! `<dir>/<resource>.<ext>`, with `json`, `yaml` and `yml` extensions in that
//! order.

use super::fetcher::{Bindings, InputFetcher};
use crate::error::FetchError;
use crate::inputs::{CelVariable, Input, InputSpec, KubernetesSpec};
use crate::types::InputKind;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const SNAPSHOT_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Live cluster API access, supplied by the caller
pub trait ResourceClient: Send + Sync {
    /// Returns the resource list (or single object when `spec.name` is set)
    fn fetch(&self, spec: &KubernetesSpec) -> Result<Value, FetchError>;
}

#[derive(Clone)]
enum Source {
    Snapshots(PathBuf),
    Client(Arc<dyn ResourceClient>),
}

#[derive(Clone)]
pub struct KubernetesFetcher {
    source: Source,
}

impl fmt::Debug for KubernetesFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Snapshots(dir) => f
                .debug_struct("KubernetesFetcher")
                .field("snapshots", dir)
                .finish(),
            Source::Client(_) => f
                .debug_struct("KubernetesFetcher")
                .field("client", &"<live>")
                .finish(),
        }
    }
}

impl KubernetesFetcher {
    /// Reads pre-fetched API resources from `dir`
    pub fn from_snapshots(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Snapshots(dir.into()),
        }
    }

    /// Delegates to a live API client
    pub fn with_client(client: Arc<dyn ResourceClient>) -> Self {
        Self {
            source: Source::Client(client),
        }
    }

    /// The snapshot directory, when reading offline
    pub fn snapshot_dir(&self) -> Option<&Path> {
        match &self.source {
            Source::Snapshots(dir) => Some(dir),
            Source::Client(_) => None,
        }
    }

    fn fetch_spec(&self, spec: &KubernetesSpec) -> Result<Value, FetchError> {
        match &self.source {
            Source::Client(client) => client.fetch(spec),
            Source::Snapshots(dir) => {
                let (path, namespaced_file) = locate_snapshot(dir, spec)?;
                debug!(path = %path.display(), resource = %spec.resource, "reading snapshot");
                let document = read_snapshot(&path)?;
                select(document, spec, namespaced_file)
            }
        }
    }
}

/// Finds the snapshot file; the flag says whether it is namespace-specific
fn locate_snapshot(dir: &Path, spec: &KubernetesSpec) -> Result<(PathBuf, bool), FetchError> {
    let mut candidates = Vec::new();
    if !spec.namespace.is_empty() {
        let ns_dir = dir.join(&spec.namespace);
        candidates.extend(
            SNAPSHOT_EXTENSIONS
                .iter()
                .map(|ext| (ns_dir.join(format!("{}.{}", spec.resource, ext)), true)),
        );
    }
    candidates.extend(
        SNAPSHOT_EXTENSIONS
            .iter()
            .map(|ext| (dir.join(format!("{}.{}", spec.resource, ext)), false)),
    );

    candidates
        .into_iter()
        .find(|(path, _)| path.is_file())
        .ok_or_else(|| {
            FetchError::NotFound(format!(
                "no snapshot for resource '{}' ({}) under {}",
                spec.resource,
                spec.api_version(),
                dir.display()
            ))
        })
}

fn read_snapshot(path: &Path) -> Result<Value, FetchError> {
    let text = fs::read_to_string(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let parsed = if is_json {
        serde_json::from_str(&text).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&text).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| FetchError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

fn metadata_field<'v>(object: &'v Value, field: &str) -> Option<&'v str> {
    object.get("metadata")?.get(field)?.as_str()
}

/// Applies the namespace and name selectors to a snapshot document
fn select(document: Value, spec: &KubernetesSpec, namespaced_file: bool) -> Result<Value, FetchError> {
    let Value::Object(mut object) = document else {
        return Ok(document);
    };

    let items = match object.remove("items") {
        Some(Value::Array(items)) => Some(items),
        Some(other) => {
            object.insert("items".to_string(), other);
            None
        }
        None => None,
    };
    let Some(items) = items else {
        // A single object
        let single = Value::Object(object);
        if !spec.name.is_empty() && metadata_field(&single, "name") != Some(spec.name.as_str()) {
            return Err(not_found(spec));
        }
        return Ok(single);
    };

    let filter_namespace = !spec.namespace.is_empty() && !namespaced_file;
    let items: Vec<Value> = items
        .into_iter()
        .filter(|item| {
            !filter_namespace || metadata_field(item, "namespace") == Some(spec.namespace.as_str())
        })
        .collect();

    if !spec.name.is_empty() {
        return items
            .into_iter()
            .find(|item| metadata_field(item, "name") == Some(spec.name.as_str()))
            .ok_or_else(|| not_found(spec));
    }

    object.insert("items".to_string(), Value::Array(items));
    Ok(Value::Object(object))
}

fn not_found(spec: &KubernetesSpec) -> FetchError {
    let scope = if spec.namespace.is_empty() {
        String::new()
    } else {
        format!(" in namespace '{}'", spec.namespace)
    };
    FetchError::NotFound(format!("{} '{}'{}", spec.resource, spec.name, scope))
}

impl InputFetcher for KubernetesFetcher {
    fn fetch_inputs(
        &self,
        inputs: &[Input],
        _variables: &[Arc<dyn CelVariable>],
    ) -> Result<Bindings, FetchError> {
        let mut bindings = Bindings::with_capacity(inputs.len());
        for input in inputs {
            let InputSpec::Kubernetes(spec) = input.spec() else {
                return Err(FetchError::UnsupportedInputType {
                    input: input.name().to_string(),
                    kind: input.kind(),
                });
            };
            bindings.insert(input.name().to_string(), self.fetch_spec(spec)?);
        }
        Ok(bindings)
    }

    fn supports_input_type(&self, kind: InputKind) -> bool {
        kind == InputKind::Kubernetes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn pods_list() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "List",
            "items": [
                {"metadata": {"name": "web", "namespace": "prod"}},
                {"metadata": {"name": "db", "namespace": "prod"}},
                {"metadata": {"name": "scratch", "namespace": "dev"}}
            ]
        })
    }

    fn fetch(fetcher: &KubernetesFetcher, spec: KubernetesSpec) -> Result<Value, FetchError> {
        let input = Input::new("res", InputSpec::Kubernetes(spec));
        fetcher
            .fetch_inputs(&[input], &[])
            .map(|mut b| b.remove("res").unwrap_or(Value::Null))
    }

    #[test]
    fn test_reads_cluster_wide_snapshot() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("pods.json"), pods_list().to_string()).unwrap();
        let fetcher = KubernetesFetcher::from_snapshots(temp.path());

        let value = fetch(&fetcher, KubernetesSpec::new("", "v1", "pods")).unwrap();
        assert_eq!(value["items"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_filters_by_namespace_and_name() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("pods.json"), pods_list().to_string()).unwrap();
        let fetcher = KubernetesFetcher::from_snapshots(temp.path());

        let value = fetch(&fetcher, KubernetesSpec::new("", "v1", "pods").in_namespace("prod")).unwrap();
        assert_eq!(value["items"].as_array().unwrap().len(), 2);

        let value = fetch(
            &fetcher,
            KubernetesSpec::new("", "v1", "pods").in_namespace("dev").named("scratch"),
        )
        .unwrap();
        assert_eq!(value["metadata"]["name"], "scratch");

        let err = fetch(
            &fetcher,
            KubernetesSpec::new("", "v1", "pods").in_namespace("dev").named("web"),
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[test]
    fn test_prefers_namespaced_yaml_snapshot() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("configmaps.json"), r#"{"items": []}"#).unwrap();
        fs::create_dir(temp.path().join("kube-system")).unwrap();
        fs::write(
            temp.path().join("kube-system").join("configmaps.yaml"),
            "items:\n  - metadata:\n      name: coredns\n",
        )
        .unwrap();
        let fetcher = KubernetesFetcher::from_snapshots(temp.path());

        let value = fetch(
            &fetcher,
            KubernetesSpec::new("", "v1", "configmaps").in_namespace("kube-system"),
        )
        .unwrap();
        assert_eq!(value["items"][0]["metadata"]["name"], "coredns");
    }

    #[test]
    fn test_missing_snapshot() {
        let temp = TempDir::new().unwrap();
        let fetcher = KubernetesFetcher::from_snapshots(temp.path());
        let err = fetch(&fetcher, KubernetesSpec::new("apps", "v1", "deployments")).unwrap_err();
        assert!(err.to_string().contains("deployments"));
    }

    struct StaticClient;

    impl ResourceClient for StaticClient {
        fn fetch(&self, spec: &KubernetesSpec) -> Result<Value, FetchError> {
            Ok(json!({"resource": spec.resource, "apiVersion": spec.api_version()}))
        }
    }

    #[test]
    fn test_delegates_to_client() {
        let fetcher = KubernetesFetcher::with_client(Arc::new(StaticClient));
        assert!(fetcher.snapshot_dir().is_none());
        let value = fetch(&fetcher, KubernetesSpec::new("apps", "v1", "deployments")).unwrap();
        assert_eq!(value["apiVersion"], "apps/v1");
    }
}
