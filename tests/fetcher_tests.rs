//! Integration tests for the composite fetcher and the built-in fetchers

mod common;

use common::{PODS_SNAPSHOT, write_file};
use compliance_scanner::error::FetchError;
use compliance_scanner::fetchers::{
    Bindings, CompositeFetcher, CompositeFetcherBuilder, InputFetcher, ResourceClient,
};
use compliance_scanner::inputs::{
    CelVariable, FileFormat, FileSpec, HttpSpec, Input, InputSpec, KubernetesSpec, SystemSpec,
};
use compliance_scanner::InputKind;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Binds `{"source": label}` for every input it is given
struct LabelFetcher(&'static str, InputKind);

impl InputFetcher for LabelFetcher {
    fn fetch_inputs(
        &self,
        inputs: &[Input],
        _variables: &[Arc<dyn CelVariable>],
    ) -> Result<Bindings, FetchError> {
        Ok(inputs
            .iter()
            .map(|i| (i.name().to_string(), json!({"source": self.0})))
            .collect())
    }

    fn supports_input_type(&self, kind: InputKind) -> bool {
        kind == self.1
    }
}

fn service_input(name: &str) -> Input {
    Input::new(
        name,
        InputSpec::System(SystemSpec {
            service: name.to_string(),
            ..SystemSpec::default()
        }),
    )
}

#[test]
fn test_empty_dispatcher_rejects_http() {
    let fetcher = CompositeFetcher::new();
    let inputs = vec![Input::new("health", InputSpec::Http(HttpSpec::get("https://svc.local/healthz")))];

    let fetch_err = fetcher.fetch_inputs(&inputs, &[]).unwrap_err();
    assert!(fetch_err.to_string().contains("no fetcher available"), "{fetch_err}");

    let validate_err = fetcher.validate_inputs(&inputs).unwrap_err();
    assert!(validate_err.to_string().contains("unsupported input type"), "{validate_err}");
}

#[test]
fn test_disjoint_fetchers_merge_bindings() {
    let fetcher = CompositeFetcherBuilder::new()
        .with_custom_fetcher(InputKind::File, Arc::new(LabelFetcher("files", InputKind::File)))
        .with_custom_fetcher(InputKind::System, Arc::new(LabelFetcher("services", InputKind::System)))
        .build();

    let inputs = vec![Input::file("motd", "etc/motd", FileFormat::Text), service_input("sshd")];
    let bindings = assert_ok!(fetcher.fetch_inputs(&inputs, &[]));

    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings["motd"]["source"], "files");
    assert_eq!(bindings["sshd"]["source"], "services");
}

#[test]
fn test_partition_failure_returns_no_bindings() {
    struct Broken;

    impl InputFetcher for Broken {
        fn fetch_inputs(&self, _: &[Input], _: &[Arc<dyn CelVariable>]) -> Result<Bindings, FetchError> {
            Err(FetchError::Other("permission denied".to_string()))
        }

        fn supports_input_type(&self, kind: InputKind) -> bool {
            kind == InputKind::System
        }
    }

    let fetcher = CompositeFetcherBuilder::new()
        .with_custom_fetcher(InputKind::File, Arc::new(LabelFetcher("files", InputKind::File)))
        .with_custom_fetcher(InputKind::System, Arc::new(Broken))
        .build();

    let inputs = vec![Input::file("motd", "etc/motd", FileFormat::Text), service_input("sshd")];
    let err = fetcher.fetch_inputs(&inputs, &[]).unwrap_err();
    match err {
        FetchError::Partition { kind, source } => {
            assert_eq!(kind, InputKind::System);
            assert!(source.to_string().contains("permission denied"));
        }
        other => panic!("expected partition error, got {other:?}"),
    }
}

#[test]
fn test_defaults_read_snapshots_and_files() {
    let snapshots = TempDir::new().unwrap();
    write_file(snapshots.path(), "pods.json", PODS_SNAPSHOT);
    let files = TempDir::new().unwrap();
    write_file(&files.path().join("etc"), "app.yaml", "replicas: 3\ntls:\n  enabled: true\n");

    let fetcher = CompositeFetcher::with_defaults(None, Some(snapshots.path()), Some(files.path()));
    assert_eq!(fetcher.supported_input_types(), vec![InputKind::Kubernetes, InputKind::File]);

    let inputs = vec![
        Input::new(
            "prodPods",
            InputSpec::Kubernetes(KubernetesSpec::new("", "v1", "pods").in_namespace("prod")),
        ),
        Input::file("app", "etc/app.yaml", FileFormat::Yaml),
    ];
    let bindings = assert_ok!(fetcher.fetch_inputs(&inputs, &[]));

    assert_eq!(assert_some!(bindings["prodPods"]["items"].as_array()).len(), 2);
    assert_eq!(bindings["app"]["tls"]["enabled"], true);
}

#[test]
fn test_live_client_used_without_snapshot_path() {
    struct Cluster;

    impl ResourceClient for Cluster {
        fn fetch(&self, spec: &KubernetesSpec) -> Result<Value, FetchError> {
            Ok(json!({"items": [], "resource": spec.resource}))
        }
    }

    let fetcher = CompositeFetcher::with_defaults(Some(Arc::new(Cluster)), None, None);
    let input = Input::kubernetes("nodes", "", "v1", "nodes");
    let bindings = assert_ok!(fetcher.fetch_inputs(&[input.clone()], &[]));
    assert_eq!(bindings["nodes"]["resource"], "nodes");

    // A snapshot path takes precedence over the client
    let empty = TempDir::new().unwrap();
    let offline = CompositeFetcher::with_defaults(Some(Arc::new(Cluster)), Some(empty.path()), None);
    let err = offline.fetch_inputs(&[input], &[]).unwrap_err();
    assert!(err.to_string().contains("no snapshot"));
}

#[test]
fn test_recursive_directory_with_permissions() {
    let files = TempDir::new().unwrap();
    let conf = files.path().join("conf.d");
    write_file(&conf, "10-base.conf", "a=1");
    write_file(&conf.join("extra"), "20-extra.conf", "b=2");

    let fetcher = CompositeFetcherBuilder::new().with_filesystem(files.path()).build();
    let mut spec = FileSpec::new("conf.d", FileFormat::Text);
    spec.recursive = true;
    spec.check_permissions = true;

    let bindings = assert_ok!(fetcher.fetch_inputs(&[Input::new("conf", InputSpec::File(spec))], &[]));
    let conf = assert_some!(bindings["conf"].as_object());
    assert_eq!(conf.len(), 2);
    assert_eq!(conf["10-base.conf"]["content"], "a=1");
    assert_eq!(conf["extra/20-extra.conf"]["size"], 3);
}

#[test]
fn test_invalid_spec_caught_before_fetch() {
    let fetcher = CompositeFetcherBuilder::new().with_filesystem(Path::new("/")).build();
    let inputs = vec![Input::new("bad", InputSpec::Kubernetes(KubernetesSpec::new("apps", "", "deployments")))];

    // kubernetes is not configured at all
    assert!(matches!(
        fetcher.validate_inputs(&inputs).unwrap_err(),
        FetchError::UnsupportedInputType { .. }
    ));

    let fetcher = CompositeFetcherBuilder::new().with_kubernetes_files("/tmp").build();
    assert!(matches!(
        fetcher.validate_inputs(&inputs).unwrap_err(),
        FetchError::InvalidInputSpec { .. }
    ));
}
