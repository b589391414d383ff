//! Test utilities for compliance-scanner integration tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// Result type alias for tests
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Extract Ok value or panic with context
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("assertion failed: expected Ok, got Err({:?})", e),
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Extract Some value or panic with context
#[macro_export]
macro_rules! assert_some {
    ($expr:expr) => {
        match $expr {
            Some(v) => v,
            None => panic!("assertion failed: expected Some, got None"),
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Some(v) => v,
            None => panic!("{}: got None", $msg),
        }
    };
}

/// Writes `content` to `dir/name`, creating `dir` as needed
pub fn write_file(dir: &Path, name: &str, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
}

/// Cluster snapshot with three pods across two namespaces
pub const PODS_SNAPSHOT: &str = r#"{
  "apiVersion": "v1",
  "kind": "PodList",
  "items": [
    {"metadata": {"name": "web", "namespace": "prod"},
     "spec": {"hostNetwork": false, "containers": [{"name": "web", "resources": {"limits": {"cpu": "500m"}}}]}},
    {"metadata": {"name": "db", "namespace": "prod"},
     "spec": {"hostNetwork": false, "containers": [{"name": "db", "resources": {"limits": {"cpu": "1"}}}]}},
    {"metadata": {"name": "debug", "namespace": "dev"},
     "spec": {"hostNetwork": true, "containers": [{"name": "shell", "resources": {}}]}}
  ]
}"#;

/// Rule file: every pod sets CPU limits
pub const LIMITS_RULE: &str = r#"
[rule]
id = "pods-have-cpu-limits"
name = "Pods set CPU limits"
error_message = "a container has no CPU limit"
expression = "pods.items.all(p, p.spec.containers.all(c, has(c.resources.limits) && has(c.resources.limits.cpu)))"

[rule.extensions]
severity = "medium"

[[inputs]]
name = "pods"
type = "kubernetes"
spec = { version = "v1", resource = "pods" }
"#;

/// Rule file: production pods stay off the host network
pub const HOST_NETWORK_RULE: &str = r#"
[rule]
id = "prod-no-host-network"
name = "Production pods do not use the host network"
expression = "pods.items.all(p, !p.spec.hostNetwork)"

[[inputs]]
name = "pods"
type = "kubernetes"
spec = { version = "v1", resource = "pods", namespace = "prod" }
"#;

/// Rule file: references a name it never declares
pub const UNDECLARED_RULE: &str = r#"
[rule]
id = "wrong-binding"
expression = "deployments.items.size() > 0"

[[inputs]]
name = "pods"
type = "kubernetes"
spec = { version = "v1", resource = "pods" }
"#;

/// Rule file in a language the scanner does not evaluate
pub const REGO_RULE: &str = r#"
[rule]
id = "opa-policy"
kind = "rego"
content = "package main\ndeny[msg] { false }"
"#;
