#![forbid(unsafe_code)]

//! Composite fetcher that routes each input to the fetcher for its kind
//!
//! Resolution is two-tier: an explicitly registered fetcher for a kind always
//! wins; otherwise the built-in kubernetes or filesystem fetcher is used when
//! configured. Inputs are partitioned by kind, each fetcher only sees its own
//! partition, and partitions run in parallel. Any partition failure fails the
//! whole fetch; no partial bindings are returned.

use super::fetcher::{Bindings, InputFetcher};
use super::filesystem::FilesystemFetcher;
use super::kubernetes::{KubernetesFetcher, ResourceClient};
use crate::error::FetchError;
use crate::inputs::{CelVariable, Input};
use crate::rules::Rule;
use crate::scanner::ScanContext;
use crate::types::InputKind;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Default)]
pub struct CompositeFetcher {
    custom: BTreeMap<InputKind, Arc<dyn InputFetcher>>,
    kubernetes: Option<Arc<KubernetesFetcher>>,
    filesystem: Option<Arc<FilesystemFetcher>>,
}

impl fmt::Debug for CompositeFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeFetcher")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .field("kubernetes", &self.kubernetes)
            .field("filesystem", &self.filesystem)
            .finish()
    }
}

/// One kind's share of a fetch
struct Partition {
    kind: InputKind,
    fetcher: Arc<dyn InputFetcher>,
    inputs: Vec<Input>,
}

impl CompositeFetcher {
    /// An empty composite; nothing is supported until fetchers are added
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in fetchers wired the usual way
    ///
    /// The kubernetes fetcher reads snapshots when `api_resource_path` is
    /// given, otherwise it uses `client` if there is one. The filesystem
    /// fetcher is always present and rooted at `files_root` (default `.`).
    pub fn with_defaults(
        client: Option<Arc<dyn ResourceClient>>,
        api_resource_path: Option<&Path>,
        files_root: Option<&Path>,
    ) -> Self {
        let mut fetcher = Self::new();
        match (api_resource_path, client) {
            (Some(path), _) => fetcher.set_kubernetes_fetcher(KubernetesFetcher::from_snapshots(path)),
            (None, Some(client)) => fetcher.set_kubernetes_fetcher(KubernetesFetcher::with_client(client)),
            (None, None) => {}
        }
        let root = files_root.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        fetcher.set_filesystem_fetcher(FilesystemFetcher::new(root));
        fetcher
    }

    /// Registers `fetcher` for `kind`, replacing any earlier registration
    pub fn register_fetcher(&mut self, kind: InputKind, fetcher: Arc<dyn InputFetcher>) {
        debug!(kind = %kind, "registered custom fetcher");
        self.custom.insert(kind, fetcher);
    }

    pub fn set_kubernetes_fetcher(&mut self, fetcher: KubernetesFetcher) {
        self.kubernetes = Some(Arc::new(fetcher));
    }

    pub fn set_filesystem_fetcher(&mut self, fetcher: FilesystemFetcher) {
        self.filesystem = Some(Arc::new(fetcher));
    }

    pub fn kubernetes_fetcher(&self) -> Option<&KubernetesFetcher> {
        self.kubernetes.as_deref()
    }

    pub fn filesystem_fetcher(&self) -> Option<&FilesystemFetcher> {
        self.filesystem.as_deref()
    }

    pub fn supports_input_type(&self, kind: InputKind) -> bool {
        self.resolve_fetcher(kind).is_some()
    }

    /// Custom registration first, then the built-in for well-known kinds
    pub fn resolve_fetcher(&self, kind: InputKind) -> Option<Arc<dyn InputFetcher>> {
        if let Some(fetcher) = self.custom.get(&kind) {
            return Some(Arc::clone(fetcher));
        }
        match kind {
            InputKind::Kubernetes => self
                .kubernetes
                .clone()
                .map(|f| f as Arc<dyn InputFetcher>),
            InputKind::File => self
                .filesystem
                .clone()
                .map(|f| f as Arc<dyn InputFetcher>),
            InputKind::System | InputKind::Http | InputKind::Database => None,
        }
    }

    /// Every kind that currently resolves, sorted
    pub fn supported_input_types(&self) -> Vec<InputKind> {
        let mut kinds: BTreeSet<InputKind> = self.custom.keys().copied().collect();
        if self.kubernetes.is_some() {
            kinds.insert(InputKind::Kubernetes);
        }
        if self.filesystem.is_some() {
            kinds.insert(InputKind::File);
        }
        kinds.into_iter().collect()
    }

    /// Pre-flight check run before any fetch
    ///
    /// # Errors
    ///
    /// `UnsupportedInputType` for the first input whose kind has no fetcher,
    /// `InvalidInputSpec` for the first input whose spec fails validation.
    pub fn validate_inputs(&self, inputs: &[Input]) -> Result<(), FetchError> {
        for input in inputs {
            if !self.supports_input_type(input.kind()) {
                return Err(FetchError::UnsupportedInputType {
                    input: input.name().to_string(),
                    kind: input.kind(),
                });
            }
            input
                .spec()
                .validate()
                .map_err(|source| FetchError::InvalidInputSpec {
                    input: input.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Fetches all inputs and merges the results into one map
    pub fn fetch_inputs(
        &self,
        inputs: &[Input],
        variables: &[Arc<dyn CelVariable>],
    ) -> Result<Bindings, FetchError> {
        self.fetch_inputs_with_context(&ScanContext::new(), inputs, variables)
    }

    /// Like [`fetch_inputs`](Self::fetch_inputs), but partitions that have not
    /// started when `ctx` trips fail with `FetchError::Cancelled`
    pub fn fetch_inputs_with_context(
        &self,
        ctx: &ScanContext,
        inputs: &[Input],
        variables: &[Arc<dyn CelVariable>],
    ) -> Result<Bindings, FetchError> {
        let partitions = self.partition(inputs)?;
        if partitions.is_empty() {
            return Ok(Bindings::new());
        }

        let outcomes: Vec<Result<Bindings, FetchError>> = partitions
            .par_iter()
            .map(|partition| {
                if ctx.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }
                debug!(
                    kind = %partition.kind,
                    inputs = partition.inputs.len(),
                    "fetching partition"
                );
                partition
                    .fetcher
                    .fetch_inputs(&partition.inputs, variables)
                    .map_err(|source| FetchError::Partition {
                        kind: partition.kind,
                        source: Box::new(source),
                    })
            })
            .collect();

        // Merge in partition order so the reported error never depends on
        // which thread finished first
        let mut bindings = Bindings::with_capacity(inputs.len());
        for outcome in outcomes {
            bindings.extend(outcome?);
        }
        Ok(bindings)
    }

    /// Validates then fetches a rule's inputs
    ///
    /// Warnings name inputs that the responsible fetcher did not bind.
    pub fn fetch_resources(
        &self,
        ctx: &ScanContext,
        rule: &dyn Rule,
        variables: &[Arc<dyn CelVariable>],
    ) -> Result<(Bindings, Vec<String>), FetchError> {
        self.validate_inputs(rule.inputs())?;
        let bindings = self.fetch_inputs_with_context(ctx, rule.inputs(), variables)?;

        let warnings: Vec<String> = rule
            .inputs()
            .iter()
            .filter(|input| !bindings.contains_key(input.name()))
            .map(|input| format!("input '{}' was not bound by its fetcher", input.name()))
            .collect();
        for warning in &warnings {
            warn!(rule = rule.id(), "{}", warning);
        }
        Ok((bindings, warnings))
    }

    /// Groups inputs by kind in first-seen order
    fn partition(&self, inputs: &[Input]) -> Result<Vec<Partition>, FetchError> {
        let mut partitions: Vec<Partition> = Vec::new();
        for input in inputs {
            let kind = input.kind();
            if let Some(partition) = partitions.iter_mut().find(|p| p.kind == kind) {
                partition.inputs.push(input.clone());
                continue;
            }
            let fetcher = self
                .resolve_fetcher(kind)
                .ok_or(FetchError::NoFetcher(kind))?;
            partitions.push(Partition {
                kind,
                fetcher,
                inputs: vec![input.clone()],
            });
        }
        Ok(partitions)
    }
}

/// Step-by-step construction of a [`CompositeFetcher`]
#[derive(Debug, Default)]
pub struct CompositeFetcherBuilder {
    fetcher: CompositeFetcher,
}

impl CompositeFetcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kubernetes_client(mut self, client: Arc<dyn ResourceClient>) -> Self {
        self.fetcher
            .set_kubernetes_fetcher(KubernetesFetcher::with_client(client));
        self
    }

    pub fn with_kubernetes_files(mut self, api_resource_path: impl Into<PathBuf>) -> Self {
        self.fetcher
            .set_kubernetes_fetcher(KubernetesFetcher::from_snapshots(api_resource_path));
        self
    }

    pub fn with_filesystem(mut self, root: impl Into<PathBuf>) -> Self {
        self.fetcher
            .set_filesystem_fetcher(FilesystemFetcher::new(root));
        self
    }

    pub fn with_custom_fetcher(mut self, kind: InputKind, fetcher: Arc<dyn InputFetcher>) -> Self {
        self.fetcher.register_fetcher(kind, fetcher);
        self
    }

    pub fn build(self) -> CompositeFetcher {
        self.fetcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{HttpSpec, InputSpec, SystemSpec, Variable};
    use crate::rules::RuleBuilder;
    use crate::types::RuleKind;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    /// Binds a fixed value for every input it receives and records what it saw
    struct MockFetcher {
        label: &'static str,
        kinds: Vec<InputKind>,
        error: Option<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        fn new(label: &'static str, kinds: &[InputKind]) -> Arc<Self> {
            Arc::new(Self {
                label,
                kinds: kinds.to_vec(),
                error: None,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(label: &'static str, kind: InputKind, error: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                kinds: vec![kind],
                error: Some(error),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl InputFetcher for MockFetcher {
        fn fetch_inputs(
            &self,
            inputs: &[Input],
            _variables: &[Arc<dyn CelVariable>],
        ) -> Result<Bindings, FetchError> {
            self.seen
                .lock()
                .unwrap()
                .extend(inputs.iter().map(|i| i.name().to_string()));
            if let Some(error) = self.error {
                return Err(FetchError::Other(error.to_string()));
            }
            Ok(inputs
                .iter()
                .map(|i| (i.name().to_string(), json!({"from": self.label, "input": i.name()})))
                .collect())
        }

        fn supports_input_type(&self, kind: InputKind) -> bool {
            self.kinds.contains(&kind)
        }
    }

    fn http_input(name: &str) -> Input {
        Input::new(name, InputSpec::Http(HttpSpec::get("https://example.com/healthz")))
    }

    fn system_input(name: &str) -> Input {
        Input::new(
            name,
            InputSpec::System(SystemSpec {
                service: "sshd".to_string(),
                ..SystemSpec::default()
            }),
        )
    }

    fn file_input(name: &str) -> Input {
        Input::file(name, "etc/app.conf", crate::inputs::FileFormat::Text)
    }

    #[test]
    fn test_new_is_empty() {
        let fetcher = CompositeFetcher::new();
        assert!(fetcher.supported_input_types().is_empty());
        assert!(fetcher.kubernetes_fetcher().is_none());
        assert!(fetcher.filesystem_fetcher().is_none());
    }

    #[test]
    fn test_with_defaults() {
        let fetcher = CompositeFetcher::with_defaults(
            None,
            Some(Path::new("/tmp/api-resources")),
            Some(Path::new("/tmp/files")),
        );
        assert!(fetcher.kubernetes_fetcher().is_some());
        assert_eq!(fetcher.filesystem_fetcher().unwrap().root(), Path::new("/tmp/files"));

        let minimal = CompositeFetcher::with_defaults(None, None, None);
        assert!(minimal.kubernetes_fetcher().is_none());
        assert!(minimal.filesystem_fetcher().is_some());
    }

    #[test]
    fn test_no_fetcher_for_http() {
        let fetcher = CompositeFetcher::new();
        let inputs = vec![http_input("health")];

        let err = fetcher.fetch_inputs(&inputs, &[]).unwrap_err();
        assert!(err.to_string().contains("no fetcher available"));

        let err = fetcher.validate_inputs(&inputs).unwrap_err();
        assert!(err.to_string().contains("unsupported input type"));
    }

    #[test]
    fn test_merges_disjoint_partitions() {
        let files = MockFetcher::new("files", &[InputKind::File]);
        let services = MockFetcher::new("services", &[InputKind::System]);
        let fetcher = CompositeFetcherBuilder::new()
            .with_custom_fetcher(InputKind::File, files.clone())
            .with_custom_fetcher(InputKind::System, services.clone())
            .build();

        let bindings = fetcher
            .fetch_inputs(&[file_input("config"), system_input("sshd")], &[])
            .unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings["config"]["from"], "files");
        assert_eq!(bindings["sshd"]["from"], "services");

        // each fetcher only saw its own inputs
        assert_eq!(*files.seen.lock().unwrap(), vec!["config"]);
        assert_eq!(*services.seen.lock().unwrap(), vec!["sshd"]);
    }

    #[test]
    fn test_partition_failure_is_atomic() {
        let fetcher = CompositeFetcherBuilder::new()
            .with_custom_fetcher(InputKind::File, MockFetcher::new("files", &[InputKind::File]))
            .with_custom_fetcher(
                InputKind::Http,
                MockFetcher::failing("http", InputKind::Http, "fetcher error"),
            )
            .build();

        let err = fetcher
            .fetch_inputs(&[file_input("config"), http_input("health")], &[])
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("failed to fetch inputs for type 'http'"));
        assert!(message.contains("fetcher error"));
    }

    #[test]
    fn test_first_failing_partition_in_input_order_is_reported() {
        let fetcher = CompositeFetcherBuilder::new()
            .with_custom_fetcher(
                InputKind::File,
                MockFetcher::failing("files", InputKind::File, "disk on fire"),
            )
            .with_custom_fetcher(
                InputKind::Http,
                MockFetcher::failing("http", InputKind::Http, "connection refused"),
            )
            .build();

        for _ in 0..10 {
            let err = fetcher
                .fetch_inputs(&[http_input("health"), file_input("config")], &[])
                .unwrap_err();
            assert!(matches!(err, FetchError::Partition { kind: InputKind::Http, .. }));
        }
    }

    #[test]
    fn test_binding_map_independent_of_input_order() {
        let fetcher = CompositeFetcherBuilder::new()
            .with_custom_fetcher(InputKind::File, MockFetcher::new("files", &[InputKind::File]))
            .with_custom_fetcher(InputKind::System, MockFetcher::new("svc", &[InputKind::System]))
            .with_custom_fetcher(InputKind::Http, MockFetcher::new("http", &[InputKind::Http]))
            .build();

        let a = file_input("a");
        let b = system_input("b");
        let c = http_input("c");
        let d = file_input("d");
        let orders = [
            vec![a.clone(), b.clone(), c.clone(), d.clone()],
            vec![d.clone(), c.clone(), b.clone(), a.clone()],
            vec![c.clone(), a.clone(), d.clone(), b.clone()],
            vec![b, d, a, c],
        ];

        let expected = fetcher.fetch_inputs(&orders[0], &[]).unwrap();
        for order in &orders[1..] {
            assert_eq!(fetcher.fetch_inputs(order, &[]).unwrap(), expected);
        }
    }

    #[test]
    fn test_custom_registration_shadows_builtin() {
        let mut fetcher = CompositeFetcherBuilder::new()
            .with_filesystem("/nonexistent-root")
            .build();
        fetcher.register_fetcher(InputKind::File, MockFetcher::new("override", &[InputKind::File]));

        let bindings = fetcher.fetch_inputs(&[file_input("config")], &[]).unwrap();
        assert_eq!(bindings["config"]["from"], "override");
    }

    #[test]
    fn test_last_registration_wins() {
        let mut fetcher = CompositeFetcher::new();
        fetcher.register_fetcher(InputKind::Http, MockFetcher::new("first", &[InputKind::Http]));
        fetcher.register_fetcher(InputKind::Http, MockFetcher::new("second", &[InputKind::Http]));

        let bindings = fetcher.fetch_inputs(&[http_input("h")], &[]).unwrap();
        assert_eq!(bindings["h"]["from"], "second");
    }

    #[test]
    fn test_supported_input_types() {
        let fetcher = CompositeFetcherBuilder::new()
            .with_filesystem("/tmp")
            .with_custom_fetcher(InputKind::Http, MockFetcher::new("http", &[InputKind::Http]))
            .build();
        assert_eq!(
            fetcher.supported_input_types(),
            vec![InputKind::File, InputKind::Http]
        );
        assert!(fetcher.supports_input_type(InputKind::Http));
        assert!(!fetcher.supports_input_type(InputKind::Kubernetes));
    }

    #[test]
    fn test_validate_inputs_reports_invalid_spec() {
        let fetcher = CompositeFetcherBuilder::new().with_filesystem("/tmp").build();
        assert!(fetcher.validate_inputs(&[file_input("ok")]).is_ok());

        let broken = Input::file("broken", "", crate::inputs::FileFormat::Text);
        let err = fetcher.validate_inputs(&[broken]).unwrap_err();
        assert!(err.to_string().contains("invalid input spec"));
    }

    #[test]
    fn test_empty_inputs() {
        let fetcher = CompositeFetcher::new();
        assert!(fetcher.fetch_inputs(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_resources() {
        let fetcher = CompositeFetcherBuilder::new()
            .with_custom_fetcher(InputKind::File, MockFetcher::new("files", &[InputKind::File]))
            .build();
        let rule = RuleBuilder::new("r", RuleKind::Cel)
            .with_input(file_input("config"))
            .with_cel_expression("true")
            .build()
            .unwrap();
        let variables: Vec<Arc<dyn CelVariable>> = vec![Arc::new(Variable::new("env", "prod"))];

        let (bindings, warnings) = fetcher
            .fetch_resources(&ScanContext::new(), rule.as_ref(), &variables)
            .unwrap();
        assert_eq!(bindings["config"]["input"], Value::from("config"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_fetch_resources_propagates_fetch_error() {
        let fetcher = CompositeFetcherBuilder::new()
            .with_custom_fetcher(
                InputKind::File,
                MockFetcher::failing("files", InputKind::File, "fetch failed"),
            )
            .build();
        let rule = RuleBuilder::new("r", RuleKind::Cel)
            .with_input(file_input("config"))
            .build()
            .unwrap();

        let err = fetcher
            .fetch_resources(&ScanContext::new(), rule.as_ref(), &[])
            .unwrap_err();
        assert!(err.to_string().contains("fetch failed"));
    }

    #[test]
    fn test_cancelled_context_stops_fetch() {
        let files = MockFetcher::new("files", &[InputKind::File]);
        let fetcher = CompositeFetcherBuilder::new()
            .with_custom_fetcher(InputKind::File, files.clone())
            .build();
        let ctx = ScanContext::new();
        ctx.cancel();

        let err = fetcher
            .fetch_inputs_with_context(&ctx, &[file_input("config")], &[])
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        assert!(files.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_integrates_with_filesystem_fetcher() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("test.txt"), "test content").unwrap();
        let fetcher = CompositeFetcherBuilder::new()
            .with_filesystem(temp.path())
            .build();

        let input = Input::file("testfile", "test.txt", crate::inputs::FileFormat::Text);
        let bindings = fetcher.fetch_inputs(&[input], &[]).unwrap();
        assert_eq!(bindings["testfile"], "test content");
    }
}
