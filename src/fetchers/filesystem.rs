#![forbid(unsafe_code)]

//! Filesystem fetcher
//!
//! Reads files relative to a root directory. Content is bound as a string
//! (`text`) or as parsed data (`json`, `yaml`). A directory binds a map of
//! relative path to content; `recursive` descends into subdirectories.

use super::fetcher::{Bindings, InputFetcher};
use crate::error::FetchError;
use crate::inputs::{CelVariable, FileFormat, FileSpec, Input, InputSpec};
use crate::types::InputKind;
use ignore::WalkBuilder;
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FilesystemFetcher {
    root: PathBuf,
}

impl FilesystemFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute paths are used as-is; relative ones resolve against the root
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn fetch_spec(&self, spec: &FileSpec) -> Result<Value, FetchError> {
        let path = self.resolve(&spec.path);
        let metadata = fs::metadata(&path).map_err(|source| FetchError::Io {
            path: path.clone(),
            source,
        })?;

        if metadata.is_dir() {
            return self.read_directory(&path, spec);
        }
        read_file(&path, spec)
    }

    fn read_directory(&self, dir: &Path, spec: &FileSpec) -> Result<Value, FetchError> {
        let mut builder = WalkBuilder::new(dir);
        builder
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .sort_by_file_name(|a, b| a.cmp(b));
        if !spec.recursive {
            builder.max_depth(Some(1));
        }

        let mut entries = Map::new();
        for entry in builder.build() {
            let entry = entry.map_err(|e| FetchError::Other(format!(
                "failed to walk {}: {}",
                dir.display(),
                e
            )))?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let relative = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            entries.insert(relative, read_file(path, spec)?);
        }
        debug!(dir = %dir.display(), files = entries.len(), "read directory input");
        Ok(Value::Object(entries))
    }
}

fn read_file(path: &Path, spec: &FileSpec) -> Result<Value, FetchError> {
    let text = fs::read_to_string(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = decode(path, &text, spec.format)?;
    if !spec.check_permissions {
        return Ok(content);
    }

    let metadata = fs::metadata(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut wrapped = json!({
        "content": content,
        "size": metadata.len(),
        "readonly": metadata.permissions().readonly(),
    });
    if let Some(mode) = unix_mode(&metadata) {
        wrapped["mode"] = Value::String(mode);
    }
    Ok(wrapped)
}

fn decode(path: &Path, text: &str, format: FileFormat) -> Result<Value, FetchError> {
    let parse_error = |message: String| FetchError::Parse {
        path: path.to_path_buf(),
        message,
    };
    match format {
        FileFormat::Text => Ok(Value::String(text.to_string())),
        FileFormat::Json => serde_json::from_str(text).map_err(|e| parse_error(e.to_string())),
        FileFormat::Yaml => serde_yaml::from_str(text).map_err(|e| parse_error(e.to_string())),
    }
}

#[cfg(unix)]
fn unix_mode(metadata: &fs::Metadata) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;
    Some(format!("{:04o}", metadata.permissions().mode() & 0o7777))
}

#[cfg(not(unix))]
fn unix_mode(_metadata: &fs::Metadata) -> Option<String> {
    None
}

impl InputFetcher for FilesystemFetcher {
    fn fetch_inputs(
        &self,
        inputs: &[Input],
        _variables: &[Arc<dyn CelVariable>],
    ) -> Result<Bindings, FetchError> {
        let mut bindings = Bindings::with_capacity(inputs.len());
        for input in inputs {
            let InputSpec::File(spec) = input.spec() else {
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
        kind == InputKind::File
    }
}
