#![forbid(unsafe_code)]

//! The fetcher contract

use crate::error::FetchError;
use crate::inputs::{CelVariable, Input};
use crate::types::InputKind;
use std::collections::HashMap;
use std::sync::Arc;

/// Fetched data keyed by input name
pub type Bindings = HashMap<String, serde_json::Value>;

/// Resolves inputs of one or more kinds into bound values
///
/// Implementations must be `Send + Sync`; the composite calls them from
/// worker threads and may run several partitions at once. A fetcher only ever
/// receives inputs of a kind it reported support for.
pub trait InputFetcher: Send + Sync {
    /// Returns one binding per input, keyed by the input's name
    fn fetch_inputs(
        &self,
        inputs: &[Input],
        variables: &[Arc<dyn CelVariable>],
    ) -> Result<Bindings, FetchError>;

    fn supports_input_type(&self, kind: InputKind) -> bool;
}
