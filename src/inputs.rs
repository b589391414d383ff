#![forbid(unsafe_code)]

//! Input model: named, typed requests for resource data

mod input;
mod spec;
mod variable;

pub use crate::types::InputKind;
pub use input::Input;
pub use spec::{
    DatabaseSpec, FileFormat, FileSpec, HttpSpec, InputSpec, KubernetesSpec, SystemSpec,
};
pub use variable::{CelVariable, GroupVersionKind, Variable};
