#![forbid(unsafe_code)]

//! Input fetchers and the composite dispatcher

mod composite;
mod fetcher;
mod filesystem;
mod kubernetes;

pub use composite::{CompositeFetcher, CompositeFetcherBuilder};
pub use fetcher::{Bindings, InputFetcher};
pub use filesystem::FilesystemFetcher;
pub use kubernetes::{KubernetesFetcher, ResourceClient};
