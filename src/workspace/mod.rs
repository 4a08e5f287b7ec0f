//! Workspace discovery: package manifests, the package registry and the
//! order packages must be published in.

pub mod graph;
pub mod manifest;
pub mod sorter;

pub use graph::{PackageDetails, PackageRegistry};
pub use manifest::{MANIFEST_FILENAME, PackageManifest};
pub use sorter::topological_order;
