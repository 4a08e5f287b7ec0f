//! Orchestration layer for workspace publishing
//!
//! [`WorkspacePublisher`] discovers and orders packages, then hands them to
//! the [`PublishSequencer`], which runs the publish cycle one package at a
//! time.

pub mod package_publisher;
pub mod sequencer;

// Re-export main types for convenience
pub use package_publisher::WorkspacePublisher;
pub use sequencer::{
    DownstreamOutcome, PackageReport, PlannedPackage, PublishReport, PublishSequencer,
    plan_package,
};
