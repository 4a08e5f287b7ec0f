pub mod core;
pub mod downstream;
pub mod orchestration;
pub mod registry;
pub mod security;
pub mod workspace;

pub use self::core::*;
pub use orchestration::{PublishReport, PublishSequencer, WorkspacePublisher};
pub use security::{CommandError, SafeCommandExecutor};
pub use workspace::{PackageDetails, PackageRegistry, topological_order};
