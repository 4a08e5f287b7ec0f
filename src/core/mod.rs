pub mod config;
pub mod config_loader;
pub mod copy;
pub mod error;
pub mod retry;
pub mod state_machine;
pub mod traits;

pub use config::*;
pub use config_loader::{ConfigLoadOptions, ConfigLoader};
pub use copy::copy_tree;
pub use error::*;
pub use retry::*;
pub use state_machine::{PackageProgress, PublishStep, StepTransition};
pub use traits::*;
