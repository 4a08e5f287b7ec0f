//! Downstream asset repository

pub mod git;

pub use git::{GitRepository, branch_name, commit_message};
