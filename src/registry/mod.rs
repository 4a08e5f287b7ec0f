//! Registry naming rules and clients

pub mod npm;

pub use npm::{
    HttpRegistryClient, NpmRegistry, PublishOutcome, is_already_published, prerelease_tag,
    tarball_url, unscoped_name,
};
