//! git operations against the downstream asset repository
//!
//! Every operation shells out to the `git` CLI through a [`CommandRunner`];
//! a non-zero exit becomes [`PublishError::GitFailed`] naming the operation.

use std::path::{Path, PathBuf};

use crate::core::error::{PublishError, Result};
use crate::core::traits::{CommandOutput, CommandRunner};
use crate::workspace::PackageDetails;

/// Downstream branch for a package version: `<unscoped-name>-<version>`
pub fn branch_name(details: &PackageDetails) -> String {
    format!("{}-{}", details.unscoped_name(), details.version)
}

pub fn commit_message(details: &PackageDetails) -> String {
    format!("Publish {}@{}", details.name, details.version)
}

/// A local clone of the asset repository
pub struct GitRepository<'a> {
    runner: &'a dyn CommandRunner,
    dir: PathBuf,
    package: String,
}

impl<'a> GitRepository<'a> {
    /// Clone `url` into `<parent>/<dir_name>`
    pub async fn clone_from(
        runner: &'a dyn CommandRunner,
        url: &str,
        parent: &Path,
        dir_name: &str,
        package: &str,
    ) -> Result<Self> {
        let args = vec!["clone".to_string(), url.to_string(), dir_name.to_string()];
        let output = runner
            .run("git", &args, parent)
            .await
            .map_err(|source| PublishError::Command {
                package: package.to_string(),
                source,
            })?;
        check(package, "clone", output)?;

        Ok(Self {
            runner,
            dir: parent.join(dir_name),
            package: package.to_string(),
        })
    }

    /// Whether `branch` exists on `url`, checked without a clone
    pub async fn remote_branch_exists(
        runner: &dyn CommandRunner,
        url: &str,
        branch: &str,
        cwd: &Path,
        package: &str,
    ) -> Result<bool> {
        let args = vec![
            "ls-remote".to_string(),
            "--heads".to_string(),
            url.to_string(),
            format!("refs/heads/{}", branch),
        ];
        let output = runner
            .run("git", &args, cwd)
            .await
            .map_err(|source| PublishError::Command {
                package: package.to_string(),
                source,
            })?;
        let output = check(package, "ls-remote", output)?;

        Ok(!output.stdout.trim().is_empty())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn git(&self, operation: &str, args: &[&str]) -> Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let output = self
            .runner
            .run("git", &args, &self.dir)
            .await
            .map_err(|source| PublishError::Command {
                package: self.package.clone(),
                source,
            })?;
        check(&self.package, operation, output)
    }

    pub async fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        self.git("checkout", &["checkout", "-b", branch]).await?;
        Ok(())
    }

    pub async fn add_all(&self) -> Result<()> {
        self.git("add", &["add", "--all"]).await?;
        Ok(())
    }

    pub async fn commit(&self, message: &str) -> Result<()> {
        self.git("commit", &["commit", "-m", message]).await?;
        Ok(())
    }

    /// Push `branch` to origin, replacing any existing branch of that name
    pub async fn force_push(&self, branch: &str) -> Result<()> {
        self.git(
            "push",
            &["push", "--force", "--set-upstream", "origin", branch],
        )
        .await?;
        Ok(())
    }
}

fn check(package: &str, operation: &str, output: CommandOutput) -> Result<CommandOutput> {
    if output.success() {
        Ok(output)
    } else {
        Err(PublishError::GitFailed {
            package: package.to_string(),
            operation: operation.to_string(),
            message: output.summary(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::CommandError;
    use async_trait::async_trait;
    use semver::Version;
    use std::collections::{BTreeSet, VecDeque};
    use std::sync::Mutex;

    /// Replays queued outputs and records every invocation
    struct ReplayRunner {
        outputs: Mutex<VecDeque<CommandOutput>>,
        calls: Mutex<Vec<(Vec<String>, PathBuf)>>,
    }

    impl ReplayRunner {
        fn new(outputs: Vec<CommandOutput>) -> Self {
            Self {
                outputs: Mutex::new(outputs.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ReplayRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            cwd: &Path,
        ) -> std::result::Result<CommandOutput, CommandError> {
            assert_eq!(program, "git");
            self.calls
                .lock()
                .unwrap()
                .push((args.to_vec(), cwd.to_path_buf()));
            Ok(self.outputs.lock().unwrap().pop_front().unwrap_or(ok("")))
        }
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn details() -> PackageDetails {
        PackageDetails {
            name: "@acme/editor".to_string(),
            dir: PathBuf::from("packages/editor"),
            version: Version::parse("2.0.0-canary.1").unwrap(),
            local_deps: BTreeSet::new(),
        }
    }

    #[test]
    fn test_branch_and_message() {
        assert_eq!(branch_name(&details()), "editor-2.0.0-canary.1");
        assert_eq!(commit_message(&details()), "Publish @acme/editor@2.0.0-canary.1");
    }

    #[tokio::test]
    async fn test_full_downstream_sequence() {
        let runner = ReplayRunner::new(vec![]);
        let parent = PathBuf::from("/tmp/work");

        let repo = GitRepository::clone_from(
            &runner,
            "https://example.com/assets.git",
            &parent,
            "assets",
            "@acme/editor",
        )
        .await
        .unwrap();
        assert_eq!(repo.dir(), parent.join("assets"));

        repo.checkout_new_branch("editor-1.0.0").await.unwrap();
        repo.add_all().await.unwrap();
        repo.commit("Publish @acme/editor@1.0.0").await.unwrap();
        repo.force_push("editor-1.0.0").await.unwrap();

        let calls = runner.calls.lock().unwrap();
        let argv: Vec<String> = calls.iter().map(|(a, _)| a.join(" ")).collect();
        assert_eq!(
            argv,
            vec![
                "clone https://example.com/assets.git assets",
                "checkout -b editor-1.0.0",
                "add --all",
                "commit -m Publish @acme/editor@1.0.0",
                "push --force --set-upstream origin editor-1.0.0",
            ]
        );
        assert_eq!(calls[0].1, parent);
        assert!(calls[1..].iter().all(|(_, cwd)| cwd == &parent.join("assets")));
    }

    #[tokio::test]
    async fn test_failed_push_names_operation() {
        let runner = ReplayRunner::new(vec![
            ok(""),
            failed("remote: Permission denied\nfatal: unable to access\n"),
        ]);
        let repo = GitRepository::clone_from(&runner, "u", Path::new("/tmp"), "assets", "@acme/ui")
            .await
            .unwrap();

        let err = repo.force_push("ui-1.0.0").await.unwrap_err();
        match err {
            PublishError::GitFailed {
                package,
                operation,
                message,
            } => {
                assert_eq!(package, "@acme/ui");
                assert_eq!(operation, "push");
                assert_eq!(message, "fatal: unable to access");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_remote_branch_exists() {
        let runner = ReplayRunner::new(vec![
            ok("3f2a1b0c\trefs/heads/editor-1.0.0\n"),
            ok(""),
        ]);

        let exists = GitRepository::remote_branch_exists(
            &runner,
            "u",
            "editor-1.0.0",
            Path::new("/tmp"),
            "@acme/editor",
        )
        .await
        .unwrap();
        assert!(exists);

        let exists = GitRepository::remote_branch_exists(
            &runner,
            "u",
            "editor-1.0.1",
            Path::new("/tmp"),
            "@acme/editor",
        )
        .await
        .unwrap();
        assert!(!exists);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(
            calls[1].0,
            vec!["ls-remote", "--heads", "u", "refs/heads/editor-1.0.1"]
        );
    }
}
