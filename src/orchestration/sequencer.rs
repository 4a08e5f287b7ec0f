//! Publish Sequencer - runs the publish cycle for each package in order
//!
//! For every package, strictly one at a time:
//! 1. `npm publish` (retried, tolerant of an already published version)
//! 2. poll the registry until the tarball is downloadable (retried)
//! 3. download and unpack the tarball, clone the asset repository and copy
//!    the package contents into it
//! 4. commit on `<unscoped-name>-<version>` and force-push
//! 5. remove every intermediate file
//!
//! Intermediate files live in a per-package temporary directory, so cleanup
//! happens on every exit path and concurrent runs cannot collide. Any error
//! that survives the retry budget aborts the whole run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::core::config::PublisherSettings;
use crate::core::copy::copy_tree;
use crate::core::error::{PublishError, Result};
use crate::core::retry::RetryManager;
use crate::core::state_machine::{PackageProgress, PublishStep};
use crate::core::traits::{CommandRunner, RegistryClient};
use crate::downstream::{GitRepository, branch_name, commit_message};
use crate::registry::{NpmRegistry, PublishOutcome, prerelease_tag, tarball_url};
use crate::workspace::PackageDetails;

/// Directory the asset repository is cloned into, inside the work dir
const ASSETS_DIR: &str = "assets";

/// Directory `npm pack` tarballs unpack to
const EXTRACTED_DIR: &str = "package";

/// What will happen to one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedPackage {
    pub name: String,
    pub version: String,
    pub tag: String,
    pub tarball_url: String,
    pub branch: String,
}

/// What happened downstream for one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownstreamOutcome {
    Pushed,
    SkippedExistingBranch,
    DryRun,
}

/// Result for one package
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageReport {
    #[serde(flatten)]
    pub plan: PlannedPackage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishOutcome>,
    pub downstream: DownstreamOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub progress: PackageProgress,
}

/// Result of a full run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub packages: Vec<PackageReport>,
    pub dry_run: bool,
    pub duration_ms: u64,
}

/// Drives packages through the publish cycle
pub struct PublishSequencer {
    settings: PublisherSettings,
    runner: Arc<dyn CommandRunner>,
    client: Arc<dyn RegistryClient>,
    work_root: PathBuf,
}

impl PublishSequencer {
    pub fn new(
        settings: PublisherSettings,
        runner: Arc<dyn CommandRunner>,
        client: Arc<dyn RegistryClient>,
    ) -> Self {
        Self {
            settings,
            runner,
            client,
            work_root: std::env::temp_dir(),
        }
    }

    /// Parent directory for per-package work directories
    pub fn with_work_root(mut self, work_root: impl Into<PathBuf>) -> Self {
        self.work_root = work_root.into();
        self
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    pub fn plan(&self, details: &PackageDetails) -> PlannedPackage {
        plan_package(&self.settings, details)
    }

    /// Publish every package of `order`, in order. The first fatal error
    /// stops the run; later packages are not attempted.
    pub async fn run(&self, order: &[&PackageDetails]) -> Result<PublishReport> {
        let started = Instant::now();
        let mut packages = Vec::with_capacity(order.len());

        tracing::info!(
            packages = order.len(),
            dry_run = self.settings.dry_run,
            "starting publish run"
        );

        for (i, details) in order.iter().enumerate() {
            tracing::info!(
                "[{}/{}] {}@{}",
                i + 1,
                order.len(),
                details.name,
                details.version
            );

            let report = if self.settings.dry_run {
                self.dry_run_package(details)
            } else {
                self.publish_package(details).await?
            };
            packages.push(report);
        }

        Ok(PublishReport {
            packages,
            dry_run: self.settings.dry_run,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn dry_run_package(&self, details: &PackageDetails) -> PackageReport {
        let plan = self.plan(details);
        tracing::info!(
            package = %plan.name,
            tag = %plan.tag,
            url = %plan.tarball_url,
            branch = %plan.branch,
            "dry run: would publish and push"
        );

        PackageReport {
            plan,
            publish: None,
            downstream: DownstreamOutcome::DryRun,
            published_at: None,
            duration_ms: 0,
            progress: PackageProgress::new(&details.name, details.version.to_string()),
        }
    }

    /// Run the full cycle for one package
    pub async fn publish_package(&self, details: &PackageDetails) -> Result<PackageReport> {
        let started = Instant::now();
        let mut progress = PackageProgress::new(&details.name, details.version.to_string());

        match self.run_cycle(details, &mut progress).await {
            Ok((publish, downstream)) => Ok(PackageReport {
                plan: self.plan(details),
                publish: Some(publish),
                downstream,
                published_at: progress.entered_at(PublishStep::ConfirmingAvailability),
                duration_ms: started.elapsed().as_millis() as u64,
                progress,
            }),
            Err(e) => {
                progress.fail(&e);
                tracing::error!(package = %details.name, code = e.code(), "{e}");
                Err(e)
            }
        }
    }

    async fn run_cycle(
        &self,
        details: &PackageDetails,
        progress: &mut PackageProgress,
    ) -> Result<(PublishOutcome, DownstreamOutcome)> {
        progress.transition(PublishStep::Publishing);
        let publish = self.publish_to_registry(details).await?;

        progress.transition(PublishStep::ConfirmingAvailability);
        self.confirm_availability(details).await?;

        let branch = branch_name(details);
        if self.settings.skip_existing_branches
            && GitRepository::remote_branch_exists(
                self.runner.as_ref(),
                &self.settings.assets_repo,
                &branch,
                &self.work_root,
                &details.name,
            )
            .await?
        {
            tracing::info!(package = %details.name, %branch, "downstream branch exists, skipping");
            progress.transition(PublishStep::Completed);
            return Ok((publish, DownstreamOutcome::SkippedExistingBranch));
        }

        progress.transition(PublishStep::Transplanting);
        let workdir = tempfile::Builder::new()
            .prefix(&format!("mirror-publisher-{}-", details.unscoped_name()))
            .tempdir_in(&self.work_root)?;

        let result = self
            .transplant_and_push(details, workdir.path(), &branch, progress)
            .await;

        cleanup(workdir.path(), details);
        if let Err(e) = workdir.close() {
            tracing::debug!(package = %details.name, "failed to remove work dir: {e}");
        }

        result?;
        progress.transition(PublishStep::Completed);
        Ok((publish, DownstreamOutcome::Pushed))
    }

    /// Step 1: `npm publish`, retried
    async fn publish_to_registry(&self, details: &PackageDetails) -> Result<PublishOutcome> {
        let npm = NpmRegistry::new(
            self.runner.as_ref(),
            &self.settings.registry_url,
            self.settings.access,
        );
        let npm = &npm;

        RetryManager::new(self.settings.publish_retry)
            .retry_when(
                |state| async move {
                    tracing::info!(
                        package = %details.name,
                        attempt = state.attempt + 1,
                        total = state.total,
                        "publishing to registry"
                    );
                    npm.publish(details).await
                },
                PublishError::is_recoverable,
            )
            .await
    }

    /// Step 2: wait for the tarball to be downloadable
    async fn confirm_availability(&self, details: &PackageDetails) -> Result<()> {
        let url = tarball_url(&self.settings.registry_url, &details.name, &details.version);
        let url = url.as_str();
        let client = self.client.as_ref();

        RetryManager::new(self.settings.availability_retry)
            .retry_when(
                |state| async move {
                    tracing::info!(
                        package = %details.name,
                        attempt = state.attempt + 1,
                        remaining = state.remaining,
                        total = state.total,
                        "checking {url}"
                    );
                    let status = client.artifact_status(&details.name, url).await?;
                    if status >= 400 {
                        return Err(PublishError::NotAvailable {
                            package: details.name.clone(),
                            url: url.to_string(),
                            status,
                        });
                    }
                    Ok(())
                },
                PublishError::is_recoverable,
            )
            .await
    }

    /// Steps 3 and 4
    async fn transplant_and_push(
        &self,
        details: &PackageDetails,
        workdir: &Path,
        branch: &str,
        progress: &mut PackageProgress,
    ) -> Result<()> {
        let url = tarball_url(&self.settings.registry_url, &details.name, &details.version);
        let tarball = tarball_file_name(details);

        self.run_tool(
            details,
            "download",
            "curl",
            &[
                "--fail",
                "--silent",
                "--show-error",
                "--location",
                "--output",
                tarball.as_str(),
                url.as_str(),
            ],
            workdir,
        )
        .await?;

        let repo = GitRepository::clone_from(
            self.runner.as_ref(),
            &self.settings.assets_repo,
            workdir,
            ASSETS_DIR,
            &details.name,
        )
        .await?;

        self.run_tool(details, "extract", "tar", &["-xzf", tarball.as_str()], workdir)
            .await?;

        let source = workdir.join(EXTRACTED_DIR);
        let destination = match &self.settings.assets_subdir {
            Some(subdir) => repo.dir().join(subdir),
            None => repo.dir().to_path_buf(),
        };
        let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &destination))
            .await
            .map_err(|e| PublishError::TransplantFailed {
                package: details.name.clone(),
                message: e.to_string(),
            })?
            .map_err(|e| PublishError::TransplantFailed {
                package: details.name.clone(),
                message: format!("copy failed: {}", e),
            })?;
        tracing::info!(package = %details.name, files = copied, "copied package contents");

        progress.transition(PublishStep::PushingDownstream);
        repo.checkout_new_branch(branch).await?;
        repo.add_all().await?;
        repo.commit(&commit_message(details)).await?;
        repo.force_push(branch).await?;
        tracing::info!(package = %details.name, %branch, "pushed downstream branch");

        Ok(())
    }

    async fn run_tool(
        &self,
        details: &PackageDetails,
        step: &str,
        program: &str,
        args: &[&str],
        cwd: &Path,
    ) -> Result<()> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let output = self
            .runner
            .run(program, &args, cwd)
            .await
            .map_err(|source| PublishError::Command {
                package: details.name.clone(),
                source,
            })?;

        if !output.success() {
            return Err(PublishError::TransplantFailed {
                package: details.name.clone(),
                message: format!("{} failed: {}", step, output.summary()),
            });
        }
        Ok(())
    }
}

/// Tag, tarball URL and downstream branch for one package
pub fn plan_package(settings: &PublisherSettings, details: &PackageDetails) -> PlannedPackage {
    PlannedPackage {
        name: details.name.clone(),
        version: details.version.to_string(),
        tag: prerelease_tag(&details.version),
        tarball_url: tarball_url(&settings.registry_url, &details.name, &details.version),
        branch: branch_name(details),
    }
}

fn tarball_file_name(details: &PackageDetails) -> String {
    format!("{}-{}.tgz", details.unscoped_name(), details.version)
}

/// Best-effort removal of the downloaded tarball, the unpacked package and
/// the clone. Failures are logged and ignored.
fn cleanup(workdir: &Path, details: &PackageDetails) {
    let targets = [
        workdir.join(tarball_file_name(details)),
        workdir.join(EXTRACTED_DIR),
        workdir.join(ASSETS_DIR),
    ];

    for target in &targets {
        let result = if target.is_dir() {
            std::fs::remove_dir_all(target)
        } else {
            std::fs::remove_file(target)
        };

        match result {
            Ok(()) => tracing::debug!(path = %target.display(), "removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!(path = %target.display(), "cleanup failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::CommandOutput;
    use crate::security::CommandError;
    use async_trait::async_trait;
    use semver::Version;
    use std::collections::{BTreeSet, VecDeque};
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::core::retry::RetryOptions;
    use crate::registry::PublishOutcome;
    use crate::workspace::{PackageRegistry, topological_order};

    /// Fake CLIs: npm and git answer from scripts, curl/tar/git clone touch the
    /// filesystem the way the real tools would.
    #[derive(Default)]
    struct FakeTools {
        npm: Mutex<VecDeque<CommandOutput>>,
        ls_remote: Mutex<VecDeque<CommandOutput>>,
        push: Mutex<VecDeque<CommandOutput>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
        /// For every `git add`, whether the package contents were in place
        staged_contents: Mutex<Vec<bool>>,
        staged_subdir: Option<String>,
    }

    fn ok() -> CommandOutput {
        CommandOutput {
            code: Some(0),
            ..Default::default()
        }
    }

    fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: format!("{}\n", stderr),
        }
    }

    impl FakeTools {
        fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p == program)
                .map(|(_, a)| a.clone())
                .collect()
        }

        fn pop(queue: &Mutex<VecDeque<CommandOutput>>) -> CommandOutput {
            queue.lock().unwrap().pop_front().unwrap_or_else(ok)
        }
    }

    #[async_trait]
    impl CommandRunner for FakeTools {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            cwd: &Path,
        ) -> std::result::Result<CommandOutput, CommandError> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));

            let output = match (program, args[0].as_str()) {
                ("npm", "publish") => Self::pop(&self.npm),
                ("curl", _) => {
                    let out = args
                        .iter()
                        .position(|a| a == "--output")
                        .map(|i| args[i + 1].clone())
                        .unwrap();
                    fs::write(cwd.join(out), b"tarball").unwrap();
                    ok()
                }
                ("tar", _) => {
                    let extracted = cwd.join("package");
                    fs::create_dir_all(extracted.join("dist")).unwrap();
                    fs::write(extracted.join("package.json"), b"{}").unwrap();
                    fs::write(extracted.join("dist/index.js"), b"export {}").unwrap();
                    ok()
                }
                ("git", "clone") => {
                    fs::create_dir_all(cwd.join(&args[2]).join(".git")).unwrap();
                    ok()
                }
                ("git", "ls-remote") => Self::pop(&self.ls_remote),
                ("git", "add") => {
                    let root = match &self.staged_subdir {
                        Some(sub) => cwd.join(sub),
                        None => cwd.to_path_buf(),
                    };
                    self.staged_contents
                        .lock()
                        .unwrap()
                        .push(root.join("package.json").is_file() && root.join("dist/index.js").is_file());
                    ok()
                }
                ("git", "push") => Self::pop(&self.push),
                _ => ok(),
            };
            Ok(output)
        }
    }

    /// Registry answering with scripted status codes, 200 once the script runs out
    #[derive(Default)]
    struct FakeRegistry {
        statuses: Mutex<VecDeque<u16>>,
        checked: Mutex<Vec<String>>,
    }

    impl FakeRegistry {
        fn with_statuses(statuses: &[u16]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                checked: Mutex::new(Vec::new()),
            }
        }

        fn check_count(&self) -> usize {
            self.checked.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn artifact_status(&self, _package: &str, url: &str) -> Result<u16> {
            self.checked.lock().unwrap().push(url.to_string());
            Ok(self.statuses.lock().unwrap().pop_front().unwrap_or(200))
        }
    }

    fn settings() -> PublisherSettings {
        let mut settings = PublisherSettings::new("@acme", "packages", "https://example.com/assets.git");
        settings.registry_url = "http://localhost:4873".to_string();
        settings.publish_retry = RetryOptions::new(5, Duration::from_millis(1));
        settings.availability_retry = RetryOptions::new(10, Duration::from_millis(1));
        settings
    }

    fn pkg(name: &str, version: &str, deps: &[&str]) -> PackageDetails {
        PackageDetails {
            name: name.to_string(),
            dir: PathBuf::from("packages").join(crate::registry::unscoped_name(name)),
            version: Version::parse(version).unwrap(),
            local_deps: deps.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    struct Harness {
        tools: Arc<FakeTools>,
        registry: Arc<FakeRegistry>,
        work_root: TempDir,
        sequencer: PublishSequencer,
    }

    fn harness(settings: PublisherSettings, tools: FakeTools, registry: FakeRegistry) -> Harness {
        let tools = Arc::new(tools);
        let registry = Arc::new(registry);
        let work_root = TempDir::new().unwrap();
        let sequencer = PublishSequencer::new(settings, tools.clone(), registry.clone())
            .with_work_root(work_root.path());

        Harness {
            tools,
            registry,
            work_root,
            sequencer,
        }
    }

    fn work_root_is_empty(h: &Harness) -> bool {
        fs::read_dir(h.work_root.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_chain_publishes_dependencies_first() {
        let registry: PackageRegistry = [
            pkg("@acme/a", "1.0.0", &["@acme/b"]),
            pkg("@acme/b", "1.0.0", &["@acme/c"]),
            pkg("@acme/c", "1.0.0", &[]),
        ]
        .into_iter()
        .collect();
        let order = topological_order(&registry).unwrap();

        let h = harness(settings(), FakeTools::default(), FakeRegistry::default());
        let report = h.sequencer.run(&order).await.unwrap();

        let published: Vec<_> = report.packages.iter().map(|p| p.plan.name.as_str()).collect();
        assert_eq!(published, vec!["@acme/c", "@acme/b", "@acme/a"]);

        let pushes: Vec<String> = h
            .tools
            .calls_to("git")
            .into_iter()
            .filter(|a| a[0] == "push")
            .map(|a| a[4].clone())
            .collect();
        assert_eq!(pushes, vec!["c-1.0.0", "b-1.0.0", "a-1.0.0"]);

        assert!(report.packages.iter().all(|p| {
            p.publish == Some(PublishOutcome::Published)
                && p.downstream == DownstreamOutcome::Pushed
                && p.progress.current == PublishStep::Completed
                && p.published_at.is_some()
        }));
        assert_eq!(*h.tools.staged_contents.lock().unwrap(), vec![true, true, true]);
        assert!(work_root_is_empty(&h));
    }

    #[tokio::test]
    async fn test_cycle_runs_every_step_in_order() {
        let h = harness(settings(), FakeTools::default(), FakeRegistry::default());
        let details = pkg("@acme/editor", "2.0.0-canary.7", &[]);

        h.sequencer.run(&[&details]).await.unwrap();

        let calls = h.tools.calls.lock().unwrap();
        let steps: Vec<String> = calls
            .iter()
            .map(|(p, a)| format!("{} {}", p, a[0]))
            .collect();
        assert_eq!(
            steps,
            vec![
                "npm publish",
                "curl --fail",
                "git clone",
                "tar -xzf",
                "git checkout",
                "git add",
                "git commit",
                "git push",
            ]
        );

        let (_, publish_args) = &calls[0];
        assert_eq!(publish_args[1..3], ["--tag".to_string(), "canary".to_string()]);

        let (_, commit_args) = calls.iter().find(|(_, a)| a[0] == "commit").unwrap();
        assert_eq!(commit_args[2], "Publish @acme/editor@2.0.0-canary.7");

        let (_, curl_args) = &calls[1];
        assert_eq!(
            curl_args.last().unwrap(),
            "http://localhost:4873/@acme/editor/-/editor-2.0.0-canary.7.tgz"
        );
    }

    #[tokio::test]
    async fn test_availability_succeeds_on_tenth_attempt() {
        let h = harness(
            settings(),
            FakeTools::default(),
            FakeRegistry::with_statuses(&[404; 9]),
        );
        let details = pkg("@acme/editor", "1.0.0", &[]);

        let report = h.sequencer.run(&[&details]).await.unwrap();

        assert_eq!(h.registry.check_count(), 10);
        assert_eq!(report.packages[0].downstream, DownstreamOutcome::Pushed);
    }

    #[tokio::test]
    async fn test_availability_exhaustion_is_fatal() {
        let registry: PackageRegistry = [
            pkg("@acme/app", "1.0.0", &["@acme/core"]),
            pkg("@acme/core", "1.0.0", &[]),
        ]
        .into_iter()
        .collect();
        let order = topological_order(&registry).unwrap();

        let h = harness(
            settings(),
            FakeTools::default(),
            FakeRegistry::with_statuses(&[404; 10]),
        );

        let err = h.sequencer.run(&order).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::NotAvailable { ref package, status: 404, .. } if package == "@acme/core"
        ));
        assert_eq!(h.registry.check_count(), 10);

        // nothing downstream, and the dependent package is never published
        assert!(h.tools.calls_to("curl").is_empty());
        assert!(h.tools.calls_to("git").is_empty());
        assert_eq!(h.tools.calls_to("npm").len(), 1);
    }

    #[tokio::test]
    async fn test_already_published_is_success_without_retry() {
        let tools = FakeTools::default();
        tools.npm.lock().unwrap().push_back(failed(
            "npm ERR! 403 403 Forbidden - PUT http://localhost:4873/@acme%2feditor - You cannot publish over the previously published versions: 1.0.0.",
        ));
        let h = harness(settings(), tools, FakeRegistry::default());
        let details = pkg("@acme/editor", "1.0.0", &[]);

        let report = h.sequencer.run(&[&details]).await.unwrap();

        assert_eq!(h.tools.calls_to("npm").len(), 1);
        assert_eq!(
            report.packages[0].publish,
            Some(PublishOutcome::AlreadyPublished)
        );
        assert_eq!(report.packages[0].downstream, DownstreamOutcome::Pushed);
    }

    #[tokio::test]
    async fn test_transient_publish_failures_are_retried() {
        let tools = FakeTools::default();
        tools
            .npm
            .lock()
            .unwrap()
            .extend([failed("npm ERR! code ECONNRESET"), failed("npm ERR! 503")]);
        let h = harness(settings(), tools, FakeRegistry::default());
        let details = pkg("@acme/editor", "1.0.0", &[]);

        let report = h.sequencer.run(&[&details]).await.unwrap();

        assert_eq!(h.tools.calls_to("npm").len(), 3);
        assert_eq!(report.packages[0].publish, Some(PublishOutcome::Published));
    }

    #[tokio::test]
    async fn test_publish_exhaustion_is_fatal() {
        let tools = FakeTools::default();
        tools
            .npm
            .lock()
            .unwrap()
            .extend((0..5).map(|_| failed("npm ERR! 500 Internal Server Error")));
        let h = harness(settings(), tools, FakeRegistry::default());
        let details = pkg("@acme/editor", "1.0.0", &[]);

        let err = h.sequencer.run(&[&details]).await.unwrap_err();

        assert!(matches!(err, PublishError::PublishFailed { .. }));
        assert_eq!(h.tools.calls_to("npm").len(), 5);
        assert_eq!(h.registry.check_count(), 0);
    }

    #[tokio::test]
    async fn test_push_failure_aborts_run_and_cleans_up() {
        let registry: PackageRegistry = [
            pkg("@acme/app", "1.0.0", &["@acme/core"]),
            pkg("@acme/core", "1.0.0", &[]),
        ]
        .into_iter()
        .collect();
        let order = topological_order(&registry).unwrap();

        let tools = FakeTools::default();
        tools
            .push
            .lock()
            .unwrap()
            .push_back(failed("remote: Permission to acme/assets.git denied"));
        let h = harness(settings(), tools, FakeRegistry::default());

        let err = h.sequencer.run(&order).await.unwrap_err();

        assert!(matches!(
            err,
            PublishError::GitFailed { ref operation, ref package, .. }
                if operation == "push" && package == "@acme/core"
        ));
        assert_eq!(h.tools.calls_to("npm").len(), 1);
        assert!(work_root_is_empty(&h));
    }

    #[tokio::test]
    async fn test_skip_existing_branch() {
        let mut settings = settings();
        settings.skip_existing_branches = true;

        let tools = FakeTools::default();
        tools.ls_remote.lock().unwrap().push_back(CommandOutput {
            code: Some(0),
            stdout: "0123abcd\trefs/heads/editor-1.0.0\n".to_string(),
            stderr: String::new(),
        });
        let h = harness(settings, tools, FakeRegistry::default());
        let details = pkg("@acme/editor", "1.0.0", &[]);

        let report = h.sequencer.run(&[&details]).await.unwrap();

        assert_eq!(
            report.packages[0].downstream,
            DownstreamOutcome::SkippedExistingBranch
        );
        let git: Vec<String> = h.tools.calls_to("git").into_iter().map(|a| a[0].clone()).collect();
        assert_eq!(git, vec!["ls-remote"]);
        assert!(h.tools.calls_to("curl").is_empty());
    }

    #[tokio::test]
    async fn test_copies_into_configured_subdir() {
        let mut settings = settings();
        settings.assets_subdir = Some(PathBuf::from("packages/editor"));

        let tools = FakeTools {
            staged_subdir: Some("packages/editor".to_string()),
            ..Default::default()
        };
        let h = harness(settings, tools, FakeRegistry::default());
        let details = pkg("@acme/editor", "1.0.0", &[]);

        h.sequencer.run(&[&details]).await.unwrap();

        assert_eq!(*h.tools.staged_contents.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_dry_run_runs_nothing() {
        let mut settings = settings();
        settings.dry_run = true;
        let h = harness(settings, FakeTools::default(), FakeRegistry::default());
        let details = pkg("@acme/editor", "3.1.0-next.2", &[]);

        let report = h.sequencer.run(&[&details]).await.unwrap();

        assert!(report.dry_run);
        assert!(h.tools.calls.lock().unwrap().is_empty());
        assert_eq!(h.registry.check_count(), 0);

        let plan = &report.packages[0].plan;
        assert_eq!(plan.tag, "next");
        assert_eq!(plan.branch, "editor-3.1.0-next.2");
        assert_eq!(report.packages[0].downstream, DownstreamOutcome::DryRun);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let h = harness(settings(), FakeTools::default(), FakeRegistry::default());
        let details = pkg("@acme/editor", "1.0.0", &[]);
        let report = PackageReport {
            plan: h.sequencer.plan(&details),
            publish: Some(PublishOutcome::AlreadyPublished),
            downstream: DownstreamOutcome::Pushed,
            published_at: None,
            duration_ms: 12,
            progress: PackageProgress::new("@acme/editor", "1.0.0"),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["name"], "@acme/editor");
        assert_eq!(
            json["tarballUrl"],
            "http://localhost:4873/@acme/editor/-/editor-1.0.0.tgz"
        );
        assert_eq!(json["publish"], "already_published");
        assert_eq!(json["downstream"], "pushed");
        assert!(json.get("publishedAt").is_none());
    }
}
