//! Moving every repository onto (or off) a feature branch.
//!
//! The dependency list comes from the manifest committed on the feature
//! branch itself, local branch first, then the remote one. In each
//! dependency the local feature branch wins, then the remote feature branch,
//! then the revision that manifest declares.

use colored::Colorize;
use log::debug;

use crate::config::LocalConfig;
use crate::error::{Error, Result};
use crate::manifest::{self, Dependency, MANIFEST_FILE};
use crate::vcs::{GitRepo, RepoContext};
use crate::workspace::{dependency_path, Workspace};

const DEFAULT_REMOTE: &str = "origin";

/// Where one repository should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Nothing to do, for the given reason.
    Skip(String),
    /// Check out `revision`. With `track`, the local feature branch is first
    /// created from that remote's branch.
    Checkout {
        revision: String,
        track: Option<String>,
    },
}

/// One step taken (or skipped) by `switch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    CheckedOut { repo: String, revision: String },
    Skipped { repo: String, reason: String },
    Detached { repo: String },
}

#[derive(Debug, Default)]
pub struct SwitchReport {
    pub warnings: Vec<String>,
    /// Problems found before anything was checked out.
    pub problems: Vec<String>,
    pub steps: Vec<Step>,
    pub failures: Vec<String>,
}

impl SwitchReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty() && self.failures.is_empty()
    }

    pub fn print(&self) {
        for warning in &self.warnings {
            eprintln!("{} {}", "warning:".yellow().bold(), warning);
        }
        for step in &self.steps {
            match step {
                Step::CheckedOut { repo, revision } => {
                    println!("checking out {} on {}...", revision.bold(), repo)
                }
                Step::Skipped { repo, reason } => {
                    println!("skipping checkout in {}: {}", repo, reason.dimmed())
                }
                Step::Detached { repo } => println!("detached {}", repo),
            }
        }
        for error in self.problems.iter().chain(&self.failures) {
            eprintln!("{} {}", "error:".red().bold(), error);
        }
    }
}

fn label(dep: Option<&Dependency>) -> String {
    dep.map(|d| d.name.clone())
        .unwrap_or_else(|| "this repo".to_string())
}

fn root_remote(workspace: &Workspace) -> Result<String> {
    Ok(LocalConfig::load(&workspace.root)?
        .remote
        .unwrap_or_else(|| DEFAULT_REMOTE.to_string()))
}

/// Dependencies as declared on the feature branch of the root repository.
pub fn feature_dependencies(
    root: &GitRepo,
    remote: &str,
    feature: &str,
    warnings: &mut Vec<String>,
) -> Result<Vec<Dependency>> {
    let revision = if root.branch_exists(feature)? {
        feature.to_string()
    } else if root.remote_branch_exists(remote, feature)? {
        format!("{}/{}", remote, feature)
    } else {
        return Err(Error::FeatureBranchState {
            message: format!(
                "could not load {}: target feature does not exist locally or remotely",
                MANIFEST_FILE
            ),
        });
    };

    let text = root
        .read_file_at_revision(&revision, MANIFEST_FILE)?
        .ok_or_else(|| Error::FeatureBranchState {
            message: format!(
                "could not retrieve {} from repo at revision {}",
                MANIFEST_FILE, revision
            ),
        })?;
    let dependencies = manifest::parse(&text)?;

    if root.resolve_revision_hash(&revision)? == root.head_hash()?
        && root.is_file_modified(MANIFEST_FILE)?
    {
        warnings.push(format!(
            "{} file has been modified on the current branch. \
             The repository version is being used.",
            MANIFEST_FILE
        ));
    }
    Ok(dependencies)
}

fn target_for(
    repo: &GitRepo,
    dep: Option<&Dependency>,
    remote: &str,
    feature: &str,
    create_branches: bool,
) -> Result<std::result::Result<Target, String>> {
    let remote_branch = format!("{}/{}", remote, feature);

    let target = if repo.is_current_branch(feature)? {
        Target::Skip("already on feature branch".to_string())
    } else if repo.branch_exists(feature)? {
        Target::Checkout {
            revision: feature.to_string(),
            track: None,
        }
    } else if repo.remote_branch_exists(remote, feature)? {
        if create_branches {
            Target::Checkout {
                revision: feature.to_string(),
                track: Some(remote.to_string()),
            }
        } else {
            Target::Checkout {
                revision: remote_branch.clone(),
                track: None,
            }
        }
    } else if let Some(dep) = dep {
        if repo.resolve_revision_hash(&dep.revision).is_err() {
            return Ok(Err(format!(
                "repo {} missing both feature branch and dependent revision",
                dep.name
            )));
        }
        Target::Checkout {
            revision: dep.revision.clone(),
            track: None,
        }
    } else {
        Target::Skip("feature branch not present".to_string())
    };

    // Moving to another commit must not clobber local changes.
    if let Target::Checkout { revision, track } = &target {
        let existing = if track.is_some() { &remote_branch } else { revision };
        if repo.resolve_revision_hash(existing)? != repo.head_hash()?
            && !repo.is_clean_working_directory()?
        {
            return Ok(Err(Error::DirtyWorkingDirectory { repo: label(dep) }.to_string()));
        }
    }
    Ok(Ok(target))
}

fn check_out(repo: &GitRepo, target: &Target, feature: &str) -> Result<()> {
    let Target::Checkout { revision, track } = target else {
        return Ok(());
    };
    if let Some(remote) = track {
        repo.create_tracking_branch(remote, feature)?;
    }
    repo.checkout(revision)
}

/// Check out `feature` across the workspace.
pub fn switch(workspace: &Workspace, feature: &str, create_branches: bool) -> Result<SwitchReport> {
    let mut report = SwitchReport::default();
    let root = GitRepo::open(&workspace.root)?;
    let remote = root_remote(workspace)?;
    let dependencies = feature_dependencies(&root, &remote, feature, &mut report.warnings)?;

    let mut points = Vec::new();
    match target_for(&root, None, &remote, feature, create_branches)? {
        Ok(target) => points.push((None, root, target)),
        Err(problem) => report.problems.push(problem),
    }
    for dep in &dependencies {
        let path = dependency_path(&workspace.root, dep);
        let Ok(repo) = GitRepo::open(&path) else {
            report.problems.push(format!("Missing repo: {}", dep.path));
            continue;
        };
        match target_for(&repo, Some(dep), &dep.remote, feature, create_branches)? {
            Ok(target) => points.push((Some(dep), repo, target)),
            Err(problem) => report.problems.push(problem),
        }
    }
    if !report.problems.is_empty() {
        return Ok(report);
    }

    for (dep, repo, target) in points {
        let repo_label = label(dep);
        match &target {
            Target::Skip(reason) => report.steps.push(Step::Skipped {
                repo: repo_label,
                reason: reason.clone(),
            }),
            Target::Checkout { revision, .. } => {
                report.steps.push(Step::CheckedOut {
                    repo: repo_label.clone(),
                    revision: revision.clone(),
                });
                if let Err(e) = check_out(&repo, &target, feature) {
                    debug!("{}: {}", repo_label, e);
                    report.failures.push(format!(
                        "cannot check out rev {} for {}",
                        revision,
                        dep.map(|d| format!("repo: {}", d.path))
                            .unwrap_or_else(|| "this repo".to_string())
                    ));
                }
            }
        }
    }
    Ok(report)
}

/// Detach HEAD in every repository that has `feature` checked out.
pub fn detach(workspace: &Workspace, feature: &str) -> Result<SwitchReport> {
    let mut report = SwitchReport::default();
    let root = GitRepo::open(&workspace.root)?;
    let remote = root_remote(workspace)?;
    let dependencies = feature_dependencies(&root, &remote, feature, &mut report.warnings)?;

    let mut repos = vec![(None, root)];
    for dep in &dependencies {
        match GitRepo::open(&dependency_path(&workspace.root, dep)) {
            Ok(repo) => repos.push((Some(dep), repo)),
            Err(_) => report.failures.push(format!("Missing repo: {}", dep.path)),
        }
    }

    for (dep, repo) in repos {
        if !repo.is_current_branch(feature)? {
            continue;
        }
        match repo.detach() {
            Ok(()) => report.steps.push(Step::Detached { repo: label(dep) }),
            Err(e) => report
                .failures
                .push(format!("cannot detach {}: {}", label(dep), e)),
        }
    }
    Ok(report)
}
