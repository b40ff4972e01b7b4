//! Creating and deleting a feature branch across the root and every
//! dependency.
//!
//! In the root the branch starts at HEAD; in each dependency it starts at
//! the revision the root's working manifest declares.

use std::path::PathBuf;

use colored::Colorize;
use log::debug;

use crate::config::LocalConfig;
use crate::error::Result;
use crate::vcs::{GitRepo, RepoContext};
use crate::workspace::Workspace;

const THIS_REPO: &str = "this repo";

/// Outcome of `feature <name>`.
#[derive(Debug, Default)]
pub struct CreateReport {
    /// Reasons the branch could not be created; nothing was created if any.
    pub problems: Vec<String>,
    pub created: usize,
    pub total: usize,
    pub failures: Vec<String>,
}

impl CreateReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty() && self.failures.is_empty()
    }

    pub fn print(&self) {
        for problem in &self.problems {
            eprintln!("{} {}", "error:".red().bold(), problem);
        }
        if !self.problems.is_empty() {
            return;
        }
        println!("created {}/{} branches", self.created, self.total);
        for failure in &self.failures {
            eprintln!("{} {}", "error:".red().bold(), failure);
        }
    }
}

fn check_can_create(
    repo: &GitRepo,
    feature: &str,
    dep: Option<(&str, &str)>,
    problems: &mut Vec<String>,
) -> Result<()> {
    let who = match dep {
        Some((name, _)) => format!("dependency {}", name),
        None => THIS_REPO.to_string(),
    };

    if repo.branch_exists(feature)? {
        problems.push(format!("{} already contains a local branch: {}", who, feature));
        return Ok(());
    }

    match dep {
        Some((_, remote)) => {
            if repo.remote_branch_exists(remote, feature)? {
                problems.push(format!(
                    "{} already contains a remote branch: {}/{}",
                    who, remote, feature
                ));
            }
        }
        None => {
            let remotes = repo.remote_branches_named(feature)?;
            match remotes.len() {
                0 => {}
                1 => problems.push(format!(
                    "{} already contains a remote branch: {}",
                    who, remotes[0]
                )),
                _ => problems.push(format!(
                    "{} already contains remote branches:\n  {}",
                    who,
                    remotes.join("\n  ")
                )),
            }
        }
    }
    Ok(())
}

/// Create branch `feature` everywhere, or nowhere if any repository is not
/// ready for it.
pub fn create(workspace: &Workspace, feature: &str) -> Result<CreateReport> {
    let mut report = CreateReport {
        total: workspace.dependencies.len() + 1,
        ..Default::default()
    };

    let root = GitRepo::open(&workspace.root)?;
    check_can_create(&root, feature, None, &mut report.problems)?;

    let mut deps = Vec::new();
    for (dep, path) in workspace.dependency_paths() {
        let repo = match GitRepo::open(&path) {
            Ok(repo) => repo,
            Err(_) => {
                report.problems.push(format!("Missing repo: {}", dep.name));
                continue;
            }
        };
        check_can_create(
            &repo,
            feature,
            Some((dep.name.as_str(), dep.remote.as_str())),
            &mut report.problems,
        )?;
        if let Err(e) = repo.resolve_revision_hash(&dep.revision) {
            report.problems.push(format!(
                "Bad revision specified: {}\n  for repo: {}\n  {}",
                dep.revision,
                dep.name,
                e.detail()
            ));
        }
        deps.push((dep, repo));
    }

    if !report.problems.is_empty() {
        return Ok(report);
    }

    match root.create_branch(feature, "HEAD") {
        Ok(()) => report.created += 1,
        Err(e) => {
            debug!("root: {}", e);
            report
                .failures
                .push(format!("cannot create branch \"{}\" in this repo", feature));
        }
    }
    for (dep, repo) in deps {
        match repo.create_branch(feature, &dep.revision) {
            Ok(()) => report.created += 1,
            Err(e) => {
                debug!("{}: {}", dep.name, e);
                report.failures.push(format!(
                    "cannot create branch \"{}\" in repo {}",
                    feature, dep.name
                ));
            }
        }
    }

    Ok(report)
}

/// How `feature -d` / `-D` behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Delete even when the branch is not merged into HEAD (`-D`).
    pub force: bool,
    /// Also delete the branch on the remotes.
    pub push: bool,
    /// Only delete the branch on the remotes.
    pub push_only: bool,
}

/// The feature branch as seen from one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchState {
    /// Dependency name; `None` for the root.
    pub name: Option<String>,
    pub path: PathBuf,
    pub remote: String,
    pub exists: bool,
    pub is_current: bool,
    pub has_remote: bool,
    pub is_merged: bool,
}

impl BranchState {
    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("repo {}", name),
            None => THIS_REPO.to_string(),
        }
    }

    fn read(repo: &GitRepo, name: Option<&str>, remote: &str, feature: &str) -> Result<Self> {
        let exists = repo.branch_exists(feature)?;
        Ok(Self {
            name: name.map(String::from),
            path: repo.path().to_path_buf(),
            remote: remote.to_string(),
            exists,
            is_current: exists && repo.is_current_branch(feature)?,
            has_remote: repo.remote_branch_exists(remote, feature)?,
            is_merged: !exists || repo.is_branch_merged(feature)?,
        })
    }
}

/// Deletions attempted of one kind.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeletionCount {
    pub deleted: usize,
    pub attempted: usize,
    pub failed: Vec<String>,
}

/// Outcome of `feature -d` / `-D`.
#[derive(Debug, Default)]
pub struct DeleteReport {
    /// Why nothing was deleted, followed by the repositories concerned.
    pub refused: Option<(String, Vec<String>)>,
    pub missing: Vec<String>,
    pub local: Option<DeletionCount>,
    pub remote: Option<DeletionCount>,
}

impl DeleteReport {
    pub fn is_ok(&self) -> bool {
        let failed = |c: &Option<DeletionCount>| c.as_ref().is_some_and(|c| !c.failed.is_empty());
        self.refused.is_none()
            && self.missing.is_empty()
            && !failed(&self.local)
            && !failed(&self.remote)
    }

    pub fn print(&self) {
        for missing in &self.missing {
            eprintln!("{} Missing repo: {}", "error:".red().bold(), missing);
        }
        if let Some((reason, repos)) = &self.refused {
            eprintln!("{} {}", "error:".red().bold(), reason);
            for repo in repos {
                eprintln!("  - {}", repo);
            }
            return;
        }
        for (kind, count) in [("local", &self.local), ("remote", &self.remote)] {
            let Some(count) = count else { continue };
            println!("deleted {}/{} {} branches", count.deleted, count.attempted, kind);
            if !count.failed.is_empty() {
                eprintln!("{} couldn't delete branches from:", "error:".red().bold());
                for failure in &count.failed {
                    eprintln!("  {}", failure);
                }
            }
        }
    }
}

/// Delete branch `feature` in every repository that has it.
pub fn delete(
    workspace: &Workspace,
    feature: &str,
    options: DeleteOptions,
) -> Result<DeleteReport> {
    let mut report = DeleteReport::default();

    let root = GitRepo::open(&workspace.root)?;
    let root_remote = LocalConfig::load(&workspace.root)?.select_remote(&root.remotes()?)?;
    let mut repos = vec![(BranchState::read(&root, None, &root_remote, feature)?, root)];

    for (dep, path) in workspace.dependency_paths() {
        match GitRepo::open(&path) {
            Ok(repo) => {
                let state = BranchState::read(&repo, Some(dep.name.as_str()), &dep.remote, feature)?;
                repos.push((state, repo));
            }
            Err(_) => report.missing.push(dep.path.clone()),
        }
    }
    if !report.missing.is_empty() {
        return Ok(report);
    }

    let labels = |pred: &dyn Fn(&BranchState) -> bool| -> Vec<String> {
        repos
            .iter()
            .filter(|(state, _)| pred(state))
            .map(|(state, _)| state.label())
            .collect()
    };

    if !options.push_only {
        let current = labels(&|s| s.exists && s.is_current);
        if !current.is_empty() {
            report.refused = Some((
                "cannot delete branches checked out in repos:".to_string(),
                current,
            ));
            return Ok(report);
        }
        let unmerged = labels(&|s| s.exists && !s.is_merged);
        if !unmerged.is_empty() && !options.force {
            report.refused = Some((
                "cannot delete unmerged branches (use -D to force) in repos:".to_string(),
                unmerged,
            ));
            return Ok(report);
        }
    }

    if !options.push_only {
        let mut count = DeletionCount::default();
        for (state, repo) in repos.iter().filter(|(s, _)| s.exists) {
            println!("deleting local branch in {}", state.label());
            count.attempted += 1;
            match repo.delete_branch(feature) {
                Ok(()) => count.deleted += 1,
                Err(e) => {
                    debug!("{}: {}", state.label(), e);
                    count.failed.push(state.label());
                }
            }
        }
        report.local = Some(count);
    }

    if options.push || options.push_only {
        let mut count = DeletionCount::default();
        for (state, repo) in repos.iter().filter(|(s, _)| s.has_remote) {
            println!("deleting remote branch in {}", state.label());
            count.attempted += 1;
            match repo.push_delete(&state.remote, feature) {
                Ok(()) => count.deleted += 1,
                Err(e) => {
                    debug!("{}: {}", state.label(), e);
                    count.failed.push(state.label());
                }
            }
        }
        report.remote = Some(count);
    }

    Ok(report)
}
