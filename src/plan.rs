//! Planning the propagation of feature-branch changes up the dependency tree.
//!
//! Each repository is evaluated once, children before parents, against the
//! manifests in the working trees. A repository needs its manifest updated
//! when any of its direct dependencies moved; whether that update is a new
//! commit or an amendment depends on whether the feature branch has already
//! diverged from the revision its parent depends on.
//!
//! The plan is a report only; [`crate::update::apply`] carries it out.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use colored::Colorize;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::manifest::{self, Dependency, MANIFEST_FILE};
use crate::vcs::{RepoContext, Vcs};
use crate::workspace::{dependency_path, Workspace};

/// What should happen to one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepoAction {
    None,
    UpdateNew,
    UpdateAmend,
    Error,
}

impl RepoAction {
    pub fn is_update(&self) -> bool {
        matches!(self, Self::UpdateNew | Self::UpdateAmend)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::None => "No action required",
            Self::UpdateNew => "Updating dependencies with a new commit",
            Self::UpdateAmend => "Amending commit with new dependencies",
            Self::Error => "Error",
        }
    }
}

/// How the root repository records its manifest update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitType {
    New,
    Amend,
}

impl FromStr for CommitType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "amend" => Ok(Self::Amend),
            _ => Err(format!("commit type must be 'new' or 'amend', not '{}'", s)),
        }
    }
}

impl fmt::Display for CommitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Amend => "amend",
        })
    }
}

/// The decision for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    pub repo_path: PathBuf,
    /// Dependency name; `None` for the root repository.
    pub name: Option<String>,
    pub action: RepoAction,
    /// The commit dependents should now point at, when already known.
    pub new_revision: Option<String>,
    pub message: String,
}

impl UpdateResult {
    fn new(
        repo_path: &Path,
        name: Option<&str>,
        action: RepoAction,
        message: impl Into<String>,
    ) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            name: name.map(String::from),
            action,
            new_revision: None,
            message: message.into(),
        }
    }

    fn error(repo_path: &Path, name: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(repo_path, name, RepoAction::Error, message)
    }

    fn with_revision(mut self, revision: String) -> Self {
        self.new_revision = Some(revision);
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("root repo")
    }
}

/// Planner output: one result per repository in post-order, plus the direct
/// dependency edges of every repository that was evaluated.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub results: Vec<UpdateResult>,
    pub edges: HashMap<PathBuf, Vec<(String, PathBuf)>>,
}

impl Plan {
    pub fn error_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.action == RepoAction::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn result_for(&self, path: &Path) -> Option<&UpdateResult> {
        self.results.iter().find(|r| r.repo_path == path)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let results: Vec<serde_json::Value> = self
            .results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "repo_path": r.repo_path.display().to_string(),
                    "name": r.name,
                    "action": r.action,
                    "new_revision": r.new_revision,
                    "message": r.message,
                })
            })
            .collect();
        serde_json::json!({ "errors": self.error_count(), "results": results })
    }

    pub fn print(&self) {
        for (idx, result) in self.results.iter().enumerate() {
            if idx > 0 {
                println!();
            }
            let action = match result.action {
                RepoAction::Error => result.action.description().red().bold(),
                RepoAction::None => result.action.description().normal(),
                _ => result.action.description().green(),
            };
            // The root's own tip is never consumed by another manifest.
            let new_rev = match (&result.name, &result.new_revision) {
                (Some(_), Some(rev)) => rev.as_str(),
                _ => "--",
            };
            println!("Result for {}:", result.display_name().bold());
            println!("  {} {}", "action:".cyan(), action);
            println!("  {} {}", "new dependency rev:".cyan(), new_rev);
            println!("  {} {}", "msg:".cyan(), result.message);
        }
    }
}

const NOT_CLEAN: &str = "working directory is not clean";
const WRONG_BRANCH: &str = "feature branch exists but is not the current branch";
const UNCHANGED: &str = "no changes; no dependency changes";

/// Plan updates for the tree rooted at `root` for feature branch `feature`.
pub fn plan<V: Vcs>(
    vcs: &V,
    root: &Path,
    root_dependencies: &[Dependency],
    feature: &str,
    root_commit_type: CommitType,
) -> Plan {
    let mut planner = Planner {
        vcs,
        feature,
        root_commit_type,
        visited: HashMap::new(),
        in_progress: HashSet::new(),
        plan: Plan::default(),
    };

    match vcs.enter(root) {
        Ok(repo) => planner.evaluate(&repo, None, root_dependencies, None),
        Err(_) => planner.record(UpdateResult::error(root, None, "the repo is missing")),
    }
    planner.plan
}

/// Plan updates for a loaded workspace.
pub fn plan_workspace<V: Vcs>(
    vcs: &V,
    workspace: &Workspace,
    feature: &str,
    root_commit_type: CommitType,
) -> Plan {
    plan(
        vcs,
        &workspace.root,
        &workspace.dependencies,
        feature,
        root_commit_type,
    )
}

struct Planner<'a, V: Vcs> {
    vcs: &'a V,
    feature: &'a str,
    root_commit_type: CommitType,
    visited: HashMap<PathBuf, UpdateResult>,
    in_progress: HashSet<PathBuf>,
    plan: Plan,
}

impl<'a, V: Vcs> Planner<'a, V> {
    fn record(&mut self, result: UpdateResult) {
        self.visited
            .insert(result.repo_path.clone(), result.clone());
        self.plan.results.push(result);
    }

    /// Evaluate `repo` and everything below it. `declared` is the
    /// dependency record through which the parent reached it.
    fn evaluate(
        &mut self,
        repo: &V::Repo,
        name: Option<&str>,
        dependencies: &[Dependency],
        declared: Option<&Dependency>,
    ) {
        let path = repo.path().to_path_buf();

        match repo.is_clean_working_directory() {
            Ok(true) => {}
            Ok(false) => {
                self.record(UpdateResult::error(&path, name, NOT_CLEAN));
                return;
            }
            Err(e) => {
                self.record(UpdateResult::error(&path, name, e.to_string()));
                return;
            }
        }

        self.in_progress.insert(path.clone());
        let children: Vec<(String, PathBuf)> = dependencies
            .iter()
            .map(|dep| (dep.name.clone(), dependency_path(&path, dep)))
            .collect();
        self.plan.edges.insert(path.clone(), children.clone());

        for (dep, (_, child_path)) in dependencies.iter().zip(&children) {
            self.visit_child(dep, child_path);
        }

        let result = match self.decide(repo, name, &children, declared) {
            Ok(result) => result,
            Err(e) => UpdateResult::error(&path, name, e.to_string()),
        };
        debug!(
            "{}: {:?} ({})",
            result.display_name(),
            result.action,
            result.message
        );
        self.in_progress.remove(&path);
        self.record(result);
    }

    fn visit_child(&mut self, dep: &Dependency, child_path: &Path) {
        if self.visited.contains_key(child_path) {
            return;
        }
        if self.in_progress.contains(child_path) {
            self.plan.results.push(UpdateResult::error(
                child_path,
                Some(&dep.name),
                "circular reference detected",
            ));
            return;
        }

        let child = match self.vcs.enter(child_path) {
            Ok(child) => child,
            Err(e) => {
                debug!("{}: {}", dep.name, e);
                self.record(UpdateResult::error(
                    child_path,
                    Some(&dep.name),
                    "the repo is missing",
                ));
                return;
            }
        };

        let subdeps = child
            .read_working_file(MANIFEST_FILE)
            .and_then(|text| match text {
                Some(text) => manifest::parse(&text),
                None => Ok(Vec::new()),
            });
        match subdeps {
            Ok(subdeps) => self.evaluate(&child, Some(&dep.name), &subdeps, Some(dep)),
            Err(e) => self.record(UpdateResult::error(
                child_path,
                Some(&dep.name),
                e.to_string(),
            )),
        }
    }

    fn deps_updated(&self, children: &[(String, PathBuf)]) -> bool {
        children.iter().any(|(_, path)| {
            self.visited
                .get(path)
                .map(|r| r.new_revision.is_some() || r.action.is_update())
                .unwrap_or(false)
        })
    }

    fn decide(
        &self,
        repo: &V::Repo,
        name: Option<&str>,
        children: &[(String, PathBuf)],
        declared: Option<&Dependency>,
    ) -> Result<UpdateResult> {
        let path = repo.path();
        let result = |action, message: &str| UpdateResult::new(path, name, action, message);

        let declared_hash = |dep: &Dependency| {
            repo.resolve_revision_hash(&dep.revision)
                .map_err(|e| Error::BadRevision {
                    name: dep.name.clone(),
                    revision: dep.revision.clone(),
                    reason: e.detail(),
                })
        };

        if !self.deps_updated(children) {
            let Some(declared) = declared else {
                return Ok(result(RepoAction::None, "no changed dependencies"));
            };

            let dep_hash = declared_hash(declared)?;
            let head_hash = repo.resolve_revision_hash("HEAD")?;

            if !repo.branch_exists(self.feature)? {
                return Ok(if dep_hash == head_hash {
                    result(RepoAction::None, UNCHANGED)
                } else {
                    result(
                        RepoAction::Error,
                        "current HEAD is not on the expected dependency revision",
                    )
                });
            }
            if !repo.is_current_branch(self.feature)? {
                return Ok(result(RepoAction::Error, WRONG_BRANCH));
            }
            return Ok(if dep_hash == head_hash {
                result(RepoAction::None, UNCHANGED)
            } else {
                result(
                    RepoAction::None,
                    "the feature branch was updated; no dependency changes",
                )
                .with_revision(head_hash)
            });
        }

        if !repo.branch_exists(self.feature)? {
            return Ok(result(
                RepoAction::Error,
                "update required, but feature branch is missing",
            ));
        }
        if !repo.is_current_branch(self.feature)? {
            return Ok(result(RepoAction::Error, WRONG_BRANCH));
        }

        let head_hash = repo.resolve_revision_hash("HEAD")?;
        let new_commit = match declared {
            None => self.root_commit_type == CommitType::New,
            Some(declared) => declared_hash(declared)? == head_hash,
        };

        Ok(match (new_commit, declared.is_none()) {
            (true, true) => result(RepoAction::UpdateNew, "updating root with new commit"),
            (true, false) => result(
                RepoAction::UpdateNew,
                "no feature branch changes; updated dependencies; update with new commit",
            ),
            (false, true) => result(RepoAction::UpdateAmend, "updating root by amending commit")
                .with_revision(head_hash),
            (false, false) => result(
                RepoAction::UpdateAmend,
                "feature branch changes; updated dependencies; update by amending",
            )
            .with_revision(head_hash),
        })
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
