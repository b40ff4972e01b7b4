//! Carrying out an update plan.
//!
//! Results are applied in plan order, which is post-order: a repository is
//! only patched once every dependency below it has its final commit. Each
//! updated repository gets all of its changed dependency revisions written
//! into its manifest at once, then a single commit (new or amended). The
//! resulting HEAD becomes the revision its own dependents are patched to.

use std::collections::HashMap;
use std::path::PathBuf;

use colored::Colorize;
use log::{debug, info};

use crate::error::{Error, Result};
use crate::manifest::MANIFEST_FILE;
use crate::patch;
use crate::plan::{Plan, RepoAction};
use crate::vcs::{RepoContext, Vcs};

/// What was done to one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub repo_path: PathBuf,
    pub name: Option<String>,
    /// `(dependency name, revision)` pairs written into the manifest.
    pub patched: Vec<(String, String)>,
    /// The commit made, if the manifest actually changed.
    pub commit: Option<String>,
    pub amended: bool,
}

impl AppliedUpdate {
    pub fn print(&self) {
        let name = self.name.as_deref().unwrap_or("root repo");
        match &self.commit {
            Some(commit) => {
                let how = if self.amended { "amended" } else { "committed" };
                println!("{} {} {} {}", "✓".green().bold(), name.bold(), how, commit);
                for (dep, revision) in &self.patched {
                    println!("    {} -> {}", dep, revision.dimmed());
                }
            }
            None => println!("{} {} already up to date", "Info:".blue().bold(), name),
        }
    }
}

/// Commit message for manifest updates made as new commits.
pub fn commit_message(feature: &str) -> String {
    format!("Update dependencies for {}", feature)
}

/// Write the updates `plan` calls for.
///
/// Nothing is touched when the plan contains an error. Patching is
/// fail-fast: a manifest that cannot be edited automatically stops the run,
/// leaving repositories below it already committed.
pub fn apply<V: Vcs>(vcs: &V, plan: &Plan, feature: &str) -> Result<Vec<AppliedUpdate>> {
    let errors = plan.error_count();
    if errors > 0 {
        return Err(Error::PlanHasErrors { count: errors });
    }

    let mut tips: HashMap<PathBuf, String> = plan
        .results
        .iter()
        .filter_map(|r| Some((r.repo_path.clone(), r.new_revision.clone()?)))
        .collect();
    let message = commit_message(feature);
    let mut applied = Vec::new();

    for result in plan.results.iter().filter(|r| r.action.is_update()) {
        let repo = vcs.enter(&result.repo_path)?;
        let original = repo.read_working_file(MANIFEST_FILE)?.ok_or_else(|| {
            Error::io(
                result.repo_path.join(MANIFEST_FILE),
                std::io::ErrorKind::NotFound.into(),
            )
        })?;

        let mut text = original.clone();
        let mut patched = Vec::new();
        for (name, child) in plan.edges.get(&result.repo_path).into_iter().flatten() {
            if let Some(tip) = tips.get(child) {
                text = patch::patch(&text, name, tip)?;
                patched.push((name.clone(), tip.clone()));
            }
        }

        let amend = result.action == RepoAction::UpdateAmend;
        let commit = if text == original {
            debug!("{}: manifest already current", result.display_name());
            None
        } else {
            repo.write_working_file(MANIFEST_FILE, &text)?;
            let commit = repo.commit_file(MANIFEST_FILE, &message, amend)?;
            info!(
                "{}: {} {}",
                result.display_name(),
                if amend { "amended" } else { "committed" },
                commit
            );
            tips.insert(result.repo_path.clone(), commit.clone());
            Some(commit)
        };

        applied.push(AppliedUpdate {
            repo_path: result.repo_path.clone(),
            name: result.name.clone(),
            patched,
            commit,
            amended: amend,
        });
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;
    use crate::plan::{plan, CommitType};
    use crate::testutil::{manifest as manifest_text, FakeVcs};
    use std::path::Path;

    const ROOT: &str = "/w/root";

    /// root -> mid, leaf; mid -> leaf; the leaf moved on `feat`.
    fn moved_leaf() -> FakeVcs {
        let vcs = FakeVcs::new();
        vcs.add(
            ROOT,
            "r1",
            Some(&manifest_text(&[
                ("mid", "../mid", "master"),
                ("leaf", "../leaf", "master"),
            ])),
        )
        .add("/w/mid", "m1", Some(&manifest_text(&[("leaf", "../leaf", "master")])))
        .add("/w/leaf", "l1", None)
        .on_branch(ROOT, "feat")
        .on_branch("/w/mid", "feat")
        .on_branch("/w/leaf", "feat")
        .advance("/w/leaf", "l2");
        vcs
    }

    fn planned(vcs: &FakeVcs, commit_type: CommitType) -> Plan {
        let text = vcs.state(ROOT, |s| s.working.clone().unwrap_or_default());
        let deps = manifest::parse(&text).unwrap();
        plan(vcs, Path::new(ROOT), &deps, "feat", commit_type)
    }

    fn declared(vcs: &FakeVcs, repo: &str, dep: &str) -> String {
        let text = vcs.state(repo, |s| s.working.clone().unwrap());
        manifest::parse(&text)
            .unwrap()
            .into_iter()
            .find(|d| d.name == dep)
            .unwrap()
            .revision
    }

    #[test]
    fn test_children_are_committed_before_parents() {
        let vcs = moved_leaf();
        let plan = planned(&vcs, CommitType::New);
        let applied = apply(&vcs, &plan, "feat").unwrap();

        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].name.as_deref(), Some("mid"));
        assert_eq!(applied[1].name, None);

        let mid_commit = applied[0].commit.clone().unwrap();
        assert_eq!(declared(&vcs, "/w/mid", "leaf"), "l2");
        assert_eq!(declared(&vcs, ROOT, "leaf"), "l2");
        assert_eq!(declared(&vcs, ROOT, "mid"), mid_commit);

        vcs.state("/w/mid", |s| {
            assert_eq!(
                s.commits,
                vec![("Update dependencies for feat".to_string(), false)]
            );
        });
        vcs.state(ROOT, |s| assert_eq!(s.commits.len(), 1));
        vcs.state("/w/leaf", |s| assert!(s.commits.is_empty()));
    }

    #[test]
    fn test_amend_root() {
        let vcs = moved_leaf();
        let plan = planned(&vcs, CommitType::Amend);
        let applied = apply(&vcs, &plan, "feat").unwrap();

        let root = applied.last().unwrap();
        assert!(root.amended);
        vcs.state(ROOT, |s| {
            assert_eq!(s.commits.len(), 1);
            assert!(s.commits[0].1);
            assert_eq!(s.refs["HEAD"], root.commit.clone().unwrap());
        });
    }

    #[test]
    fn test_plan_with_errors_writes_nothing() {
        let vcs = moved_leaf();
        vcs.with("/w/mid", |s| s.clean = false);
        let plan = planned(&vcs, CommitType::New);

        let err = apply(&vcs, &plan, "feat").unwrap_err();
        assert!(matches!(err, Error::PlanHasErrors { count: 1 }));
        vcs.state(ROOT, |s| assert!(s.commits.is_empty()));
        assert_eq!(declared(&vcs, ROOT, "leaf"), "master");
    }

    #[test]
    fn test_nothing_to_apply_for_untouched_tree() {
        let vcs = FakeVcs::new();
        vcs.add(ROOT, "r1", Some(&manifest_text(&[("leaf", "../leaf", "master")])))
            .add("/w/leaf", "l1", None);
        let plan = planned(&vcs, CommitType::New);
        assert!(apply(&vcs, &plan, "feat").unwrap().is_empty());
    }
}
