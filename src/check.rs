//! Dependency consistency checking.
//!
//! Manifests are flat: the root lists every repository the tree needs, and
//! every dependency's own manifest must agree with the root about the
//! revision of anything it lists. The check walks the manifests committed
//! at each dependency's declared revision (not the working trees), since
//! that is what a `sync` would check out.

use std::path::{Path, PathBuf};

use colored::Colorize;
use log::debug;
use serde::Serialize;

use crate::error::Error;
use crate::manifest::{self, Dependency, MANIFEST_FILE};
use crate::vcs::{RepoContext, Vcs};
use crate::workspace::{dependency_path, TargetMap, Workspace};

/// An error found during the check, with the chain of repositories
/// (root first) that led to it.
#[derive(Debug)]
pub struct ChainedError {
    pub error: Error,
    pub chain: Vec<PathBuf>,
}

impl ChainedError {
    /// Report lines: the error itself, then where it was detected and which
    /// repositories included that one, innermost first.
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut message = self.error.report_lines().into_iter();
        if let Some(first) = message.next() {
            lines.push(first);
        }
        lines.extend(message.map(|line| format!("  {}", line)));

        let mut names = self.chain.iter().rev().map(|p| basename(p));
        if let Some(innermost) = names.next() {
            lines.push(format!("  Detected in: {}", innermost));
        }
        lines.extend(names.map(|name| format!("    included by: {}", name)));
        lines
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Check `dependencies`, declared by the root repository at `root`,
/// against `targets`. An empty result means the tree is consistent.
pub fn check<V: Vcs>(
    vcs: &V,
    root: &Path,
    dependencies: &[Dependency],
    targets: &TargetMap,
) -> Vec<ChainedError> {
    let mut errors = Vec::new();
    check_dependencies(vcs, &[root.to_path_buf()], dependencies, targets, &mut errors);
    errors
}

/// Check a loaded workspace against its own root manifest.
pub fn check_workspace<V: Vcs>(vcs: &V, workspace: &Workspace) -> CheckReport {
    let errors = check(
        vcs,
        &workspace.root,
        &workspace.dependencies,
        &workspace.targets(),
    );
    CheckReport { errors }
}

fn check_dependencies<V: Vcs>(
    vcs: &V,
    chain: &[PathBuf],
    dependencies: &[Dependency],
    targets: &TargetMap,
    errors: &mut Vec<ChainedError>,
) {
    // The last chain element is the repository declaring these.
    let Some(declaring) = chain.last() else {
        return;
    };

    for dep in dependencies {
        let path = dependency_path(declaring, dep);
        let extended = || {
            let mut chain = chain.to_vec();
            chain.push(path.clone());
            chain
        };

        if chain.contains(&path) {
            errors.push(ChainedError {
                error: Error::CircularReference,
                chain: extended(),
            });
            continue;
        }

        let Some(target) = targets.get(&path) else {
            errors.push(ChainedError {
                error: Error::UnlistedDependency {
                    name: dep.name.clone(),
                },
                chain: chain.to_vec(),
            });
            continue;
        };

        // Names must match, not just the commits they resolve to.
        if dep.revision != target.revision {
            errors.push(ChainedError {
                error: Error::InconsistentRevision {
                    name: dep.name.clone(),
                    required: target.revision.clone(),
                    found: dep.revision.clone(),
                },
                chain: chain.to_vec(),
            });
            continue;
        }

        let repo = match vcs.enter(&path) {
            Ok(repo) => repo,
            Err(_) => {
                errors.push(ChainedError {
                    error: Error::MissingRepository {
                        name: dep.name.clone(),
                        path: path.clone(),
                    },
                    chain: extended(),
                });
                continue;
            }
        };

        if let Err(e) = repo.resolve_revision_hash(&target.revision) {
            errors.push(ChainedError {
                error: Error::BadRevision {
                    name: dep.name.clone(),
                    revision: target.revision.clone(),
                    reason: e.detail(),
                },
                chain: chain.to_vec(),
            });
            continue;
        }

        debug!("checking {} at {}", dep.name, target.revision);
        let subdeps = repo
            .read_file_at_revision(&target.revision, MANIFEST_FILE)
            .and_then(|text| match text {
                Some(text) => manifest::parse(&text),
                None => Ok(Vec::new()),
            });
        match subdeps {
            Ok(subdeps) => check_dependencies(vcs, &extended(), &subdeps, targets, errors),
            Err(error) => errors.push(ChainedError {
                error,
                chain: extended(),
            }),
        }
    }
}

/// Every problem found by one consistency check.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub errors: Vec<ChainedError>,
}

#[derive(Serialize)]
struct JsonEntry {
    kind: &'static str,
    message: Vec<String>,
    chain: Vec<String>,
}

fn kind(error: &Error) -> &'static str {
    match error {
        Error::Parse { .. } => "parse",
        Error::UnlistedDependency { .. } => "unlisted_dependency",
        Error::InconsistentRevision { .. } => "inconsistent_revision",
        Error::BadRevision { .. } => "bad_revision",
        Error::CircularReference => "circular_reference",
        Error::MissingRepository { .. } => "missing_repository",
        _ => "other",
    }
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let entries: Vec<JsonEntry> = self
            .errors
            .iter()
            .map(|e| JsonEntry {
                kind: kind(&e.error),
                message: e.error.report_lines(),
                chain: e.chain.iter().map(|p| p.display().to_string()).collect(),
            })
            .collect();
        serde_json::json!({ "ok": self.is_ok(), "errors": entries })
    }

    /// Print the report; errors go to stderr.
    pub fn print(&self) {
        for error in &self.errors {
            let mut lines = error.render().into_iter();
            if let Some(first) = lines.next() {
                eprintln!("{} {}", "error:".red().bold(), first);
            }
            for line in lines {
                eprintln!("{}", line);
            }
        }
        if self.is_ok() {
            println!("{} All dependencies are consistent", "✓".green().bold());
        }
    }
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
