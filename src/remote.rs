//! Fetching and pruning remotes across the workspace.

use colored::Colorize;
use log::debug;

use crate::config::LocalConfig;
use crate::error::Result;
use crate::vcs::GitRepo;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Fetch,
    Prune,
}

impl RemoteOp {
    fn verb(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Prune => "prune",
        }
    }

    fn progressive(self) -> &'static str {
        match self {
            Self::Fetch => "fetching",
            Self::Prune => "pruning",
        }
    }

    fn run(self, repo: &GitRepo, remote: &str) -> Result<()> {
        match self {
            Self::Fetch => repo.fetch(remote),
            Self::Prune => repo.prune(remote),
        }
    }
}

#[derive(Debug)]
pub struct RemoteReport {
    pub op: RemoteOp,
    /// Labels of the repositories visited, root first.
    pub visited: Vec<String>,
    pub errors: Vec<String>,
}

impl RemoteReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn print(&self) {
        for repo in &self.visited {
            println!("{} {}...", self.op.progressive(), repo);
        }
        for error in &self.errors {
            eprintln!("{} {}", "error:".red().bold(), error);
        }
    }
}

/// Run `op` against the configured remote of the root and the declared
/// remote of every dependency.
pub fn run(workspace: &Workspace, op: RemoteOp) -> Result<RemoteReport> {
    let mut report = RemoteReport {
        op,
        visited: Vec::new(),
        errors: Vec::new(),
    };

    let root = GitRepo::open(&workspace.root)?;
    let remote = LocalConfig::load(&workspace.root)?.select_remote(&root.remotes()?)?;
    report.visited.push(format!("{} for this repo", remote));
    if let Err(e) = op.run(&root, &remote) {
        debug!("root: {}", e);
        report
            .errors
            .push(format!("cannot {} '{}' for this repo", op.verb(), remote));
    }

    for (dep, path) in workspace.dependency_paths() {
        report.visited.push(dep.name.clone());
        let Ok(repo) = GitRepo::open(&path) else {
            report.errors.push(format!("Missing repo: {}", dep.path));
            continue;
        };
        if let Err(e) = op.run(&repo, &dep.remote) {
            debug!("{}: {}", dep.name, e);
            report
                .errors
                .push(format!("cannot {} repo '{}'", op.verb(), dep.name));
        }
    }
    Ok(report)
}
