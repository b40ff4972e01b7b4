//! Getting every dependency onto the revision the root manifest declares.
//!
//! Missing checkouts are cloned, existing ones fetched. The tree is then
//! checked for consistency, and only a consistent tree is checked out.
//! A revision naming a local branch leaves the dependency on that branch.

use std::fs;

use colored::Colorize;
use log::debug;

use crate::check::{check_workspace, CheckReport};
use crate::error::{Error, Result};
use crate::vcs::{self, GitRepo, GitVcs};
use crate::workspace::Workspace;

/// How one dependency was brought up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Cloned(String),
    Fetched(String),
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub fetched: Vec<Fetched>,
    /// Clone or fetch problems; nothing is checked out when any occur.
    pub sync_errors: Vec<String>,
    /// Set when the tree turned out inconsistent after fetching.
    pub check: Option<CheckReport>,
    /// `(dependency name, revision)` pairs checked out.
    pub checked_out: Vec<(String, String)>,
    pub checkout_errors: Vec<String>,
}

impl SyncReport {
    pub fn is_ok(&self) -> bool {
        self.sync_errors.is_empty()
            && self.check.is_none()
            && self.checkout_errors.is_empty()
    }

    pub fn print(&self) {
        for fetched in &self.fetched {
            match fetched {
                Fetched::Cloned(name) => println!("cloning repo {}...", name),
                Fetched::Fetched(name) => println!("fetching repo {}...", name),
            }
        }
        print_errors(&self.sync_errors);
        if let Some(check) = &self.check {
            check.print();
            eprintln!(
                "{} inconsistent dependencies. cannot proceed with checkout",
                "error:".red().bold()
            );
            return;
        }
        for (name, revision) in &self.checked_out {
            println!("checking out {} on {}...", revision, name);
        }
        print_errors(&self.checkout_errors);
        if self.is_ok() {
            println!("\n{}", "Success".green().bold());
        }
    }
}

fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    eprintln!("\n{} errors:", errors.len());
    for error in errors {
        eprintln!("- {}", error);
    }
}

/// Clone or fetch every dependency, then check out the declared revisions.
pub fn sync(workspace: &Workspace) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for (dep, path) in workspace.dependency_paths() {
        fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        let empty = fs::read_dir(&path)
            .map_err(|e| Error::io(&path, e))?
            .next()
            .is_none();

        if empty {
            report.fetched.push(Fetched::Cloned(dep.name.clone()));
            if let Err(e) = vcs::clone(&dep.clone_url(), &dep.remote, &path) {
                debug!("{}: {}", dep.name, e);
                report
                    .sync_errors
                    .push(format!("cannot sync \"{}\": clone failed", dep.path));
            }
        } else if path.join(".git").exists() {
            report.fetched.push(Fetched::Fetched(dep.name.clone()));
            let fetched = GitRepo::open(&path).and_then(|repo| repo.fetch(&dep.remote));
            if let Err(e) = fetched {
                debug!("{}: {}", dep.name, e);
                report
                    .sync_errors
                    .push(format!("cannot sync \"{}\": fetch failed", dep.path));
            }
        } else {
            report.sync_errors.push(format!(
                "cannot sync {}: {} is not empty and is not a git repo",
                dep.name, dep.path
            ));
        }
    }
    if !report.sync_errors.is_empty() {
        return Ok(report);
    }

    let check = check_workspace(&GitVcs, workspace);
    if !check.is_ok() {
        report.check = Some(check);
        return Ok(report);
    }

    for (dep, path) in workspace.dependency_paths() {
        report
            .checked_out
            .push((dep.name.clone(), dep.revision.clone()));
        let result = GitRepo::open(&path).and_then(|repo| repo.checkout(&dep.revision));
        if let Err(e) = result {
            debug!("{}: {}", dep.name, e);
            report.checkout_errors.push(format!(
                "cannot check out rev {} for repo: {}",
                dep.revision, dep.path
            ));
        }
    }
    Ok(report)
}
