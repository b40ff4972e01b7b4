//! Version control access.
//!
//! The checking and planning algorithms only see the [`Vcs`] and
//! [`RepoContext`] traits. Every call names the repository it acts on
//! through the context it is made on; the process working directory is
//! never changed. [`GitVcs`] is the real implementation: local queries go
//! through libgit2, and operations that talk to a remote run the `git`
//! binary so that the user's credential helpers and SSH setup apply.

use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{BranchType, ErrorCode, Repository, StatusOptions};
use log::debug;

use crate::error::{Error, Result};

/// Opens repositories by path.
pub trait Vcs {
    type Repo: RepoContext;

    /// Open the repository whose working directory is exactly `path`.
    ///
    /// Fails with [`Error::MissingRepository`] when there is none.
    fn enter(&self, path: &Path) -> Result<Self::Repo>;
}

/// Operations on one open repository.
pub trait RepoContext {
    fn path(&self) -> &Path;

    /// Full commit id that `revision` (branch, remote ref or id) names.
    fn resolve_revision_hash(&self, revision: &str) -> Result<String>;

    /// Whether a local branch called `name` exists.
    fn branch_exists(&self, name: &str) -> Result<bool>;

    fn is_current_branch(&self, name: &str) -> Result<bool>;

    /// True when no tracked file differs from HEAD. Untracked files are ignored.
    fn is_clean_working_directory(&self) -> Result<bool>;

    /// Contents of `filename` as committed at `revision`, if the file exists there.
    fn read_file_at_revision(&self, revision: &str, filename: &str) -> Result<Option<String>>;

    fn read_working_file(&self, filename: &str) -> Result<Option<String>>;

    fn write_working_file(&self, filename: &str, contents: &str) -> Result<()>;

    /// Stage `filename` and commit it on HEAD, either as a new commit with
    /// `message` or by amending HEAD (keeping its message). Returns the new
    /// HEAD commit id.
    fn commit_file(&self, filename: &str, message: &str, amend: bool) -> Result<String>;
}

/// [`Vcs`] backed by git repositories on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitVcs;

impl Vcs for GitVcs {
    type Repo = GitRepo;

    fn enter(&self, path: &Path) -> Result<GitRepo> {
        GitRepo::open(path)
    }
}

/// An open git repository.
pub struct GitRepo {
    path: PathBuf,
    repo: Repository,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo").field("path", &self.path).finish()
    }
}

fn is_not_found(e: &git2::Error) -> bool {
    matches!(e.code(), ErrorCode::NotFound | ErrorCode::UnbornBranch)
}

impl GitRepo {
    pub fn open(path: &Path) -> Result<Self> {
        let missing = || Error::MissingRepository {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.to_path_buf(),
        };

        if !path.is_dir() {
            return Err(missing());
        }
        let repo = Repository::open(path).map_err(|e| {
            debug!("cannot open {}: {}", path.display(), e);
            missing()
        })?;
        if repo.is_bare() {
            return Err(missing());
        }
        Ok(Self {
            path: path.to_path_buf(),
            repo,
        })
    }

    fn commit(&self, revision: &str) -> Result<git2::Commit<'_>> {
        Ok(self.repo.revparse_single(revision)?.peel_to_commit()?)
    }

    /// Name of the checked-out local branch, or `None` when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(String::from))
    }

    pub fn head_hash(&self) -> Result<String> {
        self.resolve_revision_hash("HEAD")
    }

    pub fn remotes(&self) -> Result<Vec<String>> {
        let remotes = self.repo.remotes()?;
        Ok(remotes.iter().flatten().map(String::from).collect())
    }

    pub fn remote_branch_exists(&self, remote: &str, name: &str) -> Result<bool> {
        match self
            .repo
            .find_branch(&format!("{}/{}", remote, name), BranchType::Remote)
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remote-tracking refs called `name` on any remote, as `remote/name`.
    pub fn remote_branches_named(&self, name: &str) -> Result<Vec<String>> {
        let suffix = format!("/{}", name);
        let mut found = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Remote))? {
            let (branch, _) = branch?;
            if let Some(full) = branch.name()? {
                if full.ends_with(&suffix) {
                    found.push(full.to_string());
                }
            }
        }
        Ok(found)
    }

    /// Create local branch `name` pointing at `revision`.
    pub fn create_branch(&self, name: &str, revision: &str) -> Result<()> {
        let commit = self.commit(revision)?;
        self.repo.branch(name, &commit, false)?;
        debug!("created {} at {} in {}", name, commit.id(), self.path.display());
        Ok(())
    }

    /// Create local branch `name` from `remote/name` and track it.
    pub fn create_tracking_branch(&self, remote: &str, name: &str) -> Result<()> {
        let upstream = format!("{}/{}", remote, name);
        let commit = self.commit(&upstream)?;
        let mut branch = self.repo.branch(name, &commit, false)?;
        branch.set_upstream(Some(upstream.as_str()))?;
        Ok(())
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        self.repo.find_branch(name, BranchType::Local)?.delete()?;
        Ok(())
    }

    /// Whether local branch `name` is contained in HEAD's history.
    pub fn is_branch_merged(&self, name: &str) -> Result<bool> {
        let branch = self.repo.find_branch(name, BranchType::Local)?;
        let tip = branch.get().peel_to_commit()?.id();
        let head = self.commit("HEAD")?.id();
        Ok(tip == head || self.repo.graph_descendant_of(head, tip)?)
    }

    /// Whether `filename` differs from HEAD in the index or working tree.
    pub fn is_file_modified(&self, filename: &str) -> Result<bool> {
        match self.repo.status_file(Path::new(filename)) {
            Ok(status) => Ok(!status.is_empty() && !status.is_ignored()),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Check out local branch `name`, refusing to overwrite local changes.
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let refname = format!("refs/heads/{}", name);
        let target = self.repo.revparse_single(&refname)?;
        self.repo
            .checkout_tree(&target, Some(git2::build::CheckoutBuilder::new().safe()))?;
        self.repo.set_head(&refname)?;
        Ok(())
    }

    /// Check out the commit `revision` names with a detached HEAD.
    pub fn checkout_detached(&self, revision: &str) -> Result<()> {
        let commit = self.commit(revision)?;
        self.repo.checkout_tree(
            commit.as_object(),
            Some(git2::build::CheckoutBuilder::new().safe()),
        )?;
        self.repo.set_head_detached(commit.id())?;
        Ok(())
    }

    /// Check out `revision` the way `git checkout` does: onto the local
    /// branch when one has that name, otherwise with a detached HEAD.
    pub fn checkout(&self, revision: &str) -> Result<()> {
        if self.branch_exists(revision)? {
            self.checkout_branch(revision)
        } else {
            self.checkout_detached(revision)
        }
    }

    /// Detach HEAD at its current commit.
    pub fn detach(&self) -> Result<()> {
        let id = self.commit("HEAD")?.id();
        self.repo.set_head_detached(id)?;
        Ok(())
    }

    pub fn fetch(&self, remote: &str) -> Result<()> {
        run_git(&self.path, &["fetch", remote]).map(|_| ())
    }

    pub fn prune(&self, remote: &str) -> Result<()> {
        run_git(&self.path, &["remote", "prune", remote]).map(|_| ())
    }

    /// Delete branch `name` on `remote`.
    pub fn push_delete(&self, remote: &str, name: &str) -> Result<()> {
        run_git(&self.path, &["push", remote, "--delete", name]).map(|_| ())
    }
}

impl RepoContext for GitRepo {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve_revision_hash(&self, revision: &str) -> Result<String> {
        Ok(self.commit(revision)?.id().to_string())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        match self.repo.find_branch(name, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn is_current_branch(&self, name: &str) -> Result<bool> {
        Ok(self.current_branch()?.as_deref() == Some(name))
    }

    fn is_clean_working_directory(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(false)
            .include_ignored(false)
            .exclude_submodules(true);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(statuses.is_empty())
    }

    fn read_file_at_revision(&self, revision: &str, filename: &str) -> Result<Option<String>> {
        let tree = self.commit(revision)?.tree()?;
        let entry = match tree.get_path(Path::new(filename)) {
            Ok(entry) => entry,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
        String::from_utf8(blob.content().to_vec())
            .map(Some)
            .map_err(|_| {
                Error::parse(format!(
                    "{} at {} is not valid UTF-8",
                    filename, revision
                ))
            })
    }

    fn read_working_file(&self, filename: &str) -> Result<Option<String>> {
        let path = self.path.join(filename);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    fn write_working_file(&self, filename: &str, contents: &str) -> Result<()> {
        let path = self.path.join(filename);
        std::fs::write(&path, contents).map_err(|e| Error::io(path, e))
    }

    fn commit_file(&self, filename: &str, message: &str, amend: bool) -> Result<String> {
        let mut index = self.repo.index()?;
        index.add_path(Path::new(filename))?;
        index.write()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        let head = self.commit("HEAD")?;
        let id = if amend {
            head.amend(Some("HEAD"), None, None, None, None, Some(&tree))?
        } else {
            let signature = self.repo.signature()?;
            self.repo
                .commit(Some("HEAD"), &signature, &signature, message, &tree, &[&head])?
        };
        debug!(
            "{} {} in {} as {}",
            if amend { "amended" } else { "committed" },
            filename,
            self.path.display(),
            id
        );
        Ok(id.to_string())
    }
}

/// Clone `url` into `dir`, naming the remote `remote`.
pub fn clone(url: &str, remote: &str, dir: &Path) -> Result<()> {
    let parent = dir.parent().unwrap_or(dir);
    let target = dir.as_os_str().to_string_lossy();
    run_git(parent, &["clone", "-o", remote, url, &target]).map(|_| ())
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    debug!("git {} (in {})", args.join(" "), dir.display());
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::GitCommand {
            command: args.join(" "),
            dir: dir.to_path_buf(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::GitCommand {
            command: args.join(" "),
            dir: dir.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
#[path = "vcs_tests.rs"]
mod tests;
