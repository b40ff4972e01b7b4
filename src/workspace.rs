//! The root repository, its manifest, and where every dependency lives.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::manifest::{self, Dependency};

/// Fold `.` and `..` components without consulting the filesystem.
///
/// Dependencies may not exist on disk yet (before `sync`), so symlinks are
/// never resolved. `..` above the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute location of `dependency`, declared by the repository at `repo_dir`.
pub fn dependency_path(repo_dir: &Path, dependency: &Dependency) -> PathBuf {
    normalize(&repo_dir.join(&dependency.path))
}

/// Absolute repository path to the dependency record the root requires there.
///
/// Built once from the root manifest and consulted, never modified, while
/// the dependency tree is walked.
#[derive(Debug, Clone, Default)]
pub struct TargetMap {
    targets: BTreeMap<PathBuf, Dependency>,
}

impl TargetMap {
    pub fn new(root: &Path, dependencies: &[Dependency]) -> Self {
        let targets = dependencies
            .iter()
            .map(|dep| (dependency_path(root, dep), dep.clone()))
            .collect();
        Self { targets }
    }

    pub fn get(&self, path: &Path) -> Option<&Dependency> {
        self.targets.get(path)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// A root repository together with its parsed manifest.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub dependencies: Vec<Dependency>,
}

impl Workspace {
    /// Load the workspace whose root repository contains `start`.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self> {
        let root = find_root(start.as_ref())?;
        Self::load(root)
    }

    /// Load the workspace rooted exactly at `root`.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = absolute(root.as_ref())?;
        let dependencies = manifest::load(&root)?;
        debug!(
            "loaded {} dependencies from {}",
            dependencies.len(),
            root.display()
        );
        Ok(Self { root, dependencies })
    }

    pub fn targets(&self) -> TargetMap {
        TargetMap::new(&self.root, &self.dependencies)
    }

    /// Each declared dependency paired with its absolute path.
    pub fn dependency_paths(&self) -> impl Iterator<Item = (&Dependency, PathBuf)> {
        self.dependencies
            .iter()
            .map(|dep| (dep, dependency_path(&self.root, dep)))
    }
}

/// Top-level working directory of the git repository containing `start`.
pub fn find_root(start: &Path) -> Result<PathBuf> {
    let repo = git2::Repository::discover(start)?;
    let workdir = repo.workdir().ok_or_else(|| {
        Error::config(format!(
            "{} is inside a bare repository",
            start.display()
        ))
    })?;
    absolute(workdir)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir().map_err(|e| Error::io(path, e))?;
    Ok(normalize(&cwd.join(path)))
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
