//! Test utilities: an in-memory [`Vcs`] for exercising the tree walks
//! without creating git repositories.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::manifest::MANIFEST_FILE;
use crate::vcs::{RepoContext, Vcs};

/// Everything a fake repository knows about itself.
#[derive(Debug, Default)]
pub struct FakeRepoState {
    /// Revision names (including `HEAD`) to commit ids.
    pub refs: HashMap<String, String>,
    pub branches: HashSet<String>,
    pub current_branch: Option<String>,
    pub clean: bool,
    /// Manifest text committed at each commit id.
    pub committed: HashMap<String, String>,
    pub working: Option<String>,
    /// `(message, amend)` for every commit made through the context.
    pub commits: Vec<(String, bool)>,
}

impl FakeRepoState {
    fn resolve(&self, revision: &str) -> Result<String> {
        if let Some(hash) = self.refs.get(revision) {
            return Ok(hash.clone());
        }
        if self.refs.values().any(|h| h == revision) || self.committed.contains_key(revision) {
            return Ok(revision.to_string());
        }
        Err(git2::Error::from_str(&format!("revspec '{}' not found", revision)).into())
    }
}

#[derive(Clone, Default)]
pub struct FakeVcs {
    repos: Rc<RefCell<HashMap<PathBuf, FakeRepoState>>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clean repository at `path` on branch `master` at commit `head`.
    /// The manifest, when given, is both committed at `head` and in the
    /// working tree.
    pub fn add(&self, path: &str, head: &str, manifest: Option<&str>) -> &Self {
        let mut state = FakeRepoState {
            clean: true,
            current_branch: Some("master".to_string()),
            ..Default::default()
        };
        state.refs.insert("HEAD".to_string(), head.to_string());
        state.refs.insert("master".to_string(), head.to_string());
        state.branches.insert("master".to_string());
        if let Some(text) = manifest {
            state.committed.insert(head.to_string(), text.to_string());
            state.working = Some(text.to_string());
        }
        self.repos.borrow_mut().insert(PathBuf::from(path), state);
        self
    }

    /// Mutate the state of the repository at `path`.
    pub fn with(&self, path: &str, f: impl FnOnce(&mut FakeRepoState)) -> &Self {
        let mut repos = self.repos.borrow_mut();
        let state = repos
            .get_mut(Path::new(path))
            .unwrap_or_else(|| panic!("no fake repo at {}", path));
        f(state);
        self
    }

    /// Create branch `name` at HEAD and check it out.
    pub fn on_branch(&self, path: &str, name: &str) -> &Self {
        self.with(path, |state| {
            let head = state.refs["HEAD"].clone();
            state.refs.insert(name.to_string(), head);
            state.branches.insert(name.to_string());
            state.current_branch = Some(name.to_string());
        })
    }

    /// Move HEAD (and the current branch) to a new commit `hash`.
    pub fn advance(&self, path: &str, hash: &str) -> &Self {
        self.with(path, |state| {
            state.refs.insert("HEAD".to_string(), hash.to_string());
            if let Some(branch) = state.current_branch.clone() {
                state.refs.insert(branch, hash.to_string());
            }
            if let Some(text) = state.working.clone() {
                state.committed.insert(hash.to_string(), text);
            }
        })
    }

    pub fn state<T>(&self, path: &str, f: impl FnOnce(&FakeRepoState) -> T) -> T {
        let repos = self.repos.borrow();
        f(&repos[Path::new(path)])
    }
}

impl Vcs for FakeVcs {
    type Repo = FakeRepo;

    fn enter(&self, path: &Path) -> Result<FakeRepo> {
        if !self.repos.borrow().contains_key(path) {
            return Err(Error::MissingRepository {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: path.to_path_buf(),
            });
        }
        Ok(FakeRepo {
            path: path.to_path_buf(),
            repos: Rc::clone(&self.repos),
        })
    }
}

pub struct FakeRepo {
    path: PathBuf,
    repos: Rc<RefCell<HashMap<PathBuf, FakeRepoState>>>,
}

impl FakeRepo {
    fn read<T>(&self, f: impl FnOnce(&FakeRepoState) -> T) -> T {
        f(&self.repos.borrow()[&self.path])
    }

    fn write<T>(&self, f: impl FnOnce(&mut FakeRepoState) -> T) -> T {
        let mut repos = self.repos.borrow_mut();
        f(repos.get_mut(&self.path).expect("fake repo vanished"))
    }
}

impl RepoContext for FakeRepo {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve_revision_hash(&self, revision: &str) -> Result<String> {
        self.read(|state| state.resolve(revision))
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.read(|state| state.branches.contains(name)))
    }

    fn is_current_branch(&self, name: &str) -> Result<bool> {
        Ok(self.read(|state| state.current_branch.as_deref() == Some(name)))
    }

    fn is_clean_working_directory(&self) -> Result<bool> {
        Ok(self.read(|state| state.clean))
    }

    fn read_file_at_revision(&self, revision: &str, filename: &str) -> Result<Option<String>> {
        self.read(|state| {
            let hash = state.resolve(revision)?;
            if filename != MANIFEST_FILE {
                return Ok(None);
            }
            Ok(state.committed.get(&hash).cloned())
        })
    }

    fn read_working_file(&self, filename: &str) -> Result<Option<String>> {
        if filename != MANIFEST_FILE {
            return Ok(None);
        }
        Ok(self.read(|state| state.working.clone()))
    }

    fn write_working_file(&self, filename: &str, contents: &str) -> Result<()> {
        assert_eq!(filename, MANIFEST_FILE);
        self.write(|state| state.working = Some(contents.to_string()));
        Ok(())
    }

    fn commit_file(&self, filename: &str, message: &str, amend: bool) -> Result<String> {
        assert_eq!(filename, MANIFEST_FILE);
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.write(|state| {
            state.commits.push((message.to_string(), amend));
            let hash = format!("{}-commit{}", name, state.commits.len());
            if let Some(text) = state.working.clone() {
                state.committed.insert(hash.clone(), text);
            }
            state.refs.insert("HEAD".to_string(), hash.clone());
            if let Some(branch) = state.current_branch.clone() {
                state.refs.insert(branch, hash.clone());
            }
            Ok(hash)
        })
    }
}

/// Manifest text listing `(name, path, revision)` entries.
pub fn manifest(deps: &[(&str, &str, &str)]) -> String {
    let mut text = String::from(
        "{\n    'defaults': {'remote': 'origin', 'remote_server': 'git@example.com:'},\n    'dependencies': [\n",
    );
    for (name, path, revision) in deps {
        text.push_str(&format!(
            "        {{'name': '{}', 'path': '{}', 'revision': '{}'}},\n",
            name, path, revision
        ));
    }
    text.push_str("    ]\n}\n");
    text
}
