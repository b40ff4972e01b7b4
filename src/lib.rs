//! Coordinated feature branches across a tree of git repositories.
//!
//! A root repository lists the repositories it depends on, and the revision
//! of each, in a `.rept_deps` manifest. Dependencies may carry manifests of
//! their own. This crate parses those manifests, checks that every
//! repository in the tree agrees on the revision of every shared
//! dependency, plans how changes made on a feature branch should propagate
//! upwards, and rewrites manifests in place without disturbing their
//! formatting.

pub mod check;
pub mod config;
pub mod error;
pub mod feature;
pub mod literal;
pub mod manifest;
pub mod patch;
pub mod plan;
pub mod remote;
pub mod switch;
pub mod sync;
pub mod update;
pub mod vcs;
pub mod workspace;

#[cfg(test)]
mod testutil;

pub use check::{check, check_workspace, ChainedError, CheckReport};
pub use config::LocalConfig;
pub use error::{Error, Result};
pub use manifest::{Dependency, MANIFEST_FILE};
pub use plan::{plan, plan_workspace, CommitType, Plan, RepoAction, UpdateResult};
pub use vcs::{GitRepo, GitVcs, RepoContext, Vcs};
pub use workspace::{TargetMap, Workspace};
