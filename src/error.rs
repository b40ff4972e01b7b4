//! Error types shared by the manifest, checking and planning code.
//!
//! The consistency checker and the update planner never abort on one of
//! these: they record the error against the repository where it was found
//! and keep walking. Only the command layer turns a non-empty list into a
//! failing exit status.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rept operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A manifest (or the literal expression inside it) could not be parsed.
    #[error("{message}")]
    Parse { message: String },

    /// A repository lists a dependency that the root manifest does not.
    #[error("Unlisted dependency '{name}' found")]
    UnlistedDependency { name: String },

    /// A repository requires a different revision string than the root.
    #[error("Inconsistent dependency for {name}: required: {required}, found: {found}")]
    InconsistentRevision {
        name: String,
        required: String,
        found: String,
    },

    /// A declared revision does not resolve to a commit.
    #[error("Bad revision specified: {revision} for repo: {name}: {reason}")]
    BadRevision {
        name: String,
        revision: String,
        reason: String,
    },

    /// A repository was reached again while it was still being visited.
    #[error("Circular reference detected")]
    CircularReference,

    /// A dependency's working copy is missing or could not be opened.
    #[error("Missing repo: {name} ({})", path.display())]
    MissingRepository { name: String, path: PathBuf },

    /// Tracked files have local changes that a checkout would overwrite.
    #[error("working directory is not clean for repo {repo}")]
    DirtyWorkingDirectory { repo: String },

    /// A feature branch is missing, not checked out, or otherwise unusable.
    #[error("{message}")]
    FeatureBranchState { message: String },

    /// The manifest patcher refused to edit the text.
    #[error("{message}")]
    PatchFormat { message: String },

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A git operation performed through libgit2 failed.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// An invocation of the `git` binary failed.
    #[error("git {command} failed in {}: {stderr}", dir.display())]
    GitCommand {
        command: String,
        dir: PathBuf,
        stderr: String,
    },

    /// The local configuration file is invalid or inconsistent with the repo.
    #[error("{message}")]
    Config { message: String },

    /// A plan containing errors cannot be written back.
    #[error("the update plan contains {count} error(s); no changes were made")]
    PlanHasErrors { count: usize },
}

impl Error {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub(crate) fn patch_format(message: impl Into<String>) -> Self {
        Self::PatchFormat {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The underlying failure text without this crate's prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Git(e) => e.message().to_string(),
            other => other.to_string(),
        }
    }

    /// The lines used when this error is reported on a terminal.
    ///
    /// Most errors are a single line; revision errors spread their details
    /// over indented continuation lines.
    pub fn report_lines(&self) -> Vec<String> {
        match self {
            Self::InconsistentRevision {
                name,
                required,
                found,
            } => vec![
                format!("Inconsistent dependency for {}:", name),
                format!("required: {}", required),
                format!("found: {}", found),
            ],
            Self::BadRevision {
                name,
                revision,
                reason,
            } => vec![
                format!("Bad revision specified: {}", revision),
                format!("for repo: {}", name),
                reason.clone(),
            ],
            Self::MissingRepository { name, .. } => vec![format!("Missing repo: {}", name)],
            other => vec![other.to_string()],
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inconsistent_revision_display() {
        let error = Error::InconsistentRevision {
            name: "dep2".to_string(),
            required: "origin/branch2".to_string(),
            found: "origin/branch1".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("dep2"));
        assert!(display.contains("required: origin/branch2"));
        assert!(display.contains("found: origin/branch1"));

        let lines = error.report_lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Inconsistent dependency for dep2:");
    }

    #[test]
    fn test_bad_revision_report_lines() {
        let error = Error::BadRevision {
            name: "dep1".to_string(),
            revision: "nope".to_string(),
            reason: "revspec 'nope' not found".to_string(),
        };
        assert_eq!(
            error.report_lines(),
            vec![
                "Bad revision specified: nope".to_string(),
                "for repo: dep1".to_string(),
                "revspec 'nope' not found".to_string(),
            ]
        );
    }

    #[test]
    fn test_dirty_working_directory_names_repo() {
        let error = Error::DirtyWorkingDirectory {
            repo: "this repo".to_string(),
        };
        assert_eq!(
            error.report_lines(),
            vec!["working directory is not clean for repo this repo"]
        );
    }

    #[test]
    fn test_parse_error_is_bare_message() {
        let error = Error::parse("must contain a single dictionary");
        assert_eq!(error.to_string(), "must contain a single dictionary");
        assert_eq!(error.report_lines(), vec!["must contain a single dictionary"]);
    }

    #[test]
    fn test_io_error_names_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error = Error::io("/tmp/.rept_deps", io_error);
        let display = error.to_string();
        assert!(display.contains("/tmp/.rept_deps"));
        assert!(display.contains("File not found"));
    }
}
