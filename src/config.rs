//! Per-clone settings from the uncommitted `.rept_local` file.
//!
//! The file uses the same literal syntax as the manifest:
//!
//! ```text
//! {'remote': 'origin'}
//! ```

use std::path::Path;

use crate::error::{Error, Result};
use crate::literal::{self, Node, Value};

pub const LOCAL_CONFIG_FILE: &str = ".rept_local";

/// Settings for the root repository clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalConfig {
    /// Remote the root repository talks to.
    pub remote: Option<String>,
}

impl LocalConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let value = literal::parse(text)
            .map_err(|e| Error::config(format!("could not load {}: {}", LOCAL_CONFIG_FILE, e)))?;
        let contents = value
            .as_ref()
            .and_then(Value::as_map)
            .ok_or_else(|| Error::config("must contain a single dictionary"))?;

        let remote = match contents.get("remote") {
            None => None,
            Some(Value { node: Node::None, .. }) => None,
            Some(value) => Some(
                value
                    .as_str()
                    .ok_or_else(|| Error::config("\"remote\" must be a string"))?
                    .to_string(),
            ),
        };

        Ok(Self { remote })
    }

    /// Load `.rept_local` from `repo_dir`. A missing file gives the defaults.
    pub fn load(repo_dir: impl AsRef<Path>) -> Result<Self> {
        let path = repo_dir.as_ref().join(LOCAL_CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// The remote to use given the remotes the repository actually has.
    ///
    /// A configured remote must exist. Without one, the repository must
    /// have exactly one remote.
    pub fn select_remote(&self, remotes: &[String]) -> Result<String> {
        if remotes.is_empty() {
            return Err(Error::config("no remotes detected in this repo"));
        }

        match &self.remote {
            Some(remote) if remotes.contains(remote) => Ok(remote.clone()),
            Some(_) => Err(Error::config("specified remote is not in this repo")),
            None if remotes.len() == 1 => Ok(remotes[0].clone()),
            None => Err(Error::config(format!(
                "multiple remotes detected. specify in {} file",
                LOCAL_CONFIG_FILE
            ))),
        }
    }
}
