//! `.rept_deps` manifest parsing.
//!
//! A manifest lists every repository the owning repository needs, flat:
//! nothing is inherited from a dependency's own manifest. An optional
//! `defaults` record supplies `remote`, `remote_server` and `revision` for
//! entries that leave them out.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::literal;

/// Name of the manifest file at the root of every repository.
pub const MANIFEST_FILE: &str = ".rept_deps";

/// One declared edge in the repository tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    /// Location relative to the declaring repository.
    pub path: String,
    pub remote: String,
    /// Base address; the clone URL is `remote_server` followed by `name`.
    pub remote_server: String,
    /// A branch name, remote-qualified ref, or commit id.
    pub revision: String,
}

impl Dependency {
    /// URL to clone this dependency from.
    pub fn clone_url(&self) -> String {
        format!("{}{}", self.remote_server, self.name)
    }
}

/// Fallback values applied to entries that omit a field.
#[derive(Debug, Clone, Default, Deserialize)]
struct Defaults {
    remote: Option<String>,
    remote_server: Option<String>,
    revision: Option<String>,
}

/// Entry fields: `None` when the key is absent, `Some(None)` when it is
/// present but null. Only absent keys fall back to the defaults.
#[derive(Debug, Deserialize)]
struct RawDependency {
    #[serde(default, deserialize_with = "present")]
    name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    path: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    remote: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    remote_server: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    revision: Option<Option<String>>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Parse manifest text into its dependency list.
///
/// Text holding only whitespace and comments parses to an empty list.
pub fn parse(text: &str) -> Result<Vec<Dependency>> {
    let Some(value) = literal::parse(text)? else {
        return Ok(Vec::new());
    };

    let contents = value.to_json();
    let contents = contents
        .as_object()
        .ok_or_else(|| Error::parse("must contain a single dictionary"))?;

    let defaults = match contents.get("defaults") {
        None | Some(serde_json::Value::Null) => Defaults::default(),
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| Error::parse(format!("bad \"defaults\" entry: {}", e)))?,
    };

    let dep_list = contents
        .get("dependencies")
        .ok_or_else(|| Error::parse("\"dependencies\" list not found"))?
        .as_array()
        .ok_or_else(|| Error::parse("\"dependencies\" is not a list"))?;

    let mut dependencies = Vec::with_capacity(dep_list.len());
    for (idx, entry) in dep_list.iter().enumerate() {
        if !entry.is_object() {
            return Err(Error::parse(format!(
                "dependency {} is not a dictionary",
                idx
            )));
        }

        let raw: RawDependency = serde_json::from_value(entry.clone())
            .map_err(|e| Error::parse(format!("dependency {}: {}", idx, e)))?;

        let required = |value: Option<Option<String>>, fallback: &Option<String>, what: &str| {
            value
                .unwrap_or_else(|| fallback.clone())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::parse(format!("dependency {} requires a {}", idx, what)))
        };

        let name = required(raw.name, &None, "name")?;
        let path = required(raw.path, &None, "path")?;
        let remote = required(raw.remote, &defaults.remote, "remote")?;
        let remote_server = required(raw.remote_server, &defaults.remote_server, "remote server")?;
        let revision = required(raw.revision, &defaults.revision, "revision")?;

        dependencies.push(Dependency {
            name,
            path,
            remote,
            remote_server,
            revision,
        });
    }

    Ok(dependencies)
}

/// Load the manifest in `repo_dir`. A missing file means no dependencies.
pub fn load(repo_dir: impl AsRef<Path>) -> Result<Vec<Dependency>> {
    let path = repo_dir.as_ref().join(MANIFEST_FILE);
    match std::fs::read_to_string(&path) {
        Ok(text) => parse(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
