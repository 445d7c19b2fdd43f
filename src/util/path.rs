use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Maps `(owner, repository)` to the local working copy location.
///
/// The layout is `<workdir>/<owner>/<repository>`, so every component that
/// touches a repository's clone agrees on where it lives.
#[derive(Debug, Clone)]
pub struct RepoPaths {
    workdir: PathBuf,
}

impl RepoPaths {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self { workdir: workdir.into() }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Deterministic clone path for a repository.
    ///
    /// Rejects names that would escape the work directory.
    pub fn repository_path(&self, owner: &str, repository: &str) -> Result<PathBuf> {
        for component in [owner, repository] {
            if !is_safe_component(component) {
                return Err(Error::Config(format!(
                    "refusing path component {:?} for {}/{}",
                    component, owner, repository
                )));
            }
        }
        Ok(self.workdir.join(owner).join(repository))
    }
}

fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
