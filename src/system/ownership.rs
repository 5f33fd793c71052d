//! Ownership changes via `chown` / `chgrp`.

use std::path::Path;

use tracing::info;

use super::{CommandRunner, run_checked};
use crate::error::AppError;

/// Ownership-changer collaborator.
pub trait OwnershipChanger {
    /// Recursively give `path` to `user:group`.
    fn chown_recursive(&self, path: &Path, user: &str, group: &str) -> Result<(), AppError>;

    /// Give the single path `path` to `user:group`.
    fn chown(&self, path: &Path, user: &str, group: &str) -> Result<(), AppError>;

    /// Change the group of a single path.
    fn chgrp(&self, path: &Path, group: &str) -> Result<(), AppError>;
}

/// [`OwnershipChanger`] that runs the coreutils binaries.
pub struct Chown<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Chown<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl OwnershipChanger for Chown<'_> {
    fn chown_recursive(&self, path: &Path, user: &str, group: &str) -> Result<(), AppError> {
        let args = vec![
            "-R".to_string(),
            format!("{user}:{group}"),
            path.display().to_string(),
        ];
        run_checked(self.runner, "chown", args)?;
        info!(path = %path.display(), owner = %format!("{user}:{group}"), "ownership changed");
        Ok(())
    }

    fn chown(&self, path: &Path, user: &str, group: &str) -> Result<(), AppError> {
        let args = vec![format!("{user}:{group}"), path.display().to_string()];
        run_checked(self.runner, "chown", args)?;
        info!(path = %path.display(), owner = %format!("{user}:{group}"), "ownership changed");
        Ok(())
    }

    fn chgrp(&self, path: &Path, group: &str) -> Result<(), AppError> {
        run_checked(self.runner, "chgrp", vec![group.to_string(), path.display().to_string()])?;
        info!(path = %path.display(), %group, "group changed");
        Ok(())
    }
}
