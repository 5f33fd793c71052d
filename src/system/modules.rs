//! Kernel module loading via `modprobe`.

use tracing::info;

use super::{CommandRunner, run_checked};
use crate::error::AppError;

/// Module-loader collaborator. Loading an already-loaded module succeeds.
pub trait ModuleLoader {
    fn load(&self, module: &str) -> Result<(), AppError>;
}

/// [`ModuleLoader`] that runs `modprobe`.
pub struct Modprobe<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Modprobe<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl ModuleLoader for Modprobe<'_> {
    fn load(&self, module: &str) -> Result<(), AppError> {
        run_checked(self.runner, "modprobe", vec![module.to_string()])?;
        info!(%module, "kernel module loaded");
        Ok(())
    }
}
