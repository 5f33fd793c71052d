//! systemd unit control and the activation order for the storage stack.

use std::fmt;

use tracing::info;

use super::{CommandRunner, run_checked};
use crate::{config::ServicesConfig, error::AppError};

/// `systemctl` verbs used during activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Stop,
    Disable,
    Enable,
    Restart,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Stop => "stop",
            ServiceAction::Disable => "disable",
            ServiceAction::Enable => "enable",
            ServiceAction::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service-controller collaborator.
pub trait ServiceController {
    fn apply(&self, action: ServiceAction, unit: &str) -> Result<(), AppError>;
}

/// [`ServiceController`] that runs `systemctl`.
pub struct Systemctl<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Systemctl<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl ServiceController for Systemctl<'_> {
    fn apply(&self, action: ServiceAction, unit: &str) -> Result<(), AppError> {
        run_checked(self.runner, "systemctl", vec![action.to_string(), unit.to_string()])?;
        info!(%action, %unit, "service updated");
        Ok(())
    }
}

/// Ordered steps that replace the distribution database with the server's
/// own unit and bring both up. Restarts come after both enables and the
/// database restarts before the server, which depends on it.
pub fn activation_plan(services: &ServicesConfig) -> Vec<(ServiceAction, &str)> {
    vec![
        (ServiceAction::Stop, services.conflicting.as_str()),
        (ServiceAction::Disable, services.conflicting.as_str()),
        (ServiceAction::Enable, services.database.as_str()),
        (ServiceAction::Enable, services.server.as_str()),
        (ServiceAction::Restart, services.database.as_str()),
        (ServiceAction::Restart, services.server.as_str()),
    ]
}
