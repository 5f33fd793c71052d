//! Command-line arguments and web UI credential validation.

use std::fmt;

use clap::Parser;

use crate::error::AppError;

/// Provision a single-node casd storage server: write the default server
/// configuration and signing identity, hand the files to the service
/// account, and start the services.
///
/// Does nothing if the server configuration already exists.
#[derive(Parser, Debug)]
#[command(name = "casd-provision", version)]
pub struct Cli {
    /// Username for accessing the web UI
    #[arg(long, value_name = "NAME")]
    pub username: Option<String>,

    /// Password for accessing the web UI
    #[arg(long, value_name = "PASSWORD")]
    pub password: Option<String>,
}

impl Cli {
    /// Validate into credentials; missing and empty values are usage errors.
    pub fn credentials(self) -> Result<Credentials, AppError> {
        Credentials::new(self.username, self.password)
    }
}

/// Non-empty web UI username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Result<Self, AppError> {
        let username = username
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::Usage("please provide a username".into()))?;
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::Usage("please provide a password".into()))?;

        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
