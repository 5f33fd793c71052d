//! Bootstrap pipeline: turns a bare host into a provisioned single-node
//! storage server.
//!
//! Steps, each fatal on failure:
//!   1. Idempotence gate: an existing server config means nothing to do
//!   2. Create blob and config directories (0700)
//!   3. Resolve the signing identity (reuse ring or generate one)
//!   4. Assemble the server config from the base template
//!   5. Write the server config (0600, atomic, never replaced)
//!   6. Hand blob and config trees, plus any parents step 2 created, to the
//!      service account
//!   7. Swap in the server's database unit and (re)start both services
//!   8. Load the FUSE module and open its device to the FUSE group
//!
//! Steps 6–8 are individually switchable in settings.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    cli::Credentials,
    config::Config,
    error::AppError,
    fsutil,
    identity::{self, KeyRing},
    server_config::BaseTemplate,
    system::{ModuleLoader, OwnershipChanger, ServiceController, services},
};

/// Collaborators the pipeline delegates to.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub key_ring: &'a dyn KeyRing,
    pub owner: &'a dyn OwnershipChanger,
    pub services: &'a dyn ServiceController,
    pub modules: &'a dyn ModuleLoader,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The server config was already present; nothing was touched.
    AlreadyConfigured { path: PathBuf },
    Provisioned {
        key_id: String,
        secret_ring: PathBuf,
        reused_identity: bool,
    },
}

/// `true` if anything sits at the server config path, a dangling symlink
/// included. Errors other than "not found" are fatal.
pub fn is_configured(server_config: &Path) -> Result<bool, AppError> {
    match fs::symlink_metadata(server_config) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AppError::fs("stat server config", server_config, e)),
    }
}

/// Run the whole pipeline once.
pub fn run(config: &Config, credentials: &Credentials, host: Host<'_>) -> Result<Outcome, AppError> {
    let paths = &config.paths;

    if is_configured(&paths.server_config)? {
        info!(path = %paths.server_config.display(), "server config exists, nothing to do");
        return Ok(Outcome::AlreadyConfigured {
            path: paths.server_config.clone(),
        });
    }

    if credentials.username().contains(':') {
        warn!("username contains ':' and the auth string is not escaped");
    }

    let mut created = fsutil::create_private_dir(&paths.blob_dir)?;
    created.extend(fsutil::create_private_dir(config.config_dir())?);
    if let Some(ring_dir) = paths.secret_ring.parent() {
        created.extend(fsutil::create_private_dir(ring_dir)?);
    }
    info!(blobs = %paths.blob_dir.display(), config = %config.config_dir().display(), "directories ready");

    let identity = identity::resolve(host.key_ring, &paths.secret_ring)?;

    let document = BaseTemplate::single_node(&paths.blob_dir).assemble(&identity, credentials);
    document.write_new(&paths.server_config)?;

    if config.account.enabled {
        transfer_ownership(config, &created, host.owner)?;
    }
    if config.services.enabled {
        activate_services(config, host.services)?;
    }
    if config.fuse.enabled {
        setup_fuse(config, host.modules, host.owner)?;
    }

    Ok(Outcome::Provisioned {
        key_id: identity.key_id,
        secret_ring: identity.secret_ring,
        reused_identity: identity.reused,
    })
}

/// Paths handed to the service account: the blob tree, the config tree, and
/// the key ring when it lives outside the config tree.
pub fn owned_paths(config: &Config) -> Vec<&Path> {
    let mut paths = vec![config.paths.blob_dir.as_path(), config.config_dir()];
    if !config.paths.secret_ring.starts_with(config.config_dir()) {
        paths.push(config.paths.secret_ring.as_path());
    }
    paths
}

/// Directories from `created` that lie outside every owned tree. They are
/// root-owned 0700 after creation and would block the account's way down.
pub fn created_parents<'a>(config: &Config, created: &'a [PathBuf]) -> Vec<&'a Path> {
    let owned = owned_paths(config);
    created
        .iter()
        .map(PathBuf::as_path)
        .filter(|dir| !owned.iter().any(|tree| dir.starts_with(tree)))
        .collect()
}

fn transfer_ownership(
    config: &Config,
    created: &[PathBuf],
    owner: &dyn OwnershipChanger,
) -> Result<(), AppError> {
    let account = &config.account;
    for path in owned_paths(config) {
        owner.chown_recursive(path, &account.user, &account.group)?;
    }
    for dir in created_parents(config, created) {
        owner.chown(dir, &account.user, &account.group)?;
    }
    Ok(())
}

fn activate_services(config: &Config, controller: &dyn ServiceController) -> Result<(), AppError> {
    for (action, unit) in services::activation_plan(&config.services) {
        controller.apply(action, unit)?;
    }
    Ok(())
}

fn setup_fuse(
    config: &Config,
    modules: &dyn ModuleLoader,
    owner: &dyn OwnershipChanger,
) -> Result<(), AppError> {
    let fuse = &config.fuse;
    modules.load(&fuse.module)?;
    owner.chgrp(&fuse.device, &fuse.group)
}
