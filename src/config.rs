//! Provisioning settings with env-var overrides.
//!
//! Defaults come from `config/default.toml`, compiled into the binary.
//! `CASD_PROVISION_CONFIG` points at a replacement TOML file and
//! `CASD_PROVISION_LOG_LEVEL` overrides the log level.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

/// Built-in deployment settings.
pub const DEFAULT_TOML: &str = include_str!("../config/default.toml");

/// Well-known on-disk locations.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Server configuration document; its existence is the idempotence marker.
    pub server_config: PathBuf,
    /// Secret key ring recorded in the server configuration.
    pub secret_ring: PathBuf,
    /// Blob storage root.
    pub blob_dir: PathBuf,
}

/// Service account that ends up owning the created trees.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub enabled: bool,
    pub user: String,
    pub group: String,
}

/// systemd units touched during activation.
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub enabled: bool,
    /// Distribution database unit that must be stopped and disabled.
    pub conflicting: String,
    /// Replacement database unit the server depends on.
    pub database: String,
    /// The storage server unit.
    pub server: String,
}

/// FUSE kernel module and control device.
#[derive(Debug, Clone)]
pub struct FuseConfig {
    pub enabled: bool,
    pub module: String,
    pub device: PathBuf,
    /// Group granted access to `device`.
    pub group: String,
}

/// Fully-resolved provisioning settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub paths: PathsConfig,
    pub account: AccountConfig,
    pub services: ServicesConfig,
    pub fuse: FuseConfig,
}

impl Config {
    /// Directory holding the server configuration (and, by default, the key ring).
    pub fn config_dir(&self) -> &Path {
        self.paths
            .server_config
            .parent()
            .unwrap_or_else(|| Path::new("/"))
    }
}

/// Raw TOML shape, the `serde` target before resolution.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_log_level")]
    log_level: String,
    paths: RawPaths,
    #[serde(default)]
    account: RawAccount,
    #[serde(default)]
    services: RawServices,
    #[serde(default)]
    fuse: RawFuse,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPaths {
    server_config: String,
    secret_ring: String,
    blob_dir: String,
}

// Each optional section is disabled when omitted; once present, `enabled`
// defaults to `true` so a section can be switched off without removing it.

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAccount {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_account_name")]
    user: String,
    #[serde(default = "default_account_name")]
    group: String,
}

impl Default for RawAccount {
    fn default() -> Self {
        Self {
            enabled: false,
            user: default_account_name(),
            group: default_account_name(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServices {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_conflicting_unit")]
    conflicting: String,
    #[serde(default = "default_database_unit")]
    database: String,
    #[serde(default = "default_server_unit")]
    server: String,
}

impl Default for RawServices {
    fn default() -> Self {
        Self {
            enabled: false,
            conflicting: default_conflicting_unit(),
            database: default_database_unit(),
            server: default_server_unit(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFuse {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_fuse_module")]
    module: String,
    #[serde(default = "default_fuse_device")]
    device: String,
    #[serde(default = "default_fuse_group")]
    group: String,
}

impl Default for RawFuse {
    fn default() -> Self {
        Self {
            enabled: false,
            module: default_fuse_module(),
            device: default_fuse_device(),
            group: default_fuse_group(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_account_name() -> String { "casd".to_string() }
fn default_conflicting_unit() -> String { "mysql".to_string() }
fn default_database_unit() -> String { "casd-mysql".to_string() }
fn default_server_unit() -> String { "casd".to_string() }
fn default_fuse_module() -> String { "fuse".to_string() }
fn default_fuse_device() -> String { "/dev/fuse".to_string() }
fn default_fuse_group() -> String { "fuse".to_string() }

fn default_true() -> bool {
    true
}

/// Load settings, honouring `CASD_PROVISION_CONFIG` and `CASD_PROVISION_LOG_LEVEL`.
pub fn load() -> Result<Config, AppError> {
    let path_override = env::var_os("CASD_PROVISION_CONFIG").map(PathBuf::from);
    let log_level_override = env::var("CASD_PROVISION_LOG_LEVEL").ok();
    load_from(path_override.as_deref(), log_level_override.as_deref())
}

/// Internal loader. Accepts an explicit path and optional override.
/// `None` selects the embedded defaults. Tests pass overrides directly
/// instead of mutating env vars.
pub fn load_from(path: Option<&Path>, log_level_override: Option<&str>) -> Result<Config, AppError> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
            parse(&raw, &path.display().to_string(), log_level_override)
        }
        None => parse(DEFAULT_TOML, "built-in defaults", log_level_override),
    }
}

/// Parse and resolve a TOML document. `origin` names the source in errors.
pub fn parse(raw: &str, origin: &str, log_level_override: Option<&str>) -> Result<Config, AppError> {
    let parsed: RawConfig = toml::from_str(raw)
        .map_err(|e| AppError::Config(format!("parse error in {origin}: {e}")))?;

    let paths = PathsConfig {
        server_config: required_path("paths.server_config", &parsed.paths.server_config)?,
        secret_ring: required_path("paths.secret_ring", &parsed.paths.secret_ring)?,
        blob_dir: required_path("paths.blob_dir", &parsed.paths.blob_dir)?,
    };
    if paths.server_config.file_name().is_none() {
        return Err(AppError::Config(format!(
            "paths.server_config must name a file, got {}",
            paths.server_config.display()
        )));
    }

    let account = parsed.account;
    if account.enabled && (account.user.is_empty() || account.group.is_empty()) {
        return Err(AppError::Config("account.user and account.group must not be empty".into()));
    }

    let services = parsed.services;
    if services.enabled
        && [&services.conflicting, &services.database, &services.server]
            .iter()
            .any(|unit| unit.is_empty())
    {
        return Err(AppError::Config("service unit names must not be empty".into()));
    }

    let fuse = parsed.fuse;
    if fuse.enabled && (fuse.module.is_empty() || fuse.group.is_empty()) {
        return Err(AppError::Config("fuse.module and fuse.group must not be empty".into()));
    }

    Ok(Config {
        log_level: log_level_override.unwrap_or(&parsed.log_level).to_string(),
        paths,
        account: AccountConfig {
            enabled: account.enabled,
            user: account.user,
            group: account.group,
        },
        services: ServicesConfig {
            enabled: services.enabled,
            conflicting: services.conflicting,
            database: services.database,
            server: services.server,
        },
        fuse: FuseConfig {
            enabled: fuse.enabled,
            module: fuse.module,
            device: expand_home(&fuse.device),
            group: fuse.group,
        },
    })
}

/// Non-empty and absolute once `~` is expanded.
fn required_path(key: &str, value: &str) -> Result<PathBuf, AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Config(format!("{key} must not be empty")));
    }
    let path = expand_home(value);
    if !path.is_absolute() {
        return Err(AppError::Config(format!(
            "{key} must be an absolute path, got {value}"
        )));
    }
    Ok(path)
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── sandbox settings ──────────────────────────────────────────────────────────

impl Config {
    /// Settings rooted under `root` with account, service and FUSE stages
    /// switched off, so no external commands are run. Used by tests.
    pub fn sandboxed(root: &Path) -> Self {
        let config_dir = root.join("config");
        Self {
            log_level: "info".into(),
            paths: PathsConfig {
                server_config: config_dir.join("server-config.json"),
                secret_ring: config_dir.join("identity-secring.ed25519"),
                blob_dir: root.join("var/blobs"),
            },
            account: AccountConfig {
                enabled: false,
                user: "casd".into(),
                group: "casd".into(),
            },
            services: ServicesConfig {
                enabled: false,
                conflicting: "mysql".into(),
                database: "casd-mysql".into(),
                server: "casd".into(),
            },
            fuse: FuseConfig {
                enabled: false,
                module: "fuse".into(),
                device: root.join("dev/fuse"),
                group: "fuse".into(),
            },
        }
    }
}
