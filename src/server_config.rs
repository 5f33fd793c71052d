//! Server configuration document: immutable base template, assembly with a
//! resolved identity and web UI credentials, and persistence.
//!
//! Field names follow the storage server's low-level JSON config format.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{cli::Credentials, error::AppError, fsutil, identity::Identity};

/// Auth scheme tag for username/password web UI access.
pub const AUTH_SCHEME: &str = "userpass";

/// Fully-populated server configuration, as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub listen: String,
    pub https: bool,
    pub identity: String,
    pub identity_secret_ring: PathBuf,
    pub blob_path: PathBuf,
    pub pack_related: bool,
    pub mysql: String,
    pub db_names: BTreeMap<String, String>,
    pub auth: String,
}

/// Deployment defaults that do not depend on identity or credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTemplate {
    pub listen: String,
    pub https: bool,
    pub blob_path: PathBuf,
    pub pack_related: bool,
    pub mysql: String,
    pub db_names: BTreeMap<String, String>,
}

impl BaseTemplate {
    /// Single-node defaults: HTTPS on `:3179`, related-blob packing, local
    /// MySQL as root, and the standard queue/cache/index database names.
    pub fn single_node(blob_path: &Path) -> Self {
        let db_names = [
            ("queue-sync-to-index", "sync_index_queue"),
            ("ui_thumbcache", "ui_thumbmeta_cache"),
            ("blobpacked_index", "blobpacked_index"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            listen: ":3179".into(),
            https: true,
            blob_path: blob_path.to_path_buf(),
            pack_related: true,
            mysql: "root@localhost:3306:".into(),
            db_names,
        }
    }

    /// Combine the template with an identity and credentials into a new document.
    pub fn assemble(&self, identity: &Identity, credentials: &Credentials) -> ServerConfig {
        ServerConfig {
            listen: self.listen.clone(),
            https: self.https,
            identity: identity.key_id.clone(),
            identity_secret_ring: identity.secret_ring.clone(),
            blob_path: self.blob_path.clone(),
            pack_related: self.pack_related,
            mysql: self.mysql.clone(),
            db_names: self.db_names.clone(),
            auth: auth_string(credentials),
        }
    }
}

/// `userpass:<username>:<password>`, unescaped.
pub fn auth_string(credentials: &Credentials) -> String {
    format!(
        "{AUTH_SCHEME}:{}:{}",
        credentials.username(),
        credentials.password()
    )
}

impl ServerConfig {
    /// Pretty-printed JSON with four-space indentation and a trailing newline.
    pub fn to_json(&self) -> Result<Vec<u8>, AppError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Persist to `path` (mode 0600). Never replaces an existing document.
    pub fn write_new(&self, path: &Path) -> Result<(), AppError> {
        let data = self.to_json()?;
        fsutil::write_new_private(path, &data)?;
        info!(path = %path.display(), bytes = data.len(), "server config written");
        Ok(())
    }

    /// Read a document back from disk.
    pub fn read(path: &Path) -> Result<Self, AppError> {
        let data = std::fs::read(path).map_err(|e| AppError::fs("read", path, e))?;
        Ok(serde_json::from_slice(&data)?)
    }
}
