//! Server signing identity: ed25519 key ring generation, reuse, and
//! key identifier derivation.
//!
//! Ring file layout (ASCII armor, mode 0600):
//! ```text
//! -----BEGIN CASD SECRET RING-----
//! Key-Id: 9F3A61C07B2D44E1
//!
//! <base64 of the 32-byte ed25519 signing key seed>
//! -----END CASD SECRET RING-----
//! ```
//!
//! The key identifier is the first 16 uppercase hex characters of
//! `SHA256(verifying_key_bytes)`.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::{error::AppError, fsutil};

const ARMOR_BEGIN: &str = "-----BEGIN CASD SECRET RING-----";
const ARMOR_END: &str = "-----END CASD SECRET RING-----";
const KEY_ID_HEADER: &str = "Key-Id:";
const KEY_ID_LEN: usize = 16;

/// Resolved signing identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub key_id: String,
    /// Ring the key lives in; recorded alongside `key_id` in the server config.
    pub secret_ring: PathBuf,
    /// `true` when the ring already existed before this run.
    pub reused: bool,
}

/// Signing-identity collaborator: reads and creates key ring files.
pub trait KeyRing {
    /// Extract the key identifier from an existing ring.
    fn key_id_from_ring(&self, ring: &Path) -> Result<String, AppError>;

    /// Create a brand-new ring at `ring` and return its key identifier.
    /// Must fail rather than replace an existing file.
    fn generate_ring(&self, ring: &Path) -> Result<String, AppError>;
}

/// Reuse the ring at `ring` if present, else generate one there.
///
/// An unreadable or corrupt existing ring is fatal; falling back to a fresh
/// key would orphan everything already signed with the old one.
pub fn resolve(key_ring: &dyn KeyRing, ring: &Path) -> Result<Identity, AppError> {
    match fs::metadata(ring) {
        Ok(_) => {
            let key_id = key_ring.key_id_from_ring(ring).map_err(|e| {
                AppError::Identity(format!(
                    "could not find any key id in {}: {}",
                    ring.display(),
                    detail(&e)
                ))
            })?;
            info!(key_id = %key_id, ring = %ring.display(), "re-using existing identity");
            Ok(Identity {
                key_id,
                secret_ring: ring.to_path_buf(),
                reused: true,
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let key_id = key_ring.generate_ring(ring).map_err(|e| {
                AppError::Identity(format!(
                    "could not generate new secret ring at {}: {}",
                    ring.display(),
                    detail(&e)
                ))
            })?;
            info!(key_id = %key_id, ring = %ring.display(), "generated new identity");
            Ok(Identity {
                key_id,
                secret_ring: ring.to_path_buf(),
                reused: false,
            })
        }
        Err(e) => Err(AppError::fs("stat secret ring", ring, e)),
    }
}

/// Message of a collaborator error without repeating the `identity error:` prefix.
fn detail(e: &AppError) -> String {
    match e {
        AppError::Identity(msg) => msg.clone(),
        other => other.to_string(),
    }
}

// ── ed25519 ring ──────────────────────────────────────────────────────────────

/// Production [`KeyRing`]: one ed25519 key per armored ring file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519KeyRing;

impl KeyRing for Ed25519KeyRing {
    fn key_id_from_ring(&self, ring: &Path) -> Result<String, AppError> {
        let text = fs::read_to_string(ring).map_err(|e| AppError::fs("read", ring, e))?;
        let seed = parse_ring(&text)?;
        Ok(compute_key_id(&verifying_key_of(&seed)))
    }

    fn generate_ring(&self, ring: &Path) -> Result<String, AppError> {
        let seed = generate_seed();
        let key_id = compute_key_id(&verifying_key_of(&seed));
        fsutil::write_new_private(ring, encode_ring(&key_id, &seed).as_bytes())?;
        Ok(key_id)
    }
}

// ── internals ────────────────────────────────────────────────────────────────

fn generate_seed() -> [u8; 32] {
    SigningKey::generate(&mut OsRng).to_bytes()
}

fn verifying_key_of(seed: &[u8; 32]) -> [u8; 32] {
    SigningKey::from_bytes(seed).verifying_key().to_bytes()
}

/// Derive the key identifier: first 16 uppercase hex chars of `SHA256(vk)`.
pub fn compute_key_id(verifying_key_bytes: &[u8; 32]) -> String {
    let digest = Sha256::digest(verifying_key_bytes);
    hex::encode_upper(digest)[..KEY_ID_LEN].to_string()
}

fn encode_ring(key_id: &str, seed: &[u8; 32]) -> String {
    format!(
        "{ARMOR_BEGIN}\n{KEY_ID_HEADER} {key_id}\n\n{}\n{ARMOR_END}\n",
        STANDARD.encode(seed)
    )
}

/// Parse an armored ring and return the signing key seed.
fn parse_ring(text: &str) -> Result<[u8; 32], AppError> {
    let corrupt = |what: &str| AppError::Identity(format!("malformed secret ring: {what}"));

    if text.trim().is_empty() {
        return Err(corrupt("file is empty"));
    }
    let body = text
        .trim()
        .strip_prefix(ARMOR_BEGIN)
        .and_then(|rest| rest.strip_suffix(ARMOR_END))
        .ok_or_else(|| corrupt("missing armor lines"))?;

    let mut declared_id = None;
    let mut payload = String::new();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(id) = line.strip_prefix(KEY_ID_HEADER) {
            declared_id = Some(id.trim().to_string());
        } else {
            payload.push_str(line);
        }
    }
    if payload.is_empty() {
        return Err(corrupt("no key material"));
    }

    let seed: [u8; 32] = STANDARD
        .decode(&payload)
        .map_err(|e| corrupt(&format!("key material is not base64: {e}")))?
        .try_into()
        .map_err(|_| corrupt("key material is not 32 bytes"))?;

    // Validate: the header, when present, must name this key.
    if let Some(declared) = declared_id {
        let derived = compute_key_id(&verifying_key_of(&seed));
        if declared != derived {
            return Err(corrupt(&format!(
                "Key-Id header {declared} does not match key {derived}"
            )));
        }
    }
    Ok(seed)
}

// ── tests ─────────────────────────────────────────────────────────────────────
