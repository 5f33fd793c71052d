//! Owner-only directory creation and no-clobber atomic file writes.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::error::AppError;

/// Mode for directories this tool creates.
pub const PRIVATE_DIR_MODE: u32 = 0o700;
/// Mode for files this tool writes.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Create `path` and any missing parents. Newly created directories get
/// mode 0700; existing ones are left untouched.
///
/// Returns the directories this call created, outermost first.
pub fn create_private_dir(path: &Path) -> Result<Vec<PathBuf>, AppError> {
    let missing = missing_dirs(path)?;

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(PRIVATE_DIR_MODE);
    }
    builder
        .create(path)
        .map_err(|e| AppError::fs("create directory", path, e))?;
    Ok(missing)
}

/// `path` and its ancestors that do not exist yet, outermost first.
fn missing_dirs(path: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut missing = Vec::new();
    for dir in path.ancestors().filter(|d| !d.as_os_str().is_empty()) {
        match fs::symlink_metadata(dir) {
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::NotFound => missing.push(dir.to_path_buf()),
            Err(e) => return Err(AppError::fs("stat", dir, e)),
        }
    }
    missing.reverse();
    Ok(missing)
}

/// Write `contents` to `path` with mode 0600 without ever exposing a
/// partially written file and without replacing an existing one.
///
/// The bytes go to a sibling temp file which is synced and then hard-linked
/// into place; the link fails with `AlreadyExists` if `path` is taken.
pub fn write_new_private(path: &Path, contents: &[u8]) -> Result<(), AppError> {
    let tmp = temp_sibling(path);
    let file = open_temp(&tmp).map_err(|e| AppError::fs("create", &tmp, e))?;
    let result = fill(file, contents)
        .map_err(|e| AppError::fs("write", &tmp, e))
        .and_then(|()| fs::hard_link(&tmp, path).map_err(|e| AppError::fs("create", path, e)));

    // The temp name is only a staging handle; drop it whether or not the link succeeded.
    if let Err(e) = fs::remove_file(&tmp) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %tmp.display(), error = %e, "could not remove temp file");
        }
    }
    result
}

fn open_temp(tmp: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_FILE_MODE);
    }
    options.open(tmp)
}

fn fill(mut file: fs::File, contents: &[u8]) -> io::Result<()> {
    file.write_all(contents)?;
    file.sync_all()
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp-{}", std::process::id()))
}
