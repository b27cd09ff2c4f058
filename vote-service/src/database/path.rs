//! Checks on filesystem paths taken from the environment

use anyhow::{bail, Result};
use std::{
    fs,
    path::{Component, Path},
};

fn check_components(raw: &str, what: &str) -> Result<()> {
    if raw.is_empty() {
        bail!("Empty {} path", what);
    }

    if raw.contains('\0') || raw.contains(['\n', '\r', '\t']) {
        bail!("Invalid control characters in {} path", what);
    }

    if Path::new(raw)
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        bail!("Parent directory traversal is not allowed in {} path", what);
    }

    Ok(())
}

/// Rejects database paths that could escape the working tree or clobber
/// something that is not a plain file. `:memory:` is always allowed.
pub fn validate_db_path(db_path: &str) -> Result<()> {
    if db_path == ":memory:" {
        return Ok(());
    }

    check_components(db_path, "database")?;

    let path = Path::new(db_path);
    if path.file_name().is_none() {
        bail!("Database path must include a file name");
    }

    if let Ok(meta) = fs::symlink_metadata(path) {
        if meta.file_type().is_symlink() {
            bail!("Symlink path is not allowed for database path");
        }
        if meta.is_dir() {
            bail!("Database path points to a directory");
        }
    }

    Ok(())
}

/// Content directories may not exist yet, but must not be a file or symlink.
pub fn validate_content_dir(dir: &Path) -> Result<()> {
    let Some(raw) = dir.to_str() else {
        bail!("Content directory path is not valid UTF-8");
    };
    check_components(raw, "content directory")?;

    if let Ok(meta) = fs::symlink_metadata(dir) {
        if meta.file_type().is_symlink() {
            bail!("Symlink path is not allowed for content directory");
        }
        if !meta.is_dir() {
            bail!("Content directory path points to a file");
        }
    }

    Ok(())
}
