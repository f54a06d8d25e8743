// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod layer;
pub mod memory;
pub mod prefs;
pub mod snapshot;
pub mod sqlite;
pub mod storage;

pub use layer::*;
pub use memory::*;
pub use prefs::*;
pub use snapshot::*;
pub use sqlite::*;
pub use storage::*;

use anyhow::{Context, Result, anyhow, bail};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const APP_NAME: &str = "syncdash";

pub fn default_storage_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("SYNCDASH_STORAGE_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set SYNCDASH_STORAGE_PATH to a writable file path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("storage.db"))
}

pub fn validate_storage_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("storage path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "storage path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("storage path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "storage path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_storage_path;

    #[test]
    fn storage_path_rejects_uri_forms() {
        assert!(validate_storage_path("").is_err());
        assert!(validate_storage_path("file:state.db").is_err());
        assert!(validate_storage_path("https://example.com/state.db").is_err());
        assert!(validate_storage_path("state.db?mode=ro").is_err());
        assert!(validate_storage_path(":memory:").is_ok());
        assert!(validate_storage_path("/tmp/syncdash/storage.db").is_ok());
    }
}
