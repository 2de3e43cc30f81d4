//! Cache directory resolution.

use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV_VAR: &str = "VIGIL_CACHE_DIR";

const APP_DIR: &str = "vigil";

/// Where the cache directory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirSource {
    Explicit,
    Environment,
    Xdg,
    Platform,
    Temp,
}

/// Resolve the cache directory.
///
/// Order: explicit directory, `VIGIL_CACHE_DIR`, `XDG_CACHE_HOME/vigil`,
/// the platform cache directory, then the system temp directory.
pub fn resolve_cache_dir(explicit: Option<&Path>) -> (PathBuf, CacheDirSource) {
    if let Some(dir) = explicit {
        return (dir.to_path_buf(), CacheDirSource::Explicit);
    }

    if let Some(dir) = non_empty_env(CACHE_DIR_ENV_VAR) {
        return (PathBuf::from(dir), CacheDirSource::Environment);
    }

    if let Some(xdg) = non_empty_env("XDG_CACHE_HOME") {
        return (PathBuf::from(xdg).join(APP_DIR), CacheDirSource::Xdg);
    }

    if let Some(platform) = dirs::cache_dir() {
        return (platform.join(APP_DIR), CacheDirSource::Platform);
    }

    (
        std::env::temp_dir().join(format!("{APP_DIR}_cache")),
        CacheDirSource::Temp,
    )
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
