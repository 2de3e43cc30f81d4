use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::core::VigilConfig;
use crate::errors::{Error, Result};

/// File name searched for in the working directory and its ancestors
pub const CONFIG_FILE_NAME: &str = ".vigil.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "VIGIL_CONFIG";

/// Pure function to read config file contents
pub(crate) fn read_config_file(path: &Path) -> std::result::Result<String, std::io::Error> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Parse and validate config from a TOML string
pub fn parse_and_validate_config(contents: &str) -> Result<VigilConfig> {
    let config = toml::from_str::<VigilConfig>(contents)?;
    config.validate()?;
    Ok(config)
}

/// Load a config file, failing on read, parse or validation errors
pub fn load_config_from(path: &Path) -> Result<VigilConfig> {
    let contents = read_config_file(path)
        .map_err(|e| Error::config_with_path(format!("failed to read: {e}"), path))?;
    parse_and_validate_config(&contents).map_err(|e| match e {
        Error::Config { message, .. } => Error::config_with_path(message, path),
        Error::Toml(toml_err) => Error::config_with_path(toml_err.to_string(), path),
        other => other,
    })
}

/// Try loading config from a specific path, logging instead of failing
pub(crate) fn try_load_config_from_path(config_path: &Path) -> Option<VigilConfig> {
    let contents = match read_config_file(config_path) {
        Ok(contents) => contents,
        Err(e) => {
            handle_read_error(config_path, &e);
            return None;
        }
    };

    match parse_and_validate_config(&contents) {
        Ok(config) => {
            tracing::debug!("Loaded config from {}", config_path.display());
            Some(config)
        }
        Err(e) => {
            tracing::warn!("Ignoring {}: {}. Using defaults.", config_path.display(), e);
            None
        }
    }
}

/// Handle file read errors with appropriate logging
pub(crate) fn handle_read_error(config_path: &Path, error: &std::io::Error) {
    // Only log actual errors, not "file not found"
    if error.kind() != std::io::ErrorKind::NotFound {
        tracing::warn!(
            "Failed to read config file {}: {}",
            config_path.display(),
            error
        );
    }
}

/// Generate directory ancestors up to a depth limit
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Find the nearest config file starting at `start`
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    const MAX_TRAVERSAL_DEPTH: usize = 10;

    directory_ancestors(start.to_path_buf(), MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|path| path.is_file())
}

/// Load configuration from `VIGIL_CONFIG` or the nearest `.vigil.toml`,
/// falling back to defaults.
pub fn load_config() -> VigilConfig {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        if let Some(config) = try_load_config_from_path(Path::new(&explicit)) {
            return config;
        }
    }

    let current = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(
                "Failed to get current directory: {}. Using default config.",
                e
            );
            return VigilConfig::default();
        }
    };

    find_config_file(&current)
        .and_then(|path| try_load_config_from_path(&path))
        .unwrap_or_else(|| {
            tracing::debug!("No config found. Using default config.");
            VigilConfig::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use tempfile::TempDir;

    #[test]
    fn test_parse_partial_config() {
        let config = parse_and_validate_config(indoc! {r#"
            secrets_analyzer = "gitleaks"

            [scheduler]
            max_workers = 2

            [cache]
            max_entries = 50
        "#})
        .unwrap();

        assert_eq!(config.scheduler.max_workers, 2);
        assert_eq!(config.cache.max_entries, 50);
        assert_eq!(config.secrets_analyzer, "gitleaks");
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = parse_and_validate_config("[scheduler]\nmax_workers = 0\n").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            parse_and_validate_config("[scheduler\n"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_directory_ancestors() {
        let dirs: Vec<_> = directory_ancestors(PathBuf::from("/a/b/c"), 10).collect();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/a/b/c"),
                PathBuf::from("/a/b"),
                PathBuf::from("/a"),
                PathBuf::from("/")
            ]
        );
    }

    #[test]
    fn test_find_config_in_ancestor() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.path().join(CONFIG_FILE_NAME), "[cache]\nmax_entries = 5\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        let config = load_config_from(&found).unwrap();
        assert_eq!(config.cache.max_entries, 5);
    }

    #[test]
    fn test_load_config_from_reports_path() {
        let root = TempDir::new().unwrap();
        let path = root.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[bulkhead]\nmax_concurrent = 0\n").unwrap();

        match load_config_from(&path) {
            Err(Error::Config { path: Some(p), .. }) => assert_eq!(p, path),
            other => panic!("expected config error with path, got {other:?}"),
        }
    }
}
