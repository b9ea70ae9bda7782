use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::ConfigError;

pub const DOCKERFILE: &str = "Dockerfile";

/// Dockerfile used by the coverage build.
pub const COVERAGE_DOCKERFILE: &str = "Dockerfile.cov";

/// Looks up `Dockerfile<suffix>` in `source_dir`, falling back to the plain `Dockerfile` when the
/// suffixed one does not exist.
pub fn resolve(source_dir: &Path, suffix: &str) -> Result<PathBuf, ConfigError> {
    let plain = source_dir.join(DOCKERFILE);

    if !suffix.is_empty() {
        let suffixed = source_dir.join(format!("{DOCKERFILE}{suffix}"));
        if suffixed.is_file() {
            debug!("using {suffixed:?}");
            return Ok(suffixed);
        }
        warn!("{suffixed:?} does not exist, falling back to {plain:?}");
    }

    if plain.is_file() {
        Ok(plain)
    } else {
        Err(ConfigError::missing_dockerfile(&plain))
    }
}

/// Looks up the coverage Dockerfile in `source_dir`. There is no fallback, a coverage build from the
/// regular Dockerfile would not produce a coverage image.
pub fn resolve_coverage(source_dir: &Path) -> Result<PathBuf, ConfigError> {
    let path = source_dir.join(COVERAGE_DOCKERFILE);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ConfigError::missing_dockerfile(&path))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn source_dir(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            fs::write(dir.path().join(file), "FROM scratch\n").unwrap();
        }
        dir
    }

    #[test]
    fn test_plain_dockerfile() {
        let dir = source_dir(&["Dockerfile"]);
        assert_eq!(
            resolve(dir.path(), "").unwrap(),
            dir.path().join("Dockerfile")
        );
    }

    #[test]
    fn test_suffixed_dockerfile_is_preferred() {
        let dir = source_dir(&["Dockerfile", "Dockerfile.arm64"]);
        assert_eq!(
            resolve(dir.path(), ".arm64").unwrap(),
            dir.path().join("Dockerfile.arm64")
        );
    }

    #[test]
    fn test_missing_suffixed_dockerfile_falls_back() {
        let dir = source_dir(&["Dockerfile"]);
        assert_eq!(
            resolve(dir.path(), ".arm64").unwrap(),
            dir.path().join("Dockerfile")
        );
    }

    #[test]
    fn test_no_dockerfile_at_all() {
        let dir = source_dir(&[]);
        assert!(matches!(
            resolve(dir.path(), ".arm64"),
            Err(ConfigError::MissingDockerfile { path }) if path == dir.path().join("Dockerfile")
        ));
    }

    #[test]
    fn test_coverage_dockerfile_has_no_fallback() {
        let dir = source_dir(&["Dockerfile"]);
        assert!(resolve_coverage(dir.path()).is_err());

        fs::write(dir.path().join("Dockerfile.cov"), "FROM scratch\n").unwrap();
        assert_eq!(
            resolve_coverage(dir.path()).unwrap(),
            dir.path().join("Dockerfile.cov")
        );
    }
}
