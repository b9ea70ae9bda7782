use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use walkdir::WalkDir;

use crate::Result;

/// Where precompiled coverage artifacts are staged, relative to the source directory. The coverage
/// Dockerfile copies them from here.
pub const STAGING_DIR: &str = "build/tmp/docker-coverage";

/// Copies the contents of `artifacts` into the staging directory below `source_dir`, replacing
/// whatever a previous build staged there. Returns the staging directory.
///
/// The artifacts may contain the staging directory, e.g. when they are the `build` directory of the
/// source directory; it is skipped while copying. Artifacts inside the staging directory are
/// rejected since staging starts by removing it.
pub fn stage(artifacts: &Path, source_dir: &Path) -> Result<PathBuf> {
    if !artifacts.is_dir() {
        return Err(format!("coverage artifacts directory {artifacts:?} does not exist").into());
    }
    let artifacts = artifacts.canonicalize()?;

    let staging = source_dir.canonicalize()?.join(STAGING_DIR);
    if artifacts.starts_with(&staging) {
        return Err(format!(
            "coverage artifacts directory {artifacts:?} must not be inside the staging directory {staging:?}"
        )
        .into());
    }

    if staging.exists() {
        debug!("removing previously staged artifacts in {staging:?}");
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let mut count = 0usize;
    let entries = WalkDir::new(&artifacts)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.path() != staging);
    for entry in entries {
        let entry = entry?;
        let target = staging.join(entry.path().strip_prefix(&artifacts)?);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|error| {
                format!("failed to stage {path:?}: {error}", path = entry.path())
            })?;
            count += 1;
        }
    }

    info!("staged {count} coverage artifacts from {artifacts:?} into {staging:?}");
    Ok(staging)
}
