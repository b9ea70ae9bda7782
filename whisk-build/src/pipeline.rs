//! Sequences the build, tag and push steps.
//!
//! Every step runs to completion before the next one starts and the first failure aborts the
//! remaining steps. Nothing is rolled back; images built or tagged before the failure stay around.

use std::{path::Path, time::Instant};

use log::{debug, info};

use crate::{
    config::BuildConfig,
    docker::{self, dockerfile, version::RuntimeVersion, CommandLine},
    executor::{self, Runner},
    image::{self, ImageName, COVERAGE_TAG},
    Result,
};

pub mod coverage;

pub struct Pipeline<'a, R: ?Sized> {
    config: &'a BuildConfig,
    runner: &'a R,
}

impl<'a, R: Runner + ?Sized> Pipeline<'a, R> {
    pub fn new(config: &'a BuildConfig, runner: &'a R) -> Self {
        Pipeline { config, runner }
    }

    /// Builds the image and then pushes it, see [`Pipeline::push`].
    pub fn build(&self) -> Result<()> {
        let dockerfile =
            dockerfile::resolve(&self.config.source_dir, &self.config.dockerfile_suffix)?;
        self.build_image(&dockerfile, &self.config.image_name)?;
        self.push()
    }

    /// Builds the coverage image from the coverage Dockerfile after staging `artifacts`, then tags
    /// it with the coverage tag.
    pub fn build_coverage(&self, artifacts: &Path) -> Result<()> {
        let dockerfile = dockerfile::resolve_coverage(&self.config.source_dir)?;
        coverage::stage(artifacts, &self.config.source_dir)?;

        let image_name = image::coverage_image_name(&self.config.image_name);
        self.build_image(&dockerfile, &image_name)?;
        self.tag_image(
            &image_name,
            &self.config.tagged_image().with_tag(COVERAGE_TAG),
        )
    }

    pub fn tag(&self) -> Result<()> {
        self.tag_image(&self.config.image_name, &self.config.tagged_image())
    }

    /// Tags the image and pushes it if a registry is configured.
    pub fn push(&self) -> Result<()> {
        self.tag()?;

        let target = self.config.tagged_image();
        if target.registry.is_none() {
            info!("no registry configured, not pushing {target}");
            return Ok(());
        }
        self.execute(&docker::push(self.config, &target))
    }

    fn build_image(&self, dockerfile: &Path, image_name: &str) -> Result<()> {
        let started = Instant::now();
        self.execute(&docker::build(self.config, dockerfile, image_name))?;
        info!(
            "building {image_name:?} took {elapsed:.1?}",
            elapsed = started.elapsed()
        );
        Ok(())
    }

    fn tag_image(&self, source: &str, target: &ImageName) -> Result<()> {
        let force = self.runtime_version()?.requires_force_tag();
        self.execute(&docker::tag(self.config, force, source, target))
    }

    /// Asks the binary for its version. This is not retried and gets the same timeout as every
    /// other command. Output that does not parse is fatal.
    fn runtime_version(&self) -> Result<RuntimeVersion> {
        let output = self
            .runner
            .capture(&docker::version(self.config), self.config.timeout)?;
        let version = output.parse::<RuntimeVersion>()?;
        debug!("container runtime: {version}");
        Ok(version)
    }

    fn execute(&self, command: &CommandLine) -> Result<()> {
        executor::execute(
            self.runner,
            command,
            self.config.retries,
            self.config.timeout,
        )
    }
}
