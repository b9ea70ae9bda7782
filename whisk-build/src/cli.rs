use std::path::PathBuf;

use clap::{Parser, Subcommand};
use constcat::concat;

use crate::{
    config::{BuildConfig, ConfigArgs},
    docker::dockerfile::COVERAGE_DOCKERFILE,
    executor::ProcessRunner,
    pipeline::{coverage::STAGING_DIR, Pipeline},
    Result,
};

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the image, then tag it and push it if a registry is configured
    Build,

    /// Build the coverage image from precompiled artifacts and tag it
    #[command(name = "build-coverage", arg_required_else_help = true)]
    BuildCoverage {
        #[arg(long = "artifacts", help = concat!("Directory of precompiled artifacts, staged into `", STAGING_DIR, "` below the source directory for `", COVERAGE_DOCKERFILE, "` to pick up."))]
        artifacts: PathBuf,
    },

    /// Tag the built image
    Tag,

    /// Tag the built image and push it if a registry is configured
    Push,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config = BuildConfig::try_from(self.config)?;
        let pipeline = Pipeline::new(&config, &ProcessRunner);

        match self.command {
            Commands::Build => {
                pipeline.build()?;
            }
            Commands::BuildCoverage { artifacts } => {
                pipeline.build_coverage(&artifacts)?;
            }
            Commands::Tag => {
                pipeline.tag()?;
            }
            Commands::Push => {
                pipeline.push()?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_after_subcommand() {
        let cli =
            Cli::try_parse_from(["whisk-build", "push", "--image-name", "invoker", "--tag", "v1"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Push));
        assert_eq!(cli.config.image_name.as_deref(), Some("invoker"));
        assert_eq!(cli.config.tag, "v1");
    }

    #[test]
    fn test_build_coverage_requires_artifacts() {
        assert!(Cli::try_parse_from(["whisk-build", "build-coverage"]).is_err());
        let cli = Cli::try_parse_from(["whisk-build", "build-coverage", "--artifacts", "out"])
            .unwrap();
        assert!(
            matches!(cli.command, Commands::BuildCoverage { ref artifacts } if *artifacts == PathBuf::from("out"))
        );
    }

    #[test]
    fn test_missing_image_name_fails_before_running_anything() {
        let cli = Cli::try_parse_from(["whisk-build", "build", "--binary", "false"]).unwrap();
        let error = cli.run().unwrap_err();
        assert!(error.to_string().contains("no image name configured"));
    }
}
