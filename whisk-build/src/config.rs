use std::{
    fmt, io,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Args;
use constcat::concat;

use crate::{docker::dockerfile::DOCKERFILE, image::ImageName};

pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_PREFIX: &str = "whisk";
pub const DEFAULT_BINARY: &str = "docker";
pub const DEFAULT_TIMEOUT_SECS: u64 = 840;
pub const DEFAULT_RETRIES: u32 = 3;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Name of the image to build, e.g. `invoker`.
    #[arg(long = "image-name", env = "WHISK_IMAGE_NAME", global = true)]
    pub image_name: Option<String>,

    /// Registry to push to. Images are only pushed when a registry is configured.
    #[arg(long = "registry", env = "WHISK_REGISTRY", global = true)]
    pub registry: Option<String>,

    #[arg(long = "tag", env = "WHISK_IMAGE_TAG", global = true, default_value = DEFAULT_TAG)]
    pub tag: String,

    /// Path component between the registry and the image name.
    #[arg(long = "prefix", env = "WHISK_IMAGE_PREFIX", global = true, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Seconds after which a single invocation of the container binary is stopped.
    #[arg(long = "timeout", env = "WHISK_TIMEOUT", global = true, default_value_t = DEFAULT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// How many times a failing invocation is attempted before giving up.
    #[arg(long = "retries", env = "WHISK_RETRIES", global = true, default_value_t = DEFAULT_RETRIES, value_parser = clap::value_parser!(u32).range(1..))]
    pub retries: u32,

    /// The container binary. May contain several whitespace separated words, e.g. `sudo docker`.
    #[arg(long = "binary", env = "WHISK_BINARY", global = true, default_value = DEFAULT_BINARY)]
    pub binary: String,

    #[arg(long = "dockerfile-suffix", env = "WHISK_DOCKERFILE_SUFFIX", global = true, default_value = "", help = concat!("Suffix appended to `", DOCKERFILE, "` when looking up the Dockerfile. Falls back to the plain `", DOCKERFILE, "` if the suffixed one does not exist."))]
    pub dockerfile_suffix: String,

    /// Build through `buildx` so that the image can target several architectures.
    #[arg(long = "multi-arch", env = "WHISK_MULTI_ARCH", global = true)]
    pub multi_arch: bool,

    /// Daemon socket to connect to, passed on as `--host`.
    #[arg(long = "host", env = "WHISK_DOCKER_HOST", global = true)]
    pub host: Option<String>,

    /// Build argument of the form `KEY=VALUE`, passed on verbatim. May be repeated; order is
    /// preserved.
    #[arg(long = "build-arg", global = true)]
    pub build_args: Vec<String>,

    /// Comma separated build arguments, passed on before any `--build-arg`. Values containing a
    /// comma have to be given with `--build-arg`.
    #[arg(long = "build-args", env = "WHISK_BUILD_ARGS", global = true, value_delimiter = ',')]
    pub build_arg_list: Vec<String>,

    #[arg(long = "source-dir", env = "WHISK_SOURCE_DIR", global = true, default_value = ".", help = concat!("Directory containing the `", DOCKERFILE, "`. Also used as the build context."))]
    pub source_dir: PathBuf,
}

/// Everything needed to drive a build, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub image_name: String,
    pub registry: Option<String>,
    pub tag: String,
    pub prefix: String,
    pub dockerfile_suffix: String,
    pub multi_arch: bool,
    pub build_args: Vec<String>,
    pub timeout: Duration,
    pub retries: u32,
    /// The binary followed by any leading arguments, never empty.
    pub binary: Vec<String>,
    pub host: Option<String>,
    pub source_dir: PathBuf,
}

impl BuildConfig {
    /// Creates a configuration with default values for everything but the image name and the
    /// source directory.
    #[cfg(test)]
    pub fn new(image_name: impl Into<String>, source_dir: impl Into<PathBuf>) -> Self {
        BuildConfig {
            image_name: image_name.into(),
            registry: None,
            tag: DEFAULT_TAG.to_owned(),
            prefix: DEFAULT_PREFIX.to_owned(),
            dockerfile_suffix: String::new(),
            multi_arch: false,
            build_args: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            binary: vec![DEFAULT_BINARY.to_owned()],
            host: None,
            source_dir: source_dir.into(),
        }
    }

    /// The name the built image is tagged as, and pushed under if a registry is configured.
    pub fn tagged_image(&self) -> ImageName<'_> {
        ImageName::new(
            self.registry.as_deref(),
            &self.prefix,
            &self.image_name,
            &self.tag,
        )
    }
}

impl TryFrom<ConfigArgs> for BuildConfig {
    type Error = ConfigError;

    fn try_from(args: ConfigArgs) -> Result<Self, Self::Error> {
        let ConfigArgs {
            image_name,
            registry,
            tag,
            prefix,
            timeout,
            retries,
            binary,
            dockerfile_suffix,
            multi_arch,
            host,
            build_args,
            build_arg_list,
            source_dir,
        } = args;

        let image_name = image_name
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingImageName)?;

        let registry = registry
            .map(|value| value.trim().trim_end_matches('/').to_owned())
            .filter(|value| !value.is_empty());

        let host = host.filter(|value| !value.trim().is_empty());

        let tag = non_empty("tag", tag)?;
        let prefix = non_empty("prefix", prefix)?;

        let binary = binary
            .split_whitespace()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        if binary.is_empty() {
            return Err(ConfigError::Empty { option: "binary" });
        }

        let build_args = build_arg_list
            .into_iter()
            .chain(build_args)
            .filter(|value| !value.is_empty())
            .collect();

        let source_dir = source_dir
            .canonicalize()
            .map_err(|error| ConfigError::SourceDir {
                path: source_dir.clone(),
                error,
            })?;
        if !source_dir.is_dir() {
            return Err(ConfigError::SourceDir {
                path: source_dir,
                error: io::Error::new(io::ErrorKind::Other, "not a directory"),
            });
        }

        Ok(BuildConfig {
            image_name,
            registry,
            tag,
            prefix,
            dockerfile_suffix,
            multi_arch,
            build_args,
            timeout: Duration::from_secs(timeout),
            retries,
            binary,
            host,
            source_dir,
        })
    }
}

fn non_empty(option: &'static str, value: String) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ConfigError::Empty { option })
    } else {
        Ok(value.to_owned())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingImageName,
    Empty { option: &'static str },
    SourceDir { path: PathBuf, error: io::Error },
    MissingDockerfile { path: PathBuf },
}

impl ConfigError {
    pub fn missing_dockerfile(path: &Path) -> Self {
        ConfigError::MissingDockerfile {
            path: path.to_owned(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingImageName => write!(
                f,
                "no image name configured, pass `--image-name` or set `WHISK_IMAGE_NAME`"
            ),
            ConfigError::Empty { option } => write!(f, "the `--{option}` option must not be empty"),
            ConfigError::SourceDir { path, error } => {
                write!(f, "invalid source directory {path:?}: {error}")
            }
            ConfigError::MissingDockerfile { path } => {
                write!(f, "no Dockerfile found at {path:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::SourceDir { error, .. } => Some(error),
            _ => None,
        }
    }
}
