//! Command lines for the container binary.

use std::{fmt, path::Path};

use crate::{config::BuildConfig, image::ImageName, process};

pub mod dockerfile;
pub mod version;

/// Name of the base image multi-arch builds are pointed at when no `BASE` build argument is given.
pub const SCALA_BASE_IMAGE: &str = "scala";

/// One invocation of an external program: the program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    pub fn program(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Creates a fresh [`process::Command`] for this command line.
    pub fn to_command(&self) -> process::Command {
        process::Command::new(self.program()).args(self.args())
    }

    fn push<S: Into<String>>(&mut self, arg: S) {
        self.0.push(arg.into());
    }

    fn extend<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(args.into_iter().map(Into::into));
    }
}

impl<S: Into<String>> FromIterator<S> for CommandLine {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        CommandLine(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Returns the binary and, if configured, the host it should talk to. Every command starts with
/// this.
fn docker(config: &BuildConfig) -> CommandLine {
    let mut command = CommandLine(config.binary.clone());
    if let Some(host) = config.host.as_deref() {
        command.extend(["--host", host]);
    }
    command
}

fn has_base_build_arg(build_args: &[String]) -> bool {
    build_args
        .iter()
        .any(|arg| arg.split_once('=').map_or(arg.as_str(), |(key, _)| key).trim() == "BASE")
}

pub fn build(config: &BuildConfig, dockerfile: &Path, image_name: &str) -> CommandLine {
    let mut command = docker(config);
    if config.multi_arch {
        command.push("buildx");
    }
    command.push("build");

    for arg in &config.build_args {
        command.extend(["--build-arg", arg.as_str()]);
    }
    if config.multi_arch && !has_base_build_arg(&config.build_args) {
        let base = ImageName::new(
            config.registry.as_deref(),
            &config.prefix,
            SCALA_BASE_IMAGE,
            &config.tag,
        );
        command.extend(["--build-arg".to_owned(), format!("BASE={base}")]);
    }

    command.push("-f");
    command.push(dockerfile.to_string_lossy());
    command.extend(["-t", image_name]);
    command.push(config.source_dir.to_string_lossy());

    if config.multi_arch {
        command.push("--load");
    }
    command
}

/// `force` is required by runtimes that refuse to move an existing tag, see
/// [`version::RuntimeVersion::requires_force_tag`].
pub fn tag(config: &BuildConfig, force: bool, source: &str, target: &ImageName) -> CommandLine {
    let mut command = docker(config);
    command.push("tag");
    if force {
        command.push("-f");
    }
    command.push(source);
    command.push(target.to_string());
    command
}

pub fn push(config: &BuildConfig, target: &ImageName) -> CommandLine {
    let mut command = docker(config);
    command.push("push");
    command.push(target.to_string());
    command
}

pub fn version(config: &BuildConfig) -> CommandLine {
    let mut command = docker(config);
    command.push("-v");
    command
}
