use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use semver::Version;

/// Runner name whose old releases need `tag -f` to move an existing tag.
const LEGACY_RUNNER: &str = "docker";

/// First release of the legacy runner that moves tags without `-f`.
const FORCE_TAG_REMOVED_IN: Version = Version::new(1, 12, 0);

static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+) version (\d+)\.(\d+)\.(\d+)").expect("version pattern is valid")
});

/// The name and version of the container runtime, as reported by `<binary> -v`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVersion {
    pub runner: String,
    pub version: Version,
}

impl RuntimeVersion {
    pub fn requires_force_tag(&self) -> bool {
        self.runner.eq_ignore_ascii_case(LEGACY_RUNNER)
            && self.version.major == 1
            && self.version < FORCE_TAG_REMOVED_IN
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.runner, self.version)
    }
}

impl FromStr for RuntimeVersion {
    type Err = VersionParseError;

    /// Parses the first line of the output, e.g. `Docker version 1.11.2, build b9f10c9`.
    fn from_str(output: &str) -> Result<Self, Self::Err> {
        let line = output.lines().next().unwrap_or_default();
        let error = || VersionParseError {
            line: line.to_owned(),
        };

        let captures = VERSION_LINE.captures(line).ok_or_else(error)?;
        let number = |index: usize| -> Result<u64, VersionParseError> {
            captures[index].parse().map_err(|_| error())
        };

        Ok(RuntimeVersion {
            runner: captures[1].to_owned(),
            version: Version::new(number(2)?, number(3)?, number(4)?),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct VersionParseError {
    line: String,
}

impl fmt::Display for VersionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unable to determine the container runtime version from {:?}, expected `<runner> version <major>.<minor>.<patch>`",
            self.line
        )
    }
}

impl std::error::Error for VersionParseError {}
