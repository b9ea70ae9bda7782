use std::fmt;

/// Tag given to images produced by the coverage build.
pub const COVERAGE_TAG: &str = "cov";

/// A fully qualified image name of the form `[registry/]prefix/name:tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageName<'a> {
    pub registry: Option<&'a str>,
    pub prefix: &'a str,
    pub name: &'a str,
    pub tag: &'a str,
}

impl<'a> ImageName<'a> {
    pub fn new(registry: Option<&'a str>, prefix: &'a str, name: &'a str, tag: &'a str) -> Self {
        ImageName {
            registry,
            prefix,
            name,
            tag,
        }
    }

    /// Returns the same image with a different tag.
    pub fn with_tag(self, tag: &'a str) -> Self {
        ImageName { tag, ..self }
    }
}

impl fmt::Display for ImageName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = self.registry {
            write!(f, "{registry}/")?;
        }
        write!(
            f,
            "{prefix}/{name}:{tag}",
            prefix = self.prefix,
            name = self.name,
            tag = self.tag
        )
    }
}

/// The local name of the image produced by the coverage build of `name`.
pub fn coverage_image_name(name: &str) -> String {
    format!("{name}-cov")
}
