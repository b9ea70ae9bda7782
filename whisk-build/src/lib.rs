pub(crate) mod config;
pub(crate) mod docker;
pub(crate) mod executor;
pub(crate) mod image;
pub(crate) mod pipeline;
pub(crate) mod process;

pub mod cli;

pub(crate) type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
