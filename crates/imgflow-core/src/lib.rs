//! imgflow core functionality
//!
//! This crate provides the job model, the template function registry,
//! template rendering and config parsing for imgflow. Its output is the
//! canonical JSON form of the config, which the build stage consumes.

pub mod error;
pub mod model;
pub mod onepassword;
pub mod os_release;
pub mod parser;
pub mod secrets;
pub mod source;
pub mod template;

pub use error::{ConfigError, Result};
pub use model::{Config, ConfString, DEFAULT_CONTAINERFILE, Job, read_conf_string};
pub use os_release::{OsReleaseFunction, OsReleaseSource, parse_os_release};
pub use parser::{Format, ParseOptions, parse, parse_config, parse_source};
pub use secrets::{SecretHandle, SecretMap, SecretRef, secrets_to_map};
pub use source::{ConfigSource, FileSource};
pub use template::{FunctionRegistry, TemplateProcessor, Variables};
