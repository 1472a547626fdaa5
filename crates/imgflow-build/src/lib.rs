//! imgflow image build and publish
//!
//! This crate runs the jobs of a parsed imgflow config concurrently:
//! one task per job, fail-fast cancellation, and output references
//! ordered by job then tag. The Docker Engine backend builds images from
//! a tar.gz build context and pushes them to container registries.

pub mod auth;
pub mod backend;
pub mod context;
pub mod docker;
pub mod error;
pub mod orchestrator;
pub mod os_release;
pub mod pusher;

pub use auth::RegistryAuth;
pub use backend::{BuildContext, ImageBackend};
pub use context::ContextBuilder;
pub use docker::{DockerBackend, DockerImage};
pub use error::{BuildError, BuildResult};
pub use orchestrator::{Orchestrator, read_jobs};
pub use os_release::DockerOsRelease;
pub use pusher::{ImagePusher, PushTarget, validate_tag};
