//! Source resolution for the Vane controller.
//!
//! A source repository materializes one revision of a configuration tree
//! into an immutable, content-addressed [`SourceTree`]. Failures here are
//! transient by definition; callers retry with backoff.

pub mod error;
pub mod repo;
pub mod tree;

pub use error::SourceError;
pub use repo::{DirSourceRepository, FixtureSourceRepository, SourceRepository};
pub use tree::SourceTree;
