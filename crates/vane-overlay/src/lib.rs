//! Overlay compilation for the Vane controller.
//!
//! Turns a materialized source tree into the concrete desired resource set
//! for one environment: a base layer of manifests, refined by a chain of
//! overlays, each applying its patches and then its transformers in a fixed
//! deterministic order. Overlays are pure functions over the resource set;
//! the base is never mutated in place.

pub mod compile;
pub mod error;
pub mod model;
pub mod patch;
pub mod transform;

pub use compile::{compile, CompileParams};
pub use error::CompileError;
pub use model::{ImageSubstitution, Overlay, Patch, PatchTarget, ReplicaOverride, Transformers};
