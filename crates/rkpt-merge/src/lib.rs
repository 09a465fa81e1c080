//! Schema-aware 3-way merge for Kubernetes resource YAML.
//!
//! Aligns resources by identity across the original upstream, updated
//! upstream and local versions of a package, then merges each resource
//! field by field. Local edits and upstream changes both survive; where
//! they collide the upstream side wins and the collision is reported as
//! a [`Conflict`] instead of failing the run.

mod identity;
mod merge;
mod resources;
mod schema;

pub use identity::{merge_comment, resource_id, ResourceId, MERGE_COMMENT_PREFIX};
pub use merge::{merge_resource, Conflict, Note};
pub use resources::{merge_sets, MergeOutput, Resource, ResourceKey, ResourceSet};
pub use schema::{element_key, MergeSchema};
