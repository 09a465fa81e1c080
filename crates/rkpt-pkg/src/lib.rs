//! Package fetching, the Kptfile model and update strategies.
//!
//! A package is a directory of Kubernetes manifests carrying a
//! `Kptfile` that records where it came from. [`get`] clones a package
//! out of an upstream git repository; [`Updater`] brings a local copy
//! up to a newer upstream reference while preserving local edits via
//! the 3-way merge in `rkpt-merge`.

mod error;
mod get;
mod git;
mod kptfile;
mod paths;
mod pkg;
mod update;

pub use error::{Error, Result};
pub use get::{get, GetOptions};
pub use git::{is_commit_sha, Cache, Fetched, CACHE_DIR_ENV, GIT_TIMEOUT_ENV};
pub use kptfile::{
	Git, GitLock, Info, Kptfile, Metadata, OriginType, Upstream, UpstreamLock, UpdateStrategy,
	KPTFILE_NAME,
};
pub use paths::safe_join;
pub use pkg::{load_resources, walk_package, FileKind, Package, PackageFile};
pub use update::{
	CancelFlag, ChangeAction, FileChange, UpdateOptions, UpdateReport, Updater,
};
