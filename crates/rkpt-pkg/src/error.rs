use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that can occur while fetching or updating a package.
#[derive(Debug, Error)]
pub enum Error {
	#[error("{path}: {source}")]
	Syntax {
		path: String,
		#[source]
		source: rkpt_yaml::SyntaxError,
	},

	#[error("invalid Kptfile at {path}: {source}")]
	Kptfile {
		path: String,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("{0}: Kptfile has no upstream section")]
	MissingUpstream(String),

	#[error("{0}: Kptfile has no upstreamLock; run `rkpt pkg get` before updating")]
	MissingLock(String),

	#[error("no Kptfile found in {0}")]
	NotAPackage(PathBuf),

	#[error("git {op} failed: {}", stderr.trim())]
	Git { op: &'static str, stderr: String },

	#[error("failed to run git: {0}")]
	GitSpawn(#[source] io::Error),

	#[error("git {op} timed out after {seconds}s")]
	GitTimeout { op: &'static str, seconds: u64 },

	#[error(
		"package {0} has uncommitted changes; commit or revert them before updating"
	)]
	UncommittedChanges(String),

	#[error("path {0:?} escapes the package directory")]
	PathEscape(PathBuf),

	#[error(
		"package {0} has local changes; the fast-forward strategy refuses to \
		 overwrite them, use resource-merge instead"
	)]
	FastForwardRefused(String),

	#[error("unknown update strategy {0:?}")]
	UnknownStrategy(String),

	#[error("{path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("update interrupted")]
	Cancelled,
}

impl Error {
	pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		Error::Io {
			path: path.into(),
			source,
		}
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
