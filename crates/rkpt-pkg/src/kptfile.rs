//! The `Kptfile` package manifest (kpt.dev/v1).

use std::{fmt, fs, path::Path, str::FromStr};

use rkpt_yaml::Node;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const KPTFILE_NAME: &str = "Kptfile";
pub const API_VERSION: &str = "kpt.dev/v1";
pub const KIND: &str = "Kptfile";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kptfile {
	pub api_version: String,
	pub kind: String,
	pub metadata: Metadata,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub upstream: Option<Upstream>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub upstream_lock: Option<UpstreamLock>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub info: Option<Info>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
	pub name: String,
}

/// Free-form package description carried through updates untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
	#[serde(rename = "type")]
	pub origin_type: OriginType,
	pub git: Git,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub update_strategy: Option<UpdateStrategy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamLock {
	#[serde(rename = "type")]
	pub origin_type: OriginType,
	pub git: GitLock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginType {
	#[default]
	Git,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Git {
	/// Clone URL of the upstream repository.
	pub repo: String,
	/// Package directory within the repository, `/` for the root.
	pub directory: String,
	/// Branch, tag or commit to track.
	#[serde(rename = "ref")]
	pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLock {
	pub repo: String,
	pub directory: String,
	#[serde(rename = "ref")]
	pub reference: String,
	/// Commit the reference resolved to when the package was last fetched.
	pub commit: String,
}

/// How `update` reconciles upstream changes with local edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStrategy {
	/// Schema-aware 3-way merge; local edits survive, conflicts are
	/// reported with the updated side winning.
	#[default]
	ResourceMerge,
	/// Replace with upstream, but only when the package carries no local
	/// changes at all.
	FastForward,
	/// Discard the local package and take upstream wholesale.
	ForceDeleteReplace,
}

impl fmt::Display for UpdateStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			UpdateStrategy::ResourceMerge => "resource-merge",
			UpdateStrategy::FastForward => "fast-forward",
			UpdateStrategy::ForceDeleteReplace => "force-delete-replace",
		})
	}
}

impl FromStr for UpdateStrategy {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"resource-merge" => Ok(UpdateStrategy::ResourceMerge),
			"fast-forward" => Ok(UpdateStrategy::FastForward),
			"force-delete-replace" => Ok(UpdateStrategy::ForceDeleteReplace),
			other => Err(Error::UnknownStrategy(other.to_string())),
		}
	}
}

impl Kptfile {
	/// A minimal manifest for a freshly fetched package.
	pub fn new(name: impl Into<String>) -> Self {
		Kptfile {
			api_version: API_VERSION.to_string(),
			kind: KIND.to_string(),
			metadata: Metadata { name: name.into() },
			upstream: None,
			upstream_lock: None,
			info: None,
		}
	}

	pub fn read(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
		Self::parse(&content, &path.display().to_string())
	}

	pub fn parse(content: &str, path: &str) -> Result<Self> {
		serde_yaml::from_str(content).map_err(|source| Error::Kptfile {
			path: path.to_string(),
			source,
		})
	}

	/// Atomic: written to a sibling temporary file and renamed over.
	pub fn write(&self, path: &Path) -> Result<()> {
		let content = self.to_yaml()?;
		crate::paths::write_atomic(path, content.as_bytes())
	}

	pub fn to_yaml(&self) -> Result<String> {
		serde_yaml::to_string(self).map_err(|source| Error::Kptfile {
			path: KPTFILE_NAME.to_string(),
			source,
		})
	}
}

/// Overwrite the `upstream` and `upstreamLock` sections of a parsed
/// Kptfile document with freshly resolved values, leaving every other
/// field and comment in place.
pub fn set_upstream_sections(root: &mut Node, upstream: &Upstream, lock: &UpstreamLock) {
	let Some(mapping) = root.as_mapping_mut() else {
		return;
	};
	mapping.set("upstream", upstream_node(upstream));
	mapping.set("upstreamLock", lock_node(lock));
}

fn upstream_node(upstream: &Upstream) -> Node {
	let mut git = rkpt_yaml::Mapping::default();
	git.set("repo", Node::scalar(&upstream.git.repo));
	git.set("directory", Node::scalar(&upstream.git.directory));
	git.set("ref", Node::scalar(&upstream.git.reference));
	let mut out = rkpt_yaml::Mapping::default();
	out.set("type", Node::scalar("git"));
	out.set("git", Node::Mapping(git));
	if let Some(strategy) = upstream.update_strategy {
		out.set("updateStrategy", Node::scalar(strategy.to_string()));
	}
	Node::Mapping(out)
}

fn lock_node(lock: &UpstreamLock) -> Node {
	let mut git = rkpt_yaml::Mapping::default();
	git.set("repo", Node::scalar(&lock.git.repo));
	git.set("directory", Node::scalar(&lock.git.directory));
	git.set("ref", Node::scalar(&lock.git.reference));
	git.set("commit", Node::scalar(&lock.git.commit));
	let mut out = rkpt_yaml::Mapping::default();
	out.set("type", Node::scalar("git"));
	out.set("git", Node::Mapping(git));
	Node::Mapping(out)
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use indoc::indoc;

	use super::*;

	const FULL: &str = indoc! {"
		apiVersion: kpt.dev/v1
		kind: Kptfile
		metadata:
		  name: cert-manager
		upstream:
		  type: git
		  git:
		    repo: https://github.com/example/packages
		    directory: /cert-manager
		    ref: v1.2.0
		  updateStrategy: resource-merge
		upstreamLock:
		  type: git
		  git:
		    repo: https://github.com/example/packages
		    directory: /cert-manager
		    ref: v1.1.0
		    commit: 3f786850e387550fdab836ed7e6dc881de23001b
	"};

	#[test]
	fn parses_full_manifest() {
		let kptfile = Kptfile::parse(FULL, "Kptfile").unwrap();
		let upstream = kptfile.upstream.unwrap();
		assert_eq!(upstream.git.reference, "v1.2.0");
		assert_eq!(upstream.update_strategy, Some(UpdateStrategy::ResourceMerge));
		let lock = kptfile.upstream_lock.unwrap();
		assert_eq!(lock.git.commit, "3f786850e387550fdab836ed7e6dc881de23001b");
	}

	#[test]
	fn upstream_sections_are_optional() {
		let kptfile = Kptfile::parse(
			"apiVersion: kpt.dev/v1\nkind: Kptfile\nmetadata:\n  name: x\n",
			"Kptfile",
		)
		.unwrap();
		assert_eq!(kptfile.upstream, None);
		assert_eq!(kptfile.upstream_lock, None);
	}

	#[test]
	fn serializes_round_trip() {
		let kptfile = Kptfile::parse(FULL, "Kptfile").unwrap();
		let emitted = kptfile.to_yaml().unwrap();
		assert_eq!(Kptfile::parse(&emitted, "Kptfile").unwrap(), kptfile);
	}

	#[test]
	fn rejects_garbage() {
		assert_matches!(
			Kptfile::parse("kind: [", "Kptfile"),
			Err(Error::Kptfile { .. })
		);
	}

	#[rstest::rstest]
	#[case("resource-merge", UpdateStrategy::ResourceMerge)]
	#[case("fast-forward", UpdateStrategy::FastForward)]
	#[case("force-delete-replace", UpdateStrategy::ForceDeleteReplace)]
	fn strategy_from_str(#[case] text: &str, #[case] expected: UpdateStrategy) {
		assert_eq!(text.parse::<UpdateStrategy>().unwrap(), expected);
		assert_eq!(expected.to_string(), text);
	}

	#[test]
	fn unknown_strategy_errors() {
		assert_matches!(
			"rebase".parse::<UpdateStrategy>(),
			Err(Error::UnknownStrategy(s)) if s == "rebase"
		);
	}

	#[test]
	fn set_upstream_sections_preserves_other_fields() {
		let mut docs = rkpt_yaml::parse(indoc! {"
			apiVersion: kpt.dev/v1
			kind: Kptfile
			metadata:
			  name: demo # package name
		"})
		.unwrap();
		let root = &mut docs[0].root;
		let upstream = Upstream {
			origin_type: OriginType::Git,
			git: Git {
				repo: "https://example.com/r".to_string(),
				directory: "/".to_string(),
				reference: "main".to_string(),
			},
			update_strategy: None,
		};
		let lock = UpstreamLock {
			origin_type: OriginType::Git,
			git: GitLock {
				repo: "https://example.com/r".to_string(),
				directory: "/".to_string(),
				reference: "main".to_string(),
				commit: "abc123".to_string(),
			},
		};
		set_upstream_sections(root, &upstream, &lock);
		let text = rkpt_yaml::emit_node(root, 0);
		assert!(text.contains("name: demo # package name"));
		assert!(text.contains("commit: abc123"));
		let parsed = Kptfile::parse(&text, "Kptfile").unwrap();
		assert_eq!(parsed.upstream.unwrap().git.reference, "main");
	}
}
