//! Resource identity.
//!
//! The canonical identity of a Kubernetes-style resource is the tuple
//! `(group, kind, namespace, name)`: group is the `apiVersion` prefix
//! before `/` (empty for the core group), namespace defaults to `default`.
//! A `# kpt-merge: <namespace>/<name>` line comment on the `metadata` key
//! overrides the namespace/name components for cross-tree alignment, which
//! lets a user rename a resource locally without losing its upstream
//! lineage.

use std::fmt;

use rkpt_yaml::Node;
use serde::Serialize;

pub const MERGE_COMMENT_PREFIX: &str = "kpt-merge:";
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity tuple used to align resources across the original, updated and
/// local trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId {
	pub group: String,
	pub kind: String,
	pub namespace: String,
	pub name: String,
}

impl fmt::Display for ResourceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.group.is_empty() {
			write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
		} else {
			write!(
				f,
				"{}.{} {}/{}",
				self.kind, self.group, self.namespace, self.name
			)
		}
	}
}

/// Compute the identity of a resource document root.
///
/// Returns `None` when `kind` or `metadata.name` is missing or empty; such
/// resources cannot participate in identity-based merge and are aligned by
/// file position instead.
pub fn resource_id(root: &Node) -> Option<ResourceId> {
	let kind = root.get("kind").and_then(Node::str_value).unwrap_or("");
	if kind.is_empty() {
		return None;
	}
	let api_version = root
		.get("apiVersion")
		.and_then(Node::str_value)
		.unwrap_or("");
	let group = api_version
		.split_once('/')
		.map_or("", |(group, _)| group)
		.to_string();

	let metadata = root.get("metadata");
	let mut name = metadata
		.and_then(|m| m.get("name"))
		.and_then(Node::str_value)
		.unwrap_or("")
		.to_string();
	let mut namespace = metadata
		.and_then(|m| m.get("namespace"))
		.and_then(Node::str_value)
		.filter(|ns| !ns.is_empty())
		.unwrap_or(DEFAULT_NAMESPACE)
		.to_string();

	if let Some((comment_ns, comment_name)) = merge_comment(root) {
		namespace = comment_ns;
		name = comment_name;
	}
	if name.is_empty() {
		return None;
	}
	Some(ResourceId {
		group,
		kind: kind.to_string(),
		namespace,
		name,
	})
}

/// Parse the `# kpt-merge: <namespace>/<name>` identity override from the
/// line comment on the `metadata` key, if present and well-formed.
pub fn merge_comment(root: &Node) -> Option<(String, String)> {
	let comment = root
		.as_mapping()?
		.entry("metadata")?
		.line
		.as_deref()?
		.trim_start_matches('#')
		.trim();
	let spec = comment.strip_prefix(MERGE_COMMENT_PREFIX)?.trim();
	let (namespace, name) = spec.split_once('/')?;
	let name = name.trim();
	if name.is_empty() {
		return None;
	}
	let namespace = namespace.trim();
	let namespace = if namespace.is_empty() {
		DEFAULT_NAMESPACE
	} else {
		namespace
	};
	Some((namespace.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
	use indoc::indoc;

	use super::*;
	use rkpt_yaml::parse;

	fn root_of(input: &str) -> Node {
		parse(input).unwrap().remove(0).root
	}

	#[test]
	fn id_from_metadata() {
		let root = root_of(indoc! {"
			apiVersion: apps/v1
			kind: Deployment
			metadata:
			  name: web
			  namespace: prod
		"});
		assert_eq!(
			resource_id(&root),
			Some(ResourceId {
				group: "apps".into(),
				kind: "Deployment".into(),
				namespace: "prod".into(),
				name: "web".into(),
			})
		);
	}

	#[test]
	fn namespace_defaults() {
		let root = root_of("apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n");
		let id = resource_id(&root).unwrap();
		assert_eq!(id.group, "");
		assert_eq!(id.namespace, "default");
	}

	#[test]
	fn comment_overrides_identity() {
		let root = root_of(indoc! {"
			apiVersion: v1
			kind: ConfigMap
			metadata: # kpt-merge: team/original-name
			  name: renamed
		"});
		let id = resource_id(&root).unwrap();
		assert_eq!(id.namespace, "team");
		assert_eq!(id.name, "original-name");
	}

	#[test]
	fn missing_kind_or_name_yields_none() {
		assert_eq!(resource_id(&root_of("metadata:\n  name: x\n")), None);
		assert_eq!(resource_id(&root_of("kind: ConfigMap\n")), None);
	}

	#[test]
	fn malformed_merge_comment_is_ignored() {
		let root = root_of(indoc! {"
			apiVersion: v1
			kind: ConfigMap
			metadata: # kpt-merge-not-really
			  name: cm
		"});
		assert_eq!(resource_id(&root).unwrap().name, "cm");
	}

	#[test]
	fn display_includes_group() {
		let id = ResourceId {
			group: "apps".into(),
			kind: "Deployment".into(),
			namespace: "default".into(),
			name: "web".into(),
		};
		assert_eq!(id.to_string(), "Deployment.apps default/web");
	}
}
