//! Resource collections and the set-level merge.
//!
//! A [`ResourceSet`] holds every Kubernetes resource found in one version
//! of a package, keyed by identity so that the same resource can be
//! aligned across the original, updated and local trees even when the
//! user moved it to a different file.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rkpt_yaml::{parse, Document, SyntaxError};
use tracing::{trace, warn};

use crate::identity::{resource_id, ResourceId};
use crate::merge::{merge_resource, Conflict, Note};
use crate::schema::MergeSchema;

/// How a resource is aligned across package versions.
///
/// Resources carrying `apiVersion`, `kind` and a name merge by identity.
/// Documents without one (fragments, config snippets) fall back to their
/// position within the file, so a file of such documents still merges
/// pairwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
	Id(ResourceId),
	File { path: String, ordinal: usize },
}

impl fmt::Display for ResourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResourceKey::Id(id) => id.fmt(f),
			ResourceKey::File { path, ordinal } => write!(f, "{path}#{ordinal}"),
		}
	}
}

/// One YAML document from a package, with the file it came from.
#[derive(Debug, Clone)]
pub struct Resource {
	pub key: ResourceKey,
	/// Path relative to the package root, forward slashes.
	pub path: String,
	pub document: Document,
}

/// All resources of one package version.
#[derive(Debug, Default)]
pub struct ResourceSet {
	resources: Vec<Resource>,
	index: HashMap<ResourceKey, usize>,
}

impl ResourceSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Parse one file's content and add its documents. `path` is the
	/// package-relative path used for file-positional keys and output
	/// placement.
	pub fn insert_file(&mut self, path: &str, content: &str) -> Result<(), SyntaxError> {
		for (ordinal, document) in parse(content)?.into_iter().enumerate() {
			let key = match resource_id(&document.root) {
				Some(id) => ResourceKey::Id(id),
				None => ResourceKey::File {
					path: path.to_string(),
					ordinal,
				},
			};
			if self.index.contains_key(&key) {
				warn!(%key, path, "duplicate resource, keeping the first occurrence");
				continue;
			}
			self.index.insert(key.clone(), self.resources.len());
			self.resources.push(Resource {
				key,
				path: path.to_string(),
				document,
			});
		}
		Ok(())
	}

	pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
		self.index.get(key).map(|&i| &self.resources[i])
	}

	pub fn resources(&self) -> &[Resource] {
		&self.resources
	}

	pub fn len(&self) -> usize {
		self.resources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.resources.is_empty()
	}
}

/// Result of merging two upstream versions with the local tree.
#[derive(Debug, Default)]
pub struct MergeOutput {
	/// Package-relative path to the documents that file should now hold.
	/// An empty vector means every resource in the file went away and the
	/// file should be deleted.
	pub files: BTreeMap<String, Vec<Document>>,
	pub conflicts: Vec<Conflict>,
	pub notes: Vec<Note>,
}

/// Merge every resource of the three package versions.
///
/// Files keep their local layout: merged resources stay in the file the
/// local tree keeps them in, and resources new upstream land in the file
/// the updated tree places them in.
pub fn merge_sets(
	schema: &MergeSchema,
	original: &ResourceSet,
	updated: &ResourceSet,
	local: &ResourceSet,
) -> MergeOutput {
	let mut out = MergeOutput::default();
	// Every local file gets an entry so callers can detect files whose
	// resources were all deleted.
	for resource in local.resources() {
		out.files.entry(resource.path.clone()).or_default();
	}
	for resource in local.resources() {
		let id = resource.key.to_string();
		let o = original.get(&resource.key);
		let u = updated.get(&resource.key);
		trace!(
			%id,
			in_original = o.is_some(),
			in_updated = u.is_some(),
			"merging resource"
		);
		if let (Some(o), None) = (o, u) {
			// Deleted upstream.
			if o.document.root.same_value(&resource.document.root) {
				continue;
			}
			out.notes.push(Note {
				id,
				message: "modified locally; kept despite upstream deletion".to_string(),
			});
			push_document(&mut out.files, &resource.path, resource.document.clone());
			continue;
		}
		let merged = merge_resource(
			schema,
			&id,
			o.map(|r| &r.document.root),
			u.map(|r| &r.document.root),
			Some(&resource.document.root),
			&mut out.conflicts,
		);
		if let Some(root) = merged {
			let mut document = resource.document.clone();
			document.root = root;
			push_document(&mut out.files, &resource.path, document);
		}
	}
	// Resources new upstream, placed where the updated tree has them.
	for resource in updated.resources() {
		if local.get(&resource.key).is_some() {
			continue;
		}
		if original.get(&resource.key).is_some() {
			// Known to the original and absent locally: the user deleted
			// it, and the deletion wins.
			trace!(id = %resource.key, "deleted locally, skipping upstream version");
			continue;
		}
		push_document(&mut out.files, &resource.path, resource.document.clone());
	}
	out
}

fn push_document(files: &mut BTreeMap<String, Vec<Document>>, path: &str, document: Document) {
	files.entry(path.to_string()).or_default().push(document);
}

#[cfg(test)]
mod tests {
	use indoc::indoc;

	use super::*;

	fn set(files: &[(&str, &str)]) -> ResourceSet {
		let mut s = ResourceSet::new();
		for (path, content) in files {
			s.insert_file(path, content).unwrap();
		}
		s
	}

	fn deployment(name: &str, replicas: u32) -> String {
		indoc! {"
			apiVersion: apps/v1
			kind: Deployment
			metadata:
			  name: NAME
			spec:
			  replicas: N
		"}
		.replace("NAME", name)
		.replace('N', &replicas.to_string())
	}

	const SERVICE: &str = indoc! {"
		apiVersion: v1
		kind: Service
		metadata:
		  name: web
		spec:
		  ports:
		  - port: 80
		    protocol: TCP
	"};

	#[test]
	fn resources_align_by_identity_across_files() {
		let schema = MergeSchema::with_builtins();
		let original = set(&[("a.yaml", &deployment("web", 1))]);
		let updated = set(&[("a.yaml", &deployment("web", 5))]);
		// Locally moved to a different file.
		let local = set(&[("b.yaml", &deployment("web", 1))]);
		let out = merge_sets(&schema, &original, &updated, &local);
		assert!(out.conflicts.is_empty());
		// Stays in the local file.
		let docs = &out.files["b.yaml"];
		assert_eq!(docs.len(), 1);
		assert_eq!(
			docs[0]
				.root
				.get("spec")
				.and_then(|s| s.get("replicas"))
				.and_then(rkpt_yaml::Node::str_value),
			Some("5")
		);
		// The resource was never in a local a.yaml, so no entry for it.
		assert!(!out.files.contains_key("a.yaml"));
	}

	#[test]
	fn new_upstream_resource_lands_in_its_upstream_file() {
		let schema = MergeSchema::with_builtins();
		let original = set(&[("deploy.yaml", &deployment("web", 1))]);
		let updated = set(&[
			("deploy.yaml", &deployment("web", 1)),
			("svc.yaml", SERVICE),
		]);
		let local = set(&[("deploy.yaml", &deployment("web", 1))]);
		let out = merge_sets(&schema, &original, &updated, &local);
		assert_eq!(out.files["svc.yaml"].len(), 1);
	}

	#[test]
	fn local_deletion_wins_over_upstream_change() {
		let schema = MergeSchema::with_builtins();
		let original = set(&[
			("deploy.yaml", &deployment("web", 1)),
			("svc.yaml", SERVICE),
		]);
		let updated = set(&[
			("deploy.yaml", &deployment("web", 1)),
			("svc.yaml", &SERVICE.replace("80", "81")),
		]);
		let local = set(&[("deploy.yaml", &deployment("web", 1))]);
		let out = merge_sets(&schema, &original, &updated, &local);
		assert!(!out.files.contains_key("svc.yaml"));
	}

	#[test]
	fn locally_modified_resource_survives_upstream_deletion_with_note() {
		let schema = MergeSchema::with_builtins();
		let original = set(&[("svc.yaml", SERVICE)]);
		let updated = set(&[]);
		let local = set(&[("svc.yaml", &SERVICE.replace("80", "8080"))]);
		let out = merge_sets(&schema, &original, &updated, &local);
		assert_eq!(out.files["svc.yaml"].len(), 1);
		assert_eq!(out.notes.len(), 1);
		assert!(out.notes[0].message.contains("upstream deletion"));
	}

	#[test]
	fn untouched_resource_deleted_upstream_goes_away() {
		let schema = MergeSchema::with_builtins();
		let original = set(&[("svc.yaml", SERVICE)]);
		let updated = set(&[]);
		let local = set(&[("svc.yaml", SERVICE)]);
		let out = merge_sets(&schema, &original, &updated, &local);
		// File entry stays, marking the file for deletion.
		assert!(out.files["svc.yaml"].is_empty());
		assert!(out.notes.is_empty());
	}

	#[test]
	fn merge_comment_pins_identity_across_rename() {
		let schema = MergeSchema::with_builtins();
		let renamed = indoc! {"
			apiVersion: apps/v1
			kind: Deployment
			metadata: # kpt-merge: default/web
			  name: frontend
			spec:
			  replicas: 1
		"};
		let original = set(&[("a.yaml", &deployment("web", 1))]);
		let updated = set(&[("a.yaml", &deployment("web", 5))]);
		let local = set(&[("a.yaml", renamed)]);
		let out = merge_sets(&schema, &original, &updated, &local);
		assert!(out.conflicts.is_empty());
		let doc = &out.files["a.yaml"][0];
		// Local rename kept, upstream replica bump adopted.
		assert_eq!(
			doc.root
				.get("metadata")
				.and_then(|m| m.get("name"))
				.and_then(rkpt_yaml::Node::str_value),
			Some("frontend")
		);
		assert_eq!(
			doc.root
				.get("spec")
				.and_then(|s| s.get("replicas"))
				.and_then(rkpt_yaml::Node::str_value),
			Some("5")
		);
	}

	#[test]
	fn documents_without_identity_align_by_position() {
		let schema = MergeSchema::with_builtins();
		let original = set(&[("cfg.yaml", "a: 1\n")]);
		let updated = set(&[("cfg.yaml", "a: 2\n")]);
		let local = set(&[("cfg.yaml", "a: 1\n")]);
		let out = merge_sets(&schema, &original, &updated, &local);
		assert_eq!(
			out.files["cfg.yaml"][0].root.get("a").and_then(rkpt_yaml::Node::str_value),
			Some("2")
		);
	}
}
