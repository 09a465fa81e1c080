//! Associative-key resolution for sequence merges.
//!
//! A sequence of mappings merges element-wise only when a key field makes
//! alignment meaningful. Resolution order:
//!
//! 1. the registry, seeded with the Kubernetes built-in merge keys (several
//!    fields have compound keys, probed in order);
//! 2. the heuristic: every element across all sides is a mapping with a
//!    scalar `name` field;
//! 3. otherwise the sequence is atomic and merges wholesale.

use std::collections::HashMap;

use rkpt_yaml::{Node, Sequence};

/// Registry of per-field associative keys.
pub struct MergeSchema {
	/// Field name -> candidate key sets, probed in order.
	registry: HashMap<&'static str, Vec<Vec<&'static str>>>,
}

impl Default for MergeSchema {
	fn default() -> Self {
		Self::with_builtins()
	}
}

impl MergeSchema {
	pub fn empty() -> Self {
		Self {
			registry: HashMap::new(),
		}
	}

	/// Schema preloaded with the Kubernetes built-in types' merge keys.
	pub fn with_builtins() -> Self {
		let mut schema = Self::empty();
		for field in [
			"containers",
			"initContainers",
			"ephemeralContainers",
			"env",
			"volumes",
			"imagePullSecrets",
			"webhooks",
		] {
			schema.register(field, &[&["name"]]);
		}
		// Container ports key on containerPort+protocol, Service ports on
		// port+protocol; both live under a field called `ports`.
		schema.register(
			"ports",
			&[&["containerPort", "protocol"], &["port", "protocol"], &["containerPort"], &["port"]],
		);
		schema.register("volumeMounts", &[&["mountPath"]]);
		schema.register("volumeDevices", &[&["devicePath"]]);
		schema.register("tolerations", &[&["key"]]);
		schema.register("hostAliases", &[&["ip"]]);
		schema.register("topologySpreadConstraints", &[&["topologyKey", "whenUnsatisfiable"]]);
		schema
	}

	pub fn register(&mut self, field: &'static str, candidates: &[&[&'static str]]) {
		self.registry
			.insert(field, candidates.iter().map(|c| c.to_vec()).collect());
	}

	/// Resolve the associative key for the sequence at `path`.
	///
	/// `sides` are the (up to three) versions of the sequence; a candidate
	/// key applies only when every element on every present side carries
	/// all of its fields. Returns `None` for atomic sequences.
	pub fn key_for(&self, path: &[String], sides: &[Option<&Sequence>]) -> Option<Vec<String>> {
		if !sides.iter().any(|s| s.is_some()) {
			return None;
		}
		let field = path.last()?;
		if let Some(candidates) = self.registry.get(field.as_str()) {
			for candidate in candidates {
				if sides
					.iter()
					.flatten()
					.all(|seq| all_elements_have_keys(seq, candidate))
				{
					return Some(candidate.iter().map(|k| (*k).to_string()).collect());
				}
			}
		}
		// Fallback heuristic: a `name` field on every element.
		if sides
			.iter()
			.flatten()
			.all(|seq| !seq.items.is_empty() && all_elements_have_keys(seq, &["name"]))
			&& sides.iter().flatten().any(|seq| !seq.items.is_empty())
		{
			return Some(vec!["name".to_string()]);
		}
		None
	}
}

fn all_elements_have_keys(seq: &Sequence, keys: &[impl AsRef<str>]) -> bool {
	seq.items.iter().all(|item| {
		keys.iter().all(|key| {
			item.value
				.get(key.as_ref())
				.is_some_and(|v| v.as_scalar().is_some())
		})
	})
}

/// Compound key value of a sequence element, used for alignment.
pub fn element_key(node: &Node, keys: &[String]) -> Option<String> {
	let mut parts = Vec::with_capacity(keys.len());
	for key in keys {
		parts.push(node.get(key).and_then(Node::str_value)?.to_string());
	}
	Some(parts.join("\u{0}"))
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use rstest::rstest;

	use super::*;
	use rkpt_yaml::parse;

	fn seq_at(input: &str, field: &str) -> Sequence {
		let root = parse(input).unwrap().remove(0).root;
		root.get(field).unwrap().as_sequence().unwrap().clone()
	}

	#[rstest]
	#[case::containers("containers:\n- name: app\n  image: nginx\n", "containers", &["name"])]
	#[case::env("env:\n- name: A\n  value: '1'\n", "env", &["name"])]
	#[case::volume_mounts(
		"volumeMounts:\n- mountPath: /data\n  name: data\n",
		"volumeMounts",
		&["mountPath"]
	)]
	fn registry_resolves_builtin_keys(
		#[case] input: &str,
		#[case] field: &str,
		#[case] expected: &[&str],
	) {
		let schema = MergeSchema::with_builtins();
		let seq = seq_at(input, field);
		let key = schema.key_for(&[field.to_string()], &[Some(&seq)]).unwrap();
		let expected: Vec<String> = expected.iter().map(|k| (*k).to_string()).collect();
		assert_eq!(key, expected);
	}

	#[test]
	fn ports_prefers_container_port_then_service_port() {
		let schema = MergeSchema::with_builtins();
		let container_ports = seq_at(
			"ports:\n- containerPort: 80\n  protocol: TCP\n",
			"ports",
		);
		assert_eq!(
			schema.key_for(&["ports".into()], &[Some(&container_ports)]),
			Some(vec!["containerPort".to_string(), "protocol".to_string()])
		);
		let service_ports = seq_at("ports:\n- port: 80\n  protocol: TCP\n", "ports");
		assert_eq!(
			schema.key_for(&["ports".into()], &[Some(&service_ports)]),
			Some(vec!["port".to_string(), "protocol".to_string()])
		);
	}

	#[test]
	fn heuristic_applies_to_unknown_fields_with_name() {
		let schema = MergeSchema::with_builtins();
		let seq = seq_at("widgets:\n- name: a\n- name: b\n", "widgets");
		assert_eq!(
			schema.key_for(&["widgets".into()], &[Some(&seq)]),
			Some(vec!["name".to_string()])
		);
	}

	#[test]
	fn scalar_sequences_are_atomic() {
		let schema = MergeSchema::with_builtins();
		let seq = seq_at("args:\n- one\n- two\n", "args");
		assert_eq!(schema.key_for(&["args".into()], &[Some(&seq)]), None);
	}

	#[test]
	fn key_must_hold_on_every_side() {
		let schema = MergeSchema::with_builtins();
		let with_name = seq_at("widgets:\n- name: a\n", "widgets");
		let without_name = seq_at("widgets:\n- id: b\n", "widgets");
		assert_eq!(
			schema.key_for(&["widgets".into()], &[Some(&with_name), Some(&without_name)]),
			None
		);
	}

	#[test]
	fn compound_key_element_alignment() {
		let ports = seq_at(
			indoc! {"
				ports:
				- containerPort: 80
				  protocol: TCP
				- containerPort: 80
				  protocol: UDP
			"},
			"ports",
		);
		let keys = vec!["containerPort".to_string(), "protocol".to_string()];
		let a = element_key(&ports.items[0].value, &keys).unwrap();
		let b = element_key(&ports.items[1].value, &keys).unwrap();
		assert_ne!(a, b);
	}
}
