//! 3-way node merge.
//!
//! Reconciles three versions of a resource: `original` (upstream at the
//! lockfile commit), `updated` (upstream at the target ref) and `local`
//! (the user's working copy). Local edits win over unchanged upstream,
//! upstream changes win over unchanged local, and when all three sides
//! disagree on a non-container field the updated side wins and a
//! [`Conflict`] is recorded. Conflicts never abort a merge.

use rkpt_yaml::{emit_node, Mapping, MappingEntry, Node, Sequence, SequenceItem};
use serde::Serialize;
use tracing::debug;

use crate::schema::{element_key, MergeSchema};

/// A field where original, updated and local all disagree. The updated
/// value was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
	/// Display identity of the resource.
	pub id: String,
	/// Dotted field path, with `[key]` segments for sequence elements.
	pub field: String,
	pub original: Option<String>,
	pub updated: Option<String>,
	pub local: Option<String>,
}

/// Non-fatal observation surfaced in the run report, such as a locally
/// modified resource surviving an upstream deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
	pub id: String,
	pub message: String,
}

/// Merge one resource. `conflicts` receives a record for every field where
/// the updated side had to win; the merge itself always succeeds.
///
/// Returns `None` when the resource should be absent from the result (for
/// example when it was deleted upstream and never touched locally).
pub fn merge_resource(
	schema: &MergeSchema,
	id: &str,
	original: Option<&Node>,
	updated: Option<&Node>,
	local: Option<&Node>,
	conflicts: &mut Vec<Conflict>,
) -> Option<Node> {
	let mut merger = Merger {
		schema,
		id,
		path: Vec::new(),
		conflicts,
	};
	merger.merge_nodes(original, updated, local)
}

struct Merger<'a> {
	schema: &'a MergeSchema,
	id: &'a str,
	path: Vec<String>,
	conflicts: &'a mut Vec<Conflict>,
}

impl Merger<'_> {
	fn merge_nodes(
		&mut self,
		o: Option<&Node>,
		u: Option<&Node>,
		l: Option<&Node>,
	) -> Option<Node> {
		// An upstream change to an explicit null deletes the subtree it
		// replaces, even when the local side modified it. A field that was
		// null on both upstream sides is unchanged and the local value
		// stands.
		if u.is_some_and(Node::is_null) && o.is_some_and(|o| !o.is_null()) {
			return None;
		}
		match (u, l) {
			(None, None) => None,
			(Some(u), None) => match o {
				// Added upstream.
				None => Some(u.clone()),
				// Deleted locally; the deletion wins even over an
				// upstream change.
				Some(_) => None,
			},
			(None, Some(l)) => match o {
				// Deleted upstream; honored only if untouched locally.
				Some(o) if o.same_value(l) => None,
				// Modified locally after the upstream deletion: keep.
				Some(_) => Some(l.clone()),
				// Added locally.
				None => Some(l.clone()),
			},
			(Some(u), Some(l)) => self.merge_present(o, u, l),
		}
	}

	/// Both updated and local carry a value.
	fn merge_present(&mut self, o: Option<&Node>, u: &Node, l: &Node) -> Option<Node> {
		if u.same_value(l) {
			// Converged; keep local for its comments and formatting.
			return Some(l.clone());
		}
		if o.is_some_and(|o| o.same_value(u)) {
			return Some(l.clone());
		}
		// An untouched local value adopts the upstream one, but containers
		// still recurse so local comments and styles carry into the result.
		let untouched = o.is_some_and(|o| o.same_value(l));
		match (u, l) {
			(Node::Mapping(um), Node::Mapping(lm))
				if o.is_none_or(|n| n.as_mapping().is_some()) =>
			{
				let om = o.and_then(Node::as_mapping);
				Some(Node::Mapping(self.merge_mappings(om, Some(um), Some(lm))))
			}
			(Node::Sequence(us), Node::Sequence(ls))
				if o.is_none_or(|n| n.as_sequence().is_some()) =>
			{
				let os = o.and_then(Node::as_sequence);
				match self.schema.key_for(&self.path, &[os, Some(us), Some(ls)]) {
					Some(keys) => Some(Node::Sequence(
						self.merge_sequences(os, us, ls, &keys),
					)),
					// Atomic sequence: treated as one value.
					None if untouched => Some(u.clone()),
					None if o.is_none() => Some(l.clone()),
					None => {
						self.record_conflict(o, Some(u), Some(l));
						Some(u.clone())
					}
				}
			}
			_ if untouched => Some(u.clone()),
			_ if o.is_none() => {
				// Added on both sides with different values: local wins.
				Some(l.clone())
			}
			_ => {
				self.record_conflict(o, Some(u), Some(l));
				Some(u.clone())
			}
		}
	}

	fn merge_mappings(
		&mut self,
		o: Option<&Mapping>,
		u: Option<&Mapping>,
		l: Option<&Mapping>,
	) -> Mapping {
		// Local key order first, upstream-added keys after it in their
		// upstream relative order. Keys present only in the original are
		// gone from both sides and stay gone.
		let mut keys: Vec<String> = Vec::new();
		if let Some(lm) = l {
			keys.extend(lm.entries.iter().map(|e| e.key.value.clone()));
		}
		if let Some(um) = u {
			for entry in &um.entries {
				if !keys.contains(&entry.key.value) {
					keys.push(entry.key.value.clone());
				}
			}
		}
		let mut out = Mapping {
			entries: Vec::new(),
			flow: l.or(u).is_some_and(|m| m.flow),
		};
		for key in keys {
			self.path.push(key.clone());
			let merged = self.merge_nodes(
				o.and_then(|m| m.get(&key)),
				u.and_then(|m| m.get(&key)),
				l.and_then(|m| m.get(&key)),
			);
			self.path.pop();
			let Some(value) = merged else { continue };
			// Comments and key style come from the local entry when the
			// key exists locally, otherwise from upstream.
			let template = l
				.and_then(|m| m.entry(&key))
				.or_else(|| u.and_then(|m| m.entry(&key)))
				.expect("key drawn from one of the sides");
			out.entries.push(MappingEntry {
				key: template.key.clone(),
				value,
				head: template.head.clone(),
				line: template.line.clone(),
			});
		}
		out
	}

	fn merge_sequences(
		&mut self,
		o: Option<&Sequence>,
		u: &Sequence,
		l: &Sequence,
		keys: &[String],
	) -> Sequence {
		let index = |seq: Option<&Sequence>| -> Vec<(String, Node)> {
			seq.map_or_else(Vec::new, |s| {
				s.items
					.iter()
					.filter_map(|i| element_key(&i.value, keys).map(|k| (k, i.value.clone())))
					.collect()
			})
		};
		let o_index = index(o);
		let u_index = index(Some(u));
		let l_keys: Vec<Option<String>> = l
			.items
			.iter()
			.map(|i| element_key(&i.value, keys))
			.collect();
		let lookup = |index: &[(String, Node)], key: &str| -> Option<Node> {
			index.iter().find(|(k, _)| k == key).map(|(_, n)| n.clone())
		};

		let mut out = Sequence {
			items: Vec::new(),
			flow: l.flow,
			indent_hint: l.indent_hint,
		};
		// Local element order first.
		for (item, key) in l.items.iter().zip(&l_keys) {
			let Some(key) = key else {
				// Resolver guarantees keys on every element; keep any
				// stragglers untouched rather than dropping them.
				out.items.push(item.clone());
				continue;
			};
			self.path.push(format!("[{}]", key.replace('\u{0}', ",")));
			let merged = self.merge_nodes(
				lookup(&o_index, key).as_ref(),
				lookup(&u_index, key).as_ref(),
				Some(&item.value),
			);
			self.path.pop();
			if let Some(value) = merged {
				out.items.push(SequenceItem {
					value,
					head: item.head.clone(),
					line: item.line.clone(),
				});
			}
		}
		// Upstream-added elements after, in upstream relative order.
		for item in &u.items {
			let Some(key) = element_key(&item.value, keys) else {
				continue;
			};
			if l_keys.iter().flatten().any(|k| *k == key) {
				continue;
			}
			if lookup(&o_index, &key).is_some() {
				// Present originally but gone locally: deleted by the user.
				continue;
			}
			out.items.push(item.clone());
		}
		out
	}

	fn record_conflict(&mut self, o: Option<&Node>, u: Option<&Node>, l: Option<&Node>) {
		let field = self.path.join(".");
		debug!(id = self.id, field = %field, "merge conflict, updated side wins");
		self.conflicts.push(Conflict {
			id: self.id.to_string(),
			field,
			original: o.map(render),
			updated: u.map(render),
			local: l.map(render),
		});
	}
}

fn render(node: &Node) -> String {
	emit_node(node, 0).trim_end().to_string()
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use rstest::rstest;

	use super::*;
	use rkpt_yaml::parse;

	fn node(input: &str) -> Node {
		parse(input).unwrap().remove(0).root
	}

	fn merge3(o: &str, u: &str, l: &str) -> (Node, Vec<Conflict>) {
		let schema = MergeSchema::with_builtins();
		let (o, u, l) = (node(o), node(u), node(l));
		let mut conflicts = Vec::new();
		let merged = merge_resource(
			&schema,
			"test",
			Some(&o),
			Some(&u),
			Some(&l),
			&mut conflicts,
		)
		.expect("present on all sides");
		(merged, conflicts)
	}

	#[rstest]
	// O, U, L, expected — the field-level decision table.
	#[case::no_change("replicas: 3", "replicas: 3", "replicas: 3", "replicas: 3")]
	#[case::local_edit_preserved("replicas: 3", "replicas: 3", "replicas: 7", "replicas: 7")]
	#[case::upstream_change_adopted("replicas: 3", "replicas: 5", "replicas: 3", "replicas: 5")]
	#[case::converged_change("replicas: 3", "replicas: 5", "replicas: 5", "replicas: 5")]
	#[case::added_upstream("a: 1", "a: 1\nb: 2", "a: 1", "a: 1\nb: 2")]
	#[case::added_locally("a: 1", "a: 1", "a: 1\nb: 2", "a: 1\nb: 2")]
	#[case::converged_add("a: 1", "a: 1\nb: 2", "a: 1\nb: 2", "a: 1\nb: 2")]
	#[case::local_add_wins("a: 1", "a: 1\nb: 2", "a: 1\nb: 3", "a: 1\nb: 3")]
	#[case::upstream_delete("a: 1\nb: 2", "a: 1", "a: 1\nb: 2", "a: 1")]
	#[case::local_edit_survives_upstream_delete(
		"a: 1\nb: 2",
		"a: 1",
		"a: 1\nb: 3",
		"a: 1\nb: 3"
	)]
	#[case::local_delete("a: 1\nb: 2", "a: 1\nb: 2", "a: 1", "a: 1")]
	#[case::local_delete_wins_over_upstream_change("a: 1\nb: 2", "a: 1\nb: 9", "a: 1", "a: 1")]
	fn decision_table(#[case] o: &str, #[case] u: &str, #[case] l: &str, #[case] expected: &str) {
		let (merged, conflicts) = merge3(o, u, l);
		assert!(
			merged.same_value(&node(expected)),
			"expected {expected:?}, got {:?}",
			rkpt_yaml::emit_node(&merged, 0)
		);
		assert!(conflicts.is_empty(), "unexpected conflicts: {conflicts:?}");
	}

	#[test]
	fn three_way_scalar_divergence_is_a_conflict_and_updated_wins() {
		let (merged, conflicts) = merge3("replicas: 1", "replicas: 2", "replicas: 3");
		assert_eq!(
			merged.get("replicas").and_then(Node::str_value),
			Some("2")
		);
		assert_eq!(conflicts.len(), 1);
		let c = &conflicts[0];
		assert_eq!(c.field, "replicas");
		assert_eq!(c.original.as_deref(), Some("1"));
		assert_eq!(c.updated.as_deref(), Some("2"));
		assert_eq!(c.local.as_deref(), Some("3"));
	}

	#[test]
	fn explicit_null_upstream_deletes_subtree() {
		let (merged, conflicts) = merge3(
			"spec:\n  limits:\n    cpu: 1\n",
			"spec:\n  limits: null\n",
			"spec:\n  limits:\n    cpu: 2\n",
		);
		assert!(merged.get("spec").unwrap().get("limits").is_none());
		assert!(conflicts.is_empty());
	}

	#[test]
	fn associative_list_merge() {
		let o = indoc! {"
			env:
			- name: A
			  value: '1'
		"};
		let u = indoc! {"
			env:
			- name: A
			  value: '2'
			- name: B
			  value: '9'
		"};
		let l = indoc! {"
			env:
			- name: A
			  value: '1'
			- name: C
			  value: '3'
		"};
		let (merged, conflicts) = merge3(o, u, l);
		assert!(conflicts.is_empty());
		let env = merged.get("env").and_then(Node::as_sequence).unwrap();
		let entries: Vec<(String, String)> = env
			.items
			.iter()
			.map(|i| {
				(
					i.value.get("name").unwrap().str_value().unwrap().to_string(),
					i.value.get("value").unwrap().str_value().unwrap().to_string(),
				)
			})
			.collect();
		assert_eq!(
			entries,
			vec![
				("A".to_string(), "2".to_string()),
				("C".to_string(), "3".to_string()),
				("B".to_string(), "9".to_string()),
			]
		);
	}

	#[test]
	fn associative_element_deleted_locally_stays_deleted() {
		let seq = "env:\n- name: A\n  value: '1'\n- name: B\n  value: '2'\n";
		let upstream = "env:\n- name: A\n  value: '1'\n- name: B\n  value: '9'\n";
		let local = "env:\n- name: A\n  value: '1'\n";
		let (merged, _) = merge3(seq, upstream, local);
		let env = merged.get("env").and_then(Node::as_sequence).unwrap();
		assert_eq!(env.items.len(), 1);
	}

	#[test]
	fn atomic_sequence_divergence_conflicts() {
		let (merged, conflicts) = merge3(
			"args: [a]\n",
			"args: [a, b]\n",
			"args: [a, c]\n",
		);
		let args = merged.get("args").and_then(Node::as_sequence).unwrap();
		assert_eq!(args.items.len(), 2);
		assert_eq!(args.items[1].value.str_value(), Some("b"));
		assert_eq!(conflicts.len(), 1);
		assert_eq!(conflicts[0].field, "args");
	}

	#[test]
	fn atomic_sequence_local_edit_preserved() {
		let (merged, conflicts) =
			merge3("args: [a]\n", "args: [a]\n", "args: [a, c]\n");
		let args = merged.get("args").and_then(Node::as_sequence).unwrap();
		assert_eq!(args.items.len(), 2);
		assert!(conflicts.is_empty());
	}

	#[test]
	fn mapping_order_is_local_then_upstream_additions() {
		let (merged, _) = merge3(
			"a: 1\nb: 2\n",
			"a: 1\nb: 2\nz: 9\nq: 8\n",
			"b: 2\na: 1\n",
		);
		let keys: Vec<&str> = merged
			.as_mapping()
			.unwrap()
			.entries
			.iter()
			.map(|e| e.key.value.as_str())
			.collect();
		assert_eq!(keys, vec!["b", "a", "z", "q"]);
	}

	#[test]
	fn local_comments_survive_upstream_value_change() {
		let (merged, _) = merge3(
			"replicas: 3\n",
			"replicas: 5\n",
			"replicas: 3 # keep in sync with HPA\n",
		);
		let entry = merged.as_mapping().unwrap().entry("replicas").unwrap();
		assert_eq!(entry.value.str_value(), Some("5"));
		assert_eq!(entry.line.as_deref(), Some("# keep in sync with HPA"));
	}

	#[test]
	fn comment_only_local_edit_survives_upstream_change() {
		let (merged, conflicts) = merge3(
			"image: app:v1\nreplicas: 3\n",
			"image: app:v2\nreplicas: 3\n",
			"image: app:v1\n# tuned for burst traffic\nreplicas: 3\n",
		);
		assert!(conflicts.is_empty());
		let m = merged.as_mapping().unwrap();
		assert_eq!(m.get("image").and_then(Node::str_value), Some("app:v2"));
		let entry = m.entry("replicas").unwrap();
		assert_eq!(entry.head, vec!["# tuned for burst traffic".to_string()]);
	}

	#[test]
	fn unchanged_null_field_keeps_local_value() {
		let (merged, conflicts) = merge3(
			"suspend: null\nname: x\n",
			"suspend: null\nname: y\n",
			"suspend: true\nname: x\n",
		);
		assert!(conflicts.is_empty());
		assert_eq!(merged.get("suspend").and_then(Node::str_value), Some("true"));
		assert_eq!(merged.get("name").and_then(Node::str_value), Some("y"));
	}

	#[test]
	fn conflict_field_path_is_dotted() {
		let (_, conflicts) = merge3(
			"spec:\n  template:\n    spec:\n      dnsPolicy: a\n",
			"spec:\n  template:\n    spec:\n      dnsPolicy: b\n",
			"spec:\n  template:\n    spec:\n      dnsPolicy: c\n",
		);
		assert_eq!(conflicts[0].field, "spec.template.spec.dnsPolicy");
	}

	#[test]
	fn compound_key_alignment_in_ports() {
		let o = "ports:\n- containerPort: 80\n  protocol: TCP\n";
		let u = "ports:\n- containerPort: 80\n  protocol: TCP\n- containerPort: 81\n  protocol: TCP\n";
		let l = "ports:\n- containerPort: 80\n  protocol: UDP\n- containerPort: 80\n  protocol: TCP\n";
		let (merged, conflicts) = merge3(o, u, l);
		assert!(conflicts.is_empty());
		let ports = merged.get("ports").and_then(Node::as_sequence).unwrap();
		// Local UDP addition kept, shared TCP element kept, upstream 81 added.
		assert_eq!(ports.items.len(), 3);
	}
}
