//! Package update orchestration.
//!
//! An update fetches two upstream checkouts (the locked commit and the
//! target reference), plans the new package content according to the
//! chosen strategy, then applies the plan atomically: the new tree is
//! staged next to the package and swapped in with two renames. Nothing
//! in the package is touched until every input has been read and merged.

use std::{
	collections::BTreeMap,
	fs,
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use rkpt_merge::{merge_resource, merge_sets, Conflict, MergeSchema, Note};
use rkpt_yaml::{emit, parse, Document};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
	error::{Error, Result},
	git::{self, Cache},
	kptfile::{
		set_upstream_sections, Git, GitLock, Upstream, UpstreamLock, UpdateStrategy,
		KPTFILE_NAME,
	},
	pkg::{load_resources, subpackage_dirs, walk_package, FileKind, Package},
	paths::{copy_tree, safe_join},
};

/// Cooperative cancellation handle. Checked between phases; a cancelled
/// update never leaves the package half-written.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
	pub fn cancel(&self) {
		self.0.store(true, Ordering::Relaxed);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}

	fn check(&self) -> Result<()> {
		if self.is_cancelled() {
			Err(Error::Cancelled)
		} else {
			Ok(())
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
	/// Overrides the strategy from the Kptfile for this run only.
	pub strategy: Option<UpdateStrategy>,
	/// Overrides the upstream reference, as in `rkpt pkg update pkg@v2`.
	pub reference: Option<String>,
	/// Plan and report without writing anything.
	pub dry_run: bool,
	pub cancel: CancelFlag,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
	pub package: String,
	pub strategy: UpdateStrategy,
	pub reference: String,
	pub previous_commit: String,
	pub commit: String,
	pub changes: Vec<FileChange>,
	pub conflicts: Vec<Conflict>,
	pub notes: Vec<Note>,
	pub subpackages: Vec<UpdateReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
	pub path: String,
	pub action: ChangeAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
	Added,
	Updated,
	Deleted,
}

/// Planned content for one package-relative path.
enum FileOp {
	Write(Vec<u8>),
	Delete,
}

type Plan = BTreeMap<String, FileOp>;

pub struct Updater {
	schema: MergeSchema,
	cache: Cache,
}

impl Updater {
	pub fn new(cache: Cache) -> Self {
		Updater {
			schema: MergeSchema::with_builtins(),
			cache,
		}
	}

	/// Update `pkg` to its declared upstream reference (or the override
	/// in `opts`), then recurse into subpackages that declare their own
	/// upstream.
	#[instrument(skip_all, fields(package = %pkg.name()))]
	pub fn update(&self, pkg: &Package, opts: &UpdateOptions) -> Result<UpdateReport> {
		let strategy = opts.strategy.or_else(|| {
			pkg.kptfile()
				.ok()
				.and_then(|k| k.upstream)
				.and_then(|u| u.update_strategy)
		});
		// force-delete-replace discards local state anyway, so dirty
		// work trees only block the merging strategies.
		if strategy != Some(UpdateStrategy::ForceDeleteReplace)
			&& git::in_work_tree(pkg.root())
			&& git::has_local_changes(pkg.root())?
		{
			return Err(Error::UncommittedChanges(pkg.name()));
		}
		self.update_inner(pkg, opts)
	}

	fn update_inner(&self, pkg: &Package, opts: &UpdateOptions) -> Result<UpdateReport> {
		opts.cancel.check()?;
		let kptfile = pkg.kptfile()?;
		let upstream = kptfile
			.upstream
			.clone()
			.ok_or_else(|| Error::MissingUpstream(pkg.name()))?;
		let lock = kptfile
			.upstream_lock
			.clone()
			.ok_or_else(|| Error::MissingLock(pkg.name()))?;
		let strategy = opts
			.strategy
			.or(upstream.update_strategy)
			.unwrap_or_default();
		let reference = opts
			.reference
			.clone()
			.unwrap_or_else(|| upstream.git.reference.clone());
		info!(%strategy, %reference, "updating package");

		let original = self.cache.fetch(&lock.git.repo, &lock.git.commit)?;
		opts.cancel.check()?;
		let updated = self.cache.fetch(&upstream.git.repo, &reference)?;
		opts.cancel.check()?;
		let original_dir = subdir(&original.path, &lock.git.directory)?;
		let updated_dir = subdir(&updated.path, &upstream.git.directory)?;

		let new_upstream = Upstream {
			git: Git {
				reference: reference.clone(),
				..upstream.git.clone()
			},
			..upstream.clone()
		};
		let new_lock = UpstreamLock {
			origin_type: upstream.origin_type,
			git: GitLock {
				repo: upstream.git.repo.clone(),
				directory: upstream.git.directory.clone(),
				reference: reference.clone(),
				commit: updated.commit.clone(),
			},
		};

		let mut conflicts = Vec::new();
		let mut notes = Vec::new();
		let mut plan = match strategy {
			UpdateStrategy::ResourceMerge => self.plan_resource_merge(
				pkg.root(),
				&original_dir,
				&updated_dir,
				&mut conflicts,
				&mut notes,
			)?,
			UpdateStrategy::FastForward => {
				plan_fast_forward(pkg, &original_dir, &updated_dir)?
			}
			UpdateStrategy::ForceDeleteReplace => {
				plan_replace(pkg.root(), &updated_dir)?
			}
		};
		plan.insert(
			KPTFILE_NAME.to_string(),
			FileOp::Write(self.plan_kptfile(
				pkg,
				&updated_dir,
				strategy,
				&new_upstream,
				&new_lock,
				&mut conflicts,
			)?),
		);
		prune_unchanged(pkg.root(), &mut plan)?;
		let changes = describe(pkg.root(), &plan);
		opts.cancel.check()?;

		if !opts.dry_run {
			apply_plan(pkg.root(), plan)?;
		}

		let subpackages = if opts.dry_run {
			Vec::new()
		} else {
			self.update_subpackages(pkg, opts, &mut notes)?
		};
		Ok(UpdateReport {
			package: pkg.name(),
			strategy,
			reference,
			previous_commit: lock.git.commit,
			commit: updated.commit,
			changes,
			conflicts,
			notes,
			subpackages,
		})
	}

	/// Subpackages track their own upstream and always update to their
	/// declared reference; the parent's reference override does not
	/// cascade. A subpackage that fails to update is skipped with a note
	/// so its siblings still get their turn.
	fn update_subpackages(
		&self,
		pkg: &Package,
		opts: &UpdateOptions,
		notes: &mut Vec<Note>,
	) -> Result<Vec<UpdateReport>> {
		let sub_opts = UpdateOptions {
			strategy: None,
			reference: None,
			dry_run: opts.dry_run,
			cancel: opts.cancel.clone(),
		};
		let mut out = Vec::new();
		for sub in pkg.subpackages()? {
			opts.cancel.check()?;
			let kptfile = sub.kptfile()?;
			if kptfile.upstream.is_none() || kptfile.upstream_lock.is_none() {
				debug!(package = %sub.name(), "subpackage has no upstream, skipping");
				continue;
			}
			match self.update_inner(&sub, &sub_opts) {
				Ok(report) => out.push(report),
				Err(err @ (Error::PathEscape(_) | Error::Cancelled)) => return Err(err),
				Err(err) => {
					warn!(package = %sub.name(), %err, "subpackage update failed");
					notes.push(Note {
						id: sub.name(),
						message: format!("subpackage skipped: {err}"),
					});
				}
			}
		}
		Ok(out)
	}

	fn plan_resource_merge(
		&self,
		local_root: &Path,
		original_dir: &Path,
		updated_dir: &Path,
		conflicts: &mut Vec<Conflict>,
		notes: &mut Vec<Note>,
	) -> Result<Plan> {
		let original = load_resources(original_dir)?;
		let updated = load_resources(updated_dir)?;
		let local = load_resources(local_root)?;
		let merged = merge_sets(&self.schema, &original, &updated, &local);
		conflicts.extend(merged.conflicts);
		notes.extend(merged.notes);

		let mut plan = Plan::new();
		for (path, docs) in merged.files {
			if docs.is_empty() {
				plan.insert(path, FileOp::Delete);
			} else {
				plan.insert(path, FileOp::Write(emit(&docs).into_bytes()));
			}
		}
		merge_other_files(local_root, original_dir, updated_dir, &mut plan, notes)?;
		merge_subpackage_trees(local_root, original_dir, updated_dir, &mut plan, notes)?;
		Ok(plan)
	}

	/// The Kptfile merges like any other resource, except that the
	/// upstream and upstreamLock sections are always rewritten with the
	/// freshly resolved values.
	fn plan_kptfile(
		&self,
		pkg: &Package,
		updated_dir: &Path,
		strategy: UpdateStrategy,
		new_upstream: &Upstream,
		new_lock: &UpstreamLock,
		conflicts: &mut Vec<Conflict>,
	) -> Result<Vec<u8>> {
		let local_doc = read_kptfile_doc(&pkg.kptfile_path())?
			.ok_or_else(|| Error::NotAPackage(pkg.root().to_path_buf()))?;
		let updated_doc = read_kptfile_doc(&updated_dir.join(KPTFILE_NAME))?;
		let mut doc = match (strategy, updated_doc) {
			// A replaced package takes the upstream manifest wholesale.
			(UpdateStrategy::ForceDeleteReplace, Some(updated)) => updated,
			(UpdateStrategy::ResourceMerge, Some(updated)) => {
				let mut scratch = Vec::new();
				let merged = merge_resource(
					&self.schema,
					KPTFILE_NAME,
					None,
					Some(&updated.root),
					Some(&local_doc.root),
					&mut scratch,
				);
				// Disagreements inside the sections rewritten below are
				// not worth reporting.
				conflicts.extend(
					scratch
						.into_iter()
						.filter(|c| !c.field.starts_with("upstream")),
				);
				let mut doc = local_doc.clone();
				doc.root = merged.unwrap_or_else(|| local_doc.root.clone());
				doc
			}
			_ => local_doc,
		};
		set_upstream_sections(&mut doc.root, new_upstream, new_lock);
		Ok(emit(std::slice::from_ref(&doc)).into_bytes())
	}
}

fn subdir(repo_root: &Path, directory: &str) -> Result<PathBuf> {
	let trimmed = directory.trim_start_matches('/');
	if trimmed.is_empty() {
		return Ok(repo_root.to_path_buf());
	}
	safe_join(repo_root, trimmed)
}

pub(crate) fn read_kptfile_doc(path: &Path) -> Result<Option<Document>> {
	if !path.is_file() {
		return Ok(None);
	}
	let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
	let mut docs = parse(&content).map_err(|source| Error::Syntax {
		path: path.display().to_string(),
		source,
	})?;
	Ok(if docs.is_empty() {
		None
	} else {
		Some(docs.remove(0))
	})
}

/// Whole-file 3-way merge for everything that is not a resource
/// manifest. Identical bytes on the comparison side decide who wins; a
/// real 3-way divergence keeps the local file and leaves a note.
fn merge_other_files(
	local_root: &Path,
	original_dir: &Path,
	updated_dir: &Path,
	plan: &mut Plan,
	notes: &mut Vec<Note>,
) -> Result<()> {
	let mut paths: Vec<String> = Vec::new();
	for root in [local_root, original_dir, updated_dir] {
		for file in walk_package(root)? {
			if file.kind == FileKind::Other && !paths.contains(&file.path) {
				paths.push(file.path);
			}
		}
	}
	for path in paths {
		let o = read_opt(&safe_join(original_dir, &path)?)?;
		let u = read_opt(&safe_join(updated_dir, &path)?)?;
		let l = read_opt(&safe_join(local_root, &path)?)?;
		match (o, u, l) {
			// Upstream did not move; local state stands.
			(o, u, _) if o == u => {}
			// Untouched locally; upstream wins.
			(o, Some(u), l) if l == o => {
				plan.insert(path, FileOp::Write(u));
			}
			(o, None, l) if l == o => {
				plan.insert(path, FileOp::Delete);
			}
			// Deleted locally; the deletion wins even over an upstream
			// change.
			(_, _, None) => {}
			(_, None, Some(_)) => {
				notes.push(Note {
					id: path,
					message: "modified locally; kept despite upstream deletion".to_string(),
				});
			}
			(_, Some(u), Some(l)) => {
				if u != l {
					notes.push(Note {
						id: path,
						message: "both sides changed this file; local version kept"
							.to_string(),
					});
				}
			}
		}
	}
	Ok(())
}

/// Subpackage directories merge as units: the walk never descends into
/// them, so additions and deletions are handled tree-wise here and
/// everything else is left to the per-subpackage update pass.
fn merge_subpackage_trees(
	local_root: &Path,
	original_dir: &Path,
	updated_dir: &Path,
	plan: &mut Plan,
	notes: &mut Vec<Note>,
) -> Result<()> {
	let local = subpackage_dirs(local_root)?;
	let original = subpackage_dirs(original_dir)?;
	let updated = subpackage_dirs(updated_dir)?;

	for dir in &updated {
		if local.contains(dir) || original.contains(dir) {
			// Known locally (updated separately) or deleted locally.
			continue;
		}
		// New upstream subpackage: bring over the whole tree.
		let src = safe_join(updated_dir, dir)?;
		for file in walk_package(&src)? {
			let content = read_opt(&safe_join(&src, &file.path)?)?
				.unwrap_or_default();
			plan.insert(format!("{dir}/{}", file.path), FileOp::Write(content));
		}
	}
	for dir in &local {
		if updated.contains(dir) || !original.contains(dir) {
			continue;
		}
		// Deleted upstream. Drop it when untouched, keep it with a note
		// otherwise.
		let local_tree = safe_join(local_root, dir)?;
		let original_tree = safe_join(original_dir, dir)?;
		if trees_equal(&local_tree, &original_tree)? {
			for file in walk_package(&local_tree)? {
				plan.insert(format!("{dir}/{}", file.path), FileOp::Delete);
			}
		} else {
			notes.push(Note {
				id: dir.clone(),
				message: "subpackage modified locally; kept despite upstream deletion"
					.to_string(),
			});
		}
	}
	Ok(())
}

/// Byte-for-byte equality of the package files of two trees.
fn trees_equal(a: &Path, b: &Path) -> Result<bool> {
	let files_a = walk_package(a)?;
	let files_b = walk_package(b)?;
	if files_a != files_b {
		return Ok(false);
	}
	for file in files_a {
		if read_opt(&safe_join(a, &file.path)?)? != read_opt(&safe_join(b, &file.path)?)? {
			return Ok(false);
		}
	}
	Ok(true)
}

/// Fast-forward refuses to proceed unless the package is byte-identical
/// to the original upstream checkout, Kptfile aside.
fn plan_fast_forward(pkg: &Package, original_dir: &Path, updated_dir: &Path) -> Result<Plan> {
	let local_root = pkg.root();
	let changed = |files: Vec<crate::pkg::PackageFile>, other: &Path| -> Result<bool> {
		for file in files {
			if file.kind == FileKind::Kptfile {
				continue;
			}
			let ours = read_opt(&safe_join(local_root, &file.path)?)?;
			let theirs = read_opt(&safe_join(other, &file.path)?)?;
			if ours != theirs {
				return Ok(true);
			}
		}
		Ok(false)
	};
	if changed(walk_package(local_root)?, original_dir)?
		|| changed(walk_package(original_dir)?, local_root)?
	{
		return Err(Error::FastForwardRefused(pkg.name()));
	}
	plan_replace(local_root, updated_dir)
}

/// Replace the package content with the updated tree wholesale.
fn plan_replace(local_root: &Path, updated_dir: &Path) -> Result<Plan> {
	let mut plan = Plan::new();
	for file in walk_package(local_root)? {
		if file.kind != FileKind::Kptfile {
			plan.insert(file.path, FileOp::Delete);
		}
	}
	for file in walk_package(updated_dir)? {
		if file.kind == FileKind::Kptfile {
			continue;
		}
		let content =
			read_opt(&safe_join(updated_dir, &file.path)?)?.unwrap_or_default();
		plan.insert(file.path, FileOp::Write(content));
	}
	Ok(plan)
}

fn read_opt(path: &Path) -> Result<Option<Vec<u8>>> {
	match fs::read(path) {
		Ok(content) => Ok(Some(content)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(Error::io(path, e)),
	}
}

/// Drop plan entries that would not change anything on disk.
fn prune_unchanged(root: &Path, plan: &mut Plan) -> Result<()> {
	let mut keep = Plan::new();
	for (path, op) in std::mem::take(plan) {
		let current = read_opt(&safe_join(root, &path)?)?;
		match op {
			FileOp::Write(content) => {
				if current.as_deref() != Some(content.as_slice()) {
					keep.insert(path, FileOp::Write(content));
				}
			}
			FileOp::Delete => {
				if current.is_some() {
					keep.insert(path, FileOp::Delete);
				}
			}
		}
	}
	*plan = keep;
	Ok(())
}

fn describe(root: &Path, plan: &Plan) -> Vec<FileChange> {
	plan.iter()
		.map(|(path, op)| {
			let action = match op {
				FileOp::Delete => ChangeAction::Deleted,
				FileOp::Write(_) => {
					if root.join(path).is_file() {
						ChangeAction::Updated
					} else {
						ChangeAction::Added
					}
				}
			};
			FileChange {
				path: path.clone(),
				action,
			}
		})
		.collect()
}

/// Stage the new package tree next to the package and swap it in with
/// two renames, so a crash mid-update can never leave a half-merged
/// package behind.
fn apply_plan(root: &Path, plan: Plan) -> Result<()> {
	if plan.is_empty() {
		return Ok(());
	}
	let parent = root
		.parent()
		.ok_or_else(|| Error::PathEscape(root.to_path_buf()))?;
	let staging = tempfile::Builder::new()
		.prefix(".rkpt-staging-")
		.tempdir_in(parent)
		.map_err(|e| Error::io(parent, e))?;
	let staged = staging.path().join("pkg");
	copy_tree(root, &staged)?;
	for (path, op) in &plan {
		let target = safe_join(&staged, path)?;
		match op {
			FileOp::Write(content) => {
				if let Some(dir) = target.parent() {
					fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
				}
				fs::write(&target, content).map_err(|e| Error::io(&target, e))?;
			}
			FileOp::Delete => {
				fs::remove_file(&target).map_err(|e| Error::io(&target, e))?;
				remove_empty_parents(&staged, &target);
			}
		}
	}
	debug!(staged = %staged.display(), changes = plan.len(), "swapping in staged tree");
	let backup = tempfile::Builder::new()
		.prefix(".rkpt-backup-")
		.tempdir_in(parent)
		.map_err(|e| Error::io(parent, e))?;
	let parked = backup.path().join("pkg");
	fs::rename(root, &parked).map_err(|e| Error::io(root, e))?;
	if let Err(e) = fs::rename(&staged, root) {
		// Put the original tree back before reporting.
		let _ = fs::rename(&parked, root);
		return Err(Error::io(root, e));
	}
	Ok(())
}

/// Remove directories left empty by a deletion, up to the staged root.
fn remove_empty_parents(root: &Path, target: &Path) {
	let mut dir = target.parent();
	while let Some(d) = dir {
		if d == root || fs::remove_dir(d).is_err() {
			break;
		}
		dir = d.parent();
	}
}
