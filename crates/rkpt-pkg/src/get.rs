//! Initial package fetch (`rkpt pkg get`).

use std::path::Path;

use rkpt_yaml::emit;
use tracing::{info, instrument};

use crate::{
	error::{Error, Result},
	git::Cache,
	kptfile::{
		set_upstream_sections, Git, GitLock, Kptfile, OriginType, Upstream, UpstreamLock,
		UpdateStrategy, KPTFILE_NAME,
	},
	paths::{copy_tree, safe_join},
	pkg::Package,
	update::read_kptfile_doc,
};

#[derive(Debug, Clone)]
pub struct GetOptions {
	/// Clone URL of the upstream repository.
	pub repo: String,
	/// Package directory within the repository, `/` for the root.
	pub directory: String,
	/// Branch, tag or commit to fetch.
	pub reference: String,
	/// Strategy recorded in the new Kptfile for later updates.
	pub strategy: Option<UpdateStrategy>,
}

/// Fetch an upstream package into `dest` and pin its Kptfile to the
/// resolved commit. `dest` must not already exist.
#[instrument(skip_all, fields(repo = %opts.repo, reference = %opts.reference))]
pub fn get(cache: &Cache, opts: &GetOptions, dest: &Path) -> Result<Package> {
	if dest.exists() {
		return Err(Error::io(
			dest,
			std::io::Error::new(std::io::ErrorKind::AlreadyExists, "destination exists"),
		));
	}
	let fetched = cache.fetch(&opts.repo, &opts.reference)?;
	let trimmed = opts.directory.trim_start_matches('/');
	let src = if trimmed.is_empty() {
		fetched.path.clone()
	} else {
		safe_join(&fetched.path, trimmed)?
	};
	if !src.is_dir() {
		return Err(Error::io(
			&src,
			std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("directory {} not found in {}", opts.directory, opts.repo),
			),
		));
	}
	copy_tree(&src, dest)?;

	let name = dest
		.file_name()
		.map_or_else(|| "package".to_string(), |n| n.to_string_lossy().into_owned());
	let upstream = Upstream {
		origin_type: OriginType::Git,
		git: Git {
			repo: opts.repo.clone(),
			directory: opts.directory.clone(),
			reference: opts.reference.clone(),
		},
		update_strategy: opts.strategy,
	};
	let lock = UpstreamLock {
		origin_type: OriginType::Git,
		git: GitLock {
			repo: opts.repo.clone(),
			directory: opts.directory.clone(),
			reference: opts.reference.clone(),
			commit: fetched.commit.clone(),
		},
	};

	let kptfile_path = dest.join(KPTFILE_NAME);
	// An upstream Kptfile is kept with its comments; otherwise a minimal
	// one is created.
	match read_kptfile_doc(&kptfile_path)? {
		Some(mut doc) => {
			set_upstream_sections(&mut doc.root, &upstream, &lock);
			crate::paths::write_atomic(
				&kptfile_path,
				emit(std::slice::from_ref(&doc)).as_bytes(),
			)?;
		}
		None => {
			let manifest = Kptfile {
				upstream: Some(upstream),
				upstream_lock: Some(lock),
				..Kptfile::new(name)
			};
			manifest.write(&kptfile_path)?;
		}
	}
	info!(commit = %fetched.commit, dest = %dest.display(), "package fetched");
	Package::open(dest)
}
