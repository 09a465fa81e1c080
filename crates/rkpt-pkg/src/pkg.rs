//! On-disk package model.

use std::{
	fs,
	path::{Path, PathBuf},
};

use rkpt_merge::ResourceSet;
use tracing::trace;
use walkdir::WalkDir;

use crate::{
	error::{Error, Result},
	kptfile::{Kptfile, KPTFILE_NAME},
	paths::relative_display,
};

/// A directory containing a `Kptfile`.
#[derive(Debug, Clone)]
pub struct Package {
	root: PathBuf,
}

/// A file belonging to a package, excluding subpackage trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
	/// Package-relative path with forward slashes.
	pub path: String,
	pub kind: FileKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
	/// `.yaml`/`.yml` resource manifests, merged resource by resource.
	Resource,
	/// The package manifest itself.
	Kptfile,
	/// Anything else (READMEs, scripts); merged whole-file.
	Other,
}

impl Package {
	/// Open an existing package, failing when `path` holds no Kptfile.
	/// Symlinks in the path are resolved so that boundary checks operate
	/// on real locations.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let root = path.into();
		let root = fs::canonicalize(&root).map_err(|e| Error::io(&root, e))?;
		if !root.join(KPTFILE_NAME).is_file() {
			return Err(Error::NotAPackage(root));
		}
		Ok(Package { root })
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn name(&self) -> String {
		self.root
			.file_name()
			.map_or_else(|| self.root.display().to_string(), |n| n.to_string_lossy().into_owned())
	}

	pub fn kptfile_path(&self) -> PathBuf {
		self.root.join(KPTFILE_NAME)
	}

	pub fn kptfile(&self) -> Result<Kptfile> {
		Kptfile::read(&self.kptfile_path())
	}

	/// Every file of this package in walk order, not descending into
	/// subpackages or VCS metadata.
	pub fn files(&self) -> Result<Vec<PackageFile>> {
		walk_package(&self.root)
	}

	/// Parse every resource manifest of this package into a set keyed by
	/// resource identity.
	pub fn resources(&self) -> Result<ResourceSet> {
		load_resources(&self.root)
	}

	/// Direct subpackages: nested directories carrying their own Kptfile.
	/// Subpackages of subpackages belong to their parent and are not
	/// listed here.
	pub fn subpackages(&self) -> Result<Vec<Package>> {
		let mut out = Vec::new();
		let mut it = sorted_walk(&self.root);
		while let Some(entry) = it.next() {
			let entry = entry.map_err(walk_error)?;
			if entry.depth() == 0 || !entry.file_type().is_dir() {
				continue;
			}
			if entry.path().join(KPTFILE_NAME).is_file() {
				trace!(path = %entry.path().display(), "found subpackage");
				out.push(Package {
					root: entry.path().to_path_buf(),
				});
				it.skip_current_dir();
			}
		}
		Ok(out)
	}
}

/// Walk any directory laid out as a package tree. Used for upstream
/// checkouts as well, which may lack a Kptfile entirely.
pub fn walk_package(root: &Path) -> Result<Vec<PackageFile>> {
	let mut out = Vec::new();
	let mut it = sorted_walk(root);
	while let Some(entry) = it.next() {
		let entry = entry.map_err(walk_error)?;
		if entry.file_type().is_dir() {
			if entry.depth() > 0 && entry.path().join(KPTFILE_NAME).is_file() {
				// Subpackage boundary.
				it.skip_current_dir();
			}
			continue;
		}
		if !entry.file_type().is_file() {
			continue;
		}
		let path = relative_display(root, entry.path());
		let kind = classify(&path, entry.depth());
		out.push(PackageFile { path, kind });
	}
	Ok(out)
}

/// Load every resource manifest under `root` into a [`ResourceSet`].
/// The Kptfile is handled separately and never enters the set.
pub fn load_resources(root: &Path) -> Result<ResourceSet> {
	let mut set = ResourceSet::new();
	for file in walk_package(root)? {
		if file.kind != FileKind::Resource {
			continue;
		}
		let full = root.join(&file.path);
		let content = fs::read_to_string(&full).map_err(|e| Error::io(&full, e))?;
		set.insert_file(&file.path, &content)
			.map_err(|source| Error::Syntax {
				path: file.path.clone(),
				source,
			})?;
	}
	Ok(set)
}

/// Package-relative paths of the direct subpackage directories under
/// `root`.
pub fn subpackage_dirs(root: &Path) -> Result<Vec<String>> {
	let mut out = Vec::new();
	let mut it = sorted_walk(root);
	while let Some(entry) = it.next() {
		let entry = entry.map_err(walk_error)?;
		if entry.depth() == 0 || !entry.file_type().is_dir() {
			continue;
		}
		if entry.path().join(KPTFILE_NAME).is_file() {
			out.push(relative_display(root, entry.path()));
			it.skip_current_dir();
		}
	}
	Ok(out)
}

fn sorted_walk(
	root: &Path,
) -> walkdir::FilterEntry<walkdir::IntoIter, impl FnMut(&walkdir::DirEntry) -> bool> {
	WalkDir::new(root)
		.sort_by_file_name()
		.follow_links(false)
		.into_iter()
		.filter_entry(|e| e.file_name() != ".git")
}

fn classify(path: &str, depth: usize) -> FileKind {
	if depth == 1 && path == KPTFILE_NAME {
		return FileKind::Kptfile;
	}
	if path.ends_with(".yaml") || path.ends_with(".yml") {
		FileKind::Resource
	} else {
		FileKind::Other
	}
}

fn walk_error(err: walkdir::Error) -> Error {
	let path = err
		.path()
		.map_or_else(PathBuf::new, Path::to_path_buf);
	match err.into_io_error() {
		Some(io) => Error::io(path, io),
		None => Error::io(path, std::io::Error::other("filesystem loop")),
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use tempfile::TempDir;

	use super::*;

	fn write(root: &Path, rel: &str, content: &str) {
		let full = root.join(rel);
		fs::create_dir_all(full.parent().unwrap()).unwrap();
		fs::write(full, content).unwrap();
	}

	const KPTFILE: &str = "apiVersion: kpt.dev/v1\nkind: Kptfile\nmetadata:\n  name: demo\n";

	fn sample_package() -> TempDir {
		let dir = TempDir::new().unwrap();
		let root = dir.path();
		write(root, "Kptfile", KPTFILE);
		write(
			root,
			"deploy.yaml",
			"apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n",
		);
		write(root, "docs/README.md", "# demo\n");
		write(root, "sub/Kptfile", KPTFILE);
		write(
			root,
			"sub/svc.yaml",
			"apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n",
		);
		dir
	}

	#[test]
	fn open_requires_kptfile() {
		let dir = TempDir::new().unwrap();
		assert!(matches!(
			Package::open(dir.path()),
			Err(Error::NotAPackage(_))
		));
		write(dir.path(), "Kptfile", KPTFILE);
		Package::open(dir.path()).unwrap();
	}

	#[test]
	fn files_stop_at_subpackage_boundaries() {
		let dir = sample_package();
		let pkg = Package::open(dir.path()).unwrap();
		let files = pkg.files().unwrap();
		let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
		assert!(paths.contains(&"Kptfile"));
		assert!(paths.contains(&"deploy.yaml"));
		assert!(paths.contains(&"docs/README.md"));
		assert!(!paths.iter().any(|p| p.starts_with("sub/")));
	}

	#[test]
	fn file_kinds() {
		let dir = sample_package();
		let pkg = Package::open(dir.path()).unwrap();
		let files = pkg.files().unwrap();
		let kind = |path: &str| files.iter().find(|f| f.path == path).unwrap().kind;
		assert_eq!(kind("Kptfile"), FileKind::Kptfile);
		assert_eq!(kind("deploy.yaml"), FileKind::Resource);
		assert_eq!(kind("docs/README.md"), FileKind::Other);
	}

	#[test]
	fn resources_exclude_kptfile_and_subpackages() {
		let dir = sample_package();
		let pkg = Package::open(dir.path()).unwrap();
		let set = pkg.resources().unwrap();
		assert_eq!(set.len(), 1);
	}

	#[test]
	fn subpackages_are_direct_only() {
		let dir = sample_package();
		write(dir.path(), "sub/nested/Kptfile", KPTFILE);
		let pkg = Package::open(dir.path()).unwrap();
		let subs = pkg.subpackages().unwrap();
		assert_eq!(subs.len(), 1);
		assert_eq!(subs[0].name(), "sub");
	}

	#[test]
	fn syntax_error_names_the_file() {
		let dir = sample_package();
		write(dir.path(), "broken.yaml", "a: [unterminated\n");
		let pkg = Package::open(dir.path()).unwrap();
		let err = pkg.resources().unwrap_err();
		assert!(err.to_string().contains("broken.yaml"));
	}
}
