//! Path handling within a package boundary.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Join a package-relative path onto a package root, rejecting anything
/// that would land outside the root. Absolute paths and `..` components
/// escaping the root are refused; `..` within the relative path is
/// resolved lexically.
pub fn safe_join(root: &Path, rel: &str) -> Result<PathBuf> {
	let rel_path = Path::new(rel);
	if rel_path.is_absolute() {
		return Err(Error::PathEscape(rel_path.to_path_buf()));
	}
	let mut depth = 0usize;
	let mut out = root.to_path_buf();
	for component in rel_path.components() {
		match component {
			Component::Normal(part) => {
				depth += 1;
				out.push(part);
			}
			Component::CurDir => {}
			Component::ParentDir => {
				if depth == 0 {
					return Err(Error::PathEscape(rel_path.to_path_buf()));
				}
				depth -= 1;
				out.pop();
			}
			Component::RootDir | Component::Prefix(_) => {
				return Err(Error::PathEscape(rel_path.to_path_buf()));
			}
		}
	}
	Ok(out)
}

/// Package-relative display form of `path`, with forward slashes on every
/// platform. Falls back to the full path when `path` is not under `base`.
pub fn relative_display(base: &Path, path: &Path) -> String {
	let rel = pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf());
	let mut out = String::new();
	for component in rel.components() {
		if !out.is_empty() {
			out.push('/');
		}
		out.push_str(&component.as_os_str().to_string_lossy());
	}
	out
}

/// Write `content` to `path` via a sibling temporary file and rename, so
/// readers never observe a half-written file.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
	let dir = path.parent().ok_or_else(|| Error::PathEscape(path.to_path_buf()))?;
	let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
	std::io::Write::write_all(&mut tmp, content).map_err(|e| Error::io(path, e))?;
	tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
	Ok(())
}

/// Recursively copy `src` into `dst`, skipping VCS metadata. `dst` is
/// created if missing.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
	for entry in walkdir::WalkDir::new(src)
		.follow_links(false)
		.into_iter()
		.filter_entry(|e| e.file_name() != ".git")
	{
		let entry = entry.map_err(|e| {
			let path = e.path().map_or_else(PathBuf::new, Path::to_path_buf);
			match e.into_io_error() {
				Some(io) => Error::io(path, io),
				None => Error::io(path, std::io::Error::other("filesystem loop")),
			}
		})?;
		let rel = relative_display(src, entry.path());
		let target = if rel.is_empty() {
			dst.to_path_buf()
		} else {
			safe_join(dst, &rel)?
		};
		if entry.file_type().is_dir() {
			std::fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
		} else if entry.file_type().is_file() {
			if let Some(parent) = target.parent() {
				std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
			}
			std::fs::copy(entry.path(), &target).map_err(|e| Error::io(&target, e))?;
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case("deploy.yaml", Some("/pkg/deploy.yaml"))]
	#[case("sub/dir/x.yaml", Some("/pkg/sub/dir/x.yaml"))]
	#[case("sub/../x.yaml", Some("/pkg/x.yaml"))]
	#[case("./x.yaml", Some("/pkg/x.yaml"))]
	#[case("../outside.yaml", None)]
	#[case("sub/../../outside.yaml", None)]
	#[case("/etc/passwd", None)]
	fn safe_join_cases(#[case] rel: &str, #[case] expected: Option<&str>) {
		let result = safe_join(Path::new("/pkg"), rel);
		match expected {
			Some(path) => assert_eq!(result.unwrap(), PathBuf::from(path)),
			None => assert_matches!(result, Err(Error::PathEscape(_))),
		}
	}

	#[test]
	fn relative_display_uses_forward_slashes() {
		assert_eq!(
			relative_display(Path::new("/pkg"), Path::new("/pkg/sub/x.yaml")),
			"sub/x.yaml"
		);
	}
}
