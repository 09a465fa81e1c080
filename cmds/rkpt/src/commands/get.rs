//! `pkg get` subcommand handler.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rkpt_pkg::{Cache, GetOptions, UpdateStrategy};

#[derive(Args)]
pub struct GetArgs {
	/// Package source: REPO_URI[.git][/PKG_PATH][@REF]
	pub source: String,

	/// Destination directory (defaults to the package directory name)
	pub dir: Option<PathBuf>,

	/// Update strategy recorded in the Kptfile
	#[arg(long, value_parser = clap::value_parser!(UpdateStrategy))]
	pub strategy: Option<UpdateStrategy>,
}

pub fn run<W: Write>(args: &GetArgs, mut writer: W) -> Result<()> {
	let source = PackageSource::parse(&args.source);
	let dest = match &args.dir {
		Some(dir) => dir.clone(),
		None => PathBuf::from(source.default_dir()),
	};
	let cache = Cache::open()?;
	let opts = GetOptions {
		repo: source.repo.clone(),
		directory: source.directory.clone(),
		reference: source.reference.clone(),
		strategy: args.strategy,
	};
	let pkg = rkpt_pkg::get(&cache, &opts, &dest)
		.with_context(|| format!("fetching {} from {}", source.directory, source.repo))?;
	let lock = pkg
		.kptfile()?
		.upstream_lock
		.context("freshly fetched package carries a lock")?;
	writeln!(
		writer,
		"fetched {} at {} ({})",
		dest.display(),
		source.reference,
		&lock.git.commit[..12.min(lock.git.commit.len())]
	)?;
	Ok(())
}

/// A parsed `REPO_URI[.git][/PKG_PATH][@REF]` source.
///
/// The `.git` suffix separates the repository from the package path; a
/// source without one names the repository root. The reference defaults
/// to `HEAD`, which git resolves to the remote default branch.
#[derive(Debug, PartialEq, Eq)]
pub struct PackageSource {
	pub repo: String,
	pub directory: String,
	pub reference: String,
}

impl PackageSource {
	pub fn parse(source: &str) -> Self {
		// An `@` introduces a reference only when what follows could be
		// one: no slashes (which would make it part of a path) and no
		// colon (which marks an ssh user@host prefix instead).
		let (body, reference) = match source
			.rsplit_once('@')
			.filter(|(_, r)| !r.is_empty() && !r.contains('/') && !r.contains(':'))
		{
			Some((body, reference)) => (body, reference.to_string()),
			None => (source, "HEAD".to_string()),
		};
		let (repo, directory) = if let Some(idx) = body.find(".git/") {
			let (repo, dir) = body.split_at(idx + ".git".len());
			(repo.to_string(), dir.to_string())
		} else if let Some(repo) = body.strip_suffix(".git") {
			(repo.to_string() + ".git", "/".to_string())
		} else {
			(body.to_string(), "/".to_string())
		};
		PackageSource {
			repo,
			directory,
			reference,
		}
	}

	/// Default destination: the package directory name, or the repository
	/// name when fetching the root.
	pub fn default_dir(&self) -> String {
		let dir = self.directory.trim_matches('/');
		let candidate = if dir.is_empty() {
			self.repo
				.trim_end_matches(".git")
				.trim_end_matches('/')
				.rsplit('/')
				.next()
				.unwrap_or("package")
		} else {
			dir.rsplit('/').next().unwrap_or("package")
		};
		candidate.to_string()
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case(
		"https://example.com/repo.git/pkg@v1.0",
		"https://example.com/repo.git",
		"/pkg",
		"v1.0"
	)]
	#[case(
		"https://example.com/repo.git/a/b",
		"https://example.com/repo.git",
		"/a/b",
		"HEAD"
	)]
	#[case("https://example.com/repo.git", "https://example.com/repo.git", "/", "HEAD")]
	#[case("https://example.com/repo@main", "https://example.com/repo", "/", "main")]
	#[case("git@example.com:repo", "git@example.com:repo", "/", "HEAD")]
	fn parses_sources(
		#[case] source: &str,
		#[case] repo: &str,
		#[case] directory: &str,
		#[case] reference: &str,
	) {
		assert_eq!(
			PackageSource::parse(source),
			PackageSource {
				repo: repo.to_string(),
				directory: directory.to_string(),
				reference: reference.to_string(),
			}
		);
	}

	#[rstest]
	#[case("https://example.com/repo.git/pkg", "pkg")]
	#[case("https://example.com/repo.git/a/b", "b")]
	#[case("https://example.com/repo.git", "repo")]
	fn default_dirs(#[case] source: &str, #[case] expected: &str) {
		assert_eq!(PackageSource::parse(source).default_dir(), expected);
	}
}
