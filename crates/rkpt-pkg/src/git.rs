//! Git access via the `git` binary.
//!
//! Upstream content is fetched into a local cache with shallow fetches,
//! one checkout per (repository, reference) pair. Commits are immutable
//! and reused from cache; branch and tag fetches are refreshed on every
//! call since the reference may have moved.

use std::{
	collections::hash_map::DefaultHasher,
	fs,
	hash::{Hash, Hasher},
	io::Read,
	path::{Path, PathBuf},
	process::{Command, Stdio},
	thread,
	time::{Duration, Instant},
};

use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Cache location override, mainly for tests.
pub const CACHE_DIR_ENV: &str = "RKPT_CACHE_DIR";
/// Per-command timeout override in seconds.
pub const GIT_TIMEOUT_ENV: &str = "RKPT_GIT_TIMEOUT";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A resolved upstream checkout sitting in the cache.
#[derive(Debug, Clone)]
pub struct Fetched {
	/// Repository work tree root. Content under it must be treated as
	/// read-only; it is shared between runs.
	pub path: PathBuf,
	/// Commit the requested reference resolved to.
	pub commit: String,
}

/// Shallow-fetch cache of upstream repositories.
#[derive(Debug, Clone)]
pub struct Cache {
	root: PathBuf,
}

impl Cache {
	/// Open the default cache: `$RKPT_CACHE_DIR`, or `rkpt` under the
	/// platform cache directory.
	pub fn open() -> Result<Self> {
		let root = match std::env::var_os(CACHE_DIR_ENV) {
			Some(dir) => PathBuf::from(dir),
			None => dirs::cache_dir()
				.unwrap_or_else(std::env::temp_dir)
				.join("rkpt"),
		};
		Self::at(root)
	}

	pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();
		fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
		Ok(Cache { root })
	}

	/// Fetch `reference` of `repo`, returning the cached checkout. A full
	/// commit sha already present in the cache is served without touching
	/// the network.
	#[instrument(skip(self))]
	pub fn fetch(&self, repo: &str, reference: &str) -> Result<Fetched> {
		let dir = self.root.join(checkout_name(repo, reference));
		if dir.join(".git").is_dir() {
			if let Some(commit) = cached_commit(&dir, reference) {
				debug!(path = %dir.display(), "cache hit");
				return Ok(Fetched { path: dir, commit });
			}
		} else {
			fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
			run_git(&dir, "init", &["init", "--quiet"])?;
			run_git(&dir, "remote", &["remote", "add", "origin", repo])?;
		}
		// `remote set-url` keeps an existing checkout usable after an
		// interrupted first fetch.
		run_git(&dir, "remote", &["remote", "set-url", "origin", repo])?;
		// Only the requested ref is fetched; local tag refs are never
		// created, so a tag moved upstream can not clobber a stale one in
		// the cache.
		let shallow = run_git(
			&dir,
			"fetch",
			&["fetch", "--depth=1", "origin", reference],
		);
		match shallow {
			Ok(_) => {
				run_git(&dir, "reset", &["reset", "--hard", "FETCH_HEAD", "--quiet"])?;
			}
			// Servers may refuse to serve a bare commit sha; fall back to
			// a full fetch and reset to the commit.
			Err(err) if is_commit_sha(reference) => {
				debug!(%err, "shallow fetch refused, fetching full history");
				run_git(
					&dir,
					"fetch",
					&[
						"fetch",
						"--force",
						"--tags",
						"origin",
						"+refs/heads/*:refs/remotes/origin/*",
					],
				)?;
				run_git(&dir, "reset", &["reset", "--hard", reference, "--quiet"])?;
			}
			Err(err) => return Err(err),
		}
		// Submodules are best-effort; a package rarely has them but kpt
		// checks them out when present.
		let _ = run_git(
			&dir,
			"submodule",
			&["submodule", "update", "--init", "--recursive", "--depth=1"],
		);
		let commit = run_git(&dir, "rev-parse", &["rev-parse", "HEAD"])?
			.trim()
			.to_string();
		debug!(%commit, path = %dir.display(), "fetched");
		Ok(Fetched { path: dir, commit })
	}
}

/// Commits are content-addressed, so a checkout whose HEAD already equals
/// the requested sha never needs refetching.
fn cached_commit(dir: &Path, reference: &str) -> Option<String> {
	if !is_commit_sha(reference) {
		return None;
	}
	let head = run_git(dir, "rev-parse", &["rev-parse", "HEAD"]).ok()?;
	let head = head.trim();
	head.eq_ignore_ascii_case(reference).then(|| head.to_string())
}

pub fn is_commit_sha(s: &str) -> bool {
	s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn checkout_name(repo: &str, reference: &str) -> String {
	let mut hasher = DefaultHasher::new();
	repo.hash(&mut hasher);
	reference.hash(&mut hasher);
	let tail: String = repo
		.trim_end_matches(".git")
		.trim_end_matches('/')
		.chars()
		.rev()
		.take(40)
		.collect::<String>()
		.chars()
		.rev()
		.map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
		.collect();
	format!("{tail}-{:016x}", hasher.finish())
}

/// True when `path` sits inside a git work tree. Used to decide whether
/// the uncommitted-changes check applies at all.
pub fn in_work_tree(path: &Path) -> bool {
	run_git(path, "rev-parse", &["rev-parse", "--is-inside-work-tree"])
		.is_ok_and(|out| out.trim() == "true")
}

/// True when the work tree has uncommitted changes under `path`.
pub fn has_local_changes(path: &Path) -> Result<bool> {
	let out = run_git(path, "status", &["status", "--porcelain", "--", "."])?;
	Ok(!out.trim().is_empty())
}

/// Run one git command in `dir`, capturing stdout. Failure carries the
/// stderr text; a hung command is killed once the timeout elapses.
fn run_git(dir: &Path, op: &'static str, args: &[&str]) -> Result<String> {
	debug!(?args, dir = %dir.display(), "git");
	let mut child = Command::new("git")
		.args(args)
		.current_dir(dir)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.map_err(Error::GitSpawn)?;

	// Drain both pipes off-thread so a chatty command never deadlocks on
	// a full pipe buffer.
	let stdout = child.stdout.take();
	let stderr = child.stderr.take();
	let stdout_handle = thread::spawn(move || read_all(stdout));
	let stderr_handle = thread::spawn(move || read_all(stderr));

	let timeout = timeout();
	let start = Instant::now();
	let status = loop {
		if let Some(status) = child.try_wait().map_err(Error::GitSpawn)? {
			break status;
		}
		if start.elapsed() >= timeout {
			let _ = child.kill();
			let _ = child.wait();
			return Err(Error::GitTimeout {
				op,
				seconds: timeout.as_secs(),
			});
		}
		thread::sleep(Duration::from_millis(25));
	};

	let stdout = stdout_handle.join().unwrap_or_default();
	let stderr = stderr_handle.join().unwrap_or_default();
	if !status.success() {
		return Err(Error::Git {
			op,
			stderr: String::from_utf8_lossy(&stderr).into_owned(),
		});
	}
	Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn read_all(pipe: Option<impl Read>) -> Vec<u8> {
	let mut buf = Vec::new();
	if let Some(mut pipe) = pipe {
		pipe.read_to_end(&mut buf).ok();
	}
	buf
}

fn timeout() -> Duration {
	std::env::var(GIT_TIMEOUT_ENV)
		.ok()
		.and_then(|v| v.parse().ok())
		.map_or(DEFAULT_TIMEOUT, Duration::from_secs)
}
