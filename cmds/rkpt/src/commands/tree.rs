//! `pkg tree` subcommand handler.

use std::{io::Write, path::PathBuf};

use anyhow::Result;
use clap::Args;
use rkpt_merge::ResourceKey;
use rkpt_pkg::Package;

#[derive(Args)]
pub struct TreeArgs {
	/// Package directory
	#[arg(default_value = ".")]
	pub package: PathBuf,
}

pub fn run<W: Write>(args: &TreeArgs, mut writer: W) -> Result<()> {
	let pkg = Package::open(&args.package)?;
	print_package(&pkg, 0, &mut writer)
}

fn print_package<W: Write>(pkg: &Package, depth: usize, writer: &mut W) -> Result<()> {
	let indent = "  ".repeat(depth);
	writeln!(writer, "{indent}{}/", pkg.name())?;
	for resource in pkg.resources()?.resources() {
		if let ResourceKey::Id(id) = &resource.key {
			writeln!(writer, "{indent}  {} ({})", id, resource.path)?;
		}
	}
	for sub in pkg.subpackages()? {
		print_package(&sub, depth + 1, writer)?;
	}
	Ok(())
}
