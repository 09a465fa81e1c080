//! The `pkg` subcommand group.

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct PkgArgs {
	#[command(subcommand)]
	pub command: PkgCommands,

	/// Log level (trace, debug, info, warn, error)
	#[arg(long, global = true, default_value = "info")]
	pub log_level: String,
}

#[derive(Subcommand)]
pub enum PkgCommands {
	/// Fetch a package from a git repository
	Get(super::get::GetArgs),

	/// Update a package to a newer upstream version
	Update(super::update::UpdateArgs),

	/// Print the package and subpackage hierarchy
	Tree(super::tree::TreeArgs),
}

pub fn run<W: Write>(args: PkgArgs, writer: W) -> Result<()> {
	match args.command {
		PkgCommands::Get(args) => super::get::run(&args, writer),
		PkgCommands::Update(args) => super::update::run(&args, writer),
		PkgCommands::Tree(args) => super::tree::run(&args, writer),
	}
}
