//! `pkg update` subcommand handler.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use rkpt_pkg::{Cache, Package, UpdateOptions, UpdateReport, UpdateStrategy, Updater};

#[derive(Args)]
pub struct UpdateArgs {
	/// Package directory, optionally with a target reference: [PKG][@REF]
	#[arg(default_value = ".")]
	pub package: String,

	/// Override the update strategy from the Kptfile
	#[arg(long, value_parser = clap::value_parser!(UpdateStrategy))]
	pub strategy: Option<UpdateStrategy>,

	/// Report format
	#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
	pub output: OutputFormat,

	/// Plan and report without modifying the package
	#[arg(long)]
	pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	Text,
	Json,
}

pub fn run<W: Write>(args: &UpdateArgs, mut writer: W) -> Result<()> {
	let (path, reference) = split_target(&args.package);
	let pkg = Package::open(PathBuf::from(path))?;
	let cache = Cache::open()?;
	let opts = UpdateOptions {
		strategy: args.strategy,
		reference: reference.map(str::to_string),
		dry_run: args.dry_run,
		cancel: rkpt_pkg::CancelFlag::default(),
	};
	let report = Updater::new(cache)
		.update(&pkg, &opts)
		.with_context(|| format!("updating {}", pkg.name()))?;
	match args.output {
		OutputFormat::Text => print_text(&report, &mut writer, args.dry_run)?,
		OutputFormat::Json => {
			serde_json::to_writer_pretty(&mut writer, &report)?;
			writeln!(writer)?;
		}
	}
	Ok(())
}

/// Split `[PKG][@REF]` into path and optional reference.
fn split_target(target: &str) -> (&str, Option<&str>) {
	match target.rsplit_once('@') {
		Some((path, reference)) if !reference.is_empty() && !reference.contains('/') => {
			(if path.is_empty() { "." } else { path }, Some(reference))
		}
		_ => (target, None),
	}
}

fn print_text<W: Write>(report: &UpdateReport, writer: &mut W, dry_run: bool) -> Result<()> {
	let verb = if dry_run { "would update" } else { "updated" };
	writeln!(
		writer,
		"{verb} {} to {} ({} -> {})",
		report.package,
		report.reference,
		short(&report.previous_commit),
		short(&report.commit),
	)?;
	for change in &report.changes {
		let action = match change.action {
			rkpt_pkg::ChangeAction::Added => "added",
			rkpt_pkg::ChangeAction::Updated => "updated",
			rkpt_pkg::ChangeAction::Deleted => "deleted",
		};
		writeln!(writer, "  {action} {}", change.path)?;
	}
	for note in &report.notes {
		writeln!(writer, "  note: {}: {}", note.id, note.message)?;
	}
	for conflict in &report.conflicts {
		writeln!(
			writer,
			"  conflict: {} {}: kept updated value",
			conflict.id, conflict.field
		)?;
	}
	for sub in &report.subpackages {
		print_text(sub, writer, dry_run)?;
	}
	Ok(())
}

fn short(commit: &str) -> &str {
	&commit[..12.min(commit.len())]
}
