use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "rkpt")]
#[command(about = "Package manager for Kubernetes YAML configuration", long_about = None)]
#[command(version)]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Fetch, update and inspect packages
	Pkg(commands::pkg::PkgArgs),
}

/// Initialize tracing; `RUST_LOG` overrides the flag.
fn init_logger(level: &str) {
	let level = match level.to_lowercase().as_str() {
		"trace" => "trace",
		"debug" => "debug",
		"info" => "info",
		"warn" | "warning" => "warn",
		"error" => "error",
		_ => "info",
	};

	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(level))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	match cli.command {
		Commands::Pkg(args) => {
			init_logger(&args.log_level);
			commands::pkg::run(args, std::io::stdout().lock())
		}
	}
}
