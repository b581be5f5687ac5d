
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use stepwire_protocol::KeyCase;

use crate::styles::cli_styles;

/// Key casing on the backend wire (CLI wrapper for [`KeyCase`])
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliKeyCase {
	/// StopOnEntry
	Pascal,
	/// stopOnEntry
	Camel,
	/// stop_on_entry
	Snake,
	/// Keys sent as built
	Preserve,
}

impl From<CliKeyCase> for KeyCase {
	fn from(case: CliKeyCase) -> Self {
		match case {
			CliKeyCase::Pascal => KeyCase::Pascal,
			CliKeyCase::Camel => KeyCase::Camel,
			CliKeyCase::Snake => KeyCase::Snake,
			CliKeyCase::Preserve => KeyCase::Preserve,
		}
	}
}

#[derive(Parser, Debug)]
#[command(name = "stepwire")]
#[command(about = "Debug adapter for stepwire execution backends")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (default: $XDG_CONFIG_HOME/stepwire/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Serve the Debug Adapter Protocol on stdio, or on a TCP port with --port
	Serve(ServeArgs),

	/// Print the settings `serve` would use, as JSON
	Settings(ServeArgs),
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeArgs {
	/// Accept DAP clients on this TCP port instead of stdio
	#[arg(short, long, value_name = "PORT")]
	pub port: Option<u16>,

	/// Execution backend reachable over a framed TCP stream
	#[arg(long, value_name = "HOST:PORT", conflicts_with = "backend_url")]
	pub backend_addr: Option<String>,

	/// Execution backend reachable over HTTP (commands POST to URL/<command>)
	#[arg(long, value_name = "URL")]
	pub backend_url: Option<String>,

	/// Key casing the backend expects
	#[arg(long, value_enum, value_name = "CASE")]
	pub key_case: Option<CliKeyCase>,

	/// Per-command deadline in milliseconds (0 disables it)
	#[arg(long, value_name = "MS")]
	pub request_timeout_ms: Option<u64>,

	/// How long launch waits for configurationDone, in milliseconds
	#[arg(long, value_name = "MS")]
	pub configuration_timeout_ms: Option<u64>,

	/// Let the backend read the program file itself instead of sending its text
	#[arg(long)]
	pub no_source_text: bool,

	/// First line number the backend uses
	#[arg(long, value_name = "BASE", value_parser = clap::value_parser!(u32).range(0..=1))]
	pub backend_line_base: Option<u32>,

	/// First column number the backend uses
	#[arg(long, value_name = "BASE", value_parser = clap::value_parser!(u32).range(0..=1))]
	pub backend_column_base: Option<u32>,
}
