use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter for a `-v` count. Launch tracing (`stepwire::trace`) stays visible at every level.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = warnings only; stdout may be the DAP channel, so nothing goes there
	// 1 (-v) = info for the adapter
	// 2+ (-vv) = debug for everything, wire traffic included
	match verbosity {
		0 => "warn,stepwire::trace=info",
		1 => "info",
		_ => "debug",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_ansi(false)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
