use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::backend;
use crate::cli::{Cli, Commands};
use crate::config::{FileConfig, Settings};
use crate::dap;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let file = FileConfig::load(cli.config.as_deref()).context("Failed to load config")?;

	match cli.command {
		Commands::Serve(args) => {
			let settings = Settings::resolve(&args, &file)?;
			match settings.port {
				Some(port) => serve_tcp(&settings, port).await,
				None => serve_stdio(&settings).await,
			}
		}
		Commands::Settings(args) => {
			let settings = Settings::resolve(&args, &file)?;
			println!("{}", serde_json::to_string_pretty(&settings)?);
			Ok(())
		}
	}
}

/// One session over stdin/stdout. Logging stays on stderr.
async fn serve_stdio(settings: &Settings) -> Result<()> {
	let (backend, events) = backend::connect(settings)
		.await
		.context("Failed to reach execution backend")?;
	info!(target: "stepwire.cli", "serving DAP on stdio");

	dap::serve(
		tokio::io::stdin(),
		tokio::io::stdout(),
		backend,
		events,
		settings.session_options(),
	)
	.await?;
	Ok(())
}

/// Accepts clients until interrupted; each gets its own backend connection.
async fn serve_tcp(settings: &Settings, port: u16) -> Result<()> {
	let addr = format!("127.0.0.1:{port}");
	let listener = TcpListener::bind(&addr)
		.await
		.with_context(|| format!("Failed to bind DAP listener: {addr}"))?;
	info!(target: "stepwire.cli", addr, "serving DAP on TCP");

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				info!(target: "stepwire.cli", "received Ctrl+C, shutting down");
				break;
			}
			accept = listener.accept() => {
				let (stream, peer) = accept.context("DAP accept failed")?;
				let settings = settings.clone();
				tokio::spawn(async move {
					info!(target: "stepwire.cli", %peer, "client connected");
					let (backend, events) = match backend::connect(&settings).await {
						Ok(connected) => connected,
						Err(err) => {
							warn!(target: "stepwire.cli", %peer, error = %err, "execution backend unreachable, dropping client");
							return;
						}
					};
					let (read_half, write_half) = stream.into_split();
					if let Err(err) = dap::serve(read_half, write_half, backend, events, settings.session_options()).await {
						warn!(target: "stepwire.cli", %peer, error = %err, "session ended with error");
					}
					info!(target: "stepwire.cli", %peer, "client disconnected");
				});
			}
		}
	}

	Ok(())
}
