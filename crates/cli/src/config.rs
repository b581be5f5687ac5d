//! Config file and resolved settings.
//!
//! The config file is optional JSON (`camelCase`) at `--config` or
//! `$XDG_CONFIG_HOME/stepwire/config.json`. Command-line flags win over it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stepwire::{DEFAULT_CONFIGURATION_TIMEOUT, SessionOptions};
use stepwire_protocol::KeyCase;
use stepwire_runtime::{ConnectionOptions, DEFAULT_REQUEST_TIMEOUT};
use tracing::{debug, warn};

use crate::cli::ServeArgs;
use crate::error::{CliError, Result};

/// Schema version of the config file.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
	#[serde(default)]
	pub schema: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub backend_addr: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub backend_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key_case: Option<KeyCase>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_timeout_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub configuration_timeout_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub send_source_text: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub backend_line_base: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub backend_column_base: Option<u32>,
}

impl FileConfig {
	/// Loads the config at `explicit`, or the default location.
	///
	/// An explicit path must exist; a missing default file means no config.
	pub fn load(explicit: Option<&Path>) -> Result<Self> {
		let (path, required) = match explicit {
			Some(path) => (path.to_path_buf(), true),
			None => (default_path(), false),
		};

		let content = match fs::read_to_string(&path) {
			Ok(content) => content,
			Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
				debug!(target: "stepwire.config", path = %path.display(), "no config file");
				return Ok(Self::default());
			}
			Err(e) => return Err(e.into()),
		};

		let config: Self = serde_json::from_str(&content).map_err(|source| CliError::Config {
			path: path.clone(),
			source,
		})?;
		if config.schema > SCHEMA_VERSION {
			warn!(
				target: "stepwire.config",
				path = %path.display(),
				schema = config.schema,
				supported = SCHEMA_VERSION,
				"config written by a newer stepwire, unknown keys are ignored"
			);
		}
		debug!(target: "stepwire.config", path = %path.display(), "loaded config");
		Ok(config)
	}
}

/// `$XDG_CONFIG_HOME/stepwire/config.json`, falling back to `~/.config`.
pub fn default_path() -> PathBuf {
	let config_home = std::env::var_os("XDG_CONFIG_HOME")
		.map(PathBuf::from)
		.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
		.unwrap_or_else(|| PathBuf::from("."));
	config_home.join("stepwire").join("config.json")
}

/// Which transport reaches the execution backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendTarget {
	/// Framed JSON over TCP, `host:port`.
	Stream(String),
	/// One POST per command under this base URL.
	Http(String),
}

/// Effective settings for `serve`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
	pub port: Option<u16>,
	pub backend: BackendTarget,
	pub key_case: KeyCase,
	/// `0` disables the per-command deadline.
	pub request_timeout_ms: u64,
	pub configuration_timeout_ms: u64,
	pub send_source_text: bool,
	pub backend_line_base: u32,
	pub backend_column_base: u32,
}

impl Settings {
	/// Merges flags over the config file.
	pub fn resolve(args: &ServeArgs, file: &FileConfig) -> Result<Self> {
		let backend = match (&args.backend_addr, &args.backend_url) {
			(Some(addr), _) => BackendTarget::Stream(addr.clone()),
			(None, Some(url)) => BackendTarget::Http(url.clone()),
			(None, None) => match (&file.backend_addr, &file.backend_url) {
				(Some(_), Some(_)) => return Err(CliError::ConflictingBackends),
				(Some(addr), None) => BackendTarget::Stream(addr.clone()),
				(None, Some(url)) => BackendTarget::Http(url.clone()),
				(None, None) => return Err(CliError::NoBackend),
			},
		};

		Ok(Self {
			port: args.port.or(file.port),
			backend,
			key_case: args
				.key_case
				.map(KeyCase::from)
				.or(file.key_case)
				.unwrap_or_default(),
			request_timeout_ms: args
				.request_timeout_ms
				.or(file.request_timeout_ms)
				.unwrap_or(DEFAULT_REQUEST_TIMEOUT.as_millis() as u64),
			configuration_timeout_ms: args
				.configuration_timeout_ms
				.or(file.configuration_timeout_ms)
				.unwrap_or(DEFAULT_CONFIGURATION_TIMEOUT.as_millis() as u64),
			send_source_text: !args.no_source_text && file.send_source_text.unwrap_or(true),
			backend_line_base: args.backend_line_base.or(file.backend_line_base).unwrap_or(0).min(1),
			backend_column_base: args.backend_column_base.or(file.backend_column_base).unwrap_or(0).min(1),
		})
	}

	pub fn connection_options(&self) -> ConnectionOptions {
		ConnectionOptions {
			key_case: self.key_case,
			request_timeout: (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms)),
		}
	}

	pub fn session_options(&self) -> SessionOptions {
		SessionOptions {
			configuration_timeout: Duration::from_millis(self.configuration_timeout_ms),
			send_source_text: self.send_source_text,
			backend_line_base: self.backend_line_base,
			backend_column_base: self.backend_column_base,
		}
	}
}
