use std::sync::Arc;

use stepwire_runtime::{Backend, BackendEvents, Connection, HttpBackend};
use tracing::info;

use crate::config::{BackendTarget, Settings};
use crate::error::Result;

/// Opens a fresh backend connection for one debug session.
pub async fn connect(settings: &Settings) -> Result<(Arc<dyn Backend>, BackendEvents)> {
	let options = settings.connection_options();
	match &settings.backend {
		BackendTarget::Stream(addr) => {
			let (connection, events) = Connection::connect_tcp(addr, options).await?;
			info!(target: "stepwire.cli", addr = %addr, "connected to stream backend");
			let backend: Arc<dyn Backend> = connection;
			Ok((backend, events))
		}
		BackendTarget::Http(url) => {
			let (backend, events) = HttpBackend::new(url.clone(), options)?;
			info!(target: "stepwire.cli", url = %url, "using HTTP backend");
			let backend: Arc<dyn Backend> = Arc::new(backend);
			Ok((backend, events))
		}
	}
}
