use std::path::Path;

use anyhow::Result;
use courier_core::config::CourierConfig;
use courier_core::dispatch::Dispatcher;
use courier_core::logging::init_logging;
use courier_core::server::CourierServer;

use crate::demo;

/// Resolve the configuration: file (or defaults), then environment, then flags.
fn resolve_config(path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<CourierConfig> {
    let mut config = match path {
        Some(path) => {
            let mut config = CourierConfig::default();
            config.merge(CourierConfig::from_file(path)?);
            config.apply_env_vars();
            config
        }
        None => CourierConfig::load()?,
    };

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;
    Ok(config)
}

/// Start the demo API and serve until interrupted.
pub async fn run(path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = resolve_config(path, host, port)?;
    init_logging(&config.logging);

    let dispatcher = Dispatcher::builder()
        .with_config(&config)
        .with_registry(demo::registry()?)
        .build();

    log::info!("Starting Courier demo on {}", config.server.bind_address());
    CourierServer::new(&config, dispatcher).serve().await
}
