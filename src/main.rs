//! # DSC Operator
//!
//! Runs one kube-runtime controller per enabled platform component.
//!
//! ## Usage
//!
//! ```bash
//! # Run every registered component
//! dsc-operator
//!
//! # Only run the Dashboard, with JSON logs
//! ENABLED_COMPONENTS=dashboard LOG_FORMAT=json dsc-operator
//! ```

use anyhow::Result;
use dsc_operator::components;
use dsc_operator::config::load_config;
use dsc_operator::controller::registry::ComponentRegistry;
use dsc_operator::runtime::initialization::{initialize, InitializationResult};
use std::sync::atomic::Ordering;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, server_config) = load_config();
    let registry = components::registry().enabled(&config);

    let init_result = initialize(config, &server_config, &registry).await?;

    run_components(&registry, init_result).await
}

/// Run every component controller until Ctrl-C, then shut them down
async fn run_components(registry: &ComponentRegistry, init: InitializationResult) -> Result<()> {
    let mut controllers = Vec::new();
    registry.for_each(|handler| {
        let controller = handler.controller(init.context.clone())?;
        controllers.push((handler.name().to_string(), controller));
        Ok(())
    })?;

    let shutdown = init.context.shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    let running = controllers.into_iter().map(|(name, controller)| async move {
        let result = controller.await;
        if let Err(e) = &result {
            error!(component = %name, "Controller stopped with error: {:#}", e);
        }
        result.map_err(|e| anyhow::anyhow!("{name}: {e:#}"))
    });

    let results = futures::future::join_all(running).await;

    init.server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Shutdown complete");

    let errors: Vec<String> = results
        .into_iter()
        .filter_map(|r| r.err().map(|e| e.to_string()))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(errors.join("; ")))
    }
}
