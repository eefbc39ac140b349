//! # Initialization
//!
//! Operator initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes client setup, and creation of the component
//! singletons.

use super::server::{start_server, ServerState};
use crate::client::{ClusterClient, KubeClient, ObjectKey};
use crate::config::{OperatorConfig, ServerConfig};
use crate::controller::registry::{ComponentContext, ComponentRegistry};
use crate::observability;
use crate::resources::gvk_string;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialization result containing all necessary components for the operator
#[derive(Debug)]
pub struct InitializationResult {
    /// Shared context handed to every component controller
    pub context: ComponentContext,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

/// Initialize the operator runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Default component instances
pub async fn initialize(
    config: OperatorConfig,
    server_config: &ServerConfig,
    registry: &ComponentRegistry,
) -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    init_tracing();

    info!("Starting Data Science Cluster operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        platform = %config.platform_type,
        version = %config.platform_version,
        applications_namespace = %config.applications_namespace,
        components = ?registry.names(),
        "Operator configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });

    wait_for_server_ready(&server_state, &server_handle, server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let cluster = cluster_client(client.clone(), &config.field_manager);

    ensure_default_instances(cluster.as_ref(), registry).await;

    info!("Operator initialized, starting controllers...");

    Ok(InitializationResult {
        context: ComponentContext {
            kube: client,
            cluster,
            config,
            shutdown: CancellationToken::new(),
        },
        server_state,
    })
}

/// The cluster client every controller shares; calls through it run
/// concurrently
pub fn cluster_client(client: Client, field_manager: &str) -> Arc<dyn ClusterClient> {
    Arc::new(KubeClient::new(client, field_manager))
}

/// Install the global tracing subscriber; `LOG_FORMAT=json` switches to JSON
/// lines
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "dsc_operator=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let result = if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    if let Err(e) = result {
        warn!("Tracing subscriber init returned error (may already be initialized): {}", e);
    }
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = std::time::Duration::from_secs(server_config.startup_timeout_secs);
    let poll_interval = std::time::Duration::from_millis(server_config.poll_interval_ms);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Create the singleton instance of every registered component that does
/// not have one yet
///
/// Failures are logged and do not stop startup; the controller of a
/// component whose CRD is missing simply never sees an instance.
#[tracing::instrument(skip_all, name = "controller.startup.default_instances")]
pub async fn ensure_default_instances(client: &dyn ClusterClient, registry: &ComponentRegistry) {
    let mut errors = Vec::new();
    for handler in registry.handlers() {
        let gvk = handler.gvk();
        let result = async {
            let instance = handler.default_instance()?;
            let key = ObjectKey::of(&instance);
            match client.get(&gvk, &key).await {
                Ok(_) => {
                    info!(component = handler.name(), name = %key, "Component instance exists");
                    return Ok(());
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            match client.create(&instance).await {
                Ok(_) => {
                    info!(component = handler.name(), name = %key, "Created component instance");
                    Ok(())
                }
                Err(e) if e.is_already_exists() => Ok(()),
                Err(e) => Err(e),
            }
        }
        .await;

        if let Err(e) = result {
            errors.push(format!("{} ({}): {e}", handler.name(), gvk_string(&gvk)));
        }
    }

    if !errors.is_empty() {
        warn!(
            "Failed to ensure component instances: {}. Are the CRDs installed?",
            errors.join("; ")
        );
    }
}
