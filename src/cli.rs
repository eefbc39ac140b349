//! # DSCCTL CLI
//!
//! Command-line interface for the platform component operator.
//!
//! Inspects the component singletons and triggers reconciliations without
//! waiting for a spec change.
//!
//! ## Usage
//!
//! ```bash
//! # List every component resource and its readiness
//! dscctl list
//!
//! # Show the conditions of the Kueue component
//! dscctl status --component kueue
//!
//! # Trigger a reconciliation of the Dashboard component
//! dscctl reconcile --component dashboard
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dsc_operator::client::KubeClient;
use dsc_operator::components;
use dsc_operator::constants::{ANNOTATION_RECONCILE_REQUESTED_AT, CONDITION_TYPE_READY};
use dsc_operator::controller::registry::{ComponentHandler, ComponentRegistry};
use dsc_operator::crd::{ComponentStatus, Condition};
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use std::sync::Arc;

/// Platform component operator CLI
#[derive(Parser)]
#[command(name = "dscctl")]
#[command(about = "Data Science Cluster operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every component resource
    List,
    /// Show the status conditions of a component
    Status {
        /// Component name (e.g. dashboard, kueue)
        #[arg(short, long)]
        component: String,

        /// Resource name, defaults to the component singleton
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Trigger reconciliation of a component
    Reconcile {
        /// Component name (e.g. dashboard, kueue)
        #[arg(short, long)]
        component: String,

        /// Resource name, defaults to the component singleton
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dscctl=info".into()),
        )
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let cli = Cli::parse();
    let registry = components::registry();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
    let kube_client = KubeClient::new(client, "dscctl");

    match cli.command {
        Commands::List => list_command(&kube_client, &registry).await,
        Commands::Status { component, name } => {
            let handler = find_component(&registry, &component)?;
            status_command(&kube_client, handler.as_ref(), name).await
        }
        Commands::Reconcile { component, name } => {
            let handler = find_component(&registry, &component)?;
            reconcile_command(&kube_client, handler.as_ref(), name).await
        }
    }
}

fn find_component<'a>(
    registry: &'a ComponentRegistry,
    component: &str,
) -> Result<&'a Arc<dyn ComponentHandler>> {
    registry.get(component).with_context(|| {
        format!(
            "Unknown component '{}'. Known components: {}",
            component,
            registry.names().join(", ")
        )
    })
}

/// Cluster-wide API for the component's kind
async fn component_api(
    client: &KubeClient,
    handler: &dyn ComponentHandler,
) -> Result<Api<DynamicObject>> {
    let gvk = handler.gvk();
    let (resource, _) = client
        .resolve(&gvk)
        .await
        .with_context(|| format!("Failed to resolve {}. Is the CRD installed?", gvk.kind))?;
    Ok(Api::all_with(client.inner().clone(), &resource))
}

/// Resource name, defaulting to the component singleton
fn instance_name(handler: &dyn ComponentHandler, name: Option<String>) -> Result<String> {
    if let Some(name) = name {
        return Ok(name);
    }
    handler
        .default_instance()?
        .metadata
        .name
        .context("Component singleton has no name")
}

fn component_status(obj: &DynamicObject) -> ComponentStatus {
    obj.data
        .get("status")
        .and_then(|s| serde_json::from_value(s.clone()).ok())
        .unwrap_or_default()
}

/// Trigger reconciliation by bumping an annotation
///
/// Any metadata change produces a watch event, which the controller turns
/// into a reconciliation pass.
async fn reconcile_command(
    client: &KubeClient,
    handler: &dyn ComponentHandler,
    name: Option<String>,
) -> Result<()> {
    let name = instance_name(handler, name)?;
    let kind = handler.gvk().kind;
    println!("Triggering reconciliation for {kind} '{name}'...");

    let api = component_api(client, handler).await?;
    let timestamp = chrono::Utc::now().to_rfc3339();
    let patch = json!({
        "metadata": {
            "annotations": {
                ANNOTATION_RECONCILE_REQUESTED_AT: timestamp
            }
        }
    });

    api.patch(&name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for {kind} '{name}'"))?;

    println!("Reconciliation triggered successfully");
    println!("   Resource: {kind}/{name}");
    println!("   Timestamp: {timestamp}");
    println!("\nThe operator will reconcile this resource shortly.");

    Ok(())
}

/// List the resources of every registered component
async fn list_command(client: &KubeClient, registry: &ComponentRegistry) -> Result<()> {
    println!(
        "{:<15} {:<30} {:<10} {:<12} {:<10}",
        "COMPONENT", "NAME", "READY", "PHASE", "GENERATION"
    );
    println!("{}", "-".repeat(80));

    for handler in registry.handlers() {
        let api = match component_api(client, handler.as_ref()).await {
            Ok(api) => api,
            Err(e) => {
                println!("{:<15} <unavailable: {:#}>", handler.name(), e);
                continue;
            }
        };
        let items = api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list {} resources", handler.gvk().kind))?;

        for item in items {
            let status = component_status(&item);
            let ready = ready_status(&status.conditions);
            println!(
                "{:<15} {:<30} {:<10} {:<12} {:<10}",
                handler.name(),
                item.metadata.name.as_deref().unwrap_or("<unknown>"),
                ready,
                status.phase.as_deref().unwrap_or("-"),
                status
                    .observed_generation
                    .map_or_else(|| "-".to_string(), |g| g.to_string()),
            );
        }
    }

    Ok(())
}

/// Show the conditions of a component resource
async fn status_command(
    client: &KubeClient,
    handler: &dyn ComponentHandler,
    name: Option<String>,
) -> Result<()> {
    let name = instance_name(handler, name)?;
    let kind = handler.gvk().kind;
    let api = component_api(client, handler).await?;
    let obj = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get {kind} '{name}'"))?;

    println!("Status for {kind} '{name}':\n");
    if let Some(generation) = obj.metadata.generation {
        println!("  Generation: {generation}");
    }

    let status = component_status(&obj);
    if let Some(phase) = &status.phase {
        println!("  Phase: {phase}");
    }
    if let Some(generation) = status.observed_generation {
        println!("  Observed Generation: {generation}");
    }

    if status.conditions.is_empty() {
        println!("\nNo conditions reported (resource may not have been reconciled yet)");
    } else {
        println!("\n{}", conditions_table(&status.conditions));
    }

    Ok(())
}

fn ready_status(conditions: &[Condition]) -> &'static str {
    conditions
        .iter()
        .find(|c| c.r#type == CONDITION_TYPE_READY)
        .map_or("Unknown", |c| c.status.as_str())
}

fn conditions_table(conditions: &[Condition]) -> String {
    let mut lines = vec![format!(
        "{:<25} {:<8} {:<9} {:<28} {}",
        "TYPE", "STATUS", "SEVERITY", "REASON", "MESSAGE"
    )];
    for condition in conditions {
        let severity = if condition.severity.is_error() { "Error" } else { "Info" };
        lines.push(format!(
            "{:<25} {:<8} {:<9} {:<28} {}",
            condition.r#type,
            condition.status.as_str(),
            severity,
            condition.reason,
            condition.message
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsc_operator::crd::{ConditionSeverity, ConditionStatus};

    #[test]
    fn ready_status_defaults_to_unknown() {
        assert_eq!(ready_status(&[]), "Unknown");
        let ready = Condition::new("Ready", ConditionStatus::False);
        assert_eq!(ready_status(&[ready]), "False");
    }

    #[test]
    fn conditions_table_has_one_row_per_condition() {
        let mut info = Condition::new("DeploymentsAvailable", ConditionStatus::False);
        info.severity = ConditionSeverity::Info;
        info.reason = "ManagementStateUnmanaged".to_string();
        let table = conditions_table(&[Condition::new("Ready", ConditionStatus::True), info]);

        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("Ready"));
        assert!(lines[2].contains("Info"));
        assert!(lines[2].contains("ManagementStateUnmanaged"));
    }
}
