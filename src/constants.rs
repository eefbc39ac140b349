//! # Constants
//!
//! Defaults, condition types, reasons, and the label/annotation keys the
//! operator stamps on everything it deploys.

// Server defaults
pub const DEFAULT_METRICS_PORT: u16 = 8080;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

// Platform defaults
pub const DEFAULT_PLATFORM_TYPE: &str = "OpenDataHub";
pub const DEFAULT_FIELD_MANAGER: &str = "dsc-operator";
pub const DEFAULT_APPLICATIONS_NAMESPACE: &str = "opendatahub";
pub const DEFAULT_MANIFESTS_BASE_PATH: &str = "/opt/manifests";

// Requeue and cache defaults
pub const DEFAULT_ERROR_REQUEUE_MIN_SECS: u64 = 5;
pub const DEFAULT_ERROR_REQUEUE_MAX_SECS: u64 = 300;
pub const DEFAULT_DEPLOY_CACHE_TTL_SECS: u64 = 600;

// Condition types
pub const CONDITION_TYPE_READY: &str = "Ready";
pub const CONDITION_TYPE_PROVISIONING_SUCCEEDED: &str = "ProvisioningSucceeded";
pub const CONDITION_TYPE_DEPENDENCIES_AVAILABLE: &str = "DependenciesAvailable";
pub const CONDITION_TYPE_DEPLOYMENTS_AVAILABLE: &str = "DeploymentsAvailable";

// Condition reasons
pub const REASON_ERROR: &str = "Error";
pub const REASON_DEPENDENCY_DEGRADED: &str = "DependencyDegraded";
pub const REASON_DEPLOYMENTS_NOT_READY: &str = "DeploymentsNotReady";
pub const REASON_MANAGEMENT_STATE_UNMANAGED: &str = "ManagementStateUnmanaged";

// Event reasons and actions
pub const EVENT_REASON_PROVISIONING_ERROR: &str = "ProvisioningError";
pub const EVENT_REASON_RECONCILE_ERROR: &str = "ReconcileError";
pub const EVENT_ACTION_RECONCILE: &str = "Reconcile";

// Phases
pub const PHASE_READY: &str = "Ready";
pub const PHASE_NOT_READY: &str = "Not Ready";

// Finalizer
pub const PLATFORM_FINALIZER: &str = "platform.opendatahub.io/finalizer";

// Labels
pub const LABEL_PART_OF: &str = "platform.opendatahub.io/part-of";

// Annotations
pub const ANNOTATION_MANAGED: &str = "opendatahub.io/managed";
pub const ANNOTATION_INSTANCE_GENERATION: &str = "platform.opendatahub.io/instance.generation";
pub const ANNOTATION_INSTANCE_NAME: &str = "platform.opendatahub.io/instance.name";
pub const ANNOTATION_INSTANCE_UID: &str = "platform.opendatahub.io/instance.uid";
pub const ANNOTATION_PLATFORM_TYPE: &str = "platform.opendatahub.io/type";
pub const ANNOTATION_PLATFORM_VERSION: &str = "platform.opendatahub.io/version";
pub const ANNOTATION_RECONCILE_REQUESTED_AT: &str = "platform.opendatahub.io/reconcile-requested-at";
