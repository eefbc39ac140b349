//! # Operator Configuration
//!
//! Platform, namespace, and reconcile tuning loaded from environment
//! variables.

use super::env_var_or_default;
use crate::constants::{
    DEFAULT_APPLICATIONS_NAMESPACE, DEFAULT_DEPLOY_CACHE_TTL_SECS, DEFAULT_ERROR_REQUEUE_MAX_SECS,
    DEFAULT_ERROR_REQUEUE_MIN_SECS, DEFAULT_FIELD_MANAGER, DEFAULT_PLATFORM_TYPE,
};
use crate::crd::Release;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Platform name reported in the release and stamped on deployed objects
    pub platform_type: String,
    pub platform_version: String,
    /// Prefix of the server-side apply field manager of every controller
    pub field_manager: String,
    /// Namespace components deploy their workloads into
    pub applications_namespace: String,
    /// Components to run; empty runs every registered component
    pub enabled_components: Vec<String>,
    pub error_requeue_min_secs: u64,
    pub error_requeue_max_secs: u64,
    pub deploy_cache_ttl_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            platform_type: DEFAULT_PLATFORM_TYPE.to_string(),
            platform_version: env!("CARGO_PKG_VERSION").to_string(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            applications_namespace: DEFAULT_APPLICATIONS_NAMESPACE.to_string(),
            enabled_components: Vec::new(),
            error_requeue_min_secs: DEFAULT_ERROR_REQUEUE_MIN_SECS,
            error_requeue_max_secs: DEFAULT_ERROR_REQUEUE_MAX_SECS,
            deploy_cache_ttl_secs: DEFAULT_DEPLOY_CACHE_TTL_SECS,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            platform_type: env_var_or_default("PLATFORM_TYPE", defaults.platform_type),
            platform_version: env_var_or_default("PLATFORM_VERSION", defaults.platform_version),
            field_manager: env_var_or_default("FIELD_MANAGER", defaults.field_manager),
            applications_namespace: env_var_or_default(
                "APPLICATIONS_NAMESPACE",
                defaults.applications_namespace,
            ),
            enabled_components: parse_component_list(
                &std::env::var("ENABLED_COMPONENTS").unwrap_or_default(),
            ),
            error_requeue_min_secs: env_var_or_default(
                "ERROR_REQUEUE_MIN_SECS",
                defaults.error_requeue_min_secs,
            ),
            error_requeue_max_secs: env_var_or_default(
                "ERROR_REQUEUE_MAX_SECS",
                defaults.error_requeue_max_secs,
            ),
            deploy_cache_ttl_secs: env_var_or_default(
                "DEPLOY_CACHE_TTL_SECS",
                defaults.deploy_cache_ttl_secs,
            ),
        }
    }

    pub fn release(&self) -> Release {
        Release {
            name: self.platform_type.clone(),
            version: self.platform_version.clone(),
        }
    }

    pub fn is_enabled(&self, component: &str) -> bool {
        self.enabled_components.is_empty()
            || self
                .enabled_components
                .iter()
                .any(|c| c.eq_ignore_ascii_case(component))
    }

    pub fn deploy_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.deploy_cache_ttl_secs)
    }
}

fn parse_component_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_list_is_trimmed_and_lowercased() {
        assert_eq!(
            parse_component_list(" Dashboard, ,kueue "),
            vec!["dashboard".to_string(), "kueue".to_string()]
        );
        assert!(parse_component_list("").is_empty());
    }

    #[test]
    fn empty_filter_enables_everything() {
        let config = OperatorConfig::default();
        assert!(config.is_enabled("dashboard"));

        let config = OperatorConfig {
            enabled_components: vec!["kueue".to_string()],
            ..OperatorConfig::default()
        };
        assert!(config.is_enabled("Kueue"));
        assert!(!config.is_enabled("dashboard"));
    }

    #[test]
    fn release_uses_platform_settings() {
        let release = OperatorConfig::default().release();
        assert_eq!(release.name, "OpenDataHub");
        assert_eq!(release.version, env!("CARGO_PKG_VERSION"));
    }
}
