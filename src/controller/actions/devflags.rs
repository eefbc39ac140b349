//! # Manifest Initialization and Dev Flags
//!
//! [`InitializeAction`] points the request at the component's bundled
//! manifests. [`DevFlagsAction`] then swaps those for the locations listed in
//! the instance's `spec.devFlags.manifests`, if any.

use super::{Action, ActionError};
use crate::constants::DEFAULT_MANIFESTS_BASE_PATH;
use crate::controller::types::{ManifestInfo, ReconciliationRequest};
use crate::crd::{ManifestConfig, PlatformObject};
use async_trait::async_trait;
use tracing::debug;

/// Seeds `rr.manifests` with `<base>/<context_dir>/<source_path>`
#[derive(Debug)]
pub struct InitializeAction {
    base_path: String,
    context_dir: String,
    source_path: String,
}

impl InitializeAction {
    pub fn new(context_dir: impl Into<String>) -> Self {
        Self {
            base_path: DEFAULT_MANIFESTS_BASE_PATH.to_string(),
            context_dir: context_dir.into(),
            source_path: String::new(),
        }
    }

    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    #[must_use]
    pub fn with_source_path(mut self, source_path: impl Into<String>) -> Self {
        self.source_path = source_path.into();
        self
    }
}

#[async_trait]
impl<K: PlatformObject> Action<K> for InitializeAction {
    fn name(&self) -> &str {
        "initialize"
    }

    async fn run(&self, rr: &mut ReconciliationRequest<K>) -> Result<(), ActionError> {
        rr.manifests = vec![ManifestInfo::new(
            self.base_path.clone(),
            self.context_dir.clone(),
            self.source_path.clone(),
        )];
        Ok(())
    }
}

/// Local filesystem path of a dev flags manifest URI
fn local_path(config: &ManifestConfig) -> Result<&str, ActionError> {
    let uri = config.uri.trim();
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    if path.starts_with('/') {
        Ok(path)
    } else {
        Err(ActionError::Config(format!(
            "unsupported manifest uri {uri:?}: only local paths are supported"
        )))
    }
}

/// Replaces the bundled manifests with the dev flags overrides
#[derive(Debug, Default)]
pub struct DevFlagsAction;

impl DevFlagsAction {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<K: PlatformObject> Action<K> for DevFlagsAction {
    fn name(&self) -> &str {
        "devflags"
    }

    async fn run(&self, rr: &mut ReconciliationRequest<K>) -> Result<(), ActionError> {
        let Some(dev_flags) = rr.instance().dev_flags() else {
            return Ok(());
        };
        if dev_flags.manifests.is_empty() {
            return Ok(());
        }

        let manifests = dev_flags
            .manifests
            .iter()
            .map(|config| {
                let path = local_path(config)?;
                Ok(ManifestInfo::new(
                    path,
                    config.context_dir.clone(),
                    config.source_path.clone(),
                ))
            })
            .collect::<Result<Vec<_>, ActionError>>()?;

        debug!(count = manifests.len(), "using dev flags manifests");
        rr.manifests = manifests;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(uri: &str) -> ManifestConfig {
        ManifestConfig {
            uri: uri.to_string(),
            ..ManifestConfig::default()
        }
    }

    #[test]
    fn local_uris_resolve_to_paths() {
        assert_eq!(local_path(&config("file:///tmp/m")).unwrap(), "/tmp/m");
        assert_eq!(local_path(&config("/opt/dev")).unwrap(), "/opt/dev");
    }

    #[test]
    fn remote_uris_are_rejected() {
        assert!(matches!(
            local_path(&config("https://example.com/m.tar.gz")),
            Err(ActionError::Config(_))
        ));
        assert!(local_path(&config("relative/path")).is_err());
    }
}
