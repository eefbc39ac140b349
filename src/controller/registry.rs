//! # Component Registry
//!
//! The set of components the operator runs, built once at startup from an
//! explicit table of handlers.

use crate::client::{ClientError, ClusterClient};
use crate::config::OperatorConfig;
use futures::future::BoxFuture;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a component needs to start its controller
#[derive(Clone)]
pub struct ComponentContext {
    pub kube: kube::Client,
    pub cluster: Arc<dyn ClusterClient>,
    pub config: OperatorConfig,
    pub shutdown: CancellationToken,
}

impl fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One platform component
pub trait ComponentHandler: Send + Sync {
    /// Lowercase component name
    fn name(&self) -> &str;

    /// Kind of the component resource
    fn gvk(&self) -> GroupVersionKind;

    /// The singleton instance created when none exists
    fn default_instance(&self) -> Result<DynamicObject, ClientError>;

    /// Build the component controller; the returned future runs it until
    /// `ctx.shutdown` fires
    fn controller(
        &self,
        ctx: ComponentContext,
    ) -> anyhow::Result<BoxFuture<'static, anyhow::Result<()>>>;
}

#[derive(Default)]
pub struct ComponentRegistry {
    handlers: Vec<Arc<dyn ComponentHandler>>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, handler: impl ComponentHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn ComponentHandler>> {
        self.handlers.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ComponentHandler>> {
        self.handlers.iter().find(|h| h.name().eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Keep only the components enabled by `config`
    #[must_use]
    pub fn enabled(mut self, config: &OperatorConfig) -> Self {
        self.handlers.retain(|h| config.is_enabled(h.name()));
        self
    }

    /// Run `f` for every handler, continuing past failures; the failures are
    /// joined into a single error
    pub fn for_each<F>(&self, mut f: F) -> anyhow::Result<()>
    where
        F: FnMut(&Arc<dyn ComponentHandler>) -> anyhow::Result<()>,
    {
        let errors: Vec<String> = self
            .handlers
            .iter()
            .filter_map(|h| f(h).err().map(|e| format!("{}: {e:#}", h.name())))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::new_object;
    use futures::FutureExt;

    #[derive(Debug)]
    struct Stub(&'static str);

    impl ComponentHandler for Stub {
        fn name(&self) -> &str {
            self.0
        }

        fn gvk(&self) -> GroupVersionKind {
            GroupVersionKind::gvk("test.io", "v1", "Stub")
        }

        fn default_instance(&self) -> Result<DynamicObject, ClientError> {
            Ok(new_object(&self.gvk(), None, self.0))
        }

        fn controller(
            &self,
            _ctx: ComponentContext,
        ) -> anyhow::Result<BoxFuture<'static, anyhow::Result<()>>> {
            Ok(futures::future::ready(Ok(())).boxed())
        }
    }

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new().with(Stub("a")).with(Stub("b")).with(Stub("c"))
    }

    #[test]
    fn for_each_visits_every_handler_and_joins_errors() {
        let mut visited = Vec::new();
        let result = registry().for_each(|h| {
            visited.push(h.name().to_string());
            if h.name() == "a" || h.name() == "c" {
                anyhow::bail!("boom");
            }
            Ok(())
        });

        assert_eq!(visited, vec!["a", "b", "c"]);
        assert_eq!(result.unwrap_err().to_string(), "a: boom; c: boom");
    }

    #[test]
    fn enabled_filters_by_config() {
        let config = OperatorConfig {
            enabled_components: vec!["b".to_string()],
            ..OperatorConfig::default()
        };
        assert_eq!(registry().enabled(&config).names(), vec!["b"]);
        assert_eq!(registry().enabled(&OperatorConfig::default()).names().len(), 3);
        assert!(registry().get("B").is_some());
    }
}
