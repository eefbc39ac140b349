//! # Actions
//!
//! An action is one named step of a reconciliation pipeline. The reconciler
//! runs a controller's actions strictly in declaration order; the first
//! error aborts the rest of the pass.
//!
//! Actions are generic over the component kind, so an action that needs the
//! concrete instance reads it from [`ReconciliationRequest::instance`]
//! without any runtime type check.

pub mod dependency;
pub mod deploy;
pub mod deployments;
pub mod devflags;
pub mod gc;
pub mod render;

use crate::client::ClientError;
use crate::controller::types::ReconciliationRequest;
use crate::crd::PlatformObject;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Errors returned by actions
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{context}: {source}")]
    Client {
        context: String,
        #[source]
        source: ClientError,
    },

    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stops a finalizer chain without failing the reconcile
    #[error("stop")]
    Stop,

    #[error("reconciliation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ActionError {
    pub fn client(context: impl Into<String>, source: ClientError) -> Self {
        if matches!(source, ClientError::Cancelled) {
            return Self::Cancelled;
        }
        Self::Client {
            context: context.into(),
            source,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }
}

/// One step of a reconciliation pipeline
#[async_trait]
pub trait Action<K: PlatformObject>: Send + Sync {
    /// Name used for the tracing span and metrics label
    fn name(&self) -> &str;

    async fn run(&self, rr: &mut ReconciliationRequest<K>) -> Result<(), ActionError>;
}

/// Action built from a synchronous closure
pub struct FnAction<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

pub fn action_fn<K, F>(name: impl Into<String>, f: F) -> FnAction<F>
where
    K: PlatformObject,
    F: Fn(&mut ReconciliationRequest<K>) -> Result<(), ActionError> + Send + Sync,
{
    FnAction {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<K, F> Action<K> for FnAction<F>
where
    K: PlatformObject,
    F: Fn(&mut ReconciliationRequest<K>) -> Result<(), ActionError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, rr: &mut ReconciliationRequest<K>) -> Result<(), ActionError> {
        (self.f)(rr)
    }
}
