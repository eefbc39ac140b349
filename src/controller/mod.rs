//! # Controller
//!
//! The reconciliation core: condition bookkeeping, the reconciliation
//! request, the action pipeline, the generic reconciler, and the component
//! registry.

pub mod actions;
pub mod conditions;
pub mod reconciler;
pub mod registry;
pub mod types;
