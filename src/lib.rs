//! # DSC Operator
//!
//! Core of a Kubernetes operator that reconciles data science platform
//! components.
//!
//! ## Overview
//!
//! Each component (Dashboard, Kueue, ...) is a cluster-scoped singleton
//! custom resource driven by a generic reconciler:
//!
//! 1. **Action pipeline** - initialize, render and deploy manifests, check
//!    workload status, garbage collect stale objects
//! 2. **Condition aggregation** - every pipeline step reports a condition;
//!    the top-level `Ready` condition is derived from its dependents
//! 3. **Dependency monitoring** - degraded external operators surface as
//!    `DependenciesAvailable`
//! 4. **Status write-back** - conditions, phase and `observedGeneration`
//!    are server-side applied to the status subresource
//!
//! ## Features
//!
//! - **Kind-agnostic client**: actions operate on `DynamicObject`, so
//!   foreign CRDs that may not be installed are handled uniformly
//! - **Deploy cache**: unchanged objects are not re-applied
//! - **Prometheus metrics** and **health probes** on one HTTP port

pub mod client;
pub mod components;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod resources;
pub mod runtime;
