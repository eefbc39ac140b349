//! # Runtime Module
//!
//! Runtime components for the operator, including initialization, the HTTP
//! server, the per-component watch loop, and error handling.

pub mod error_policy;
pub mod initialization;
pub mod server;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use server::*;
pub use watch_loop::*;
