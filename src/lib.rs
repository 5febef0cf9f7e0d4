#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # reshard-operator
//!
//! Runs the resharding reconciliation loop against a Kubernetes cluster.
//!
//! The engine itself lives in [`reshard_reconciler`]; this crate wires it to
//! the API server, the command line and the process signals.

pub mod config;
pub mod k8s;
pub mod shutdown;

pub use reshard_reconciler;
