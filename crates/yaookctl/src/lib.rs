//! # yaookctl
//!
//! Recovery tooling for Yaook-managed OpenStack clusters.
//!
//! - [`collector`] and [`resolver`] work out which Galera replica a cluster
//!   should be bootstrapped from after a full outage.
//! - [`recovery`] forces a MySQLService or OVSDBService StatefulSet to restart
//!   from one named replica.
//! - [`upgrade`] force-upgrades per-node agents stuck mid-lifecycle.
//! - [`pause`] stops an operator from reconciling a resource.
//!
//! All cluster access goes through the [`control::ControlPlane`] and
//! [`collector::ReplicaStateSource`] traits; operator prompts go through
//! [`confirm::Confirmer`].

// -----------------------------------------------------------------------------
// API Design Choices
// -----------------------------------------------------------------------------
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]

pub mod collector;
pub mod config;
pub mod confirm;
pub mod control;
pub mod error;
pub mod grastate;
pub mod kinds;
pub mod lookups;
pub mod patch;
pub mod pause;
pub mod probe;
pub mod recovery;
pub mod resolver;
pub mod ui;
pub mod upgrade;

pub use config::{CtlConfig, ProbeSettings};
pub use error::{ControlPlaneError, RecoveryError};
pub use kinds::ResourceKind;
