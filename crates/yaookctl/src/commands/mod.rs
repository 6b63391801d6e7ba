//! Subcommand implementations.

pub mod force_upgrade;
pub mod galera;
pub mod ovsdb;
pub mod pause;
